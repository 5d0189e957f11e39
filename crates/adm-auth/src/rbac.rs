use adm_core::{build_tree, Account, Department, Role, Tree};
use adm_error::{AdmError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::models::{
    AccountInput, DepartmentInput, Page, RoleDetail, RoleInput, RoleItem, RoleQuery,
};
use crate::password::PasswordService;
use crate::registry::PermissionRegistry;
use crate::store::{
    AccountRepository, DepartmentRepository, RolePermissionStore, RoleRepository, Stores,
};

/// 授权判定所需的账号信息
#[derive(Debug, Clone)]
pub struct Subject {
    pub account: Account,
    pub role_ids: Vec<i64>,
}

/// 权限检查特质
#[async_trait]
pub trait PermissionCheck: Send + Sync {
    /// 账号当前状态与有效角色；账号不存在返回 `None`
    async fn subject(&self, user_id: i64) -> Result<Option<Subject>>;
    /// 路由对应的权限码，未注册返回 `NotFound`
    async fn resolve_code(&self, method: &str, route: &str) -> Result<String>;
    async fn has_permission(&self, role_ids: &[i64], code: &str) -> Result<bool>;
}

/// RBAC服务 - 角色基础访问控制
pub struct RbacService {
    accounts: Arc<dyn AccountRepository>,
    roles: Arc<dyn RoleRepository>,
    role_permissions: Arc<dyn RolePermissionStore>,
    departments: Arc<dyn DepartmentRepository>,
    registry: Arc<PermissionRegistry>,
}

impl RbacService {
    pub fn new(stores: &Stores, registry: Arc<PermissionRegistry>) -> Self {
        Self {
            accounts: stores.accounts.clone(),
            roles: stores.roles.clone(),
            role_permissions: stores.role_permissions.clone(),
            departments: stores.departments.clone(),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<PermissionRegistry> {
        &self.registry
    }

    pub async fn roles_of(&self, user_id: i64) -> Result<Vec<Role>> {
        self.accounts.roles_of(user_id).await
    }

    /// 多个角色的权限码，按字典序返回
    pub async fn permission_codes(&self, role_ids: &[i64]) -> Result<Vec<String>> {
        let codes: HashSet<String> = self.role_permissions.permission_codes(role_ids).await?;
        let mut codes: Vec<String> = codes.into_iter().collect();
        codes.sort();
        Ok(codes)
    }

    pub async fn set_role_permissions(&self, role_id: i64, api_ids: &[i64]) -> Result<()> {
        self.role_permissions
            .set_role_permissions(role_id, api_ids)
            .await?;
        info!(role_id, apis = api_ids.len(), "role permissions replaced");
        Ok(())
    }

    pub async fn create_role(&self, input: RoleInput) -> Result<Role> {
        input.validate()?;
        let role = self
            .roles
            .create_role(input.to_role(0), &input.api_ids)
            .await?;
        info!(role_id = role.id, name = %role.name, "role created");
        Ok(role)
    }

    pub async fn update_role(&self, id: i64, input: RoleInput) -> Result<Role> {
        input.validate()?;
        let role = self
            .roles
            .update_role(input.to_role(id), &input.api_ids)
            .await?;
        info!(role_id = id, apis = input.api_ids.len(), "role updated");
        Ok(role)
    }

    pub async fn delete_role(&self, id: i64) -> Result<()> {
        self.roles.delete_role(id).await?;
        info!(role_id = id, "role deleted");
        Ok(())
    }

    /// 角色列表，附带每个角色关联的接口数量
    pub async fn list_roles(&self, query: &RoleQuery) -> Result<Page<RoleItem>> {
        let (roles, total) = self.roles.list_roles(query).await?;
        let ids: Vec<i64> = roles.iter().map(|r| r.id).collect();
        let counts = self.role_permissions.count_by_role(&ids).await?;

        let list = roles
            .into_iter()
            .map(|role| {
                let api_count = counts.get(&role.id).copied().unwrap_or(0);
                RoleItem { role, api_count }
            })
            .collect();
        Ok(Page { list, total })
    }

    pub async fn role_detail(&self, id: i64) -> Result<RoleDetail> {
        let role = self
            .roles
            .get_role(id)
            .await?
            .ok_or_else(|| AdmError::NotFound {
                resource: format!("role {}", id),
            })?;
        let api_ids = self.role_permissions.api_ids_of_role(id).await?;
        Ok(RoleDetail { role, api_ids })
    }

    pub async fn department_tree(&self) -> Result<Vec<Tree<Department>>> {
        let departments = self.departments.list_all().await?;
        build_tree(departments, 0)
    }

    pub async fn create_department(&self, input: DepartmentInput) -> Result<Department> {
        let department = input.into_department(0)?;
        if department.parent_id != 0 {
            self.department(department.parent_id).await?;
        }
        let created = self.departments.create(department).await?;
        info!(department_id = created.id, name = %created.name, "department created");
        Ok(created)
    }

    pub async fn update_department(&self, id: i64, input: DepartmentInput) -> Result<Department> {
        let department = input.into_department(id)?;

        // 上级必须存在，且调整后仍是一棵树
        let mut departments = self.departments.list_all().await?;
        let Some(slot) = departments.iter_mut().find(|d| d.id == id) else {
            return Err(AdmError::NotFound {
                resource: format!("department {}", id),
            });
        };
        *slot = department.clone();
        if department.parent_id != 0 && !departments.iter().any(|d| d.id == department.parent_id) {
            return Err(AdmError::NotFound {
                resource: format!("department {}", department.parent_id),
            });
        }
        build_tree(departments, 0)?;

        let updated = self.departments.update(department).await?;
        info!(department_id = id, parent_id = updated.parent_id, "department updated");
        Ok(updated)
    }

    pub async fn delete_department(&self, id: i64) -> Result<()> {
        self.departments.delete(id).await?;
        info!(department_id = id, "department deleted");
        Ok(())
    }

    async fn department(&self, id: i64) -> Result<Department> {
        self.departments
            .get_by_id(id)
            .await?
            .ok_or_else(|| AdmError::NotFound {
                resource: format!("department {}", id),
            })
    }

    /// 新建账号并分配角色，密码按强度规则校验后哈希
    pub async fn create_account(&self, input: AccountInput) -> Result<Account> {
        input.validate()?;
        if input.department_id != 0 {
            self.department(input.department_id).await?;
        }
        let password = input.password.clone();
        let hash =
            tokio::task::spawn_blocking(move || PasswordService::hash_password(&password)).await??;
        let account = self
            .accounts
            .create_account(input.to_account(hash), &input.role_ids)
            .await?;
        info!(
            account_id = account.id,
            username = %account.username,
            roles = input.role_ids.len(),
            "account created"
        );
        Ok(account)
    }
}

#[async_trait]
impl PermissionCheck for RbacService {
    async fn subject(&self, user_id: i64) -> Result<Option<Subject>> {
        let Some(account) = self.accounts.find_by_id(user_id).await? else {
            return Ok(None);
        };
        let role_ids = self
            .accounts
            .roles_of(user_id)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        Ok(Some(Subject { account, role_ids }))
    }

    async fn resolve_code(&self, method: &str, route: &str) -> Result<String> {
        self.registry.resolve_code(method, route).await
    }

    async fn has_permission(&self, role_ids: &[i64], code: &str) -> Result<bool> {
        if role_ids.is_empty() {
            return Ok(false);
        }
        self.role_permissions.has_permission(role_ids, code).await
    }
}
