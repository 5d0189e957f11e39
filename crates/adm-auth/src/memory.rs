//! 内存存储
//!
//! 所有表共用一把读写锁，任何写操作对读者都是原子的。
//! 用于测试和无数据库的本地运行。

use adm_core::{Account, ApiEntry, Department, Role, RoleApi};
use adm_error::{AdmError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::models::RoleQuery;
use crate::store::{
    AccountRepository, ApiRepository, DepartmentRepository, RolePermissionStore, RoleRepository,
};

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    account_roles: HashMap<i64, Vec<i64>>,
    roles: BTreeMap<i64, Role>,
    apis: BTreeMap<i64, ApiEntry>,
    role_apis: Vec<RoleApi>,
    departments: BTreeMap<i64, Department>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self, requested: i64) -> i64 {
        if requested > 0 {
            self.last_id = self.last_id.max(requested);
            requested
        } else {
            self.last_id += 1;
            self.last_id
        }
    }

    fn ensure_unique_code(&self, entry: &ApiEntry) -> Result<()> {
        let taken = self
            .apis
            .values()
            .any(|api| api.id != entry.id && api.permission_code == entry.permission_code);
        if taken {
            return Err(AdmError::Conflict {
                details: format!("权限码已存在: {}", entry.permission_code),
            });
        }
        Ok(())
    }

    fn ensure_unique_role_name(&self, role: &Role) -> Result<()> {
        if self
            .roles
            .values()
            .any(|r| r.id != role.id && r.name == role.name)
        {
            return Err(AdmError::Conflict {
                details: format!("角色名称已存在: {}", role.name),
            });
        }
        Ok(())
    }

    /// 把接口ID解析为关联行；任一ID不存在即失败
    fn resolve_role_apis(&self, role_id: i64, api_ids: &[i64]) -> Result<Vec<RoleApi>> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        let mut rows = Vec::with_capacity(api_ids.len());
        for &api_id in api_ids {
            if !seen.insert(api_id) {
                continue;
            }
            match self.apis.get(&api_id) {
                Some(api) => rows.push(RoleApi {
                    role_id,
                    permission_code: api.permission_code.clone(),
                    api_id,
                }),
                None => missing.push(api_id),
            }
        }
        if !missing.is_empty() {
            return Err(AdmError::NotFound {
                resource: format!("api {:?}", missing),
            });
        }
        Ok(rows)
    }

    fn replace_role_apis(&mut self, role_id: i64, rows: Vec<RoleApi>) {
        self.role_apis.retain(|row| row.role_id != role_id);
        self.role_apis.extend(rows);
    }
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// 模拟存储故障，之后所有读写返回 `ServiceUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AdmError::ServiceUnavailable {
                service: "memory-store".to_string(),
                retry_after: Some(std::time::Duration::from_secs(1)),
            });
        }
        Ok(())
    }

    // 初始化数据。id 为 0 时自动分配

    pub async fn insert_account(&self, mut account: Account) -> i64 {
        let mut tables = self.tables.write().await;
        account.id = tables.next_id(account.id);
        let id = account.id;
        tables.accounts.insert(id, account);
        id
    }

    pub async fn insert_role(&self, mut role: Role) -> i64 {
        let mut tables = self.tables.write().await;
        role.id = tables.next_id(role.id);
        let id = role.id;
        tables.roles.insert(id, role);
        id
    }

    pub async fn insert_api(&self, mut entry: ApiEntry) -> i64 {
        let mut tables = self.tables.write().await;
        entry.id = tables.next_id(entry.id);
        let id = entry.id;
        tables.apis.insert(id, entry);
        id
    }

    pub async fn insert_department(&self, mut department: Department) -> i64 {
        let mut tables = self.tables.write().await;
        department.id = tables.next_id(department.id);
        let id = department.id;
        tables.departments.insert(id, department);
        id
    }

    pub async fn assign_role(&self, account_id: i64, role_id: i64) {
        let mut tables = self.tables.write().await;
        let roles = tables.account_roles.entry(account_id).or_default();
        if !roles.contains(&role_id) {
            roles.push(role_id);
        }
    }

    pub async fn set_account_status(
        &self,
        account_id: i64,
        status: adm_core::AccountStatus,
        locked_until: Option<DateTime<Utc>>,
    ) {
        let mut tables = self.tables.write().await;
        if let Some(account) = tables.accounts.get_mut(&account_id) {
            account.status = status;
            account.locked_until = locked_until;
        }
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Account>> {
        self.check()?;
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>, ip: Option<String>) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let account = tables.accounts.get_mut(&id).ok_or_else(|| AdmError::NotFound {
            resource: format!("account {}", id),
        })?;
        account.last_login_at = Some(at);
        account.last_login_ip = ip;
        account.login_attempts = 0;
        Ok(())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let account = tables.accounts.get_mut(&id).ok_or_else(|| AdmError::NotFound {
            resource: format!("account {}", id),
        })?;
        account.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn roles_of(&self, account_id: i64) -> Result<Vec<Role>> {
        self.check()?;
        let tables = self.tables.read().await;
        let Some(role_ids) = tables.account_roles.get(&account_id) else {
            return Ok(Vec::new());
        };
        Ok(role_ids
            .iter()
            .filter_map(|id| tables.roles.get(id))
            .filter(|role| role.status)
            .cloned()
            .collect())
    }

    async fn create_account(&self, mut account: Account, role_ids: &[i64]) -> Result<Account> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.accounts.values().any(|a| a.username == account.username) {
            return Err(AdmError::Conflict {
                details: format!("用户名已存在: {}", account.username),
            });
        }
        let mut roles: Vec<i64> = Vec::with_capacity(role_ids.len());
        for &role_id in role_ids {
            if !tables.roles.contains_key(&role_id) {
                return Err(AdmError::NotFound {
                    resource: format!("role {}", role_id),
                });
            }
            if !roles.contains(&role_id) {
                roles.push(role_id);
            }
        }
        account.id = tables.next_id(0);
        tables.accounts.insert(account.id, account.clone());
        tables.account_roles.insert(account.id, roles);
        Ok(account)
    }
}

#[async_trait]
impl ApiRepository for MemoryStore {
    async fn list_all(&self) -> Result<Vec<ApiEntry>> {
        self.check()?;
        Ok(self.tables.read().await.apis.values().cloned().collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ApiEntry>> {
        self.check()?;
        Ok(self.tables.read().await.apis.get(&id).cloned())
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<ApiEntry>> {
        self.check()?;
        let tables = self.tables.read().await;
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        Ok(tables
            .apis
            .values()
            .filter(|api| wanted.contains(&api.id))
            .cloned()
            .collect())
    }

    async fn create(&self, mut entry: ApiEntry) -> Result<ApiEntry> {
        self.check()?;
        let mut tables = self.tables.write().await;
        entry.id = 0;
        tables.ensure_unique_code(&entry)?;
        entry.id = tables.next_id(0);
        tables.apis.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn update(&self, entry: ApiEntry) -> Result<ApiEntry> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if !tables.apis.contains_key(&entry.id) {
            return Err(AdmError::NotFound {
                resource: format!("api {}", entry.id),
            });
        }
        tables.ensure_unique_code(&entry)?;
        // 关联表中冗余的权限码跟随更新
        for row in tables.role_apis.iter_mut().filter(|r| r.api_id == entry.id) {
            row.permission_code = entry.permission_code.clone();
        }
        tables.apis.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.apis.values().any(|api| api.parent_id == id) {
            return Err(AdmError::Validation {
                message: "请先删除子节点".to_string(),
            });
        }
        if tables.apis.remove(&id).is_none() {
            return Err(AdmError::NotFound {
                resource: format!("api {}", id),
            });
        }
        tables.role_apis.retain(|row| row.api_id != id);
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn create_role(&self, mut role: Role, api_ids: &[i64]) -> Result<Role> {
        self.check()?;
        let mut tables = self.tables.write().await;
        role.id = 0;
        tables.ensure_unique_role_name(&role)?;
        // 先解析关联，失败时不留下任何写入
        let mut rows = tables.resolve_role_apis(0, api_ids)?;
        role.id = tables.next_id(0);
        for row in rows.iter_mut() {
            row.role_id = role.id;
        }
        tables.roles.insert(role.id, role.clone());
        tables.replace_role_apis(role.id, rows);
        Ok(role)
    }

    async fn update_role(&self, role: Role, api_ids: &[i64]) -> Result<Role> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if !tables.roles.contains_key(&role.id) {
            return Err(AdmError::NotFound {
                resource: format!("role {}", role.id),
            });
        }
        tables.ensure_unique_role_name(&role)?;
        let rows = tables.resolve_role_apis(role.id, api_ids)?;
        tables.roles.insert(role.id, role.clone());
        tables.replace_role_apis(role.id, rows);
        Ok(role)
    }

    async fn delete_role(&self, id: i64) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.roles.remove(&id).is_none() {
            return Err(AdmError::NotFound {
                resource: format!("role {}", id),
            });
        }
        tables.role_apis.retain(|row| row.role_id != id);
        for roles in tables.account_roles.values_mut() {
            roles.retain(|r| *r != id);
        }
        Ok(())
    }

    async fn list_roles(&self, query: &RoleQuery) -> Result<(Vec<Role>, i64)> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut matched: Vec<&Role> = tables.roles.values().filter(|r| query.matches(r)).collect();
        matched.sort_by(|a, b| b.sort.cmp(&a.sort).then(b.id.cmp(&a.id)));

        let total = matched.len() as i64;
        let (offset, limit) = query.window();
        let page = matched.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }

    async fn get_role(&self, id: i64) -> Result<Option<Role>> {
        self.check()?;
        Ok(self.tables.read().await.roles.get(&id).cloned())
    }
}

#[async_trait]
impl RolePermissionStore for MemoryStore {
    async fn set_role_permissions(&self, role_id: i64, api_ids: &[i64]) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if !tables.roles.contains_key(&role_id) {
            return Err(AdmError::NotFound {
                resource: format!("role {}", role_id),
            });
        }
        let rows = tables.resolve_role_apis(role_id, api_ids)?;
        tables.replace_role_apis(role_id, rows);
        Ok(())
    }

    async fn permission_codes(&self, role_ids: &[i64]) -> Result<HashSet<String>> {
        self.check()?;
        if role_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let tables = self.tables.read().await;
        Ok(tables
            .role_apis
            .iter()
            .filter(|row| role_ids.contains(&row.role_id))
            .map(|row| row.permission_code.clone())
            .collect())
    }

    async fn has_permission(&self, role_ids: &[i64], code: &str) -> Result<bool> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .role_apis
            .iter()
            .any(|row| row.permission_code == code && role_ids.contains(&row.role_id)))
    }

    async fn count_by_role(&self, role_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut counts: HashMap<i64, i64> = role_ids.iter().map(|id| (*id, 0)).collect();
        for row in &tables.role_apis {
            if let Some(count) = counts.get_mut(&row.role_id) {
                *count += 1;
            }
        }
        Ok(counts)
    }

    async fn api_ids_of_role(&self, role_id: i64) -> Result<Vec<i64>> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .role_apis
            .iter()
            .filter(|row| row.role_id == role_id)
            .map(|row| row.api_id)
            .collect())
    }
}

#[async_trait]
impl DepartmentRepository for MemoryStore {
    async fn list_all(&self) -> Result<Vec<Department>> {
        self.check()?;
        Ok(self.tables.read().await.departments.values().cloned().collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Department>> {
        self.check()?;
        Ok(self.tables.read().await.departments.get(&id).cloned())
    }

    async fn create(&self, mut department: Department) -> Result<Department> {
        self.check()?;
        let mut tables = self.tables.write().await;
        department.id = tables.next_id(0);
        tables.departments.insert(department.id, department.clone());
        Ok(department)
    }

    async fn update(&self, department: Department) -> Result<Department> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let Some(slot) = tables.departments.get_mut(&department.id) else {
            return Err(AdmError::NotFound {
                resource: format!("department {}", department.id),
            });
        };
        *slot = department.clone();
        Ok(department)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.departments.values().any(|d| d.parent_id == id) {
            return Err(AdmError::Validation {
                message: "请先删除下级部门".to_string(),
            });
        }
        if tables.departments.remove(&id).is_none() {
            return Err(AdmError::NotFound {
                resource: format!("department {}", id),
            });
        }
        Ok(())
    }
}
