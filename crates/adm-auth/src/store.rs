//! 存储抽象
//!
//! 认证核心只依赖这些 trait；`PgStore` 和 `MemoryStore` 分别提供
//! Postgres 与内存实现。

use adm_core::{Account, ApiEntry, Department, Role};
use adm_error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::RoleQuery;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>>;
    /// 记录登录时间与IP
    async fn record_login(&self, id: i64, at: DateTime<Utc>, ip: Option<String>) -> Result<()>;
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;
    /// 账号当前拥有的角色（不含已禁用的角色）
    async fn roles_of(&self, account_id: i64) -> Result<Vec<Role>>;
    /// 新建账号并关联角色；用户名重复为 `Conflict`，角色不存在为 `NotFound`，失败时不留下写入
    async fn create_account(&self, account: Account, role_ids: &[i64]) -> Result<Account>;
}

/// 权限注册表的持久化
#[async_trait]
pub trait ApiRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<ApiEntry>>;
    async fn get_by_id(&self, id: i64) -> Result<Option<ApiEntry>>;
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<ApiEntry>>;
    /// 新增条目，`entry.id` 被忽略，返回写入后的条目
    async fn create(&self, entry: ApiEntry) -> Result<ApiEntry>;
    async fn update(&self, entry: ApiEntry) -> Result<ApiEntry>;
    /// 删除条目及其在角色关联中的引用
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// 在同一事务内写入角色及其权限关联
    async fn create_role(&self, role: Role, api_ids: &[i64]) -> Result<Role>;
    async fn update_role(&self, role: Role, api_ids: &[i64]) -> Result<Role>;
    async fn delete_role(&self, id: i64) -> Result<()>;
    /// 按 `sort DESC, id DESC` 排序分页，返回 (当前页, 总数)
    async fn list_roles(&self, query: &RoleQuery) -> Result<(Vec<Role>, i64)>;
    async fn get_role(&self, id: i64) -> Result<Option<Role>>;
}

/// 角色与权限码关联
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    /// 整体替换角色的权限关联；任一接口ID不存在时整体失败，原关联保持不变
    async fn set_role_permissions(&self, role_id: i64, api_ids: &[i64]) -> Result<()>;
    /// 多个角色的权限码并集；空角色集合返回空集合
    async fn permission_codes(&self, role_ids: &[i64]) -> Result<HashSet<String>>;
    async fn has_permission(&self, role_ids: &[i64], code: &str) -> Result<bool>;
    async fn count_by_role(&self, role_ids: &[i64]) -> Result<HashMap<i64, i64>>;
    async fn api_ids_of_role(&self, role_id: i64) -> Result<Vec<i64>>;
}

#[async_trait]
pub trait DepartmentRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Department>>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Department>>;
    /// `department.id` 被忽略
    async fn create(&self, department: Department) -> Result<Department>;
    async fn update(&self, department: Department) -> Result<Department>;
    /// 存在下级部门时拒绝删除
    async fn delete(&self, id: i64) -> Result<()>;
}

/// 各仓储的集合，通常由同一个底层存储提供
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountRepository>,
    pub apis: Arc<dyn ApiRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub role_permissions: Arc<dyn RolePermissionStore>,
    pub departments: Arc<dyn DepartmentRepository>,
}

impl Stores {
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: AccountRepository
            + ApiRepository
            + RoleRepository
            + RolePermissionStore
            + DepartmentRepository
            + 'static,
    {
        Self {
            accounts: store.clone(),
            apis: store.clone(),
            roles: store.clone(),
            role_permissions: store.clone(),
            departments: store,
        }
    }
}
