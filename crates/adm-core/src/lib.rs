use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod tree;

pub use tree::{build_tree, Tree, TreeNode};

/// 账号状态: 0=禁用, 1=正常, 2=锁定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Disabled,
    Enabled,
    Locked,
}

impl AccountStatus {
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::Disabled),
            1 => Some(Self::Enabled),
            2 => Some(Self::Locked),
            _ => None,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::Disabled => 0,
            Self::Enabled => 1,
            Self::Locked => 2,
        }
    }
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Enabled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub status: AccountStatus,
    pub locked_until: Option<DateTime<Utc>>,
    pub login_attempts: i32,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub department_id: i64,
}

impl Account {
    /// 锁定到期后视为未锁定；未设置到期时间的锁定一直有效
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AccountStatus::Locked && self.locked_until.map_or(true, |until| now < until)
    }

    pub fn is_disabled(&self) -> bool {
        self.status == AccountStatus::Disabled
    }
}

/// 数据权限范围: 1=全部, 2=本部门, 3=本部门及子部门, 4=仅本人, 5=自定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    All,
    Department,
    DepartmentTree,
    SelfOnly,
    Custom,
}

impl DataScope {
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::All),
            2 => Some(Self::Department),
            3 => Some(Self::DepartmentTree),
            4 => Some(Self::SelfOnly),
            5 => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::All => 1,
            Self::Department => 2,
            Self::DepartmentTree => 3,
            Self::SelfOnly => 4,
            Self::Custom => 5,
        }
    }
}

impl Default for DataScope {
    fn default() -> Self {
        Self::All
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub data_scope: DataScope,
    pub sort: i32,
    pub status: bool,
}

/// 权限注册表条目（受保护的接口）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEntry {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub permission_code: String,
    pub url: String,
    pub method: String,
    pub sort: i32,
    pub status: bool,
    pub is_menu: bool,
    pub description: Option<String>,
}

/// 角色与权限码的关联快照，角色每次更新时整体重建
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleApi {
    pub role_id: i64,
    pub permission_code: String,
    pub api_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub sort: i32,
    pub status: bool,
}

/// 通用 JSON 响应结构: `{code, message, data}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

impl<T> JsonResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: adm_error::ResponseCode::OK,
            message: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn empty() -> Self {
        Self {
            code: adm_error::ResponseCode::OK,
            message: "ok".to_string(),
            data: None,
        }
    }
}

pub use adm_error::{AdmError as Error, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(status: AccountStatus, locked_until: Option<DateTime<Utc>>) -> Account {
        Account {
            id: 1,
            username: "alice".to_string(),
            password_hash: String::new(),
            email: None,
            mobile: None,
            status,
            locked_until,
            login_attempts: 0,
            last_login_at: None,
            last_login_ip: None,
            department_id: 0,
        }
    }

    #[test]
    fn test_lock_expiry() {
        let now = Utc::now();
        assert!(account(AccountStatus::Locked, None).is_locked_at(now));
        assert!(account(AccountStatus::Locked, Some(now + Duration::minutes(5))).is_locked_at(now));
        assert!(!account(AccountStatus::Locked, Some(now - Duration::minutes(5))).is_locked_at(now));
        assert!(!account(AccountStatus::Enabled, None).is_locked_at(now));
    }

    #[test]
    fn test_status_codes() {
        for status in [AccountStatus::Disabled, AccountStatus::Enabled, AccountStatus::Locked] {
            assert_eq!(AccountStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(AccountStatus::from_code(9), None);
        assert_eq!(DataScope::from_code(4), Some(DataScope::SelfOnly));
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let mut acc = account(AccountStatus::Enabled, None);
        acc.password_hash = "$2b$04$secret".to_string();
        let json = serde_json::to_string(&acc).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"username\":\"alice\""));
    }
}
