use adm_core::{Account, AccountStatus, ApiEntry, DataScope, Department, Role, Tree};
use adm_error::{AdmError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 当前请求的身份，由令牌解析得到，只在单个请求内有效
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
}

/// API请求和响应类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub captcha_id: String,
    pub captcha_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expire: DateTime<Utc>,
    pub refresh: DateTime<Utc>,
    pub user: Account,
    pub roles: Vec<Role>,
    pub role_ids: Vec<i64>,
    pub apis: Vec<ApiEntry>,
    /// 前端按钮级控制使用，不能替代服务端校验
    pub api_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user: Account,
    pub roles: Vec<Role>,
    pub api_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct CaptchaResponse {
    pub id: String,
    pub base64: String,
}

// 创建/更新角色请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_scope: DataScope,
    #[serde(default)]
    pub sort: i32,
    #[serde(default = "default_true")]
    pub status: bool,
    #[serde(default)]
    pub api_ids: Vec<i64>,
}

fn default_true() -> bool {
    true
}

impl RoleInput {
    pub fn validate(&self) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > 64 {
            return Err(AdmError::Validation {
                message: "角色名称长度应为1-64个字符".to_string(),
            });
        }
        Ok(())
    }

    pub fn to_role(&self, id: i64) -> Role {
        Role {
            id,
            name: self.name.trim().to_string(),
            description: self.description.clone(),
            data_scope: self.data_scope,
            sort: self.sort,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    pub name: Option<String>,
    pub status: Option<bool>,
}

fn default_page() -> u32 {
    1
}

fn default_size() -> u32 {
    20
}

impl Default for RoleQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            size: default_size(),
            name: None,
            status: None,
        }
    }
}

impl RoleQuery {
    /// 规范化分页参数，返回 (offset, limit)
    pub fn window(&self) -> (usize, usize) {
        let size = self.size.clamp(1, 200) as usize;
        let page = self.page.max(1) as usize;
        ((page - 1) * size, size)
    }

    pub fn matches(&self, role: &Role) -> bool {
        let name_ok = self
            .name
            .as_deref()
            .map_or(true, |needle| role.name.contains(needle));
        let status_ok = self.status.map_or(true, |s| role.status == s);
        name_ok && status_ok
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleItem {
    #[serde(flatten)]
    pub role: Role,
    pub api_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Role,
    pub api_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub list: Vec<T>,
    pub total: i64,
}

// 创建/更新接口请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInput {
    #[serde(default)]
    pub parent_id: i64,
    pub name: String,
    pub permission_code: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub sort: i32,
    #[serde(default = "default_true")]
    pub status: bool,
    #[serde(default)]
    pub is_menu: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl ApiInput {
    /// 校验并生成条目；菜单节点可以不绑定路由
    pub fn into_entry(self, id: i64) -> Result<ApiEntry> {
        if self.name.trim().is_empty() || self.permission_code.trim().is_empty() {
            return Err(AdmError::Validation {
                message: "名称和权限码不能为空".to_string(),
            });
        }
        if self.parent_id == id && id != 0 {
            return Err(AdmError::Validation {
                message: "不能将自身设置为父节点".to_string(),
            });
        }
        let method = self.method.trim().to_ascii_uppercase();
        if !self.is_menu && (self.url.is_empty() || method.is_empty()) {
            return Err(AdmError::Validation {
                message: "非菜单接口必须指定 url 和 method".to_string(),
            });
        }
        if !self.url.is_empty() && !self.url.starts_with('/') {
            return Err(AdmError::Validation {
                message: format!("url 必须以 / 开头: {}", self.url),
            });
        }

        Ok(ApiEntry {
            id,
            parent_id: self.parent_id,
            name: self.name.trim().to_string(),
            permission_code: self.permission_code.trim().to_string(),
            url: self.url,
            method,
            sort: self.sort,
            status: self.status,
            is_menu: self.is_menu,
            description: self.description,
        })
    }
}

// 创建/更新部门请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentInput {
    #[serde(default)]
    pub parent_id: i64,
    pub name: String,
    #[serde(default)]
    pub sort: i32,
    #[serde(default = "default_true")]
    pub status: bool,
}

impl DepartmentInput {
    pub fn into_department(self, id: i64) -> Result<Department> {
        let name = self.name.trim();
        if name.is_empty() || name.chars().count() > 50 {
            return Err(AdmError::Validation {
                message: "部门名称长度应为1-50个字符".to_string(),
            });
        }
        if self.parent_id == id && id != 0 {
            return Err(AdmError::Validation {
                message: "不能将自身设置为上级部门".to_string(),
            });
        }
        Ok(Department {
            id,
            parent_id: self.parent_id,
            name: name.to_string(),
            sort: self.sort,
            status: self.status,
        })
    }
}

/// 创建账号请求，密码为明文，由服务端哈希
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInput {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(default)]
    pub department_id: i64,
    #[serde(default)]
    pub role_ids: Vec<i64>,
}

impl AccountInput {
    pub fn validate(&self) -> Result<()> {
        let len = self.username.trim().chars().count();
        if !(3..=20).contains(&len) {
            return Err(AdmError::Validation {
                message: "用户名长度必须在3-20个字符之间".to_string(),
            });
        }
        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            if !email.contains('@') {
                return Err(AdmError::Validation {
                    message: "邮箱格式不正确".to_string(),
                });
            }
        }
        Ok(())
    }

    /// 生成待写入的账号，`password_hash` 由调用方提供
    pub fn to_account(&self, password_hash: String) -> Account {
        Account {
            id: 0,
            username: self.username.trim().to_string(),
            password_hash,
            email: self.email.clone().filter(|e| !e.is_empty()),
            mobile: self.mobile.clone().filter(|m| !m.is_empty()),
            status: self.status,
            locked_until: None,
            login_attempts: 0,
            last_login_at: None,
            last_login_ip: None,
            department_id: self.department_id,
        }
    }
}

/// 接口树及前端渲染用的静态映射
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTreeResponse {
    pub tree: Vec<Tree<ApiEntry>>,
    pub method_map: BTreeMap<&'static str, &'static str>,
    pub is_menu_map: BTreeMap<&'static str, &'static str>,
    pub status_map: BTreeMap<&'static str, &'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_input(is_menu: bool, url: &str, method: &str) -> ApiInput {
        ApiInput {
            parent_id: 0,
            name: "文章列表".to_string(),
            permission_code: "cms:article:list".to_string(),
            url: url.to_string(),
            method: method.to_string(),
            sort: 0,
            status: true,
            is_menu,
            description: None,
        }
    }

    #[test]
    fn test_login_request_is_camel_case() {
        let req: LoginRequest = serde_json::from_str(
            r#"{"username":"editor","password":"p","captchaId":"c1","captchaCode":"1234"}"#,
        )
        .unwrap();
        assert_eq!(req.captcha_id, "c1");
        assert_eq!(req.captcha_code, "1234");
    }

    #[test]
    fn test_api_input_normalizes_method() {
        let entry = api_input(false, "/sys/cms/article", "get").into_entry(3).unwrap();
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.id, 3);
    }

    #[test]
    fn test_api_input_requires_route_unless_menu() {
        assert!(api_input(false, "", "").into_entry(1).is_err());
        assert!(api_input(true, "", "").into_entry(1).is_ok());
        assert!(api_input(false, "sys/x", "GET").into_entry(1).is_err());
    }

    #[test]
    fn test_role_query_window() {
        let q = RoleQuery {
            page: 3,
            size: 10,
            ..RoleQuery::default()
        };
        assert_eq!(q.window(), (20, 10));

        let q = RoleQuery {
            page: 0,
            size: 0,
            ..RoleQuery::default()
        };
        assert_eq!(q.window(), (0, 1));

        // 代码里构造的默认查询与空查询串一致
        assert_eq!(RoleQuery::default().window(), (0, 20));
        let parsed: RoleQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.window(), RoleQuery::default().window());
    }

    #[test]
    fn test_department_input_checks() {
        let input: DepartmentInput =
            serde_json::from_str(r#"{"parentId": 3, "name": " 研发部 "}"#).unwrap();
        let department = input.clone().into_department(0).unwrap();
        assert_eq!(department.name, "研发部");
        assert!(department.status);

        assert!(input.into_department(3).is_err());
        let blank: DepartmentInput = serde_json::from_str(r#"{"name": "  "}"#).unwrap();
        assert!(blank.into_department(0).is_err());
    }

    #[test]
    fn test_account_input_checks() {
        let input: AccountInput = serde_json::from_str(
            r#"{"username": "editor", "password": "Editor#2024", "roleIds": [2, 3]}"#,
        )
        .unwrap();
        input.validate().unwrap();
        assert_eq!(input.role_ids, vec![2, 3]);
        let account = input.to_account("hash".to_string());
        assert_eq!(account.status, AccountStatus::Enabled);
        assert_eq!(account.email, None);

        let short = AccountInput {
            username: "ab".to_string(),
            ..input.clone()
        };
        assert!(short.validate().is_err());
        let bad_mail = AccountInput {
            email: Some("nobody".to_string()),
            ..input
        };
        assert!(bad_mail.validate().is_err());
    }

    #[test]
    fn test_role_input_defaults() {
        let input: RoleInput = serde_json::from_str(r#"{"name":"Editor","apiIds":[1,2]}"#).unwrap();
        assert!(input.status);
        assert_eq!(input.data_scope, DataScope::All);
        assert_eq!(input.api_ids, vec![1, 2]);
        assert!(input.validate().is_ok());
    }
}
