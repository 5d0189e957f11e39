use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// 业务响应码，随 JSON 响应体中的 `code` 字段返回
pub struct ResponseCode;

impl ResponseCode {
    pub const OK: i32 = 0;
    pub const FAILED: i32 = 1;
    /// 没有登录
    pub const NO_LOGIN: i32 = 10;
    /// 没有权限
    pub const NO_AUTH: i32 = 20;
}

/// 拒绝访问的具体原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// 账号已锁定
    Locked,
    /// 账号已禁用
    Disabled,
    /// 账号未分配任何角色
    NoRoles,
    /// 角色集合不持有该权限码
    MissingPermission { code: String },
    /// 路由未在权限注册表中登记
    UnregisteredRoute { method: String, route: String },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Locked => write!(f, "用户已被锁定"),
            DenyReason::Disabled => write!(f, "用户已禁用"),
            DenyReason::NoRoles => write!(f, "用户未分配角色"),
            DenyReason::MissingPermission { .. } => write!(f, "没有权限"),
            DenyReason::UnregisteredRoute { .. } => write!(f, "接口不存在"),
        }
    }
}

/// 系统统一错误类型
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AdmError {
    // === 业务错误 ===
    #[error("资源未找到: {resource}")]
    NotFound { resource: String },

    #[error("请求无效: {reason}")]
    InvalidRequest { reason: String },

    #[error("验证失败: {message}")]
    Validation { message: String },

    #[error("资源冲突: {details}")]
    Conflict { details: String },

    // === 认证错误 (NoLogin) ===
    #[error("认证失败: {message}")]
    Authentication { message: String },

    #[error("Token无效: {message}")]
    TokenInvalid { message: String },

    #[error("Token已过期")]
    TokenExpired,

    #[error("刷新令牌已过期")]
    RefreshExpired,

    #[error("验证码错误")]
    ChallengeInvalid,

    #[error("用户名或者密码错误")]
    CredentialInvalid,

    // === 授权错误 (NoAuth) ===
    #[error("{reason}")]
    Forbidden { reason: DenyReason },

    // === 技术错误 ===
    #[error("树结构存在循环引用: {node_ids:?}")]
    CycleDetected { node_ids: Vec<i64> },

    #[error("数据库错误")]
    Database {
        message: String,
        #[serde(skip)]
        context: Option<DatabaseContext>,
    },

    #[error("外部服务不可用: {service}")]
    ServiceUnavailable {
        service: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    // === 系统错误 ===
    #[error("内部系统错误: {message}")]
    Internal {
        message: String,
        details: Option<String>,
    },

    #[error("配置错误: {key} - {reason}")]
    Configuration { key: String, reason: String },

    #[error("序列化错误: {format}")]
    Serialization { format: String, message: String },

    #[error("并发错误: {operation}")]
    Concurrency { operation: String, message: String },
}

/// 数据库上下文信息
#[derive(Debug, Clone)]
pub struct DatabaseContext {
    pub query: Option<String>,
    pub table: Option<String>,
    /// 出错的仓储操作，例如 `set_role_permissions`
    pub operation: Option<String>,
}

/// 错误种类，调用方按种类分支而不是匹配消息文本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    Unauthenticated,
    Invalid,
    Unavailable,
    Internal,
}

/// 错误严重级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,      // 可预期的业务错误
    Medium,   // 技术错误但不影响核心功能
    High,     // 影响核心功能的错误
    Critical, // 系统级严重错误
}

/// 错误元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub error_id: String,
    pub severity: ErrorSeverity,
    pub component: String,
    pub operation: Option<String>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub context: std::collections::HashMap<String, String>,
}

impl AdmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdmError::NotFound { .. } => ErrorKind::NotFound,
            AdmError::Conflict { .. } => ErrorKind::Conflict,
            AdmError::Forbidden { .. } => ErrorKind::Forbidden,
            AdmError::Authentication { .. }
            | AdmError::TokenInvalid { .. }
            | AdmError::TokenExpired
            | AdmError::RefreshExpired => ErrorKind::Unauthenticated,
            AdmError::InvalidRequest { .. }
            | AdmError::Validation { .. }
            | AdmError::ChallengeInvalid
            | AdmError::CredentialInvalid
            | AdmError::CycleDetected { .. } => ErrorKind::Invalid,
            AdmError::ServiceUnavailable { .. } => ErrorKind::Unavailable,
            AdmError::Database { .. }
            | AdmError::Internal { .. }
            | AdmError::Configuration { .. }
            | AdmError::Serialization { .. }
            | AdmError::Concurrency { .. } => ErrorKind::Internal,
        }
    }

    /// 获取错误的严重级别
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AdmError::NotFound { .. }
            | AdmError::InvalidRequest { .. }
            | AdmError::Validation { .. }
            | AdmError::ChallengeInvalid
            | AdmError::CredentialInvalid => ErrorSeverity::Low,
            AdmError::Conflict { .. }
            | AdmError::Authentication { .. }
            | AdmError::TokenInvalid { .. }
            | AdmError::TokenExpired
            | AdmError::RefreshExpired
            | AdmError::Forbidden { .. } => ErrorSeverity::Medium,
            AdmError::ServiceUnavailable { .. } => ErrorSeverity::Medium,
            AdmError::CycleDetected { .. }
            | AdmError::Database { .. }
            | AdmError::Serialization { .. }
            | AdmError::Concurrency { .. } => ErrorSeverity::High,
            AdmError::Internal { .. } | AdmError::Configuration { .. } => ErrorSeverity::Critical,
        }
    }

    /// 业务响应码: 认证类为 NoLogin，授权类为 NoAuth，其余为通用失败
    pub fn response_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Unauthenticated => ResponseCode::NO_LOGIN,
            ErrorKind::Forbidden => ResponseCode::NO_AUTH,
            _ => ResponseCode::FAILED,
        }
    }

    /// 获取重试延迟时间
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            AdmError::ServiceUnavailable { retry_after, .. } => *retry_after,
            AdmError::Concurrency { .. } => Some(std::time::Duration::from_millis(100)),
            _ => None,
        }
    }

    /// 记录错误日志
    pub fn log(&self, metadata: &ErrorMetadata) {
        match metadata.severity {
            ErrorSeverity::Low => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    user_id = ?metadata.user_id,
                    request_id = ?metadata.request_id,
                    error = %self,
                    "业务错误"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    user_id = ?metadata.user_id,
                    request_id = ?metadata.request_id,
                    error = %self,
                    context = ?metadata.context,
                    "技术错误"
                );
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                error!(
                    error_id = %metadata.error_id,
                    component = %metadata.component,
                    operation = ?metadata.operation,
                    user_id = ?metadata.user_id,
                    request_id = ?metadata.request_id,
                    error = %self,
                    context = ?metadata.context,
                    severity = ?metadata.severity,
                    "严重错误"
                );
            }
        }
    }

    /// 转换为 HTTP 状态码
    pub fn to_http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Forbidden => 403,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Invalid => 400,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    /// 获取用户可见的错误消息
    ///
    /// 认证与授权类错误直接返回具体原因，便于客户端区分"重新登录"与"联系管理员"；
    /// 技术错误只返回笼统提示，细节留在日志里。
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Unauthenticated | ErrorKind::Forbidden => match self {
                AdmError::Authentication { message } | AdmError::TokenInvalid { message } => {
                    message.clone()
                }
                other => other.to_string(),
            },
            ErrorKind::Invalid | ErrorKind::Conflict | ErrorKind::NotFound => self.to_string(),
            ErrorKind::Unavailable => "服务暂时不可用，请稍后重试".to_string(),
            ErrorKind::Internal => "系统内部错误，请联系管理员".to_string(),
        }
    }
}

/// 创建错误元数据的便捷构造器
pub struct ErrorMetadataBuilder {
    metadata: ErrorMetadata,
}

impl ErrorMetadataBuilder {
    pub fn new(component: &str) -> Self {
        Self {
            metadata: ErrorMetadata {
                error_id: uuid::Uuid::new_v4().to_string(),
                severity: ErrorSeverity::Medium,
                component: component.to_string(),
                operation: None,
                user_id: None,
                request_id: None,
                timestamp: chrono::Utc::now(),
                context: std::collections::HashMap::new(),
            },
        }
    }

    pub fn operation(mut self, operation: &str) -> Self {
        self.metadata.operation = Some(operation.to_string());
        self
    }

    pub fn user_id(mut self, user_id: &str) -> Self {
        self.metadata.user_id = Some(user_id.to_string());
        self
    }

    pub fn request_id(mut self, request_id: &str) -> Self {
        self.metadata.request_id = Some(request_id.to_string());
        self
    }

    pub fn context(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .context
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(mut self, error: &AdmError) -> ErrorMetadata {
        self.metadata.severity = error.severity();
        if let AdmError::Database {
            context: Some(db), ..
        } = error
        {
            let fields = [("table", &db.table), ("db_operation", &db.operation)];
            for (key, value) in fields {
                if let Some(value) = value {
                    self.metadata
                        .context
                        .insert(key.to_string(), value.clone());
                }
            }
        }
        self.metadata
    }
}

pub type Result<T> = std::result::Result<T, AdmError>;

// === 转换实现 ===

impl From<serde_json::Error> for AdmError {
    fn from(err: serde_json::Error) -> Self {
        AdmError::Serialization {
            format: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for AdmError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AdmError::ServiceUnavailable {
                    service: "database".to_string(),
                    retry_after: None,
                }
            }
            sqlx::Error::RowNotFound => AdmError::NotFound {
                resource: "row".to_string(),
            },
            sqlx::Error::Database(db) if db.is_unique_violation() => AdmError::Conflict {
                details: db.message().to_string(),
            },
            other => AdmError::Database {
                message: other.to_string(),
                context: None,
            },
        }
    }
}

impl From<tokio::task::JoinError> for AdmError {
    fn from(err: tokio::task::JoinError) -> Self {
        AdmError::Concurrency {
            operation: "task_join".to_string(),
            message: err.to_string(),
        }
    }
}

// Axum integration
#[cfg(feature = "axum")]
impl IntoResponse for AdmError {
    fn into_response(self) -> axum::response::Response {
        let status_code = StatusCode::from_u16(self.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::json!({
            "code": self.response_code(),
            "message": self.user_message(),
            "data": null
        });

        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_codes_split_login_from_auth() {
        let no_login = AdmError::Authentication {
            message: "没有登录".to_string(),
        };
        assert_eq!(no_login.response_code(), ResponseCode::NO_LOGIN);
        assert_eq!(AdmError::RefreshExpired.response_code(), ResponseCode::NO_LOGIN);

        let locked = AdmError::Forbidden {
            reason: DenyReason::Locked,
        };
        assert_eq!(locked.response_code(), ResponseCode::NO_AUTH);
        assert_eq!(locked.to_http_status(), 403);
        assert_eq!(locked.user_message(), "用户已被锁定");

        let down = AdmError::ServiceUnavailable {
            service: "database".to_string(),
            retry_after: None,
        };
        // 存储不可用不能被当作"没有权限"
        assert_eq!(down.response_code(), ResponseCode::FAILED);
        assert_eq!(down.to_http_status(), 503);
    }

    #[test]
    fn test_token_message_is_surfaced() {
        let err = AdmError::TokenInvalid {
            message: "Token签名无效".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert_eq!(err.user_message(), "Token签名无效");
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AdmError::Database {
            message: "relation sys_roles does not exist".to_string(),
            context: None,
        };
        assert_eq!(err.to_http_status(), 500);
        assert!(!err.user_message().contains("sys_roles"));
    }

    #[test]
    fn test_metadata_carries_database_context() {
        let err = AdmError::Database {
            message: "deadlock detected".to_string(),
            context: Some(DatabaseContext {
                query: None,
                table: Some("sys_role_apis".to_string()),
                operation: Some("set_role_permissions".to_string()),
            }),
        };
        let metadata = ErrorMetadataBuilder::new("pg_store").build(&err);
        assert_eq!(metadata.context["table"], "sys_role_apis");
        assert_eq!(metadata.context["db_operation"], "set_role_permissions");
    }

    #[test]
    fn test_metadata_builder_takes_error_severity() {
        let err = AdmError::Internal {
            message: "boom".to_string(),
            details: None,
        };
        let metadata = ErrorMetadataBuilder::new("auth_middleware")
            .operation("authorize")
            .context("route", "/sys/role/list")
            .build(&err);
        assert!(matches!(metadata.severity, ErrorSeverity::Critical));
        assert_eq!(metadata.context.get("route").unwrap(), "/sys/role/list");
    }
}
