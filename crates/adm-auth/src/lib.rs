pub mod captcha;
pub mod config;
pub mod jwt;
pub mod memory;
pub mod middleware;
pub mod models;
pub mod password;
pub mod permissions;
pub mod pg;
pub mod rbac;
pub mod registry;
pub mod service;
pub mod store;

// 重新导出核心类型
pub use captcha::{Challenge, ChallengeStore, MemoryChallengeStore};
pub use config::{AuthConfig, CaptchaConfig, JwtConfig};
pub use jwt::{Claims, IssuedToken, JwtService};
pub use memory::MemoryStore;
pub use middleware::{audit_middleware, AuthMiddleware, Gate, PermissionCode, RouteClass};
pub use models::Principal;
pub use password::PasswordService;
pub use permissions::Permission;
pub use pg::PgStore;
pub use rbac::{PermissionCheck, RbacService, Subject};
pub use registry::PermissionRegistry;
pub use service::AuthService;
pub use store::{
    AccountRepository, ApiRepository, DepartmentRepository, RolePermissionStore, RoleRepository,
    Stores,
};

// 错误类型
pub use adm_error::{AdmError, Result};
