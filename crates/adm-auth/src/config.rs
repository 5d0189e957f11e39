//! 认证相关配置
//!
//! 启动时一次性加载并校验，缺失或非法的配置在启动阶段直接失败，
//! 不会拖到第一个请求才暴露。

use adm_error::{AdmError, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// 路由表: 路由URI -> 大写的HTTP方法
pub type RouteTable = HashMap<String, String>;

const KNOWN_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// 携带 token 的请求头
    #[serde(default = "default_token_header")]
    pub token_header: String,
    /// 向下游传递用户ID的请求头
    #[serde(default = "default_ctx_user_key")]
    pub ctx_user_key: String,
    /// 完全不需要认证的路由
    #[serde(default)]
    pub ignore_routes: RouteTable,
    /// 只需要登录、不校验权限的路由
    #[serde(default)]
    pub public_routes: RouteTable,
}

fn default_token_header() -> String {
    "X-Token".to_string()
}

fn default_ctx_user_key() -> String {
    "X-User-Id".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_header: default_token_header(),
            ctx_user_key: default_ctx_user_key(),
            ignore_routes: HashMap::new(),
            public_routes: HashMap::new(),
        }
    }
}

impl AuthConfig {
    /// 校验并规范化配置（方法名统一转为大写）
    pub fn validate(mut self) -> Result<Self> {
        check_header_name("auth.token_header", &self.token_header)?;
        check_header_name("auth.ctx_user_key", &self.ctx_user_key)?;
        if self.token_header.eq_ignore_ascii_case(&self.ctx_user_key) {
            return Err(AdmError::Configuration {
                key: "auth.ctx_user_key".to_string(),
                reason: "不能与 token_header 相同".to_string(),
            });
        }
        self.ignore_routes = normalize_routes("auth.ignore_routes", self.ignore_routes)?;
        self.public_routes = normalize_routes("auth.public_routes", self.public_routes)?;
        Ok(self)
    }
}

fn check_header_name(key: &str, value: &str) -> Result<()> {
    if axum::http::HeaderName::from_bytes(value.as_bytes()).is_err() {
        return Err(AdmError::Configuration {
            key: key.to_string(),
            reason: format!("非法的请求头名称: {:?}", value),
        });
    }
    Ok(())
}

fn normalize_routes(key: &str, routes: RouteTable) -> Result<RouteTable> {
    routes
        .into_iter()
        .map(|(uri, method)| {
            let method = method.trim().to_ascii_uppercase();
            if !uri.starts_with('/') {
                return Err(AdmError::Configuration {
                    key: key.to_string(),
                    reason: format!("路由必须以 / 开头: {}", uri),
                });
            }
            if !KNOWN_METHODS.contains(&method.as_str()) {
                return Err(AdmError::Configuration {
                    key: key.to_string(),
                    reason: format!("未知的请求方法 {} ({})", method, uri),
                });
            }
            Ok((uri, method))
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// 一般通过环境变量 `JWT_SECRET` 注入
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// token 有效期（秒）
    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,
    /// 过期之后仍允许刷新的时长（秒）
    #[serde(default = "default_refresh_expire_secs")]
    pub refresh_expire_secs: u64,
}

/// 令牌有效期与刷新窗口的上限：10年
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

fn default_issuer() -> String {
    "adm-auth".to_string()
}

fn default_expire_secs() -> u64 {
    7200
}

fn default_refresh_expire_secs() -> u64 {
    604_800
}

impl JwtConfig {
    pub fn validate(self) -> Result<Self> {
        if self.secret.len() < 16 {
            return Err(AdmError::Configuration {
                key: "jwt.secret".to_string(),
                reason: "密钥长度至少16位".to_string(),
            });
        }
        if self.issuer.is_empty() {
            return Err(AdmError::Configuration {
                key: "jwt.issuer".to_string(),
                reason: "不能为空".to_string(),
            });
        }
        if self.expire_secs == 0 {
            return Err(AdmError::Configuration {
                key: "jwt.expire_secs".to_string(),
                reason: "必须大于0".to_string(),
            });
        }
        let bounded = [
            ("jwt.expire_secs", self.expire_secs),
            ("jwt.refresh_expire_secs", self.refresh_expire_secs),
        ];
        for (key, secs) in bounded {
            if secs > MAX_TOKEN_LIFETIME_SECS {
                return Err(AdmError::Configuration {
                    key: key.to_string(),
                    reason: format!("不能超过 {} 秒", MAX_TOKEN_LIFETIME_SECS),
                });
            }
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// 验证码位数
    #[serde(default = "default_captcha_length")]
    pub length: usize,
    /// 有效期（秒）
    #[serde(default = "default_captcha_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_captcha_width")]
    pub width: u32,
    #[serde(default = "default_captcha_height")]
    pub height: u32,
}

fn default_captcha_length() -> usize {
    4
}

fn default_captcha_ttl() -> u64 {
    300
}

fn default_captcha_width() -> u32 {
    120
}

fn default_captcha_height() -> u32 {
    40
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            length: default_captcha_length(),
            ttl_secs: default_captcha_ttl(),
            width: default_captcha_width(),
            height: default_captcha_height(),
        }
    }
}

impl CaptchaConfig {
    pub fn validate(self) -> Result<Self> {
        if !(1..=8).contains(&self.length) {
            return Err(AdmError::Configuration {
                key: "captcha.length".to_string(),
                reason: "位数应在1-8之间".to_string(),
            });
        }
        if self.ttl_secs == 0 {
            return Err(AdmError::Configuration {
                key: "captcha.ttl_secs".to_string(),
                reason: "必须大于0".to_string(),
            });
        }
        Ok(self)
    }
}
