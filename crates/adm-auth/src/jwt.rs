use adm_error::{AdmError, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,      // user ID
    pub username: String,  // username
    pub refresh_time: i64, // 允许刷新的截止时间
    pub iss: String,       // issuer
    pub iat: i64,          // issued at timestamp
    pub nbf: i64,          // not before timestamp
    pub exp: i64,          // expiration timestamp
}

impl Claims {
    fn new(
        user_id: i64,
        username: String,
        issuer: &str,
        now: DateTime<Utc>,
        expire: Duration,
        refresh_expire: Duration,
    ) -> Self {
        let exp = now + expire;
        let refresh_time = exp + refresh_expire;

        Self {
            user_id,
            username,
            refresh_time: refresh_time.timestamp(),
            iss: issuer.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }

    pub fn refresh_until(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.refresh_time, 0).unwrap_or_else(Utc::now)
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or_else(Utc::now)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// 签发结果
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expire: DateTime<Utc>,
    pub refresh: DateTime<Utc>,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    expire: Duration,
    refresh_expire: Duration,
}

fn lifetime(secs: u64) -> Duration {
    let secs = secs.min(crate::config::MAX_TOKEN_LIFETIME_SECS);
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        // 只校验签名和签发者，过期由调用方按场景判断
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iat", "iss"]);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;

        Self {
            encoding_key,
            decoding_key,
            validation,
            issuer: config.issuer.clone(),
            expire: lifetime(config.expire_secs),
            refresh_expire: lifetime(config.refresh_expire_secs),
        }
    }

    /// 生成令牌
    pub fn generate_token(&self, user_id: i64, username: &str) -> Result<IssuedToken> {
        self.generate_token_at(user_id, username, Utc::now())
    }

    pub fn generate_token_at(
        &self,
        user_id: i64,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let claims = Claims::new(
            user_id,
            username.to_string(),
            &self.issuer,
            now,
            self.expire,
            self.refresh_expire,
        );

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(
            |e| AdmError::Internal {
                message: format!("Failed to generate token: {}", e),
                details: None,
            },
        )?;

        Ok(IssuedToken {
            token,
            expire: claims.expires_at(),
            refresh: claims.refresh_until(),
        })
    }

    /// 解析令牌：校验签名与签发者，不判断是否过期
    pub fn parse_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let message = match e.kind() {
                    ErrorKind::InvalidSignature => "Token签名无效".to_string(),
                    ErrorKind::InvalidIssuer => "Token签发者无效".to_string(),
                    ErrorKind::InvalidAlgorithm => "Token签名算法无效".to_string(),
                    ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                        "无效的Token".to_string()
                    }
                    _ => format!("Token验证失败: {}", e),
                };
                AdmError::TokenInvalid { message }
            })
    }

    /// 校验令牌当前可用：签名正确、已生效且未过期
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        self.verify_token_at(token, Utc::now())
    }

    pub fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let claims = self.parse_token(token)?;

        if now.timestamp() < claims.nbf {
            return Err(AdmError::TokenInvalid {
                message: "Token尚未生效".to_string(),
            });
        }
        if claims.is_expired_at(now) {
            return Err(AdmError::TokenExpired);
        }

        Ok(claims)
    }

    /// 刷新令牌
    ///
    /// 未过期的令牌同样可以刷新（滑动续期）；超过刷新截止时间则返回 `RefreshExpired`。
    pub fn refresh_token(&self, token: &str) -> Result<IssuedToken> {
        self.refresh_token_at(token, Utc::now())
    }

    pub fn refresh_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<IssuedToken> {
        let claims = self.parse_token(token)?;

        if now.timestamp() > claims.refresh_time {
            return Err(AdmError::RefreshExpired);
        }

        self.generate_token_at(claims.user_id, &claims.username, now)
    }

    /// 从请求头的值中提取 token，兼容可选的 `Bearer ` 前缀
    pub fn extract_token(header_value: &str) -> Option<&str> {
        let value = header_value.trim();
        let token = match value.strip_prefix("Bearer") {
            // 只有 "Bearer" 本身，或 "Bearer" 后紧跟空白时才视为前缀
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
            _ => value,
        };
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }
}
