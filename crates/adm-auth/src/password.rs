use adm_error::{AdmError, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::warn;

/// 密码服务 - 处理密码哈希与校验
pub struct PasswordService;

impl PasswordService {
    /// 生成密码哈希
    pub fn hash_password(password: &str) -> Result<String> {
        Self::validate_password_strength(password)?;
        Self::hash_password_with_cost(password, DEFAULT_COST)
    }

    /// 指定 cost 生成哈希，不做强度校验（初始化数据、测试使用）
    pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String> {
        hash(password, cost).map_err(|e| AdmError::Internal {
            message: format!("Failed to hash password: {}", e),
            details: None,
        })
    }

    /// 验证密码
    ///
    /// 存储的哈希格式不正确时视为校验失败，不向调用方暴露差异。
    pub fn verify_password(password: &str, hash: &str) -> bool {
        match verify(password, hash) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(error = %e, "stored password hash is malformed");
                false
            }
        }
    }

    /// 在阻塞线程池中验证密码，避免 bcrypt 占用异步工作线程
    pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool> {
        let matched =
            tokio::task::spawn_blocking(move || Self::verify_password(&password, &hash)).await?;
        Ok(matched)
    }

    /// 验证密码强度
    pub fn validate_password_strength(password: &str) -> Result<()> {
        if password.len() < 8 {
            return Err(AdmError::Validation {
                message: "密码长度至少8位".to_string(),
            });
        }

        if password.len() > 72 {
            return Err(AdmError::Validation {
                message: "密码长度不能超过72位".to_string(),
            });
        }

        let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_special = password
            .chars()
            .any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c));

        let complexity_score = [has_lower, has_upper, has_digit, has_special]
            .iter()
            .filter(|&&b| b)
            .count();

        if complexity_score < 3 {
            return Err(AdmError::Validation {
                message: "密码必须包含大写字母、小写字母、数字和特殊字符中的至少3种".to_string(),
            });
        }

        let weak_passwords = ["password", "123456", "qwerty", "abc123", "admin"];
        let lowered = password.to_lowercase();
        if weak_passwords.iter().any(|&weak| lowered.contains(weak)) {
            return Err(AdmError::Validation {
                message: "密码不能包含常见的弱密码模式".to_string(),
            });
        }

        Ok(())
    }
}
