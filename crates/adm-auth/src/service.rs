//! 登录、刷新与个人信息

use adm_core::Account;
use adm_error::{AdmError, DenyReason, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::captcha::ChallengeStore;
use crate::jwt::{IssuedToken, JwtService};
use crate::models::{CaptchaResponse, LoginRequest, LoginResponse, Principal, ProfileResponse};
use crate::password::PasswordService;
use crate::rbac::RbacService;
use crate::store::{AccountRepository, ApiRepository, Stores};

pub struct AuthService {
    jwt: Arc<JwtService>,
    challenges: Arc<dyn ChallengeStore>,
    accounts: Arc<dyn AccountRepository>,
    apis: Arc<dyn ApiRepository>,
    rbac: Arc<RbacService>,
}

impl AuthService {
    pub fn new(
        jwt: Arc<JwtService>,
        challenges: Arc<dyn ChallengeStore>,
        stores: &Stores,
        rbac: Arc<RbacService>,
    ) -> Self {
        Self {
            jwt,
            challenges,
            accounts: stores.accounts.clone(),
            apis: stores.apis.clone(),
            rbac,
        }
    }

    pub async fn captcha(&self) -> Result<CaptchaResponse> {
        let challenge = self.challenges.issue().await?;
        Ok(CaptchaResponse {
            id: challenge.id,
            base64: challenge.image,
        })
    }

    /// 校验验证码与账号密码
    ///
    /// 顺序：验证码 → 账号 → 状态 → 密码。账号不存在与密码错误返回同一个错误。
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        challenge_id: &str,
        challenge_answer: &str,
    ) -> Result<Account> {
        if !self.challenges.verify(challenge_id, challenge_answer).await? {
            return Err(AdmError::ChallengeInvalid);
        }

        let Some(account) = self.accounts.find_by_username(username).await? else {
            info!(username, "login rejected: unknown account");
            return Err(AdmError::CredentialInvalid);
        };

        if account.is_disabled() {
            return Err(AdmError::Forbidden {
                reason: DenyReason::Disabled,
            });
        }
        if account.is_locked_at(Utc::now()) {
            return Err(AdmError::Forbidden {
                reason: DenyReason::Locked,
            });
        }

        let matched = PasswordService::verify_password_blocking(
            password.to_string(),
            account.password_hash.clone(),
        )
        .await?;
        if !matched {
            info!(user_id = account.id, "login rejected: wrong password");
            return Err(AdmError::CredentialInvalid);
        }

        Ok(account)
    }

    pub async fn login(&self, request: LoginRequest, ip: Option<String>) -> Result<LoginResponse> {
        let mut account = self
            .authenticate(
                &request.username,
                &request.password,
                &request.captcha_id,
                &request.captcha_code,
            )
            .await?;

        let now = Utc::now();
        match self.accounts.record_login(account.id, now, ip.clone()).await {
            Ok(()) => {
                account.last_login_at = Some(now);
                account.last_login_ip = ip;
            }
            Err(e) => warn!(user_id = account.id, error = %e, "failed to record login"),
        }

        let roles = self.rbac.roles_of(account.id).await?;
        let role_ids: Vec<i64> = roles.iter().map(|r| r.id).collect();
        let api_codes = self.rbac.permission_codes(&role_ids).await?;

        let held: HashSet<&str> = api_codes.iter().map(String::as_str).collect();
        let apis = self
            .apis
            .list_all()
            .await?
            .into_iter()
            .filter(|api| held.contains(api.permission_code.as_str()))
            .collect();

        let issued = self.jwt.generate_token(account.id, &account.username)?;
        info!(
            user_id = account.id,
            roles = role_ids.len(),
            codes = api_codes.len(),
            "login succeeded"
        );

        Ok(LoginResponse {
            token: issued.token,
            expire: issued.expire,
            refresh: issued.refresh,
            user: account,
            roles,
            role_ids,
            apis,
            api_codes,
        })
    }

    pub fn refresh(&self, token: &str) -> Result<IssuedToken> {
        let issued = self.jwt.refresh_token(token)?;
        info!(expire = %issued.expire, "token refreshed");
        Ok(issued)
    }

    pub async fn profile(&self, principal: &Principal) -> Result<ProfileResponse> {
        let user = self.current_account(principal).await?;
        let roles = self.rbac.roles_of(user.id).await?;
        let role_ids: Vec<i64> = roles.iter().map(|r| r.id).collect();
        let api_codes = self.rbac.permission_codes(&role_ids).await?;
        Ok(ProfileResponse {
            user,
            roles,
            api_codes,
        })
    }

    pub async fn reset_password(&self, principal: &Principal, password: String) -> Result<()> {
        let account = self.current_account(principal).await?;
        let hash =
            tokio::task::spawn_blocking(move || PasswordService::hash_password(&password)).await??;
        self.accounts.update_password(account.id, &hash).await?;
        info!(user_id = account.id, "password reset");
        Ok(())
    }

    async fn current_account(&self, principal: &Principal) -> Result<Account> {
        self.accounts
            .find_by_id(principal.user_id)
            .await?
            .ok_or_else(|| AdmError::Authentication {
                message: "用户不存在".to_string(),
            })
    }
}
