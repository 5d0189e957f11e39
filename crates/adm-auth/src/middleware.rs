use axum::{
    async_trait,
    extract::{FromRequestParts, MatchedPath, Request},
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_http::auth::{AsyncAuthorizeRequest, AsyncRequireAuthorizationLayer};
use tracing::{debug, info, warn};

use crate::{
    config::AuthConfig,
    jwt::JwtService,
    models::Principal,
    rbac::PermissionCheck,
};
use adm_error::{AdmError, DenyReason, ErrorKind, ErrorMetadataBuilder, Result};

/// 路由分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// 无需认证
    Ignored,
    /// 只需登录
    Public,
    /// 需要登录和权限
    Protected,
}

/// 放行请求所匹配的权限标识，供审计等下游读取
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCode(pub String);

/// 单个请求的授权判定
#[derive(Clone)]
pub struct Gate {
    config: Arc<AuthConfig>,
    ctx_user_key: HeaderName,
    jwt: Arc<JwtService>,
    checker: Arc<dyn PermissionCheck>,
}

impl Gate {
    pub fn new(
        config: AuthConfig,
        jwt: Arc<JwtService>,
        checker: Arc<dyn PermissionCheck>,
    ) -> Result<Self> {
        let config = config.validate()?;
        let ctx_user_key = HeaderName::from_bytes(config.ctx_user_key.as_bytes()).map_err(|e| {
            AdmError::Configuration {
                key: "auth.ctx_user_key".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            config: Arc::new(config),
            ctx_user_key,
            jwt,
            checker,
        })
    }

    pub fn classify(&self, method: &str, route: &str) -> RouteClass {
        let listed = |table: &crate::config::RouteTable| {
            table
                .get(route)
                .is_some_and(|m| m.eq_ignore_ascii_case(method))
        };
        if listed(&self.config.ignore_routes) {
            RouteClass::Ignored
        } else if listed(&self.config.public_routes) {
            RouteClass::Public
        } else {
            RouteClass::Protected
        }
    }

    /// 判定请求：放行返回 `Ok`，其中忽略路由没有身份；拒绝返回对应错误
    ///
    /// 存储不可用时返回 `ServiceUnavailable`，同样不放行。
    pub async fn authorize(
        &self,
        method: &str,
        route: &str,
        headers: &HeaderMap,
    ) -> Result<Option<Principal>> {
        Ok(self
            .decide(method, route, headers)
            .await?
            .map(|(principal, _)| principal))
    }

    /// 放行时附带命中的权限标识，只需登录的路由没有
    async fn decide(
        &self,
        method: &str,
        route: &str,
        headers: &HeaderMap,
    ) -> Result<Option<(Principal, Option<PermissionCode>)>> {
        let class = self.classify(method, route);
        if class == RouteClass::Ignored {
            return Ok(None);
        }

        let token = headers
            .get(self.config.token_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(JwtService::extract_token)
            .ok_or_else(|| AdmError::Authentication {
                message: "未登录或非法访问".to_string(),
            })?;

        let claims = self.jwt.verify_token(token)?;
        let principal = Principal {
            user_id: claims.user_id,
            username: claims.username,
        };

        if class == RouteClass::Public {
            return Ok(Some((principal, None)));
        }

        let subject = self
            .checker
            .subject(principal.user_id)
            .await
            .map_err(|e| self.fail_closed(e, &principal, "load_subject"))?
            .ok_or_else(|| AdmError::Authentication {
                message: "用户不存在".to_string(),
            })?;

        if subject.account.is_locked_at(chrono::Utc::now()) {
            return Err(self.deny(&principal, method, route, DenyReason::Locked));
        }
        if subject.account.is_disabled() {
            return Err(self.deny(&principal, method, route, DenyReason::Disabled));
        }
        if subject.role_ids.is_empty() {
            return Err(self.deny(&principal, method, route, DenyReason::NoRoles));
        }

        let code = match self.checker.resolve_code(method, route).await {
            Ok(code) => code,
            Err(AdmError::NotFound { .. }) => {
                let reason = DenyReason::UnregisteredRoute {
                    method: method.to_string(),
                    route: route.to_string(),
                };
                return Err(self.deny(&principal, method, route, reason));
            }
            Err(e) => return Err(self.fail_closed(e, &principal, "resolve_code")),
        };

        let allowed = self
            .checker
            .has_permission(&subject.role_ids, &code)
            .await
            .map_err(|e| self.fail_closed(e, &principal, "has_permission"))?;
        if !allowed {
            return Err(self.deny(
                &principal,
                method,
                route,
                DenyReason::MissingPermission { code },
            ));
        }

        debug!(user_id = principal.user_id, %method, %route, permission_code = %code, "request authorized");
        Ok(Some((principal, Some(PermissionCode(code)))))
    }

    fn deny(&self, principal: &Principal, method: &str, route: &str, reason: DenyReason) -> AdmError {
        info!(
            user_id = principal.user_id,
            %method,
            %route,
            reason = ?reason,
            "request denied"
        );
        AdmError::Forbidden { reason }
    }

    fn fail_closed(&self, err: AdmError, principal: &Principal, operation: &str) -> AdmError {
        let err = match err.kind() {
            ErrorKind::Unavailable => err,
            _ => AdmError::ServiceUnavailable {
                service: "authorization-store".to_string(),
                retry_after: None,
            },
        };
        let metadata = ErrorMetadataBuilder::new("auth_middleware")
            .operation(operation)
            .user_id(&principal.user_id.to_string())
            .build(&err);
        err.log(&metadata);
        err
    }
}

/// 认证中间件
#[derive(Clone)]
pub struct AuthMiddleware {
    gate: Gate,
}

impl AuthMiddleware {
    pub fn layer(gate: Gate) -> AsyncRequireAuthorizationLayer<Self> {
        AsyncRequireAuthorizationLayer::new(Self { gate })
    }
}

impl<B> AsyncAuthorizeRequest<B> for AuthMiddleware
where
    B: Send + 'static,
{
    type RequestBody = B;
    type ResponseBody = axum::body::Body;
    type Future = std::pin::Pin<
        Box<
            dyn std::future::Future<
                    Output = std::result::Result<Request<B>, Response<Self::ResponseBody>>,
                > + Send,
        >,
    >;

    fn authorize(&mut self, mut request: Request<B>) -> Self::Future {
        let gate = self.gate.clone();

        Box::pin(async move {
            // 下游只信任由本中间件写入的用户ID
            request.headers_mut().remove(&gate.ctx_user_key);

            let method = request.method().as_str().to_string();
            let route = request
                .extensions()
                .get::<MatchedPath>()
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| request.uri().path().to_string());

            match gate.decide(&method, &route, request.headers()).await {
                Ok(Some((principal, code))) => {
                    request.headers_mut().insert(
                        gate.ctx_user_key.clone(),
                        HeaderValue::from(principal.user_id),
                    );
                    request.extensions_mut().insert(principal);
                    if let Some(code) = code {
                        request.extensions_mut().insert(code);
                    }
                    Ok(request)
                }
                Ok(None) => Ok(request),
                Err(e) => Err(e.into_response()),
            }
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AdmError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AdmError::Authentication {
                message: "未登录或非法访问".to_string(),
            })
    }
}

/// 审计日志中间件
///
/// 挂在鉴权层之内，只记录已放行的请求；响应原样返回。
pub async fn audit_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let principal = request.extensions().get::<Principal>().cloned();
    let code = request
        .extensions()
        .get::<PermissionCode>()
        .map(|c| c.0.clone())
        .unwrap_or_default();
    let start_time = std::time::Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start_time.elapsed().as_millis();
    let Some(principal) = principal else {
        debug!(%method, %route, %status, duration_ms, "anonymous request");
        return response;
    };

    if status.is_client_error() || status.is_server_error() {
        warn!(
            user_id = principal.user_id,
            username = %principal.username,
            %method,
            %route,
            permission_code = %code,
            %status,
            duration_ms,
            "request failed"
        );
    } else {
        info!(
            user_id = principal.user_id,
            username = %principal.username,
            %method,
            %route,
            permission_code = %code,
            %status,
            duration_ms,
            "request audited"
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::rbac::Subject;
    use adm_core::{Account, AccountStatus};
    use std::collections::HashMap;

    /// 固定数据的权限检查
    struct FixedCheck {
        account: Account,
        role_ids: Vec<i64>,
        routes: HashMap<(String, String), String>,
        codes: Vec<String>,
        down: bool,
    }

    #[async_trait]
    impl PermissionCheck for FixedCheck {
        async fn subject(&self, user_id: i64) -> Result<Option<Subject>> {
            if self.down {
                return Err(AdmError::Database {
                    message: "connection reset".to_string(),
                    context: None,
                });
            }
            Ok((user_id == self.account.id).then(|| Subject {
                account: self.account.clone(),
                role_ids: self.role_ids.clone(),
            }))
        }

        async fn resolve_code(&self, method: &str, route: &str) -> Result<String> {
            self.routes
                .get(&(method.to_string(), route.to_string()))
                .cloned()
                .ok_or_else(|| AdmError::NotFound {
                    resource: route.to_string(),
                })
        }

        async fn has_permission(&self, _role_ids: &[i64], code: &str) -> Result<bool> {
            Ok(self.codes.iter().any(|c| c == code))
        }
    }

    fn account(status: AccountStatus) -> Account {
        Account {
            id: 7,
            username: "editor".to_string(),
            password_hash: String::new(),
            email: None,
            mobile: None,
            status,
            locked_until: None,
            login_attempts: 0,
            last_login_at: None,
            last_login_ip: None,
            department_id: 0,
        }
    }

    fn gate(check: FixedCheck) -> (Gate, Arc<JwtService>) {
        let jwt = Arc::new(JwtService::new(&JwtConfig {
            secret: "middleware_test_secret_key".to_string(),
            issuer: "adm-test".to_string(),
            expire_secs: 60,
            refresh_expire_secs: 300,
        }));
        let mut config = AuthConfig::default();
        config
            .ignore_routes
            .insert("/auth/login".to_string(), "POST".to_string());
        config
            .public_routes
            .insert("/auth/profile".to_string(), "GET".to_string());
        (Gate::new(config, jwt.clone(), Arc::new(check)).unwrap(), jwt)
    }

    fn check(status: AccountStatus, role_ids: Vec<i64>) -> FixedCheck {
        FixedCheck {
            account: account(status),
            role_ids,
            routes: HashMap::from([(
                ("GET".to_string(), "/sys/cms/article".to_string()),
                "cms:article:list".to_string(),
            ), (
                ("DELETE".to_string(), "/sys/user/delete/:id".to_string()),
                "sys:user:delete".to_string(),
            )]),
            codes: vec!["cms:article:list".to_string()],
            down: false,
        }
    }

    fn headers_for(jwt: &JwtService) -> HeaderMap {
        let issued = jwt.generate_token(7, "editor").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("X-Token", HeaderValue::from_str(&issued.token).unwrap());
        headers
    }

    #[test]
    fn test_classify() {
        let (gate, _) = gate(check(AccountStatus::Enabled, vec![1]));
        assert_eq!(gate.classify("POST", "/auth/login"), RouteClass::Ignored);
        assert_eq!(gate.classify("GET", "/auth/login"), RouteClass::Protected);
        assert_eq!(gate.classify("GET", "/auth/profile"), RouteClass::Public);
        assert_eq!(gate.classify("GET", "/sys/cms/article"), RouteClass::Protected);
    }

    #[tokio::test]
    async fn test_ignored_route_needs_no_token() {
        let (gate, _) = gate(check(AccountStatus::Enabled, vec![1]));
        let outcome = gate
            .authorize("POST", "/auth/login", &HeaderMap::new())
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_missing_token_is_no_login() {
        let (gate, _) = gate(check(AccountStatus::Enabled, vec![1]));
        let err = gate
            .authorize("GET", "/sys/cms/article", &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.response_code(), adm_error::ResponseCode::NO_LOGIN);
    }

    #[tokio::test]
    async fn test_permission_decisions() {
        let (gate, jwt) = gate(check(AccountStatus::Enabled, vec![1]));
        let headers = headers_for(&jwt);

        let principal = gate
            .authorize("GET", "/sys/cms/article", &headers)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(principal.user_id, 7);

        let (_, code) = gate
            .decide("GET", "/sys/cms/article", &headers)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, Some(PermissionCode("cms:article:list".to_string())));
        let (_, code) = gate
            .decide("GET", "/auth/profile", &headers)
            .await
            .unwrap()
            .unwrap();
        assert!(code.is_none());

        let err = gate
            .authorize("DELETE", "/sys/user/delete/:id", &headers)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmError::Forbidden {
                reason: DenyReason::MissingPermission { .. }
            }
        ));

        let err = gate
            .authorize("GET", "/sys/unknown", &headers)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmError::Forbidden {
                reason: DenyReason::UnregisteredRoute { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_account_state_denials() {
        for (status, roles, expected) in [
            (AccountStatus::Locked, vec![1], DenyReason::Locked),
            (AccountStatus::Disabled, vec![1], DenyReason::Disabled),
            (AccountStatus::Enabled, vec![], DenyReason::NoRoles),
        ] {
            let (gate, jwt) = gate(check(status, roles));
            let err = gate
                .authorize("GET", "/sys/cms/article", &headers_for(&jwt))
                .await
                .unwrap_err();
            match err {
                AdmError::Forbidden { reason } => assert_eq!(reason, expected),
                other => panic!("unexpected: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_public_route_skips_state_checks() {
        let (gate, jwt) = gate(check(AccountStatus::Locked, vec![]));
        let principal = gate
            .authorize("GET", "/auth/profile", &headers_for(&jwt))
            .await
            .unwrap();
        assert!(principal.is_some());
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let mut fixed = check(AccountStatus::Enabled, vec![1]);
        fixed.down = true;
        let (gate, jwt) = gate(fixed);
        let err = gate
            .authorize("GET", "/sys/cms/article", &headers_for(&jwt))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmError::ServiceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_audit_leaves_response_untouched() {
        use axum::{body::Body, http::StatusCode, routing::get, Router};
        use tower::ServiceExt;

        let router = Router::new()
            .route(
                "/sys/cms/article",
                get(|| async { (StatusCode::CREATED, "created") }),
            )
            .route(
                "/sys/cms/missing",
                get(|| async {
                    AdmError::NotFound {
                        resource: "article 9".to_string(),
                    }
                }),
            )
            .route_layer(axum::middleware::from_fn(audit_middleware));

        let mut request = Request::builder()
            .uri("/sys/cms/article")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(Principal {
            user_id: 7,
            username: "editor".to_string(),
        });
        request
            .extensions_mut()
            .insert(PermissionCode("cms:article:list".to_string()));
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"created");

        // 匿名请求与失败响应同样原样返回
        let request = Request::builder()
            .uri("/sys/cms/missing")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], 1);
    }
}
