//! 授权中间件端到端测试：登录、放行、拒绝与存储故障

use adm_auth::{
    models::{ApiInput, LoginRequest, LoginResponse},
    AuthConfig, AuthMiddleware, AuthService, CaptchaConfig, ChallengeStore, Gate, JwtConfig,
    JwtService, MemoryChallengeStore, MemoryStore, PasswordService, PermissionCheck,
    PermissionRegistry, Principal, RbacService, Stores,
};
use adm_core::{Account, AccountStatus, DataScope, JsonResponse, Role};
use adm_error::{AdmError, Result};
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

struct Harness {
    router: Router,
    store: Arc<MemoryStore>,
    challenges: Arc<MemoryChallengeStore>,
    jwt: Arc<JwtService>,
    auth: Arc<AuthService>,
    editor_id: i64,
    frozen_id: i64,
}

fn account(username: &str, password: &str, status: AccountStatus) -> Account {
    Account {
        id: 0,
        username: username.to_string(),
        password_hash: PasswordService::hash_password_with_cost(password, 4).unwrap(),
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

fn business_api(code: &str, method: &str, url: &str) -> ApiInput {
    ApiInput {
        parent_id: 0,
        name: code.to_string(),
        permission_code: code.to_string(),
        url: url.to_string(),
        method: method.to_string(),
        sort: 0,
        status: true,
        is_menu: false,
        description: None,
    }
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::from_shared(store.clone());
    let registry = Arc::new(PermissionRegistry::new(stores.apis.clone()));
    registry.seed_builtin().await.unwrap();
    let rbac = Arc::new(RbacService::new(&stores, registry.clone()));

    // 业务接口由管理员登记，不属于内置接口
    let article_list = registry
        .create_api(business_api("cms:article:list", "GET", "/sys/cms/article"))
        .await
        .unwrap()
        .id;
    registry
        .create_api(business_api(
            "sys:user:delete",
            "DELETE",
            "/sys/user/delete/:id",
        ))
        .await
        .unwrap();
    let editor_role = store
        .insert_role(Role {
            id: 0,
            name: "Editor".to_string(),
            description: None,
            data_scope: DataScope::All,
            sort: 0,
            status: true,
        })
        .await;
    rbac.set_role_permissions(editor_role, &[article_list])
        .await
        .unwrap();

    let editor_id = store
        .insert_account(account("editor", "Editor#2024", AccountStatus::Enabled))
        .await;
    let frozen_id = store
        .insert_account(account("frozen", "Frozen#2024", AccountStatus::Locked))
        .await;
    store.assign_role(editor_id, editor_role).await;
    store.assign_role(frozen_id, editor_role).await;

    let jwt = Arc::new(JwtService::new(&JwtConfig {
        secret: "integration_test_secret_key".to_string(),
        issuer: "adm-test".to_string(),
        expire_secs: 60,
        refresh_expire_secs: 300,
    }));
    let challenges = Arc::new(MemoryChallengeStore::new(CaptchaConfig::default()));
    let auth = Arc::new(AuthService::new(
        jwt.clone(),
        challenges.clone(),
        &stores,
        rbac.clone(),
    ));

    let mut config = AuthConfig::default();
    config
        .ignore_routes
        .insert("/auth/login".to_string(), "POST".to_string());
    config
        .ignore_routes
        .insert("/auth/refresh".to_string(), "POST".to_string());
    config
        .ignore_routes
        .insert("/health".to_string(), "GET".to_string());
    config
        .public_routes
        .insert("/auth/profile".to_string(), "GET".to_string());
    let gate = Gate::new(config, jwt.clone(), rbac.clone()).unwrap();

    let login_service = auth.clone();
    let refresh_service = auth.clone();
    let profile_service = auth.clone();
    let router = Router::new()
        .route(
            "/auth/login",
            post(move |Json(req): Json<LoginRequest>| {
                let auth = login_service.clone();
                async move {
                    auth.login(req, None)
                        .await
                        .map(|resp| Json(JsonResponse::ok(resp)))
                }
            }),
        )
        .route(
            "/auth/refresh",
            post(move |headers: HeaderMap| {
                let auth = refresh_service.clone();
                async move { refresh_from_header(&auth, &headers) }
            }),
        )
        .route(
            "/auth/profile",
            get(move |principal: Principal| {
                let auth = profile_service.clone();
                async move {
                    auth.profile(&principal)
                        .await
                        .map(|resp| Json(JsonResponse::ok(resp)))
                }
            }),
        )
        .route("/health", get(echo_user_header))
        .route("/sys/cms/article", get(echo_user_header))
        .route("/sys/user/delete/:id", delete(echo_user_header))
        .route("/sys/unregistered", get(echo_user_header))
        .route_layer(AuthMiddleware::layer(gate));

    Harness {
        router,
        store,
        challenges,
        jwt,
        auth,
        editor_id,
        frozen_id,
    }
}

/// 刷新接口不经过鉴权，令牌自行从请求头取出
fn refresh_from_header(
    auth: &AuthService,
    headers: &HeaderMap,
) -> Result<Json<JsonResponse<adm_auth::IssuedToken>>> {
    let token = headers
        .get("X-Token")
        .and_then(|v| v.to_str().ok())
        .and_then(JwtService::extract_token)
        .ok_or_else(|| AdmError::Authentication {
            message: "未登录或非法访问".to_string(),
        })?;
    auth.refresh(token).map(|issued| Json(JsonResponse::ok(issued)))
}

/// 返回中间件写入的用户ID请求头
async fn echo_user_header(headers: HeaderMap) -> Json<JsonResponse<Option<String>>> {
    let user = headers
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(JsonResponse::ok(user))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn with_token(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Token", token)
        .body(Body::empty())
        .unwrap()
}

async fn login(h: &Harness, username: &str, password: &str) -> (StatusCode, Value) {
    let challenge = h.challenges.issue_with_answer("2468").await;
    let body = serde_json::json!({
        "username": username,
        "password": password,
        "captchaId": challenge.id,
        "captchaCode": "2468",
    });
    send(
        &h.router,
        Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn editor_reads_articles_but_cannot_delete_users() {
    let h = harness().await;

    let (status, body) = login(&h, "editor", "Editor#2024").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["apiCodes"], serde_json::json!(["cms:article:list"]));
    assert_eq!(body["data"]["user"]["username"], "editor");
    assert!(body["data"]["user"].get("passwordHash").is_none());
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(&h.router, with_token("GET", "/sys/cms/article", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], h.editor_id.to_string());

    let (status, body) = send(
        &h.router,
        with_token("DELETE", "/sys/user/delete/5", &token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 20);
    assert_eq!(body["data"], Value::Null);
}

#[tokio::test]
async fn locked_account_is_rejected_despite_valid_token() {
    let h = harness().await;
    let issued = h.jwt.generate_token(h.frozen_id, "frozen").unwrap();

    let (status, body) = send(
        &h.router,
        with_token("GET", "/sys/cms/article", &issued.token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 20);
    assert_eq!(body["message"], "用户已被锁定");
}

#[tokio::test]
async fn locked_account_cannot_log_in() {
    let h = harness().await;
    let (status, body) = login(&h, "frozen", "Frozen#2024").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "用户已被锁定");
}

#[tokio::test]
async fn missing_or_forged_token_is_no_login() {
    let h = harness().await;

    let (status, body) = send(
        &h.router,
        Request::builder()
            .uri("/sys/cms/article")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 10);

    let (status, body) = send(
        &h.router,
        with_token("GET", "/sys/cms/article", "Bearer not.a.token"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 10);
}

#[tokio::test]
async fn ignored_route_strips_inbound_user_header() {
    let h = harness().await;
    let (status, body) = send(
        &h.router,
        Request::builder()
            .uri("/health")
            .header("X-User-Id", "1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], Value::Null);
}

#[tokio::test]
async fn public_route_needs_login_only() {
    let h = harness().await;
    h.store
        .set_account_status(h.editor_id, AccountStatus::Enabled, None)
        .await;
    let issued = h.jwt.generate_token(h.editor_id, "editor").unwrap();

    let (status, body) = send(&h.router, with_token("GET", "/auth/profile", &issued.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["roles"][0]["name"], "Editor");

    let (status, _) = send(
        &h.router,
        Request::builder()
            .uri("/auth/profile")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unregistered_route_is_denied() {
    let h = harness().await;
    let issued = h.jwt.generate_token(h.editor_id, "editor").unwrap();
    let (status, body) = send(
        &h.router,
        with_token("GET", "/sys/unregistered", &issued.token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 20);
    assert_eq!(body["message"], "接口不存在");
}

#[tokio::test]
async fn store_outage_fails_closed_as_unavailable() {
    let h = harness().await;
    let issued = h.jwt.generate_token(h.editor_id, "editor").unwrap();
    h.store.set_unavailable(true);

    let (status, body) = send(
        &h.router,
        with_token("GET", "/sys/cms/article", &issued.token),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], 1);
}

#[tokio::test]
async fn wrong_captcha_and_password_are_rejected() {
    let h = harness().await;

    let challenge = h.challenges.issue_with_answer("1357").await;
    let err = h
        .auth
        .authenticate("editor", "Editor#2024", &challenge.id, "0000")
        .await
        .unwrap_err();
    assert!(matches!(err, AdmError::ChallengeInvalid));
    // 验证码已作废
    let err = h
        .auth
        .authenticate("editor", "Editor#2024", &challenge.id, "1357")
        .await
        .unwrap_err();
    assert!(matches!(err, AdmError::ChallengeInvalid));

    let challenge = h.challenges.issue_with_answer("1357").await;
    let wrong_password = h
        .auth
        .authenticate("editor", "nope", &challenge.id, "1357")
        .await
        .unwrap_err();
    let challenge = h.challenges.issue_with_answer("1357").await;
    let unknown_user = h
        .auth
        .authenticate("ghost", "nope", &challenge.id, "1357")
        .await
        .unwrap_err();
    assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    assert!(matches!(unknown_user, AdmError::CredentialInvalid));
}

#[tokio::test]
async fn login_records_last_login() {
    let h = harness().await;
    let challenge = h.challenges.issue().await.unwrap();
    // 随机答案不可知，这里只验证单次使用
    assert!(!h.challenges.verify(&challenge.id, "x").await.unwrap());

    let challenge = h.challenges.issue_with_answer("8642").await;
    let resp: LoginResponse = h
        .auth
        .login(
            LoginRequest {
                username: "editor".to_string(),
                password: "Editor#2024".to_string(),
                captcha_id: challenge.id,
                captcha_code: "8642".to_string(),
            },
            Some("10.0.0.8".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(resp.user.last_login_ip.as_deref(), Some("10.0.0.8"));
    assert_eq!(resp.role_ids.len(), 1);
    assert_eq!(resp.apis.len(), 1);

    let refreshed = h.auth.refresh(&resp.token).unwrap();
    let claims = h.jwt.parse_token(&refreshed.token).unwrap();
    assert_eq!(claims.user_id, h.editor_id);
}

#[tokio::test]
async fn rbac_exposes_subject_state() {
    let h = harness().await;
    let stores = Stores::from_shared(h.store.clone());
    let rbac = RbacService::new(
        &stores,
        Arc::new(PermissionRegistry::new(stores.apis.clone())),
    );
    let subject = rbac.subject(h.frozen_id).await.unwrap().unwrap();
    assert!(subject.account.is_locked_at(chrono::Utc::now()));
    assert_eq!(subject.role_ids.len(), 1);
    assert!(rbac.subject(9999).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_token_is_no_login() {
    let h = harness().await;
    // 有效期 60 秒，两分钟前签发
    let issued = h
        .jwt
        .generate_token_at(h.editor_id, "editor", Utc::now() - Duration::seconds(120))
        .unwrap();

    let (status, body) = send(
        &h.router,
        with_token("GET", "/sys/cms/article", &issued.token),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 10);
}

#[tokio::test]
async fn expired_token_refreshes_only_inside_window() {
    let h = harness().await;

    let stale = h
        .jwt
        .generate_token_at(h.editor_id, "editor", Utc::now() - Duration::seconds(120))
        .unwrap();
    let (status, body) = send(&h.router, with_token("POST", "/auth/refresh", &stale.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    let fresh = body["data"]["token"].as_str().unwrap().to_string();
    assert_ne!(fresh, stale.token);

    // 新令牌可以直接访问业务接口
    let (status, body) = send(&h.router, with_token("GET", "/sys/cms/article", &fresh)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], h.editor_id.to_string());

    // 刷新窗口 300 秒，已超出
    let dead = h
        .jwt
        .generate_token_at(h.editor_id, "editor", Utc::now() - Duration::seconds(400))
        .unwrap();
    let (status, body) = send(&h.router, with_token("POST", "/auth/refresh", &dead.token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 10);

    let (status, body) = send(
        &h.router,
        Request::builder()
            .method("POST")
            .uri("/auth/refresh")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 10);
}
