use axum::{
    extract::{ConnectInfo, Json, Path, Query, State},
    http::HeaderMap,
};
use adm_auth::{
    jwt::IssuedToken,
    models::{
        AccountInput, ApiInput, ApiTreeResponse, CaptchaResponse, DepartmentInput, LoginRequest,
        LoginResponse, Page, ProfileResponse, ResetPasswordRequest, RoleDetail, RoleInput,
        RoleItem, RoleQuery,
    },
    AuthService, JwtService, PermissionRegistry, Principal, RbacService,
};
use adm_core::{Account, ApiEntry, Department, JsonResponse, Role, Tree};
use adm_error::{AdmError, Result};
use std::net::SocketAddr;
use std::sync::Arc;

type ApiResult<T> = Result<Json<JsonResponse<T>>>;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub rbac: Arc<RbacService>,
    pub registry: Arc<PermissionRegistry>,
    pub token_header: Arc<str>,
}

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(JsonResponse::ok(data)))
}

/// 获取验证码
pub async fn captcha(State(state): State<AppState>) -> ApiResult<CaptchaResponse> {
    ok(state.auth.captcha().await?)
}

/// 登录
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    ok(state.auth.login(req, Some(client_ip(&headers, addr))).await?)
}

/// 刷新令牌，过期但仍在刷新窗口内的 token 可以换新
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<IssuedToken> {
    let token = headers
        .get(state.token_header.as_ref())
        .and_then(|v| v.to_str().ok())
        .and_then(JwtService::extract_token)
        .ok_or_else(|| AdmError::Authentication {
            message: "未登录或非法访问".to_string(),
        })?;
    ok(state.auth.refresh(token)?)
}

pub async fn profile(
    State(state): State<AppState>,
    principal: Principal,
) -> ApiResult<ProfileResponse> {
    ok(state.auth.profile(&principal).await?)
}

pub async fn reset_password(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<()> {
    state.auth.reset_password(&principal, req.password).await?;
    Ok(Json(JsonResponse::empty()))
}

// ===============
// 接口（权限点）管理
// ===============

pub async fn api_tree(State(state): State<AppState>) -> ApiResult<ApiTreeResponse> {
    ok(state.registry.api_tree().await?)
}

pub async fn create_api(
    State(state): State<AppState>,
    Json(input): Json<ApiInput>,
) -> ApiResult<ApiEntry> {
    ok(state.registry.create_api(input).await?)
}

pub async fn update_api(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<ApiInput>,
) -> ApiResult<ApiEntry> {
    ok(state.registry.update_api(id, input).await?)
}

pub async fn delete_api(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<()> {
    state.registry.delete_api(id).await?;
    Ok(Json(JsonResponse::empty()))
}

// ===============
// 角色管理
// ===============

pub async fn create_role(
    State(state): State<AppState>,
    Json(input): Json<RoleInput>,
) -> ApiResult<Role> {
    ok(state.rbac.create_role(input).await?)
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<RoleInput>,
) -> ApiResult<Role> {
    ok(state.rbac.update_role(id, input).await?)
}

pub async fn delete_role(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<()> {
    state.rbac.delete_role(id).await?;
    Ok(Json(JsonResponse::empty()))
}

pub async fn list_roles(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> ApiResult<Page<RoleItem>> {
    ok(state.rbac.list_roles(&query).await?)
}

pub async fn role_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<RoleDetail> {
    ok(state.rbac.role_detail(id).await?)
}

// ===============
// 部门与账号
// ===============

pub async fn department_tree(State(state): State<AppState>) -> ApiResult<Vec<Tree<Department>>> {
    ok(state.rbac.department_tree().await?)
}

pub async fn create_department(
    State(state): State<AppState>,
    Json(input): Json<DepartmentInput>,
) -> ApiResult<Department> {
    ok(state.rbac.create_department(input).await?)
}

pub async fn update_department(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<DepartmentInput>,
) -> ApiResult<Department> {
    ok(state.rbac.update_department(id, input).await?)
}

pub async fn delete_department(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<()> {
    state.rbac.delete_department(id).await?;
    Ok(Json(JsonResponse::empty()))
}

/// 新建账号，响应不含密码哈希
pub async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<AccountInput>,
) -> ApiResult<Account> {
    ok(state.rbac.create_account(input).await?)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// 优先取反向代理写入的 X-Forwarded-For 第一段
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}
