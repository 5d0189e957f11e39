use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

mod routes;
use adm_auth::{
    models::{AccountInput, RoleInput, RoleQuery},
    AccountRepository, ApiRepository, AuthConfig, AuthMiddleware, AuthService, CaptchaConfig,
    Gate, JwtConfig, JwtService, MemoryChallengeStore, MemoryStore, PermissionRegistry, PgStore,
    RbacService, Stores,
};
use adm_core::{AccountStatus, DataScope};
use dotenv::dotenv;
use routes::AppState;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct AppConfig {
    server: ServerCfg,
    storage: StorageCfg,
    #[serde(default)]
    auth: AuthConfig,
    jwt: JwtConfig,
    #[serde(default)]
    captcha: CaptchaConfig,
}

#[derive(Debug, Deserialize)]
struct ServerCfg {
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct StorageCfg {
    /// postgres | memory
    kind: String,
    url_env: Option<String>,
    max_connections: Option<u32>,
    migrations: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv().ok();

    let mut cfg: AppConfig = load_config()?;
    if let Ok(secret) = std::env::var("JWT_SECRET") {
        cfg.jwt.secret = secret;
    }
    let jwt_config = cfg.jwt.validate()?;
    let captcha_config = cfg.captcha.validate()?;

    let stores = build_stores(&cfg.storage).await?;
    let registry = Arc::new(PermissionRegistry::new(stores.apis.clone()));
    let seeded = registry.seed_builtin().await?;
    info!(seeded, "builtin permissions registered");

    let rbac = Arc::new(RbacService::new(&stores, registry.clone()));
    seed_admin(&stores, &rbac).await?;

    let jwt = Arc::new(JwtService::new(&jwt_config));
    let challenges = Arc::new(MemoryChallengeStore::new(captcha_config));
    let auth = Arc::new(AuthService::new(
        jwt.clone(),
        challenges,
        &stores,
        rbac.clone(),
    ));

    let token_header: Arc<str> = Arc::from(cfg.auth.token_header.as_str());
    let gate = Gate::new(cfg.auth, jwt, rbac.clone())?;

    let state = AppState {
        auth,
        rbac,
        registry,
        token_header,
    };

    let app = Router::new()
        .route("/auth/captcha", get(routes::captcha))
        .route("/auth/login", post(routes::login))
        .route("/auth/refresh", post(routes::refresh))
        .route("/auth/profile", get(routes::profile))
        .route("/auth/reset-password", post(routes::reset_password))
        .route("/sys/api/tree", get(routes::api_tree))
        .route("/sys/api/create", post(routes::create_api))
        .route("/sys/api/update/:id", put(routes::update_api))
        .route("/sys/api/delete/:id", delete(routes::delete_api))
        .route("/sys/role/create", post(routes::create_role))
        .route("/sys/role/update/:id", put(routes::update_role))
        .route("/sys/role/delete/:id", delete(routes::delete_role))
        .route("/sys/role/list", get(routes::list_roles))
        .route("/sys/role/detail/:id", get(routes::role_detail))
        .route("/sys/department/tree", get(routes::department_tree))
        .route("/sys/department/create", post(routes::create_department))
        .route("/sys/department/update/:id", put(routes::update_department))
        .route("/sys/department/delete/:id", delete(routes::delete_department))
        .route("/sys/user/create", post(routes::create_user))
        .route("/health", get(routes::health))
        // 后加的 route_layer 在外层：先鉴权，再审计
        .route_layer(middleware::from_fn(adm_auth::audit_middleware))
        .route_layer(AuthMiddleware::layer(gate))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
    let fmt_layer = fmt::layer().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,tower_http=info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config() -> anyhow::Result<AppConfig> {
    let path = std::env::var("ADM_CONFIG").unwrap_or_else(|_| "configs/default.yaml".into());
    let s = std::fs::read_to_string(&path)?;
    let cfg: AppConfig = serde_yaml::from_str(&s)?;
    info!(path = %path, storage = %cfg.storage.kind, "load_config");
    Ok(cfg)
}

fn read_env(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env {}", key))
}

/// 按配置选择存储
async fn build_stores(cfg: &StorageCfg) -> anyhow::Result<Stores> {
    match cfg.kind.as_str() {
        "postgres" => {
            let url = read_env(cfg.url_env.as_deref().unwrap_or("DATABASE_URL"))?;
            let pool = PgPoolOptions::new()
                .max_connections(cfg.max_connections.unwrap_or(10))
                .connect(&url)
                .await?;
            let dir = cfg.migrations.as_deref().unwrap_or("migrations");
            let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(dir)).await?;
            migrator.run(&pool).await?;
            info!(dir, "postgres migrations applied");
            Ok(Stores::from_shared(Arc::new(PgStore::new(pool))))
        }
        "memory" => {
            warn!("using in-memory storage; data is lost on restart");
            Ok(Stores::from_shared(Arc::new(MemoryStore::new())))
        }
        other => anyhow::bail!("unsupported storage kind: {}", other),
    }
}

const ADMIN_ROLE: &str = "超级管理员";

/// 创建拥有全部权限的管理员，密码来自 ADMIN_PASS；账号已存在时跳过
async fn seed_admin(stores: &Stores, rbac: &RbacService) -> anyhow::Result<()> {
    let Ok(password) = std::env::var("ADMIN_PASS") else {
        warn!("ADMIN_PASS not set; no administrator seeded");
        return Ok(());
    };
    let username = std::env::var("ADMIN_USER").unwrap_or_else(|_| "admin".into());
    if stores.accounts.find_by_username(&username).await?.is_some() {
        info!(username = %username, "administrator already present");
        return Ok(());
    }

    // 管理员角色总是持有当前登记的全部接口
    let api_ids: Vec<i64> = stores.apis.list_all().await?.into_iter().map(|a| a.id).collect();
    let existing = rbac
        .list_roles(&RoleQuery {
            name: Some(ADMIN_ROLE.to_string()),
            ..RoleQuery::default()
        })
        .await?
        .list
        .into_iter()
        .find(|r| r.role.name == ADMIN_ROLE);
    let role_id = match existing {
        Some(item) => {
            rbac.set_role_permissions(item.role.id, &api_ids).await?;
            item.role.id
        }
        None => {
            rbac.create_role(RoleInput {
                name: ADMIN_ROLE.to_string(),
                description: Some("拥有全部接口权限".to_string()),
                data_scope: DataScope::All,
                sort: 0,
                status: true,
                api_ids,
            })
            .await?
            .id
        }
    };

    let account = rbac
        .create_account(AccountInput {
            username: username.clone(),
            password,
            email: None,
            mobile: None,
            status: AccountStatus::Enabled,
            department_id: 0,
            role_ids: vec![role_id],
        })
        .await?;
    info!(account_id = account.id, username = %username, role_id, "administrator seeded");
    Ok(())
}
