use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use traceroot_core::clickhouse_store::ClickhouseStore;
use traceroot_core::config::Config;
use traceroot_core::object_store::ObjectStore;
use traceroot_core::queue::TaskQueue;
use traceroot_core::relational::RelationalStore;
use traceroot_core::{handlers, migrations, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("traceroot_core=debug,tower_http=debug")))
        .init();

    let config = Config::from_env();

    migrations::run(&config.clickhouse_url, &config.clickhouse_user, &config.clickhouse_password).await?;

    let relational = Arc::new(RelationalStore::open(&config.relational_db_path)?);
    tracing::info!(path = %config.relational_db_path, "relational store opened");

    let ch = ClickhouseStore::new(&config.clickhouse_url, &config.clickhouse_database, &config.clickhouse_user, &config.clickhouse_password);

    let object_store = ObjectStore::new(
        config.s3_endpoint_url.as_deref(),
        &config.s3_region,
        &config.s3_bucket,
        config.s3_access_key_id.as_deref(),
        config.s3_secret_access_key.as_deref(),
    )
    .await;
    object_store.ensure_container().await?;

    let queue = TaskQueue::new(&config.redis_url).await?;

    let cors = if config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = config.cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
    };
    let body_limit = config.max_ingest_body_bytes;
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;

    let state = AppState { relational, ch, object_store, queue, config: Arc::new(config) };

    let app = Router::new()
        .route("/public/traces", post(handlers::ingest::ingest_traces))
        .route("/organizations", post(handlers::organizations::create_organization).get(handlers::organizations::list_organizations))
        .route("/organizations/{org_id}", patch(handlers::organizations::update_organization).delete(handlers::organizations::delete_organization))
        .route("/organizations/{org_id}/members", post(handlers::organizations::add_member).get(handlers::organizations::list_members))
        .route(
            "/organizations/{org_id}/members/{user_id}",
            patch(handlers::organizations::update_member_role).delete(handlers::organizations::remove_member),
        )
        .route("/organizations/{org_id}/invitations", post(handlers::organizations::create_invitation).get(handlers::organizations::list_invitations))
        .route("/organizations/{org_id}/projects", post(handlers::organizations::create_project).get(handlers::organizations::list_org_projects))
        .route(
            "/projects/{project_id}",
            get(handlers::projects::get_project).patch(handlers::projects::update_project).delete(handlers::projects::delete_project),
        )
        .route("/projects/{project_id}/api-keys", post(handlers::api_keys::create_api_key).get(handlers::api_keys::list_api_keys))
        .route("/projects/{project_id}/api-keys/{key_id}", axum::routing::delete(handlers::api_keys::delete_api_key))
        .route("/projects/{project_id}/traces", get(handlers::traces::list_traces))
        .route("/projects/{project_id}/traces/{trace_id}", get(handlers::traces::get_trace))
        .route("/health", get(handlers::health::healthz))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("traceroot-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
