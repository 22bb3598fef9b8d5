use axum::{routing::get, Json, Router};
use clap::Args;
use sendwise_campaigns::handlers::CampaignsApiDoc;
use sendwise_campaigns::{CampaignService, StatsService};
use sendwise_contacts::handlers::ContactsApiDoc;
use sendwise_contacts::{ContactService, ListService};
use sendwise_core::{EncryptionService, ServerConfig};
use sendwise_database::DbConnection;
use sendwise_email::handlers::EmailApiDoc;
use sendwise_email::{DomainService, ProviderService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use utoipa::OpenApi;

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1:3000", env = "SENDWISE_ADDRESS")]
    pub address: String,

    /// Database connection URL (sqlite:// or postgres://)
    #[arg(
        long,
        default_value = "sqlite://sendwise.db?mode=rwc",
        env = "SENDWISE_DATABASE_URL"
    )]
    pub database_url: String,

    /// Data directory for the generated encryption key (defaults to ~/.sendwise)
    #[arg(long, env = "SENDWISE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// 64-character hex key sealing provider credentials
    #[arg(long, env = "SENDWISE_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let data_dir = self.data_dir.unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".sendwise")
        });
        let config = ServerConfig::new(
            self.address,
            self.database_url,
            data_dir,
            self.encryption_key,
        )?;

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(run(config))
    }
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    debug!("Initializing database connection...");
    let db = sendwise_database::establish_connection(&config.database_url).await?;
    let encryption_service = Arc::new(EncryptionService::new(&config.encryption_key)?);

    let app = build_app(db, encryption_service);

    let listener = TcpListener::bind(&config.address).await?;
    info!("Sendwise API listening on {}", config.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Every API surface merged into one OpenAPI document
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = EmailApiDoc::openapi();
    doc.merge(ContactsApiDoc::openapi());
    doc.merge(CampaignsApiDoc::openapi());
    doc.info.title = "Sendwise API".to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc
}

/// Wire the services together and mount every router under `/api`
pub fn build_app(db: Arc<DbConnection>, encryption_service: Arc<EncryptionService>) -> Router {
    let provider_service = Arc::new(ProviderService::new(db.clone(), encryption_service));
    let domain_service = Arc::new(DomainService::new(db.clone(), provider_service.clone()));
    let list_service = Arc::new(ListService::new(db.clone()));
    let campaign_service = Arc::new(CampaignService::new(
        db.clone(),
        provider_service.clone(),
        domain_service.clone(),
        list_service.clone(),
    ));

    let email_state = Arc::new(sendwise_email::handlers::AppState {
        provider_service,
        domain_service,
    });
    let contacts_state = Arc::new(sendwise_contacts::handlers::AppState {
        contact_service: Arc::new(ContactService::new(db.clone())),
        list_service,
    });
    let campaigns_state = Arc::new(sendwise_campaigns::handlers::AppState {
        campaign_service,
        stats_service: Arc::new(StatsService::new(db)),
    });

    let doc = openapi();
    let api = Router::new()
        .merge(sendwise_email::handlers::configure_routes().with_state(email_state))
        .merge(sendwise_contacts::handlers::configure_routes().with_state(contacts_state))
        .merge(sendwise_campaigns::handlers::configure_routes().with_state(campaigns_state))
        .route("/openapi.json", get(move || async move { Json(doc) }));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    async fn app() -> Router {
        let db = sendwise_database::establish_connection("sqlite::memory:")
            .await
            .unwrap();
        build_app(db, Arc::new(EncryptionService::new(KEY).unwrap()))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_openapi_covers_every_crate() {
        let doc = openapi();
        for path in ["/domains", "/contacts/import", "/campaigns/{id}/send", "/client-stats"] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
        assert_eq!(doc.info.title, "Sendwise API");
    }

    #[tokio::test]
    async fn test_routes_are_nested_under_api() {
        let app = app().await;

        let (status, stats) = get_json(app.clone(), "/api/client-stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_campaigns"], 0);

        let (status, contacts) = get_json(app.clone(), "/api/contacts").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(contacts["total"], 0);

        let (status, doc) = get_json(app.clone(), "/api/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/lists"].is_object());

        let response = app
            .oneshot(Request::builder().uri("/contacts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
