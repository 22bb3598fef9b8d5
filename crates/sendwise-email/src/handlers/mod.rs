//! HTTP handlers for the email service

mod domains;
mod providers;
mod types;

pub use types::AppState;

use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;

/// Configure email routes
pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(providers::routes())
        .merge(domains::routes())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Providers
        providers::create_provider,
        providers::list_providers,
        providers::list_provider_types,
        providers::get_provider,
        providers::delete_provider,
        providers::check_provider,
        providers::test_provider,
        // Domains
        domains::create_domain,
        domains::list_domains,
        domains::get_domain,
        domains::update_domain,
        domains::delete_domain,
        domains::verify_domain,
        domains::set_default_domain,
        domains::get_dns_records,
    ),
    components(
        schemas(
            // Provider types
            types::CreateEmailProviderRequest,
            types::EmailProviderResponse,
            types::ProviderTypeInfo,
            types::TestEmailRequestBody,
            types::TestEmailResponse,
            crate::providers::ProviderConfig,
            crate::providers::EmailProviderType,
            crate::providers::AuthenticationRequirements,
            crate::providers::AuthScheme,
            crate::providers::CredentialField,
            crate::providers::SupportedFeatures,
            crate::providers::ConfigurationCheck,
            // Domain types
            types::CreateDomainBody,
            types::UpdateDomainBody,
            types::DomainResponse,
            types::DnsRecordsResponse,
            crate::services::DnsRecord,
            crate::providers::DnsRecordStatus,
        )
    ),
    tags(
        (name = "Email Providers", description = "Email provider configuration and checks"),
        (name = "Domains", description = "Sending domains and DKIM/SPF/DMARC verification")
    )
)]
pub struct EmailApiDoc;

#[cfg(test)]
pub(crate) mod test_support {
    use super::AppState;
    use crate::dns::StaticTxtResolver;
    use crate::providers::EmailProviderFactory;
    use crate::services::{DomainService, ProviderService};
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use sendwise_core::EncryptionService;
    use sendwise_database::test_utils::TestDatabase;
    use std::sync::Arc;

    pub async fn test_state() -> (TestDatabase, Arc<AppState>) {
        let db = TestDatabase::with_migrations().await.unwrap();
        let encryption = Arc::new(
            EncryptionService::new(
                "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            )
            .unwrap(),
        );
        let provider_service = Arc::new(ProviderService::with_factory(
            db.db.clone(),
            encryption,
            EmailProviderFactory::new(Arc::new(StaticTxtResolver::new())),
        ));
        let domain_service = Arc::new(DomainService::new(db.db.clone(), provider_service.clone()));

        let state = Arc::new(AppState {
            provider_service,
            domain_service,
        });
        (db, state)
    }

    pub fn request(method: Method, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
