//! Handler types for the email service

use crate::errors::EmailError;
use crate::providers::{
    AuthenticationRequirements, EmailProviderType, ProviderConfig, SupportedFeatures,
};
use crate::services::{DnsRecord, DomainService, ProviderService};
use sendwise_core::error_builder::{
    bad_gateway, bad_request, conflict, internal_server_error, not_found,
};
use sendwise_core::problemdetails::Problem;
use sendwise_entities::{domains, email_providers};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

pub struct AppState {
    pub provider_service: Arc<ProviderService>,
    pub domain_service: Arc<DomainService>,
}

impl From<EmailError> for Problem {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::ProviderNotFound(id) => not_found()
                .detail(format!("Email provider {} not found", id))
                .build(),
            EmailError::DomainNotFound(id) => {
                not_found().detail(format!("Domain {} not found", id)).build()
            }
            EmailError::Conflict(msg) => conflict().detail(msg).build(),
            e @ (EmailError::InvalidProviderType(_)
            | EmailError::MissingCredential { .. }
            | EmailError::Validation(_)
            | EmailError::Configuration(_)) => bad_request().detail(e.to_string()).build(),
            e if e.is_provider_failure() => bad_gateway().detail(e.to_string()).build(),
            e => {
                error!("Email service error: {}", e);
                internal_server_error().detail(e.to_string()).build()
            }
        }
    }
}

// ========================================
// Provider Types
// ========================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEmailProviderRequest {
    /// User-friendly name for the provider
    #[schema(example = "Marketing SendGrid")]
    pub name: String,
    /// Provider tag: sendgrid, mailgun, ses, sendclean, sendpulse or smtp
    #[schema(example = "sendgrid")]
    pub provider_type: String,
    /// Provider settings; keys may be snake_case or camelCase
    pub config: ProviderConfig,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmailProviderResponse {
    pub id: i32,
    #[schema(example = "Marketing SendGrid")]
    pub name: String,
    #[schema(example = "sendgrid")]
    pub provider_type: String,
    #[schema(example = "SendGrid")]
    pub display_name: String,
    pub is_active: bool,
    /// Config with secrets masked
    pub config: serde_json::Value,
    #[schema(example = "2026-03-01T10:30:00Z")]
    pub created_at: String,
    #[schema(example = "2026-03-01T10:30:00Z")]
    pub updated_at: String,
}

impl EmailProviderResponse {
    pub fn new(provider: email_providers::Model, config: serde_json::Value) -> Self {
        let display_name = EmailProviderType::from_str(&provider.provider_type)
            .map(|t| t.display_name().to_string())
            .unwrap_or_else(|_| provider.provider_type.clone());

        Self {
            id: provider.id,
            name: provider.name,
            provider_type: provider.provider_type,
            display_name,
            is_active: provider.is_active,
            config,
            created_at: provider.created_at.to_rfc3339(),
            updated_at: provider.updated_at.to_rfc3339(),
        }
    }
}

/// What a provider type needs and supports
#[derive(Debug, Serialize, ToSchema)]
pub struct ProviderTypeInfo {
    pub provider_type: EmailProviderType,
    #[schema(example = "SendGrid")]
    pub display_name: String,
    pub requirements: AuthenticationRequirements,
    pub features: SupportedFeatures,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TestEmailRequestBody {
    #[schema(example = "hello@example.com")]
    pub from: String,
    pub from_name: Option<String>,
    #[schema(example = "me@example.com")]
    pub to: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestEmailResponse {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

// ========================================
// Domain Types
// ========================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDomainBody {
    #[schema(example = "news.example.com")]
    pub name: String,
    pub provider_id: Option<i32>,
    #[schema(example = "s1")]
    pub dkim_selector: Option<String>,
    pub dkim_value: Option<String>,
    #[schema(example = "include:sendgrid.net")]
    pub spf_value: Option<String>,
    #[schema(example = "v=DMARC1; p=none;")]
    pub dmarc_value: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Omitted fields are left unchanged; an empty string clears a value
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDomainBody {
    pub provider_id: Option<i32>,
    pub dkim_selector: Option<String>,
    pub dkim_value: Option<String>,
    pub spf_value: Option<String>,
    pub dmarc_value: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DomainResponse {
    pub id: i32,
    #[schema(example = "news.example.com")]
    pub name: String,
    #[schema(example = "verified")]
    pub status: String,
    pub verified: bool,
    pub default_domain: bool,
    pub dkim_verified: bool,
    pub spf_verified: bool,
    pub dmarc_verified: bool,
    /// Share of verification checks passed
    #[schema(example = 75)]
    pub verification_percentage: u8,
    pub dkim_selector: Option<String>,
    pub dkim_value: Option<String>,
    pub spf_value: Option<String>,
    pub dmarc_value: Option<String>,
    pub provider_id: Option<i32>,
    pub metadata: serde_json::Value,
    pub last_used_at: Option<String>,
    pub last_verified_at: Option<String>,
    #[schema(example = "2026-03-01T10:30:00Z")]
    pub created_at: String,
    #[schema(example = "2026-03-01T10:30:00Z")]
    pub updated_at: String,
}

impl From<domains::Model> for DomainResponse {
    fn from(domain: domains::Model) -> Self {
        let verification_percentage = DomainService::verification_percentage(&domain);
        Self {
            id: domain.id,
            name: domain.name,
            status: domain.status,
            verified: domain.verified,
            default_domain: domain.default_domain,
            dkim_verified: domain.dkim_verified,
            spf_verified: domain.spf_verified,
            dmarc_verified: domain.dmarc_verified,
            verification_percentage,
            dkim_selector: domain.dkim_selector,
            dkim_value: domain.dkim_value,
            spf_value: domain.spf_value,
            dmarc_value: domain.dmarc_value,
            provider_id: domain.provider_id,
            metadata: domain.metadata,
            last_used_at: domain.last_used_at.map(|t| t.to_rfc3339()),
            last_verified_at: domain.last_verified_at.map(|t| t.to_rfc3339()),
            created_at: domain.created_at.to_rfc3339(),
            updated_at: domain.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DnsRecordsResponse {
    pub domain: String,
    pub records: Vec<DnsRecord>,
}
