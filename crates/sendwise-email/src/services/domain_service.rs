//! Domain service for managing sending domains

use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, SqlErr, TransactionTrait,
};
use sendwise_entities::domains;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::errors::EmailError;
use crate::providers::common::DOMAIN_RE;
use crate::providers::{
    AuthenticationRequirements, DnsRecordStatus, DomainVerificationResult, EmailProviderType,
    VerifyDomainParams,
};
use crate::services::ProviderService;

fn conflict_on_duplicate(err: DbErr, name: &str) -> EmailError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            EmailError::Conflict(format!("Domain {} already exists", name))
        }
        _ => err.into(),
    }
}

#[derive(Clone)]
pub struct DomainService {
    db: Arc<DatabaseConnection>,
    provider_service: Arc<ProviderService>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateDomainRequest {
    pub name: String,
    pub provider_id: Option<i32>,
    pub dkim_selector: Option<String>,
    pub dkim_value: Option<String>,
    pub spf_value: Option<String>,
    pub dmarc_value: Option<String>,
    pub metadata: Option<Value>,
}

/// Fields left as `None` are unchanged. An empty string clears a record value.
#[derive(Debug, Clone, Default)]
pub struct UpdateDomainRequest {
    pub provider_id: Option<i32>,
    pub dkim_selector: Option<String>,
    pub dkim_value: Option<String>,
    pub spf_value: Option<String>,
    pub dmarc_value: Option<String>,
    pub metadata: Option<Value>,
}

/// A record the domain owner has to publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DnsRecord {
    #[schema(example = "dkim")]
    pub purpose: String,
    #[schema(example = "TXT")]
    pub record_type: String,
    #[schema(example = "s1._domainkey.example.com")]
    pub name: String,
    #[schema(example = "v=DKIM1; k=rsa; p=MIGfMA0GCSqGSIb3...")]
    pub value: String,
    pub status: DnsRecordStatus,
}

/// Placeholder shown until the provider's DKIM key is stored on the domain
const DKIM_VALUE_PLACEHOLDER: &str = "v=DKIM1; k=rsa; p=<public key from your provider>";

impl DomainService {
    pub fn new(db: Arc<DatabaseConnection>, provider_service: Arc<ProviderService>) -> Self {
        Self {
            db,
            provider_service,
        }
    }

    /// Trim, lowercase and drop the trailing dot
    pub fn normalize_name(name: &str) -> String {
        name.trim().trim_end_matches('.').to_lowercase()
    }

    pub async fn create(&self, request: CreateDomainRequest) -> Result<domains::Model, EmailError> {
        let name = Self::normalize_name(&request.name);
        debug!("Creating domain: {}", name);

        if !DOMAIN_RE.is_match(&name) {
            return Err(EmailError::Validation(format!(
                "'{}' is not a valid domain name",
                request.name.trim()
            )));
        }
        if self.find_by_name(&name).await?.is_some() {
            return Err(EmailError::Conflict(format!("Domain {} already exists", name)));
        }
        if let Some(provider_id) = request.provider_id {
            self.provider_service.get(provider_id).await?;
        }

        // The first domain becomes the default
        let is_first = domains::Entity::find().count(self.db.as_ref()).await? == 0;

        let domain = domains::ActiveModel {
            name: Set(name.clone()),
            status: Set("pending".to_string()),
            verified: Set(false),
            default_domain: Set(is_first),
            dkim_verified: Set(false),
            spf_verified: Set(false),
            dmarc_verified: Set(false),
            dkim_selector: Set(non_empty(request.dkim_selector)),
            dkim_value: Set(non_empty(request.dkim_value)),
            spf_value: Set(non_empty(request.spf_value)),
            dmarc_value: Set(non_empty(request.dmarc_value)),
            provider_id: Set(request.provider_id),
            metadata: Set(request.metadata.unwrap_or_else(|| serde_json::json!({}))),
            ..Default::default()
        };

        // A concurrent create can still reach the unique index
        let result = domain
            .insert(self.db.as_ref())
            .await
            .map_err(|e| conflict_on_duplicate(e, &name))?;

        info!("Created domain {} with id: {}", name, result.id);

        Ok(result)
    }

    pub async fn get(&self, id: i32) -> Result<domains::Model, EmailError> {
        domains::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(EmailError::DomainNotFound(id))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<domains::Model>, EmailError> {
        let domain = domains::Entity::find()
            .filter(domains::Column::Name.eq(Self::normalize_name(name)))
            .one(self.db.as_ref())
            .await?;

        Ok(domain)
    }

    /// Default domain first, then by name
    pub async fn list(&self) -> Result<Vec<domains::Model>, EmailError> {
        let domains = domains::Entity::find()
            .order_by_desc(domains::Column::DefaultDomain)
            .order_by_asc(domains::Column::Name)
            .all(self.db.as_ref())
            .await?;

        Ok(domains)
    }

    pub async fn update(
        &self,
        id: i32,
        request: UpdateDomainRequest,
    ) -> Result<domains::Model, EmailError> {
        let domain = self.get(id).await?;

        if let Some(provider_id) = request.provider_id {
            self.provider_service.get(provider_id).await?;
        }

        let mut active_model: domains::ActiveModel = domain.into();
        if let Some(provider_id) = request.provider_id {
            active_model.provider_id = Set(Some(provider_id));
        }
        if let Some(selector) = request.dkim_selector {
            active_model.dkim_selector = Set(non_empty(Some(selector)));
        }
        if let Some(value) = request.dkim_value {
            active_model.dkim_value = Set(non_empty(Some(value)));
        }
        if let Some(value) = request.spf_value {
            active_model.spf_value = Set(non_empty(Some(value)));
        }
        if let Some(value) = request.dmarc_value {
            active_model.dmarc_value = Set(non_empty(Some(value)));
        }
        if let Some(metadata) = request.metadata {
            active_model.metadata = Set(metadata);
        }

        let result = active_model.update(self.db.as_ref()).await?;

        debug!("Updated domain {}", id);

        Ok(result)
    }

    /// Deleting the default domain promotes the oldest remaining one
    pub async fn delete(&self, id: i32) -> Result<(), EmailError> {
        let domain = self.get(id).await?;

        let txn = self.db.begin().await?;

        domains::Entity::delete_by_id(domain.id).exec(&txn).await?;

        if domain.default_domain {
            let next = domains::Entity::find()
                .order_by_asc(domains::Column::CreatedAt)
                .order_by_asc(domains::Column::Id)
                .one(&txn)
                .await?;
            if let Some(next) = next {
                info!("Domain {} is now the default domain", next.name);
                let mut active_model: domains::ActiveModel = next.into();
                active_model.default_domain = Set(true);
                active_model.update(&txn).await?;
            }
        }

        txn.commit().await?;

        info!("Deleted domain {} ({})", domain.name, id);

        Ok(())
    }

    /// Requirements of the linked provider, or of plain SMTP when none is linked
    async fn requirements_for(
        &self,
        domain: &domains::Model,
    ) -> Result<AuthenticationRequirements, EmailError> {
        let provider_type = match domain.provider_id {
            Some(provider_id) => {
                let provider = self.provider_service.get(provider_id).await?;
                EmailProviderType::from_str(&provider.provider_type)?
            }
            None => EmailProviderType::Smtp,
        };
        Ok(provider_type.authentication_requirements())
    }

    /// Looks up the domain's DKIM, SPF and DMARC records and stores the outcome
    pub async fn verify(&self, id: i32) -> Result<domains::Model, EmailError> {
        let domain = self.get(id).await?;
        debug!("Verifying domain {}", domain.name);

        let params = VerifyDomainParams {
            domain: domain.name.clone(),
            dkim_selector: domain.dkim_selector.clone(),
            dkim_value: domain.dkim_value.clone(),
            spf_value: domain.spf_value.clone(),
            dmarc_value: domain.dmarc_value.clone(),
        };

        let result = match domain.provider_id {
            Some(provider_id) => {
                let provider = self.provider_service.get(provider_id).await?;
                let instance = self.provider_service.create_provider_instance(&provider)?;
                instance.verify_domain_authentication(&params).await
            }
            None => {
                self.provider_service
                    .factory()
                    .verifier()
                    .verify(
                        &params,
                        &EmailProviderType::Smtp.authentication_requirements(),
                    )
                    .await
            }
        };

        let status = verification_status(&result);
        if status != "verified" {
            warn!(
                "Domain {} is not fully verified: {}",
                domain.name,
                result.errors.join("; ")
            );
        }

        let mut metadata = match &domain.metadata {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        metadata.insert("last_errors".to_string(), serde_json::json!(result.errors));
        metadata.insert(
            "records".to_string(),
            serde_json::json!({
                "dkim": result.dkim_details,
                "spf": result.spf_details,
                "dmarc": result.dmarc_details,
            }),
        );

        let mut active_model: domains::ActiveModel = domain.into();
        active_model.dkim_verified = Set(result.dkim_verified);
        active_model.spf_verified = Set(result.spf_verified);
        active_model.dmarc_verified = Set(result.dmarc_verified);
        active_model.verified = Set(result.fully_verified());
        active_model.status = Set(status.to_string());
        active_model.last_verified_at = Set(Some(chrono::Utc::now()));
        active_model.metadata = Set(Value::Object(metadata));

        let updated = active_model.update(self.db.as_ref()).await?;

        info!(
            "Verified domain {}: status={}, {}%",
            updated.name,
            updated.status,
            Self::verification_percentage(&updated)
        );

        Ok(updated)
    }

    /// Makes `id` the only default domain
    pub async fn set_default(&self, id: i32) -> Result<domains::Model, EmailError> {
        let domain = self.get(id).await?;

        let txn = self.db.begin().await?;

        domains::Entity::update_many()
            .col_expr(domains::Column::DefaultDomain, Expr::value(false))
            .filter(domains::Column::Id.ne(id))
            .filter(domains::Column::DefaultDomain.eq(true))
            .exec(&txn)
            .await?;

        let mut active_model: domains::ActiveModel = domain.into();
        active_model.default_domain = Set(true);
        let updated = active_model.update(&txn).await?;

        txn.commit().await?;

        info!("Domain {} is now the default domain", updated.name);

        Ok(updated)
    }

    pub async fn get_default(&self) -> Result<Option<domains::Model>, EmailError> {
        let domain = domains::Entity::find()
            .filter(domains::Column::DefaultDomain.eq(true))
            .one(self.db.as_ref())
            .await?;

        Ok(domain)
    }

    /// Records to publish for the domain, built from its stored values and the
    /// linked provider's requirements
    pub async fn dns_records(&self, id: i32) -> Result<Vec<DnsRecord>, EmailError> {
        let domain = self.get(id).await?;
        let requirements = self.requirements_for(&domain).await?;
        Ok(build_dns_records(&domain, &requirements))
    }

    /// Share of the four verification flags that are set, rounded to a whole percent
    pub fn verification_percentage(domain: &domains::Model) -> u8 {
        let set = [
            domain.verified,
            domain.dkim_verified,
            domain.spf_verified,
            domain.dmarc_verified,
        ]
        .iter()
        .filter(|flag| **flag)
        .count();

        (100.0 * set as f64 / 4.0).round() as u8
    }

    pub async fn mark_used(&self, id: i32) -> Result<(), EmailError> {
        let domain = self.get(id).await?;

        let mut active_model: domains::ActiveModel = domain.into();
        active_model.last_used_at = Set(Some(chrono::Utc::now()));
        active_model.update(self.db.as_ref()).await?;

        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `verified` when every record passed, `failed` when a record exists but does
/// not match, otherwise `pending`
fn verification_status(result: &DomainVerificationResult) -> &'static str {
    if result.fully_verified() {
        return "verified";
    }
    let unverified = [
        result.dkim_verified,
        result.spf_verified,
        result.dmarc_verified,
    ]
    .iter()
    .filter(|flag| !**flag)
    .count();

    // Missing records and lookup failures each leave one error
    if unverified > result.errors.len() {
        "failed"
    } else {
        "pending"
    }
}

fn record_status(verified: bool) -> DnsRecordStatus {
    if verified {
        DnsRecordStatus::Verified
    } else {
        DnsRecordStatus::Pending
    }
}

fn build_dns_records(
    domain: &domains::Model,
    requirements: &AuthenticationRequirements,
) -> Vec<DnsRecord> {
    let mut records = Vec::new();

    let selector = domain
        .dkim_selector
        .clone()
        .or_else(|| requirements.default_dkim_selector.clone());
    if let Some(selector) = selector {
        records.push(DnsRecord {
            purpose: "dkim".to_string(),
            record_type: "TXT".to_string(),
            name: format!("{}._domainkey.{}", selector, domain.name),
            value: domain
                .dkim_value
                .clone()
                .unwrap_or_else(|| DKIM_VALUE_PLACEHOLDER.to_string()),
            status: record_status(domain.dkim_verified),
        });
    }

    let spf_value = match domain.spf_value.as_deref() {
        Some(value) if value.to_lowercase().starts_with("v=spf1") => value.to_string(),
        Some(mechanism) => format!("v=spf1 {} ~all", mechanism),
        None => match &requirements.spf_include {
            Some(include) => format!("v=spf1 {} ~all", include),
            None => "v=spf1 mx ~all".to_string(),
        },
    };
    records.push(DnsRecord {
        purpose: "spf".to_string(),
        record_type: "TXT".to_string(),
        name: domain.name.clone(),
        value: spf_value,
        status: record_status(domain.spf_verified),
    });

    records.push(DnsRecord {
        purpose: "dmarc".to_string(),
        record_type: "TXT".to_string(),
        name: format!("_dmarc.{}", domain.name),
        value: domain
            .dmarc_value
            .clone()
            .unwrap_or_else(|| requirements.dmarc_policy.clone()),
        status: record_status(domain.dmarc_verified),
    });

    records
}
