//! Provider service for managing email provider configurations

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use sendwise_core::EncryptionService;
use sendwise_entities::email_providers;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::errors::EmailError;
use crate::providers::{
    ConfigurationCheck, EmailProvider, EmailProviderFactory, EmailProviderType, ProviderConfig,
    SendEmailRequest,
};

/// Config keys shown as `***`
const SECRET_FIELDS: &[&str] = &["api_key", "secret_access_key", "token", "secret", "password"];
/// Config keys shown with their first and last 4 characters
const KEY_ID_FIELDS: &[&str] = &["access_key_id", "owner_id", "user_id"];

#[derive(Clone)]
pub struct ProviderService {
    db: Arc<DatabaseConnection>,
    encryption_service: Arc<EncryptionService>,
    factory: EmailProviderFactory,
}

#[derive(Debug, Clone)]
pub struct CreateProviderRequest {
    pub name: String,
    pub provider_type: EmailProviderType,
    pub config: ProviderConfig,
}

#[derive(Debug, Clone)]
pub struct TestEmailRequest {
    pub from: String,
    pub from_name: Option<String>,
    pub to: String,
}

/// Outcome of a test send. Provider failures are reported, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEmailResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl ProviderService {
    pub fn new(db: Arc<DatabaseConnection>, encryption_service: Arc<EncryptionService>) -> Self {
        Self::with_factory(db, encryption_service, EmailProviderFactory::default())
    }

    pub fn with_factory(
        db: Arc<DatabaseConnection>,
        encryption_service: Arc<EncryptionService>,
        factory: EmailProviderFactory,
    ) -> Self {
        Self {
            db,
            encryption_service,
            factory,
        }
    }

    pub fn factory(&self) -> &EmailProviderFactory {
        &self.factory
    }

    /// Validates the config for its provider type, then stores it encrypted
    pub async fn create(
        &self,
        request: CreateProviderRequest,
    ) -> Result<email_providers::Model, EmailError> {
        debug!(
            "Creating email provider: {} ({})",
            request.name, request.provider_type
        );

        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(EmailError::Validation("Provider name is required".into()));
        }
        EmailProviderFactory::validate(request.provider_type, &request.config)?;

        let config_json = serde_json::to_string(&request.config)?;
        let encrypted_config = self.encryption_service.encrypt_string(&config_json)?;

        let provider = email_providers::ActiveModel {
            name: Set(name),
            provider_type: Set(request.provider_type.to_string()),
            config: Set(encrypted_config),
            is_active: Set(true),
            ..Default::default()
        };

        let result = provider.insert(self.db.as_ref()).await?;

        info!(
            "Created {} email provider with id: {}",
            request.provider_type, result.id
        );

        Ok(result)
    }

    pub async fn get(&self, id: i32) -> Result<email_providers::Model, EmailError> {
        email_providers::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(EmailError::ProviderNotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<email_providers::Model>, EmailError> {
        let providers = email_providers::Entity::find()
            .order_by_desc(email_providers::Column::CreatedAt)
            .order_by_desc(email_providers::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(providers)
    }

    pub async fn list_active(&self) -> Result<Vec<email_providers::Model>, EmailError> {
        let providers = email_providers::Entity::find()
            .filter(email_providers::Column::IsActive.eq(true))
            .order_by_desc(email_providers::Column::CreatedAt)
            .order_by_desc(email_providers::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(providers)
    }

    pub async fn delete(&self, id: i32) -> Result<(), EmailError> {
        let provider = self.get(id).await?;

        email_providers::Entity::delete_by_id(provider.id)
            .exec(self.db.as_ref())
            .await?;

        debug!("Deleted email provider with id: {}", id);

        Ok(())
    }

    pub async fn set_active(
        &self,
        id: i32,
        is_active: bool,
    ) -> Result<email_providers::Model, EmailError> {
        let provider = self.get(id).await?;

        let mut active_model: email_providers::ActiveModel = provider.into();
        active_model.is_active = Set(is_active);

        let result = active_model.update(self.db.as_ref()).await?;

        debug!(
            "Updated email provider {} active status to: {}",
            id, is_active
        );

        Ok(result)
    }

    fn decrypt_config(
        &self,
        provider: &email_providers::Model,
    ) -> Result<ProviderConfig, EmailError> {
        let config_json = self.encryption_service.decrypt_string(&provider.config)?;
        Ok(serde_json::from_str(&config_json)?)
    }

    pub fn create_provider_instance(
        &self,
        provider: &email_providers::Model,
    ) -> Result<Box<dyn EmailProvider>, EmailError> {
        let config = self.decrypt_config(provider)?;
        self.factory
            .create_from_tag(&provider.provider_type, &config)
            .map_err(|e| {
                error!(
                    "Failed to create provider instance for {}: {}",
                    provider.id, e
                );
                e
            })
    }

    /// Stored config for display, with secrets hidden
    pub fn get_masked_config(
        &self,
        provider: &email_providers::Model,
    ) -> Result<Value, EmailError> {
        let config = self.decrypt_config(provider)?;
        Ok(mask_config(serde_json::to_value(config)?))
    }

    pub async fn check(&self, id: i32) -> Result<ConfigurationCheck, EmailError> {
        let provider = self.get(id).await?;
        let instance = self.create_provider_instance(&provider)?;
        let check = instance.check_configuration().await;

        debug!(
            "Configuration check for provider {}: valid={}, {} errors, {} warnings",
            id,
            check.valid,
            check.errors.len(),
            check.warnings.len()
        );

        Ok(check)
    }

    pub async fn send_test_email(
        &self,
        id: i32,
        request: TestEmailRequest,
    ) -> Result<TestEmailResult, EmailError> {
        let provider = self.get(id).await?;
        let instance = self.create_provider_instance(&provider)?;

        let email = SendEmailRequest {
            from: request.from,
            from_name: request.from_name,
            to: vec![request.to],
            subject: format!("Sendwise test email from {}", provider.name),
            html: Some(format!(
                "<p>This is a test email sent through <strong>{}</strong> ({}).</p>",
                provider.name,
                instance.name()
            )),
            text: Some(format!(
                "This is a test email sent through {} ({}).",
                provider.name,
                instance.name()
            )),
            ..Default::default()
        };

        match instance.send(&email).await {
            Ok(response) => {
                info!("Test email sent through provider {}", id);
                Ok(TestEmailResult {
                    success: true,
                    message_id: Some(response.message_id),
                    error: None,
                })
            }
            Err(e) => {
                error!("Test email through provider {} failed: {}", id, e);
                Ok(TestEmailResult {
                    success: false,
                    message_id: None,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}

fn mask_config(config: Value) -> Value {
    let Value::Object(fields) = config else {
        return config;
    };

    let masked: Map<String, Value> = fields
        .into_iter()
        .map(|(key, value)| {
            let value = if SECRET_FIELDS.contains(&key.as_str()) {
                Value::String("***".to_string())
            } else if KEY_ID_FIELDS.contains(&key.as_str()) {
                Value::String(mask_string(value.as_str().unwrap_or_default()))
            } else {
                value
            };
            (key, value)
        })
        .collect();

    Value::Object(masked)
}

/// Mask a string, showing only first 4 and last 4 characters
fn mask_string(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        "***".to_string()
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}
