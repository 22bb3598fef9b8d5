//! Email provider trait definitions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::EmailError;

/// Supported email provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EmailProviderType {
    /// Twilio SendGrid (Mail Send v3)
    SendGrid,
    /// Mailgun REST API
    Mailgun,
    /// Amazon Simple Email Service
    Ses,
    /// SendClean REST API
    SendClean,
    /// SendPulse SMTP API
    SendPulse,
    /// Any SMTP relay
    Smtp,
}

impl std::fmt::Display for EmailProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailProviderType::SendGrid => write!(f, "sendgrid"),
            EmailProviderType::Mailgun => write!(f, "mailgun"),
            EmailProviderType::Ses => write!(f, "ses"),
            EmailProviderType::SendClean => write!(f, "sendclean"),
            EmailProviderType::SendPulse => write!(f, "sendpulse"),
            EmailProviderType::Smtp => write!(f, "smtp"),
        }
    }
}

impl EmailProviderType {
    pub const ALL: [EmailProviderType; 6] = [
        EmailProviderType::SendGrid,
        EmailProviderType::Mailgun,
        EmailProviderType::Ses,
        EmailProviderType::SendClean,
        EmailProviderType::SendPulse,
        EmailProviderType::Smtp,
    ];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, EmailError> {
        match s.trim().to_lowercase().as_str() {
            "sendgrid" | "send_grid" | "send-grid" => Ok(EmailProviderType::SendGrid),
            "mailgun" => Ok(EmailProviderType::Mailgun),
            "ses" | "aws_ses" | "aws-ses" | "amazon_ses" | "amazon-ses" => {
                Ok(EmailProviderType::Ses)
            }
            "sendclean" | "send_clean" => Ok(EmailProviderType::SendClean),
            "sendpulse" | "send_pulse" => Ok(EmailProviderType::SendPulse),
            "smtp" => Ok(EmailProviderType::Smtp),
            _ => Err(EmailError::InvalidProviderType(s.to_string())),
        }
    }

    /// Human readable provider name
    pub fn display_name(&self) -> &'static str {
        match self {
            EmailProviderType::SendGrid => "SendGrid",
            EmailProviderType::Mailgun => "Mailgun",
            EmailProviderType::Ses => "Amazon SES",
            EmailProviderType::SendClean => "SendClean",
            EmailProviderType::SendPulse => "SendPulse",
            EmailProviderType::Smtp => "SMTP",
        }
    }

    pub fn authentication_requirements(&self) -> AuthenticationRequirements {
        let dmarc = "v=DMARC1; p=none;".to_string();
        match self {
            EmailProviderType::SendGrid => AuthenticationRequirements {
                scheme: AuthScheme::ApiKey,
                fields: vec![CredentialField::required(
                    "api_key",
                    "SendGrid API key (starts with SG.)",
                )],
                default_dkim_selector: Some("s1".to_string()),
                spf_include: Some("include:sendgrid.net".to_string()),
                dmarc_policy: dmarc,
            },
            EmailProviderType::Mailgun => AuthenticationRequirements {
                scheme: AuthScheme::KeyAndDomain,
                fields: vec![
                    CredentialField::required("api_key", "Mailgun private API key"),
                    CredentialField::required("domain", "Sending domain registered in Mailgun"),
                    CredentialField::optional("region", "API region, 'us' (default) or 'eu'"),
                ],
                default_dkim_selector: Some("mx".to_string()),
                spf_include: Some("include:mailgun.org".to_string()),
                dmarc_policy: dmarc,
            },
            EmailProviderType::Ses => AuthenticationRequirements {
                scheme: AuthScheme::KeyAndSecret,
                fields: vec![
                    CredentialField::required("access_key_id", "AWS access key id"),
                    CredentialField::required("secret_access_key", "AWS secret access key"),
                    CredentialField::optional("region", "AWS region, defaults to us-east-1"),
                    CredentialField::optional(
                        "endpoint_url",
                        "Custom endpoint for SES compatible services",
                    ),
                ],
                // SES issues per-identity DKIM tokens, there is no fixed selector
                default_dkim_selector: None,
                spf_include: Some("include:amazonses.com".to_string()),
                dmarc_policy: dmarc,
            },
            EmailProviderType::SendClean => AuthenticationRequirements {
                scheme: AuthScheme::KeyAndSecret,
                fields: vec![
                    CredentialField::required("owner_id", "SendClean account owner id"),
                    CredentialField::required("token", "SendClean API token"),
                ],
                default_dkim_selector: Some("sendclean".to_string()),
                spf_include: Some("include:sendclean.net".to_string()),
                dmarc_policy: dmarc,
            },
            EmailProviderType::SendPulse => AuthenticationRequirements {
                scheme: AuthScheme::OAuthClientCredentials,
                fields: vec![
                    CredentialField::required("user_id", "SendPulse REST API user id"),
                    CredentialField::required("secret", "SendPulse REST API secret"),
                ],
                default_dkim_selector: Some("sign".to_string()),
                spf_include: Some("include:mxsmtp.sendpulse.com".to_string()),
                dmarc_policy: dmarc,
            },
            EmailProviderType::Smtp => AuthenticationRequirements {
                scheme: AuthScheme::SmtpCredentials,
                fields: vec![
                    CredentialField::required("host", "SMTP server host name"),
                    CredentialField::optional("port", "SMTP port, defaults to 587"),
                    CredentialField::required("username", "SMTP user name"),
                    CredentialField::required("password", "SMTP password"),
                    CredentialField::optional("security", "none, starttls (default) or tls"),
                ],
                default_dkim_selector: Some("default".to_string()),
                spf_include: None,
                dmarc_policy: dmarc,
            },
        }
    }

    pub fn supported_features(&self) -> SupportedFeatures {
        match self {
            EmailProviderType::SendGrid | EmailProviderType::Mailgun => SupportedFeatures {
                html: true,
                plain_text: true,
                attachments: true,
                bulk_send: true,
                templates: true,
                tracking: true,
                scheduling: true,
                domain_verification: true,
            },
            EmailProviderType::Ses
            | EmailProviderType::SendClean
            | EmailProviderType::SendPulse => SupportedFeatures {
                html: true,
                plain_text: true,
                attachments: true,
                bulk_send: true,
                templates: true,
                tracking: true,
                scheduling: false,
                domain_verification: true,
            },
            EmailProviderType::Smtp => SupportedFeatures {
                html: true,
                plain_text: true,
                attachments: true,
                bulk_send: false,
                templates: false,
                tracking: false,
                scheduling: false,
                domain_verification: false,
            },
        }
    }
}

/// How a provider authenticates API calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    ApiKey,
    KeyAndSecret,
    KeyAndDomain,
    OAuthClientCredentials,
    SmtpCredentials,
}

/// One credential field a provider configuration accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CredentialField {
    #[schema(example = "api_key")]
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl CredentialField {
    fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

/// Credentials and DNS setup a provider needs
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticationRequirements {
    pub scheme: AuthScheme,
    pub fields: Vec<CredentialField>,
    /// Selector used for the DKIM lookup when a domain does not set one
    #[schema(example = "s1")]
    pub default_dkim_selector: Option<String>,
    /// SPF mechanism the domain's SPF record must contain
    #[schema(example = "include:sendgrid.net")]
    pub spf_include: Option<String>,
    #[schema(example = "v=DMARC1; p=none;")]
    pub dmarc_policy: String,
}

impl AuthenticationRequirements {
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SupportedFeatures {
    pub html: bool,
    pub plain_text: bool,
    pub attachments: bool,
    pub bulk_send: bool,
    pub templates: bool,
    pub tracking: bool,
    pub scheduling: bool,
    pub domain_verification: bool,
}

/// Outcome of a provider configuration check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConfigurationCheck {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigurationCheck {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// DNS record verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DnsRecordStatus {
    /// Record exists and matches the expected value
    Verified,
    /// Record not found yet
    Pending,
    /// Record exists but its value does not match
    Failed,
    /// The lookup itself failed
    Unknown,
}

/// Request to send an email
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendEmailRequest {
    pub from: String,
    pub from_name: Option<String>,
    pub to: Vec<String>,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    pub headers: Option<std::collections::HashMap<String, String>>,
}

impl SendEmailRequest {
    /// Checks run before any provider call
    pub fn validate(&self) -> Result<(), EmailError> {
        if self.from.trim().is_empty() {
            return Err(EmailError::Validation("Sender address is required".into()));
        }
        if self.subject.trim().is_empty() {
            return Err(EmailError::Validation("Subject is required".into()));
        }
        if self.to.is_empty() {
            return Err(EmailError::Validation(
                "At least one recipient is required".into(),
            ));
        }
        if self.html.is_none() && self.text.is_none() {
            return Err(EmailError::Validation(
                "Either an HTML or a text body is required".into(),
            ));
        }
        Ok(())
    }

    /// `"Name <address>"` when a display name is set
    pub fn formatted_from(&self) -> String {
        match &self.from_name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.from),
            _ => self.from.clone(),
        }
    }
}

/// Response from sending an email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEmailResponse {
    /// Provider's message ID
    pub message_id: String,
}

/// Domain authentication values to check
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct VerifyDomainParams {
    #[schema(example = "example.com")]
    pub domain: String,
    pub dkim_selector: Option<String>,
    pub dkim_value: Option<String>,
    pub spf_value: Option<String>,
    pub dmarc_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DomainVerificationResult {
    pub domain: String,
    pub dkim_verified: bool,
    pub spf_verified: bool,
    pub dmarc_verified: bool,
    pub dkim_details: Option<String>,
    pub spf_details: Option<String>,
    pub dmarc_details: Option<String>,
    pub errors: Vec<String>,
}

impl DomainVerificationResult {
    pub fn fully_verified(&self) -> bool {
        self.dkim_verified && self.spf_verified && self.dmarc_verified
    }
}

/// Email provider trait for abstracting different email services
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> EmailProviderType;

    fn name(&self) -> &'static str {
        self.provider_type().display_name()
    }

    /// Send an email
    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, EmailError>;

    /// Send several emails, one result per message in input order
    async fn send_bulk(
        &self,
        emails: &[SendEmailRequest],
    ) -> Vec<Result<SendEmailResponse, EmailError>> {
        let mut results = Vec::with_capacity(emails.len());
        for email in emails {
            results.push(self.send(email).await);
        }
        results
    }

    /// Check the domain's DKIM, SPF and DMARC records
    async fn verify_domain_authentication(
        &self,
        params: &VerifyDomainParams,
    ) -> DomainVerificationResult;

    fn authentication_requirements(&self) -> AuthenticationRequirements {
        self.provider_type().authentication_requirements()
    }

    fn supported_features(&self) -> SupportedFeatures {
        self.provider_type().supported_features()
    }

    /// Validate credentials and probe the remote service. Never fails; problems are
    /// reported in the returned check.
    async fn check_configuration(&self) -> ConfigurationCheck;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_from_str() {
        assert_eq!(
            EmailProviderType::from_str("sendgrid").unwrap(),
            EmailProviderType::SendGrid
        );
        assert_eq!(
            EmailProviderType::from_str("SendGrid").unwrap(),
            EmailProviderType::SendGrid
        );
        assert_eq!(
            EmailProviderType::from_str("aws_ses").unwrap(),
            EmailProviderType::Ses
        );
        assert_eq!(
            EmailProviderType::from_str("Amazon_SES").unwrap(),
            EmailProviderType::Ses
        );
        assert_eq!(
            EmailProviderType::from_str(" smtp ").unwrap(),
            EmailProviderType::Smtp
        );
        assert!(matches!(
            EmailProviderType::from_str("postmark"),
            Err(EmailError::InvalidProviderType(_))
        ));
    }

    #[test]
    fn test_provider_type_display_round_trips() {
        for provider_type in EmailProviderType::ALL {
            let tag = provider_type.to_string();
            assert_eq!(EmailProviderType::from_str(&tag).unwrap(), provider_type);
            let json = serde_json::to_string(&provider_type).unwrap();
            assert_eq!(json, format!("\"{}\"", tag));
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(EmailProviderType::Mailgun.display_name(), "Mailgun");
        assert_eq!(EmailProviderType::Ses.display_name(), "Amazon SES");
        assert_eq!(EmailProviderType::Smtp.display_name(), "SMTP");
    }

    #[test]
    fn test_required_fields() {
        let fields: Vec<_> = EmailProviderType::Mailgun
            .authentication_requirements()
            .required_fields()
            .map(String::from)
            .collect();
        assert_eq!(fields, vec!["api_key", "domain"]);

        let smtp = EmailProviderType::Smtp.authentication_requirements();
        assert!(smtp.spf_include.is_none());
        assert_eq!(smtp.scheme, AuthScheme::SmtpCredentials);
    }

    #[test]
    fn test_send_request_validation() {
        let mut request = SendEmailRequest {
            from: "news@example.com".into(),
            to: vec!["a@example.com".into()],
            subject: "Hello".into(),
            text: Some("Hi".into()),
            ..Default::default()
        };
        assert!(request.validate().is_ok());

        request.subject = "  ".into();
        assert!(matches!(request.validate(), Err(EmailError::Validation(_))));

        request.subject = "Hello".into();
        request.text = None;
        assert!(request.validate().is_err());

        request.html = Some("<p>Hi</p>".into());
        request.to.clear();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_formatted_from() {
        let mut request = SendEmailRequest {
            from: "news@example.com".into(),
            ..Default::default()
        };
        assert_eq!(request.formatted_from(), "news@example.com");
        request.from_name = Some("Acme".into());
        assert_eq!(request.formatted_from(), "Acme <news@example.com>");
    }

    #[test]
    fn test_configuration_check_collects_errors() {
        let mut check = ConfigurationCheck::new();
        check.warning("slow");
        assert!(check.valid);
        check.error("bad key");
        assert!(!check.valid);
        assert_eq!(check.errors, vec!["bad key"]);
        assert_eq!(check.warnings, vec!["slow"]);
    }
}
