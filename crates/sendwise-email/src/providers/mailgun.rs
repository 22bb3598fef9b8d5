//! Mailgun provider implementation

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::common::{error_body, record_probe, trim_base_url, DOMAIN_RE};
use super::traits::{
    ConfigurationCheck, DomainVerificationResult, EmailProvider, EmailProviderType,
    SendEmailRequest, SendEmailResponse, VerifyDomainParams,
};
use crate::dns::DomainAuthVerifier;
use crate::errors::EmailError;

static API_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(key-)?[0-9a-f]{32}(-[0-9a-f]{8}-[0-9a-f]{8})?$")
        .expect("Mailgun key regex is valid")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailgunCredentials {
    pub api_key: String,
    pub domain: String,
    /// `us` (default) or `eu`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

pub struct MailgunProvider {
    client: Client,
    api_key: String,
    domain: String,
    region: String,
    base_url: String,
    verifier: DomainAuthVerifier,
}

impl MailgunProvider {
    const US_BASE_URL: &'static str = "https://api.mailgun.net";
    const EU_BASE_URL: &'static str = "https://api.eu.mailgun.net";

    pub fn new(
        credentials: &MailgunCredentials,
        verifier: DomainAuthVerifier,
    ) -> Result<Self, EmailError> {
        for (field, value) in [("api_key", &credentials.api_key), ("domain", &credentials.domain)] {
            if value.trim().is_empty() {
                return Err(EmailError::MissingCredential {
                    provider: "Mailgun".into(),
                    field: field.into(),
                });
            }
        }

        let region = credentials
            .region
            .as_deref()
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "us".to_string());
        let base_url = if region == "eu" {
            Self::EU_BASE_URL
        } else {
            Self::US_BASE_URL
        };

        Ok(Self {
            client: Client::new(),
            api_key: credentials.api_key.trim().to_string(),
            domain: credentials.domain.trim().to_lowercase(),
            region,
            base_url: base_url.to_string(),
            verifier,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base_url(base_url);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v3{}", self.base_url, path)
    }

    fn form_fields(email: &SendEmailRequest) -> Vec<(String, String)> {
        let mut fields = vec![("from".to_string(), email.formatted_from())];
        for to in &email.to {
            fields.push(("to".to_string(), to.clone()));
        }
        for cc in email.cc.iter().flatten() {
            fields.push(("cc".to_string(), cc.clone()));
        }
        for bcc in email.bcc.iter().flatten() {
            fields.push(("bcc".to_string(), bcc.clone()));
        }
        fields.push(("subject".to_string(), email.subject.clone()));
        if let Some(text) = &email.text {
            fields.push(("text".to_string(), text.clone()));
        }
        if let Some(html) = &email.html {
            fields.push(("html".to_string(), html.clone()));
        }
        if let Some(reply_to) = &email.reply_to {
            fields.push(("h:Reply-To".to_string(), reply_to.clone()));
        }
        for (name, value) in email.headers.iter().flatten() {
            fields.push((format!("h:{}", name), value.clone()));
        }
        fields
    }
}

#[derive(Debug, Deserialize)]
struct MailgunSendResponse {
    id: String,
}

#[async_trait]
impl EmailProvider for MailgunProvider {
    fn provider_type(&self) -> EmailProviderType {
        EmailProviderType::Mailgun
    }

    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, EmailError> {
        email.validate()?;
        debug!(
            "Sending email via Mailgun ({}) from: {}",
            self.domain, email.from
        );

        let response = self
            .client
            .post(self.api_url(&format!(
                "/{}/messages",
                urlencoding::encode(&self.domain)
            )))
            .basic_auth("api", Some(&self.api_key))
            .form(&Self::form_fields(email))
            .send()
            .await
            .map_err(|e| {
                error!("Mailgun request failed: {}", e);
                EmailError::Mailgun(format!("Failed to send email: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            error!("Failed to send email via Mailgun ({}): {}", status, body);
            return Err(EmailError::Mailgun(format!(
                "Failed to send email ({}): {}",
                status, body
            )));
        }

        let sent: MailgunSendResponse = response
            .json()
            .await
            .map_err(|e| EmailError::Mailgun(format!("Failed to parse send response: {}", e)))?;

        debug!("Email sent successfully, message_id: {}", sent.id);

        Ok(SendEmailResponse {
            message_id: sent.id.trim_matches(|c| c == '<' || c == '>').to_string(),
        })
    }

    async fn verify_domain_authentication(
        &self,
        params: &VerifyDomainParams,
    ) -> DomainVerificationResult {
        self.verifier
            .verify(params, &self.authentication_requirements())
            .await
    }

    async fn check_configuration(&self) -> ConfigurationCheck {
        let mut check = ConfigurationCheck::new();

        if !DOMAIN_RE.is_match(&self.domain) {
            check.error(format!("'{}' is not a valid domain name", self.domain));
        }
        if self.region != "us" && self.region != "eu" {
            check.error(format!(
                "Unknown Mailgun region '{}', expected 'us' or 'eu'",
                self.region
            ));
        }
        if !API_KEY_RE.is_match(&self.api_key) {
            check.warning("Mailgun API key does not look like a private API key");
        }

        let outcome = self
            .client
            .get(self.api_url(&format!("/domains/{}", urlencoding::encode(&self.domain))))
            .basic_auth("api", Some(&self.api_key))
            .send()
            .await
            .map(|r| r.status());
        record_probe(&mut check, self.name(), outcome);

        check
    }
}
