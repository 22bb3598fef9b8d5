//! SendGrid Mail Send v3 provider implementation

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::common::{error_body, record_probe, trim_base_url};
use super::traits::{
    ConfigurationCheck, DomainVerificationResult, EmailProvider, EmailProviderType,
    SendEmailRequest, SendEmailResponse, VerifyDomainParams,
};
use crate::dns::DomainAuthVerifier;
use crate::errors::EmailError;

static API_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^SG\.[A-Za-z0-9_-]{16,32}\.[A-Za-z0-9_-]{16,64}$")
        .expect("SendGrid key regex is valid")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendGridCredentials {
    pub api_key: String,
}

pub struct SendGridProvider {
    client: Client,
    api_key: String,
    base_url: String,
    verifier: DomainAuthVerifier,
}

impl SendGridProvider {
    const BASE_URL: &'static str = "https://api.sendgrid.com";

    pub fn new(
        credentials: &SendGridCredentials,
        verifier: DomainAuthVerifier,
    ) -> Result<Self, EmailError> {
        if credentials.api_key.trim().is_empty() {
            return Err(EmailError::MissingCredential {
                provider: "SendGrid".into(),
                field: "api_key".into(),
            });
        }

        Ok(Self {
            client: Client::new(),
            api_key: credentials.api_key.trim().to_string(),
            base_url: Self::BASE_URL.to_string(),
            verifier,
        })
    }

    /// Point the provider at another API host
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base_url(base_url);
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Debug, Serialize)]
struct SendGridAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl SendGridAddress {
    fn plain(email: &str) -> Self {
        Self {
            email: email.to_string(),
            name: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendGridPersonalization {
    to: Vec<SendGridAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cc: Option<Vec<SendGridAddress>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<Vec<SendGridAddress>>,
}

#[derive(Debug, Serialize)]
struct SendGridContent {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct SendGridMailRequest {
    personalizations: Vec<SendGridPersonalization>,
    from: SendGridAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<SendGridAddress>,
    subject: String,
    content: Vec<SendGridContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<std::collections::HashMap<String, String>>,
}

impl SendGridMailRequest {
    fn from_request(email: &SendEmailRequest) -> Self {
        let addresses = |list: &Option<Vec<String>>| -> Option<Vec<SendGridAddress>> {
            list.as_ref()
                .filter(|l| !l.is_empty())
                .map(|l| l.iter().map(|a| SendGridAddress::plain(a)).collect())
        };

        // text/plain must precede text/html
        let mut content = Vec::new();
        if let Some(text) = &email.text {
            content.push(SendGridContent {
                content_type: "text/plain",
                value: text.clone(),
            });
        }
        if let Some(html) = &email.html {
            content.push(SendGridContent {
                content_type: "text/html",
                value: html.clone(),
            });
        }

        Self {
            personalizations: vec![SendGridPersonalization {
                to: email.to.iter().map(|a| SendGridAddress::plain(a)).collect(),
                cc: addresses(&email.cc),
                bcc: addresses(&email.bcc),
            }],
            from: SendGridAddress {
                email: email.from.clone(),
                name: email.from_name.clone(),
            },
            reply_to: email.reply_to.as_deref().map(SendGridAddress::plain),
            subject: email.subject.clone(),
            content,
            headers: email.headers.clone(),
        }
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    fn provider_type(&self) -> EmailProviderType {
        EmailProviderType::SendGrid
    }

    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, EmailError> {
        email.validate()?;
        debug!("Sending email via SendGrid from: {}", email.from);

        let response = self
            .client
            .post(self.api_url("/v3/mail/send"))
            .bearer_auth(&self.api_key)
            .json(&SendGridMailRequest::from_request(email))
            .send()
            .await
            .map_err(|e| {
                error!("SendGrid request failed: {}", e);
                EmailError::SendGrid(format!("Failed to send email: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            error!("Failed to send email via SendGrid ({}): {}", status, body);
            return Err(EmailError::SendGrid(format!(
                "Failed to send email ({}): {}",
                status, body
            )));
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| EmailError::SendGrid("No message ID returned".to_string()))?;

        debug!("Email sent successfully, message_id: {}", message_id);

        Ok(SendEmailResponse { message_id })
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

        if !API_KEY_RE.is_match(&self.api_key) {
            check.error("SendGrid API key must look like SG.<id>.<secret>");
        }

        let outcome = self
            .client
            .get(self.api_url("/v3/scopes"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map(|r| r.status());
        record_probe(&mut check, self.name(), outcome);

        check
    }
}
