//! SendClean provider implementation

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use super::common::{error_body, record_probe, trim_base_url};
use super::traits::{
    ConfigurationCheck, DomainVerificationResult, EmailProvider, EmailProviderType,
    SendEmailRequest, SendEmailResponse, VerifyDomainParams,
};
use crate::dns::DomainAuthVerifier;
use crate::errors::EmailError;

static OWNER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{4,64}$").expect("owner id regex is valid"));
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{16,128}$").expect("token regex is valid"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCleanCredentials {
    pub owner_id: String,
    pub token: String,
}

pub struct SendCleanProvider {
    client: Client,
    owner_id: String,
    token: String,
    base_url: String,
    verifier: DomainAuthVerifier,
}

#[derive(Debug, Serialize)]
struct SendCleanRecipient<'a> {
    email: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct SendCleanMessage<'a> {
    subject: &'a str,
    from_email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from_name: Option<&'a str>,
    to: Vec<SendCleanRecipient<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    headers: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct SendCleanRequest<'a, T: Serialize> {
    owner_id: &'a str,
    token: &'a str,
    #[serde(flatten)]
    payload: T,
}

#[derive(Debug, Serialize)]
struct SendMailPayload<'a> {
    message: SendCleanMessage<'a>,
}

impl SendCleanProvider {
    const BASE_URL: &'static str = "https://api.sendclean.net/v1.0";

    pub fn new(
        credentials: &SendCleanCredentials,
        verifier: DomainAuthVerifier,
    ) -> Result<Self, EmailError> {
        for (field, value) in [("owner_id", &credentials.owner_id), ("token", &credentials.token)] {
            if value.trim().is_empty() {
                return Err(EmailError::MissingCredential {
                    provider: "SendClean".into(),
                    field: field.into(),
                });
            }
        }

        Ok(Self {
            client: Client::new(),
            owner_id: credentials.owner_id.trim().to_string(),
            token: credentials.token.trim().to_string(),
            base_url: Self::BASE_URL.to_string(),
            verifier,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base_url(base_url);
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn message<'a>(email: &'a SendEmailRequest) -> SendCleanMessage<'a> {
        let mut to: Vec<_> = email
            .to
            .iter()
            .map(|a| SendCleanRecipient { email: a, kind: "to" })
            .collect();
        to.extend(email.cc.iter().flatten().map(|a| SendCleanRecipient { email: a, kind: "cc" }));
        to.extend(
            email
                .bcc
                .iter()
                .flatten()
                .map(|a| SendCleanRecipient { email: a, kind: "bcc" }),
        );

        let mut headers: serde_json::Map<String, Value> = email
            .headers
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        if let Some(reply_to) = &email.reply_to {
            headers.insert("Reply-To".into(), Value::String(reply_to.clone()));
        }

        SendCleanMessage {
            subject: &email.subject,
            from_email: &email.from,
            from_name: email.from_name.as_deref(),
            to,
            html: email.html.as_deref(),
            text: email.text.as_deref(),
            headers,
        }
    }
}

/// Finds the message id in the shapes SendClean answers with
fn extract_message_id(body: &Value) -> Option<String> {
    let candidates = [body, &body["data"], &body[0], &body["data"][0]];
    candidates.iter().find_map(|v| {
        ["message_id", "_id", "id"]
            .iter()
            .find_map(|key| v.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    })
}

#[async_trait]
impl EmailProvider for SendCleanProvider {
    fn provider_type(&self) -> EmailProviderType {
        EmailProviderType::SendClean
    }

    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, EmailError> {
        email.validate()?;
        debug!("Sending email via SendClean from: {}", email.from);

        let request = SendCleanRequest {
            owner_id: &self.owner_id,
            token: &self.token,
            payload: SendMailPayload {
                message: Self::message(email),
            },
        };

        let response = self
            .client
            .post(self.api_url("/messages/sendMail"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("SendClean request failed: {}", e);
                EmailError::SendClean(format!("Failed to send email: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            error!("Failed to send email via SendClean ({}): {}", status, body);
            return Err(EmailError::SendClean(format!(
                "Failed to send email ({}): {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EmailError::SendClean(format!("Failed to parse send response: {}", e)))?;

        // Errors can come back with a 200 status
        if body["status"].as_str() == Some("error") {
            let message = body["message"].as_str().unwrap_or("unknown error").to_string();
            error!("SendClean rejected the email: {}", message);
            return Err(EmailError::SendClean(message));
        }

        let message_id = extract_message_id(&body)
            .ok_or_else(|| EmailError::SendClean("No message ID returned".to_string()))?;

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

        if !OWNER_ID_RE.is_match(&self.owner_id) {
            check.error("SendClean owner id contains invalid characters");
        }
        if !TOKEN_RE.is_match(&self.token) {
            check.error("SendClean token must be 16 to 128 letters, digits, '-' or '_'");
        }

        let outcome = self
            .client
            .post(self.api_url("/users/ping"))
            .json(&serde_json::json!({"owner_id": self.owner_id, "token": self.token}))
            .send()
            .await
            .map(|r| r.status());
        record_probe(&mut check, self.name(), outcome);

        check
    }
}
