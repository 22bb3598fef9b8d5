//! SendPulse SMTP API provider implementation
//!
//! SendPulse authenticates with OAuth2 client credentials. The access token is
//! cached until shortly before it expires.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::common::{error_body, trim_base_url};
use super::traits::{
    ConfigurationCheck, DomainVerificationResult, EmailProvider, EmailProviderType,
    SendEmailRequest, SendEmailResponse, VerifyDomainParams,
};
use crate::dns::DomainAuthVerifier;
use crate::errors::EmailError;

static CLIENT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{16,64}$").expect("client id regex is valid"));

/// Refresh this long before the token expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Used when the advertised lifetime does not fit in an `Instant`
const FALLBACK_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

fn token_expiry(now: Instant, expires_in: u64) -> Instant {
    now.checked_add(Duration::from_secs(expires_in))
        .unwrap_or(now + FALLBACK_TOKEN_LIFETIME)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPulseCredentials {
    pub user_id: String,
    pub secret: String,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct SendPulseProvider {
    client: Client,
    user_id: String,
    secret: String,
    base_url: String,
    token: Mutex<Option<CachedToken>>,
    verifier: DomainAuthVerifier,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
struct SendPulseAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SendPulseEmail<'a> {
    subject: &'a str,
    from: SendPulseAddress<'a>,
    to: Vec<SendPulseAddress<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cc: Option<Vec<SendPulseAddress<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<Vec<SendPulseAddress<'a>>>,
    /// Base64 encoded
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SendPulseSendResponse {
    #[serde(default)]
    result: bool,
    id: Option<String>,
    message: Option<String>,
}

impl SendPulseProvider {
    const BASE_URL: &'static str = "https://api.sendpulse.com";

    pub fn new(
        credentials: &SendPulseCredentials,
        verifier: DomainAuthVerifier,
    ) -> Result<Self, EmailError> {
        for (field, value) in [("user_id", &credentials.user_id), ("secret", &credentials.secret)] {
            if value.trim().is_empty() {
                return Err(EmailError::MissingCredential {
                    provider: "SendPulse".into(),
                    field: field.into(),
                });
            }
        }

        Ok(Self {
            client: Client::new(),
            user_id: credentials.user_id.trim().to_string(),
            secret: credentials.secret.trim().to_string(),
            base_url: Self::BASE_URL.to_string(),
            token: Mutex::new(None),
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

    fn token_request(&self) -> reqwest::RequestBuilder {
        self.client
            .post(self.api_url("/oauth/access_token"))
            .json(&serde_json::json!({
                "grant_type": "client_credentials",
                "client_id": self.user_id,
                "client_secret": self.secret,
            }))
    }

    async fn fetch_token(&self) -> Result<TokenResponse, EmailError> {
        let response = self
            .token_request()
            .send()
            .await
            .map_err(|e| EmailError::SendPulse(format!("Failed to request access token: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            return Err(EmailError::SendPulse(format!(
                "Failed to obtain access token ({}): {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| EmailError::SendPulse(format!("Failed to parse token response: {}", e)))
    }

    /// Cached token, refreshed when missing or about to expire
    async fn access_token(&self) -> Result<String, EmailError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_EXPIRY_MARGIN < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting new SendPulse access token");
        let fresh = self.fetch_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(CachedToken {
            access_token: fresh.access_token,
            expires_at: token_expiry(Instant::now(), fresh.expires_in),
        });
        Ok(access_token)
    }

    fn payload<'a>(email: &'a SendEmailRequest) -> SendPulseEmail<'a> {
        let addresses = |list: &'a Option<Vec<String>>| -> Option<Vec<SendPulseAddress<'a>>> {
            list.as_ref().filter(|l| !l.is_empty()).map(|l| {
                l.iter()
                    .map(|a| SendPulseAddress { email: a, name: None })
                    .collect()
            })
        };

        SendPulseEmail {
            subject: &email.subject,
            from: SendPulseAddress {
                email: &email.from,
                name: email.from_name.as_deref(),
            },
            to: email
                .to
                .iter()
                .map(|a| SendPulseAddress { email: a, name: None })
                .collect(),
            cc: addresses(&email.cc),
            bcc: addresses(&email.bcc),
            html: email.html.as_ref().map(|h| BASE64.encode(h)),
            text: email.text.as_deref(),
        }
    }
}

#[async_trait]
impl EmailProvider for SendPulseProvider {
    fn provider_type(&self) -> EmailProviderType {
        EmailProviderType::SendPulse
    }

    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, EmailError> {
        email.validate()?;
        debug!("Sending email via SendPulse from: {}", email.from);

        let token = self.access_token().await.map_err(|e| {
            error!("SendPulse authentication failed: {}", e);
            e
        })?;

        let response = self
            .client
            .post(self.api_url("/smtp/emails"))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "email": Self::payload(email) }))
            .send()
            .await
            .map_err(|e| {
                error!("SendPulse request failed: {}", e);
                EmailError::SendPulse(format!("Failed to send email: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = error_body(response).await;
            error!("Failed to send email via SendPulse ({}): {}", status, body);
            return Err(EmailError::SendPulse(format!(
                "Failed to send email ({}): {}",
                status, body
            )));
        }

        let sent: SendPulseSendResponse = response
            .json()
            .await
            .map_err(|e| EmailError::SendPulse(format!("Failed to parse send response: {}", e)))?;

        if !sent.result {
            let message = sent.message.unwrap_or_else(|| "email was not accepted".to_string());
            error!("SendPulse rejected the email: {}", message);
            return Err(EmailError::SendPulse(message));
        }

        let message_id = sent
            .id
            .ok_or_else(|| EmailError::SendPulse("No message ID returned".to_string()))?;

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

        if !CLIENT_ID_RE.is_match(&self.user_id) {
            check.error("SendPulse user id must be 16 to 64 letters or digits");
        }
        if !CLIENT_ID_RE.is_match(&self.secret) {
            check.error("SendPulse secret must be 16 to 64 letters or digits");
        }

        // The token request doubles as the connectivity probe
        match self.token_request().send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) if response.status().is_client_error() => {
                let status = response.status();
                let body = error_body(response).await;
                check.error(format!(
                    "SendPulse rejected the credentials ({}): {}",
                    status, body
                ));
            }
            Ok(response) => check.warning(format!(
                "SendPulse answered the token request with {}",
                response.status()
            )),
            Err(e) => check.warning(format!("Could not reach SendPulse: {}", e)),
        }

        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::StaticTxtResolver;
    use std::sync::Arc;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn provider(server: &MockServer) -> SendPulseProvider {
        SendPulseProvider::new(
            &SendPulseCredentials {
                user_id: "0123456789abcdef0123456789abcdef".into(),
                secret: "fedcba9876543210fedcba9876543210".into(),
            },
            DomainAuthVerifier::new(Arc::new(StaticTxtResolver::new())),
        )
        .unwrap()
        .with_base_url(&server.uri())
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .and(body_partial_json(serde_json::json!({"grant_type": "client_credentials"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[test]
    fn test_token_expiry_survives_huge_lifetimes() {
        let now = Instant::now();
        assert_eq!(token_expiry(now, 3600), now + Duration::from_secs(3600));
        assert_eq!(token_expiry(now, u64::MAX), now + FALLBACK_TOKEN_LIFETIME);
    }

    #[tokio::test]
    async fn test_send_with_unbounded_token_lifetime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-forever",
                "expires_in": u64::MAX
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/smtp/emails"))
            .and(header("Authorization", "Bearer tok-forever"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"result": true, "id": "sp-9"})),
            )
            .mount(&server)
            .await;

        let response = provider(&server).send(&email()).await.unwrap();
        assert_eq!(response.message_id, "sp-9");
    }

    fn email() -> SendEmailRequest {
        SendEmailRequest {
            from: "news@example.com".into(),
            to: vec!["a@example.org".into()],
            subject: "Hello".into(),
            html: Some("<b>Hi</b>".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_token_is_cached_between_sends() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/smtp/emails"))
            .and(header("Authorization", "Bearer tok-1"))
            .and(body_partial_json(serde_json::json!({
                "email": {"html": BASE64.encode("<b>Hi</b>"), "subject": "Hello"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"result": true, "id": "sp-1"})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let results = provider.send_bulk(&[email(), email()]).await;
        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(result.unwrap().message_id, "sp-1");
        }
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let err = provider.send(&email()).await.unwrap_err();
        assert!(err.to_string().contains("invalid_client"));

        let check = provider.check_configuration().await;
        assert!(!check.valid);
        assert!(check.errors[0].contains("rejected"));
    }

    #[tokio::test]
    async fn test_result_false_is_an_error() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/smtp/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"result": false, "message": "Sender is not activated"}),
            ))
            .mount(&server)
            .await;

        let err = provider(&server).send(&email()).await.unwrap_err();
        assert!(matches!(err, EmailError::SendPulse(ref m) if m == "Sender is not activated"));
    }
}
