//! Plain SMTP provider implementation

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use super::common::DOMAIN_RE;
use super::traits::{
    ConfigurationCheck, DomainVerificationResult, EmailProvider, EmailProviderType,
    SendEmailRequest, SendEmailResponse, VerifyDomainParams,
};
use crate::dns::DomainAuthVerifier;
use crate::errors::EmailError;

pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// No encryption
    None,
    /// Upgrade the plain connection with STARTTLS
    #[default]
    StartTls,
    /// Implicit TLS (SMTPS)
    Tls,
}

impl SmtpSecurity {
    pub fn parse(value: &str) -> Result<Self, EmailError> {
        match value.trim().to_lowercase().as_str() {
            "none" | "plain" | "" => Ok(SmtpSecurity::None),
            "starttls" | "start_tls" => Ok(SmtpSecurity::StartTls),
            "tls" | "ssl" | "smtps" => Ok(SmtpSecurity::Tls),
            other => Err(EmailError::Configuration(format!(
                "Unknown SMTP security mode '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpCredentials {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub security: SmtpSecurity,
}

pub struct SmtpProvider {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
    port: u16,
    security: SmtpSecurity,
    verifier: DomainAuthVerifier,
}

impl SmtpProvider {
    pub fn new(credentials: &SmtpCredentials, verifier: DomainAuthVerifier) -> Result<Self, EmailError> {
        for (field, value) in [
            ("host", &credentials.host),
            ("username", &credentials.username),
            ("password", &credentials.password),
        ] {
            if value.trim().is_empty() {
                return Err(EmailError::MissingCredential {
                    provider: "SMTP".into(),
                    field: field.into(),
                });
            }
        }

        let host = credentials.host.trim().to_string();
        let port = credentials.port.unwrap_or(match credentials.security {
            SmtpSecurity::Tls => 465,
            _ => DEFAULT_SMTP_PORT,
        });

        let builder = match credentials.security {
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host),
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                .map_err(|e| EmailError::Smtp(format!("Invalid STARTTLS relay {}: {}", host, e)))?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                .map_err(|e| EmailError::Smtp(format!("Invalid TLS relay {}: {}", host, e)))?,
        };

        let mailer = builder
            .port(port)
            .credentials(Credentials::new(
                credentials.username.clone(),
                credentials.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(30)))
            .build();

        Ok(Self {
            mailer,
            host,
            port,
            security: credentials.security,
            verifier,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn parse_mailbox(address: &str, name: Option<String>) -> Result<Mailbox, EmailError> {
        let parsed = address
            .parse::<lettre::Address>()
            .map_err(|e| EmailError::Validation(format!("Invalid address '{}': {}", address, e)))?;
        Ok(Mailbox::new(name, parsed))
    }

    /// Builds the MIME message and its Message-ID
    fn build_message(email: &SendEmailRequest) -> Result<(Message, String), EmailError> {
        let sender_domain = email.from.rsplit('@').next().unwrap_or("localhost");
        let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), sender_domain);

        let mut builder = Message::builder()
            .from(Self::parse_mailbox(&email.from, email.from_name.clone())?)
            .subject(email.subject.clone())
            .message_id(Some(message_id.clone()));

        for to in &email.to {
            builder = builder.to(Self::parse_mailbox(to, None)?);
        }
        for cc in email.cc.iter().flatten() {
            builder = builder.cc(Self::parse_mailbox(cc, None)?);
        }
        for bcc in email.bcc.iter().flatten() {
            builder = builder.bcc(Self::parse_mailbox(bcc, None)?);
        }
        if let Some(reply_to) = &email.reply_to {
            builder = builder.reply_to(Self::parse_mailbox(reply_to, None)?);
        }
        if email.headers.as_ref().is_some_and(|h| !h.is_empty()) {
            warn!("Custom headers are not supported over SMTP and were dropped");
        }

        let message = match (&email.text, &email.html) {
            (Some(text), Some(html)) => builder.multipart(MultiPart::alternative_plain_html(
                text.clone(),
                html.clone(),
            )),
            (None, Some(html)) => builder.singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html.clone()),
            ),
            (Some(text), None) => builder.singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(text.clone()),
            ),
            (None, None) => {
                return Err(EmailError::Validation(
                    "Either an HTML or a text body is required".into(),
                ))
            }
        }
        .map_err(|e| EmailError::Validation(format!("Failed to build message: {}", e)))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn provider_type(&self) -> EmailProviderType {
        EmailProviderType::Smtp
    }

    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, EmailError> {
        email.validate()?;
        debug!(
            "Sending email via SMTP {}:{} from: {}",
            self.host, self.port, email.from
        );

        let (message, message_id) = Self::build_message(email)?;

        self.mailer.send(message).await.map_err(|e| {
            error!("Failed to send email via SMTP {}: {}", self.host, e);
            EmailError::Smtp(format!("Failed to send email: {}", e))
        })?;

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

        let is_ip = self.host.parse::<std::net::IpAddr>().is_ok();
        if !is_ip && self.host != "localhost" && !DOMAIN_RE.is_match(&self.host) {
            check.error(format!("'{}' is not a valid SMTP host", self.host));
        }
        if self.security == SmtpSecurity::None {
            check.warning("SMTP connection is not encrypted");
        }

        match self.mailer.test_connection().await {
            Ok(true) => {}
            Ok(false) => check.warning(format!(
                "SMTP server {}:{} did not accept the connection",
                self.host, self.port
            )),
            Err(e) => check.warning(format!(
                "Could not connect to {}:{}: {}",
                self.host, self.port, e
            )),
        }

        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::StaticTxtResolver;
    use std::sync::Arc;

    fn credentials(security: SmtpSecurity, port: Option<u16>) -> SmtpCredentials {
        SmtpCredentials {
            host: "127.0.0.1".into(),
            port,
            username: "mailer".into(),
            password: "secret".into(),
            security,
        }
    }

    fn verifier() -> DomainAuthVerifier {
        DomainAuthVerifier::new(Arc::new(StaticTxtResolver::new()))
    }

    #[test]
    fn test_security_parsing() {
        assert_eq!(SmtpSecurity::parse("STARTTLS").unwrap(), SmtpSecurity::StartTls);
        assert_eq!(SmtpSecurity::parse("ssl").unwrap(), SmtpSecurity::Tls);
        assert_eq!(SmtpSecurity::parse("none").unwrap(), SmtpSecurity::None);
        assert!(SmtpSecurity::parse("rot13").is_err());
    }

    // Building the transport starts its connection pool on the runtime
    #[tokio::test]
    async fn test_default_ports() {
        let starttls = SmtpProvider::new(&credentials(SmtpSecurity::StartTls, None), verifier());
        assert_eq!(starttls.unwrap().port(), 587);
        let tls = SmtpProvider::new(&credentials(SmtpSecurity::Tls, None), verifier());
        assert_eq!(tls.unwrap().port(), 465);
        let custom = SmtpProvider::new(&credentials(SmtpSecurity::None, Some(2525)), verifier());
        assert_eq!(custom.unwrap().port(), 2525);
    }

    #[test]
    fn test_missing_password() {
        let mut creds = credentials(SmtpSecurity::StartTls, None);
        creds.password = String::new();
        let err = SmtpProvider::new(&creds, verifier()).err().unwrap();
        assert_eq!(err.to_string(), "SMTP requires the 'password' credential");
    }

    #[test]
    fn test_build_message_with_both_bodies() {
        let email = SendEmailRequest {
            from: "news@example.com".into(),
            from_name: Some("Example".into()),
            to: vec!["a@example.org".into()],
            reply_to: Some("reply@example.com".into()),
            subject: "Weekly".into(),
            text: Some("plain body".into()),
            html: Some("<p>html body</p>".into()),
            ..Default::default()
        };

        let (message, message_id) = SmtpProvider::build_message(&email).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(message_id.ends_with("@example.com>"));
        assert!(raw.contains("Subject: Weekly"));
        assert!(raw.contains("Reply-To: reply@example.com"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains(&message_id));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let email = SendEmailRequest {
            from: "news@example.com".into(),
            to: vec!["not an address".into()],
            subject: "Weekly".into(),
            text: Some("body".into()),
            ..Default::default()
        };
        assert!(matches!(
            SmtpProvider::build_message(&email),
            Err(EmailError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_warning() {
        // Nothing listens on port 1
        let provider =
            SmtpProvider::new(&credentials(SmtpSecurity::None, Some(1)), verifier()).unwrap();
        let check = provider.check_configuration().await;
        assert!(check.valid, "{:?}", check.errors);
        assert!(check
            .warnings
            .iter()
            .any(|w| w.contains("Could not connect") || w.contains("did not accept")));
    }
}
