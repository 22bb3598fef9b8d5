//! Mock email provider for testing

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::EmailError;
use crate::providers::{
    ConfigurationCheck, DomainVerificationResult, EmailProvider, EmailProviderType,
    SendEmailRequest, SendEmailResponse, VerifyDomainParams,
};

#[derive(Debug, Clone, Default)]
pub struct MockEmailProvider {
    pub send_count: Arc<AtomicUsize>,
    /// Recipients whose sends fail
    pub failing_recipients: HashSet<String>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, recipient: &str) -> Self {
        self.failing_recipients.insert(recipient.to_string());
        self
    }

    pub fn send_call_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    fn provider_type(&self) -> EmailProviderType {
        EmailProviderType::Smtp
    }

    async fn send(&self, email: &SendEmailRequest) -> Result<SendEmailResponse, EmailError> {
        let n = self.send_count.fetch_add(1, Ordering::SeqCst);
        email.validate()?;

        if email.to.iter().any(|to| self.failing_recipients.contains(to)) {
            return Err(EmailError::Smtp("Mock send failure".to_string()));
        }

        Ok(SendEmailResponse {
            message_id: format!("mock-message-{}", n + 1),
        })
    }

    async fn verify_domain_authentication(
        &self,
        params: &VerifyDomainParams,
    ) -> DomainVerificationResult {
        DomainVerificationResult {
            domain: params.domain.clone(),
            ..Default::default()
        }
    }

    async fn check_configuration(&self) -> ConfigurationCheck {
        ConfigurationCheck::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> SendEmailRequest {
        SendEmailRequest {
            from: "sender@example.com".to_string(),
            to: vec![to.to_string()],
            subject: "Test".to_string(),
            html: Some("<p>Test</p>".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_send_bulk_keeps_input_order() {
        let provider = MockEmailProvider::new().failing_for("b@example.com");

        let results = provider
            .send_bulk(&[email("a@example.com"), email("b@example.com"), email("c@example.com")])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().message_id, "mock-message-1");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().message_id, "mock-message-3");
        assert_eq!(provider.send_call_count(), 3);
    }

    #[tokio::test]
    async fn test_send_bulk_does_not_stop_on_invalid_message() {
        let provider = MockEmailProvider::new();
        let mut invalid = email("a@example.com");
        invalid.subject = String::new();

        let results = provider.send_bulk(&[invalid, email("b@example.com")]).await;

        assert!(matches!(results[0], Err(EmailError::Validation(_))));
        assert!(results[1].is_ok());
    }

    #[test]
    fn test_mock_name() {
        assert_eq!(MockEmailProvider::new().name(), "SMTP");
    }
}
