//! Email providers, sending domains and provider configuration for Sendwise
//!
//! Providers:
//! - SendGrid, Mailgun, SendClean, SendPulse (HTTP APIs)
//! - Amazon SES (AWS SDK)
//! - Plain SMTP
//!
//! Features:
//! - Domain management with DKIM/SPF/DMARC verification over DNS
//! - Provider credential encryption

pub mod dns;
pub mod errors;
pub mod handlers;
pub mod providers;
pub mod services;

pub use errors::EmailError;
pub use providers::{EmailProvider, EmailProviderFactory, EmailProviderType, ProviderConfig};
pub use services::{DomainService, ProviderService};
