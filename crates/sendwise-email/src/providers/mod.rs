//! Email provider abstractions and implementations

pub(crate) mod common;
mod factory;
mod mailgun;
mod sendclean;
mod sendgrid;
mod sendpulse;
mod ses;
mod smtp;
mod traits;

#[cfg(test)]
pub mod mock;

pub use factory::{EmailProviderFactory, ProviderConfig};
pub use mailgun::{MailgunCredentials, MailgunProvider};
pub use sendclean::{SendCleanCredentials, SendCleanProvider};
pub use sendgrid::{SendGridCredentials, SendGridProvider};
pub use sendpulse::{SendPulseCredentials, SendPulseProvider};
pub use ses::{SesCredentials, SesProvider, DEFAULT_SES_REGION};
pub use smtp::{SmtpCredentials, SmtpProvider, SmtpSecurity, DEFAULT_SMTP_PORT};
pub use traits::*;

#[cfg(test)]
pub use mock::MockEmailProvider;
