//! Helpers shared by the HTTP providers

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Response, StatusCode};

use super::traits::ConfigurationCheck;

pub(crate) static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .expect("domain regex is valid")
});

/// Body of a failed response, for error messages
pub(crate) async fn error_body(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

/// Folds the outcome of a connectivity probe into `check`
pub(crate) fn record_probe(
    check: &mut ConfigurationCheck,
    provider: &str,
    outcome: Result<StatusCode, reqwest::Error>,
) {
    match outcome {
        Ok(status) if status.is_success() => {}
        Ok(status) if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
            check.error(format!("{} rejected the credentials ({})", provider, status));
        }
        Ok(status) => {
            check.warning(format!(
                "{} answered the connectivity probe with {}",
                provider, status
            ));
        }
        Err(e) => check.warning(format!("Could not reach {}: {}", provider, e)),
    }
}

pub(crate) fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
