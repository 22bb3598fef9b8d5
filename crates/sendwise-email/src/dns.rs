//! DNS lookups behind domain authentication checks

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::providers::{
    AuthenticationRequirements, DnsRecordStatus, DomainVerificationResult, VerifyDomainParams,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxtLookupError {
    /// The name exists but has no TXT records, or does not exist at all
    NotFound,
    Failed(String),
}

/// Source of TXT records
#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// All TXT records at `name`, each with its character strings joined
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, TxtLookupError>;
}

/// Resolver backed by Cloudflare's public DNS servers
pub struct HickoryTxtResolver {
    resolver: TokioAsyncResolver,
}

impl Default for HickoryTxtResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HickoryTxtResolver {
    pub fn new() -> Self {
        let mut options = ResolverOpts::default();
        options.try_tcp_on_error = true;
        options.use_hosts_file = false;

        let resolver = TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), options);

        Self { resolver }
    }
}

#[async_trait]
impl TxtResolver for HickoryTxtResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, TxtLookupError> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|record| {
                    record
                        .txt_data()
                        .iter()
                        .map(|data| String::from_utf8_lossy(data).to_string())
                        .collect::<String>()
                })
                .collect()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Err(TxtLookupError::NotFound),
                _ => Err(TxtLookupError::Failed(e.to_string())),
            },
        }
    }
}

/// Fixed set of TXT records, for tests and offline setups
#[derive(Debug, Clone, Default)]
pub struct StaticTxtResolver {
    records: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
}

impl StaticTxtResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, name: &str, value: &str) -> Self {
        self.records
            .entry(normalize_name(name))
            .or_default()
            .push(value.to_string());
        self
    }

    /// Lookups of `name` fail with a server error
    pub fn with_failure(mut self, name: &str) -> Self {
        self.failing.insert(normalize_name(name));
        self
    }
}

#[async_trait]
impl TxtResolver for StaticTxtResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Vec<String>, TxtLookupError> {
        let name = normalize_name(name);
        if self.failing.contains(&name) {
            return Err(TxtLookupError::Failed(format!("SERVFAIL for {}", name)));
        }
        match self.records.get(&name) {
            Some(records) if !records.is_empty() => Ok(records.clone()),
            _ => Err(TxtLookupError::NotFound),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_lowercase()
}

/// Result of checking one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCheck {
    pub status: DnsRecordStatus,
    pub details: Option<String>,
    pub error: Option<String>,
}

impl RecordCheck {
    fn verified(record: &str) -> Self {
        Self {
            status: DnsRecordStatus::Verified,
            details: Some(record.to_string()),
            error: None,
        }
    }

    fn mismatch(details: String) -> Self {
        Self {
            status: DnsRecordStatus::Failed,
            details: Some(details),
            error: None,
        }
    }

    fn lookup_error(kind: &str, name: &str, err: TxtLookupError) -> Self {
        match err {
            TxtLookupError::NotFound => Self {
                status: DnsRecordStatus::Pending,
                details: None,
                error: Some(format!("No {} record found at {}", kind, name)),
            },
            TxtLookupError::Failed(reason) => Self {
                status: DnsRecordStatus::Unknown,
                details: None,
                error: Some(format!("{} lookup for {} failed: {}", kind, name, reason)),
            },
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == DnsRecordStatus::Verified
    }
}

/// Checks DKIM, SPF and DMARC records of a sending domain
#[derive(Clone)]
pub struct DomainAuthVerifier {
    resolver: Arc<dyn TxtResolver>,
}

impl DomainAuthVerifier {
    pub fn new(resolver: Arc<dyn TxtResolver>) -> Self {
        Self { resolver }
    }

    pub async fn verify(
        &self,
        params: &VerifyDomainParams,
        requirements: &AuthenticationRequirements,
    ) -> DomainVerificationResult {
        let domain = normalize_name(&params.domain);
        debug!("Verifying authentication records for {}", domain);

        let selector = non_empty(&params.dkim_selector)
            .map(str::to_string)
            .or_else(|| requirements.default_dkim_selector.clone());
        let spf_expected = non_empty(&params.spf_value)
            .map(str::to_string)
            .or_else(|| requirements.spf_include.clone());

        let dkim = match selector {
            Some(selector) => {
                self.check_dkim(&domain, &selector, non_empty(&params.dkim_value))
                    .await
            }
            None => RecordCheck {
                status: DnsRecordStatus::Failed,
                details: None,
                error: Some(format!("DKIM selector is required to verify {}", domain)),
            },
        };
        let spf = self.check_spf(&domain, spf_expected.as_deref()).await;
        let dmarc = self
            .check_dmarc(&domain, non_empty(&params.dmarc_value))
            .await;

        let errors = [&dkim, &spf, &dmarc]
            .iter()
            .filter_map(|check| check.error.clone())
            .collect();

        DomainVerificationResult {
            domain,
            dkim_verified: dkim.is_verified(),
            spf_verified: spf.is_verified(),
            dmarc_verified: dmarc.is_verified(),
            dkim_details: dkim.details,
            spf_details: spf.details,
            dmarc_details: dmarc.details,
            errors,
        }
    }

    pub async fn check_dkim(
        &self,
        domain: &str,
        selector: &str,
        expected: Option<&str>,
    ) -> RecordCheck {
        let name = format!("{}._domainkey.{}", selector, domain);
        let records = match self.resolver.lookup_txt(&name).await {
            Ok(records) => records,
            Err(e) => return RecordCheck::lookup_error("DKIM", &name, e),
        };

        let found = records.iter().find(|record| match expected {
            Some(value) => strip_whitespace(record).contains(&strip_whitespace(value)),
            None => {
                starts_with_ignore_case(record.trim_start(), "v=DKIM1")
                    || strip_whitespace(record).contains("p=")
            }
        });

        match found {
            Some(record) => RecordCheck::verified(record),
            None => RecordCheck::mismatch(format!(
                "DKIM record at {} does not match the expected key",
                name
            )),
        }
    }

    pub async fn check_spf(&self, domain: &str, expected: Option<&str>) -> RecordCheck {
        let records = match self.resolver.lookup_txt(domain).await {
            Ok(records) => records,
            Err(e) => return RecordCheck::lookup_error("SPF", domain, e),
        };

        let Some(record) = records
            .iter()
            .find(|r| starts_with_ignore_case(r.trim_start(), "v=spf1"))
        else {
            return RecordCheck::lookup_error("SPF", domain, TxtLookupError::NotFound);
        };

        match expected {
            Some(expected) if !spf_matches(record, expected) => RecordCheck::mismatch(format!(
                "SPF record '{}' is missing '{}'",
                record, expected
            )),
            _ => RecordCheck::verified(record),
        }
    }

    pub async fn check_dmarc(&self, domain: &str, expected: Option<&str>) -> RecordCheck {
        let name = format!("_dmarc.{}", domain);
        let records = match self.resolver.lookup_txt(&name).await {
            Ok(records) => records,
            Err(e) => return RecordCheck::lookup_error("DMARC", &name, e),
        };

        let Some(record) = records
            .iter()
            .find(|r| starts_with_ignore_case(r.trim_start(), "v=DMARC1"))
        else {
            return RecordCheck::lookup_error("DMARC", &name, TxtLookupError::NotFound);
        };

        match expected {
            Some(expected) if !dmarc_matches(record, expected) => RecordCheck::mismatch(
                format!("DMARC record '{}' does not match '{}'", record, expected),
            ),
            _ => RecordCheck::verified(record),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Every mechanism of `expected` other than the version and the `all` term is in `record`
fn spf_matches(record: &str, expected: &str) -> bool {
    let record_terms: Vec<&str> = record.split_whitespace().collect();
    expected
        .split_whitespace()
        .filter(|term| !term.eq_ignore_ascii_case("v=spf1"))
        .filter(|term| {
            !term
                .trim_start_matches(['+', '-', '~', '?'])
                .eq_ignore_ascii_case("all")
        })
        .all(|term| record_terms.iter().any(|r| r.eq_ignore_ascii_case(term)))
}

fn dmarc_tags(value: &str) -> HashMap<String, String> {
    value
        .split(';')
        .filter_map(|tag| {
            let (key, val) = tag.split_once('=')?;
            Some((key.trim().to_lowercase(), val.trim().to_lowercase()))
        })
        .collect()
}

/// Every tag of `expected` appears in `record` with the same value
fn dmarc_matches(record: &str, expected: &str) -> bool {
    let record_tags = dmarc_tags(record);
    dmarc_tags(expected)
        .iter()
        .all(|(key, val)| record_tags.get(key) == Some(val))
}
