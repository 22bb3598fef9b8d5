//! Email services

mod domain_service;
mod provider_service;

pub use domain_service::{CreateDomainRequest, DnsRecord, DomainService, UpdateDomainRequest};
pub use provider_service::{
    CreateProviderRequest, ProviderService, TestEmailRequest, TestEmailResult,
};
