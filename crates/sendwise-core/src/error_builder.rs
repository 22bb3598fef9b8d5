//! Problem responses for the failure kinds the API reports

use crate::problemdetails::{self, Problem};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

const PROBLEM_BASE: &str = "https://sendwise.dev/probs";

/// Every failure the HTTP layer can report, with its fixed response members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    BadRequest,
    NotFound,
    Conflict,
    /// An upstream email provider rejected or failed the request
    Provider,
    Internal,
}

impl ProblemKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Provider => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// URL and instance path segment
    fn slug(self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::Provider => "provider-error",
            Self::Internal => "internal-server-error",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Provider => "PROVIDER_ERROR",
            Self::Internal => "INTERNAL_SERVER_ERROR",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Resource Not Found",
            Self::Conflict => "Conflict",
            Self::Provider => "Email Provider Error",
            Self::Internal => "Internal Server Error",
        }
    }

    fn fallback_detail(self) -> Option<&'static str> {
        match self {
            Self::BadRequest => Some("The request was malformed or invalid"),
            Self::Conflict => {
                Some("The request conflicts with the current state of the resource")
            }
            Self::Internal => Some("An unexpected error occurred while processing your request"),
            Self::NotFound | Self::Provider => None,
        }
    }
}

/// A problem of a known kind, plus whatever the failing call site adds
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    kind: ProblemKind,
    detail: Option<String>,
    extensions: Map<String, Value>,
}

impl ErrorBuilder {
    pub fn new(kind: ProblemKind) -> Self {
        Self {
            kind,
            detail: None,
            extensions: Map::new(),
        }
    }

    pub fn kind(&self) -> ProblemKind {
        self.kind
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Extra member on the response body; values that fail to serialize are dropped
    pub fn extension<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.extensions.insert(key.to_string(), value);
        }
        self
    }

    pub fn build(self) -> Problem {
        let kind = self.kind;
        let detail = self
            .detail
            .or_else(|| kind.fallback_detail().map(str::to_string));

        let mut problem = problemdetails::new(kind.status())
            .with_type(format!("{}/{}", PROBLEM_BASE, kind.slug()))
            .with_title(kind.title())
            .with_instance(format!("/error/{}", kind.slug()))
            .with_value("error_code", kind.code())
            .with_value("timestamp", chrono::Utc::now().to_rfc3339());
        if let Some(detail) = detail {
            problem = problem.with_detail(detail);
        }

        // Call-site members never replace the standard ones
        for (key, value) in self.extensions {
            problem.body.entry(key).or_insert(value);
        }
        problem
    }
}

impl From<ErrorBuilder> for Problem {
    fn from(builder: ErrorBuilder) -> Self {
        builder.build()
    }
}

pub fn internal_server_error() -> ErrorBuilder {
    ErrorBuilder::new(ProblemKind::Internal)
}

pub fn not_found() -> ErrorBuilder {
    ErrorBuilder::new(ProblemKind::NotFound)
}

pub fn bad_request() -> ErrorBuilder {
    ErrorBuilder::new(ProblemKind::BadRequest)
}

pub fn conflict() -> ErrorBuilder {
    ErrorBuilder::new(ProblemKind::Conflict)
}

pub fn bad_gateway() -> ErrorBuilder {
    ErrorBuilder::new(ProblemKind::Provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_builder() {
        let problem = not_found().detail("Domain 7 not found").build();

        assert_eq!(problem.status_code, StatusCode::NOT_FOUND);
        assert_eq!(problem.body["detail"], "Domain 7 not found");
        assert_eq!(problem.body["error_code"], "NOT_FOUND");
        assert_eq!(problem.body["type"], "https://sendwise.dev/probs/not-found");
        assert_eq!(problem.body["instance"], "/error/not-found");
        assert!(problem.body.contains_key("timestamp"));
    }

    #[test]
    fn test_detail_falls_back_per_kind() {
        let problem = conflict().build();
        assert_eq!(
            problem.body["detail"],
            "The request conflicts with the current state of the resource"
        );

        let problem = bad_gateway().build();
        assert_eq!(problem.status_code, StatusCode::BAD_GATEWAY);
        assert_eq!(problem.body["error_code"], "PROVIDER_ERROR");
        assert!(!problem.body.contains_key("detail"));
    }

    #[test]
    fn test_extensions_cannot_override_standard_members() {
        let problem: Problem = bad_request()
            .detail("Missing field")
            .extension("field", "api_key")
            .extension("error_code", "SOMETHING_ELSE")
            .into();

        assert_eq!(problem.status_code, StatusCode::BAD_REQUEST);
        assert_eq!(problem.body["field"], "api_key");
        assert_eq!(problem.body["error_code"], "BAD_REQUEST");
    }

    #[test]
    fn test_every_kind_maps_to_its_status() {
        for (kind, status) in [
            (ProblemKind::BadRequest, StatusCode::BAD_REQUEST),
            (ProblemKind::NotFound, StatusCode::NOT_FOUND),
            (ProblemKind::Conflict, StatusCode::CONFLICT),
            (ProblemKind::Provider, StatusCode::BAD_GATEWAY),
            (ProblemKind::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            let builder = ErrorBuilder::new(kind);
            assert_eq!(builder.kind(), kind);
            assert_eq!(builder.build().status_code, status);
        }
    }
}
