//! Code Registry: mints and validates structured job codes.
//!
//! A job code is `{companyPrefix}-{natureCode}{runningNumber}`. Running
//! numbers come from one counter document per (prefix, nature) pair, mutated
//! exclusively through the store's atomic increment primitive — never
//! read-modify-written — so concurrent callers can never double-issue.

use std::fmt;
use std::sync::Arc;
use tracing::instrument;

use crate::directory::CompanyDirectory;
use crate::errors::ServiceError;
use crate::models::JobNature;
use crate::store::{collections, DocumentStore};

pub const COUNTER_FIELD: &str = "next";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeParts {
    pub company_prefix: String,
    pub job_nature: JobNature,
    pub running_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeViolation {
    Malformed(String),
    UnknownPrefix(String),
    UnknownNature(String),
    NonPositiveRunningNumber,
}

impl fmt::Display for CodeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeViolation::Malformed(detail) => write!(f, "malformed code: {detail}"),
            CodeViolation::UnknownPrefix(prefix) => {
                write!(f, "company prefix '{prefix}' is not in the directory")
            }
            CodeViolation::UnknownNature(rest) => {
                write!(f, "no known job nature code at '{rest}'")
            }
            CodeViolation::NonPositiveRunningNumber => {
                write!(f, "running number must be a positive integer")
            }
        }
    }
}

pub fn format_code(prefix: &str, nature: JobNature, running_number: u32) -> String {
    format!("{prefix}-{}{running_number}", nature.code())
}

/// Lexes the fixed grammar `<prefix>-<nature><digits>`. Nature codes are
/// matched longest-first so `SW1` never parses as nature `S`, number-less.
pub fn parse_code(code: &str) -> Result<CodeParts, ServiceError> {
    let (prefix, rest) = code
        .split_once('-')
        .ok_or_else(|| ServiceError::validation(format!("code '{code}' is missing the '-' separator")))?;

    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ServiceError::validation(format!(
            "code '{code}' has an invalid company prefix"
        )));
    }

    let nature = JobNature::lex_order()
        .into_iter()
        .find(|n| rest.starts_with(n.code()))
        .ok_or_else(|| {
            ServiceError::validation(format!("code '{code}' has no recognizable job nature"))
        })?;

    let digits = &rest[nature.code().len()..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ServiceError::validation(format!(
            "code '{code}' must end in a running number"
        )));
    }
    let running_number: u32 = digits
        .parse()
        .map_err(|_| ServiceError::validation(format!("running number in '{code}' is out of range")))?;
    if running_number == 0 {
        return Err(ServiceError::validation(format!(
            "running number in '{code}' must be positive"
        )));
    }

    Ok(CodeParts {
        company_prefix: prefix.to_string(),
        job_nature: nature,
        running_number,
    })
}

pub struct CodeRegistry {
    store: Arc<dyn DocumentStore>,
    directory: Arc<dyn CompanyDirectory>,
}

impl CodeRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, directory: Arc<dyn CompanyDirectory>) -> Self {
        Self { store, directory }
    }

    /// Mints the next code for (prefix, nature). The code is synthesized only
    /// after the counter increment commits; if the increment cannot be
    /// durably committed the call fails with `RegistryUnavailable` and no
    /// number is consumed, so callers may retry freely.
    #[instrument(skip(self))]
    pub async fn generate(
        &self,
        prefix: &str,
        nature: JobNature,
    ) -> Result<String, ServiceError> {
        if !self.directory.is_valid_prefix(prefix).await? {
            return Err(ServiceError::validation(format!(
                "company prefix '{prefix}' is not in the directory"
            )));
        }

        let counter_id = format!("{prefix}:{}", nature.code());
        let next = self
            .store
            .atomic_increment(collections::COUNTERS, &counter_id, COUNTER_FIELD, 1)
            .await
            .map_err(|e| ServiceError::RegistryUnavailable(e.to_string()))?;
        let running_number = u32::try_from(next).map_err(|_| {
            ServiceError::Internal(format!("counter {counter_id} overflowed: {next}"))
        })?;

        Ok(format_code(prefix, nature, running_number))
    }

    /// Structural and directory validation for manually-typed codes and for
    /// defending against malformed CRM-sourced codes. Collects every
    /// violation rather than stopping at the first.
    pub async fn validate(&self, code: &str) -> Result<Vec<CodeViolation>, ServiceError> {
        let mut violations = Vec::new();

        let Some((prefix, rest)) = code.split_once('-') else {
            violations.push(CodeViolation::Malformed(
                "missing '-' separator".to_string(),
            ));
            return Ok(violations);
        };

        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            violations.push(CodeViolation::Malformed(format!(
                "invalid company prefix '{prefix}'"
            )));
        } else if !self.directory.is_valid_prefix(prefix).await? {
            violations.push(CodeViolation::UnknownPrefix(prefix.to_string()));
        }

        let nature = JobNature::lex_order()
            .into_iter()
            .find(|n| rest.starts_with(n.code()));
        let Some(nature) = nature else {
            violations.push(CodeViolation::UnknownNature(rest.to_string()));
            return Ok(violations);
        };

        let digits = &rest[nature.code().len()..];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            violations.push(CodeViolation::Malformed(format!(
                "expected digits after nature code, found '{digits}'"
            )));
        } else {
            match digits.parse::<u32>() {
                Ok(0) => violations.push(CodeViolation::NonPositiveRunningNumber),
                Ok(_) => {}
                Err(_) => violations.push(CodeViolation::Malformed(format!(
                    "running number '{digits}' is out of range"
                ))),
            }
        }

        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_nature() {
        for (code, nature, n) in [
            ("FS-P12", JobNature::Product, 12),
            ("FS-S1", JobNature::ServiceSale, 1),
            ("FS-SW7", JobNature::ServiceWork, 7),
            ("HQ-R300", JobNature::Research, 300),
        ] {
            let parts = parse_code(code).unwrap();
            assert_eq!(parts.job_nature, nature);
            assert_eq!(parts.running_number, n);
        }
    }

    #[test]
    fn sw_lexes_before_s() {
        // "SW1" must resolve to service-work 1, never service-sale "W1".
        let parts = parse_code("FS-SW1").unwrap();
        assert_eq!(parts.job_nature, JobNature::ServiceWork);
        assert_eq!(parts.running_number, 1);
    }

    #[test]
    fn rejects_malformed_codes() {
        for code in ["FSS1", "-S1", "FS-", "FS-S", "FS-S0", "FS-X9", "FS-Sx1", "FS!-S1"] {
            assert!(parse_code(code).is_err(), "{code} should not parse");
        }
    }

    #[test]
    fn format_parse_roundtrip() {
        for nature in JobNature::lex_order() {
            for n in [1u32, 9, 10, 999, 1_000_000] {
                let code = format_code("FS", nature, n);
                let parts = parse_code(&code).unwrap();
                assert_eq!(parts.company_prefix, "FS");
                assert_eq!(parts.job_nature, nature);
                assert_eq!(parts.running_number, n);
            }
        }
    }
}
