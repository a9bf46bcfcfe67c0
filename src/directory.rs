//! Company directory seam.
//!
//! The multi-company/branch directory and its permission model live outside
//! this engine; all it provides here is prefix validation for job codes.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::errors::ServiceError;

#[async_trait]
pub trait CompanyDirectory: Send + Sync {
    async fn is_valid_prefix(&self, prefix: &str) -> Result<bool, ServiceError>;
}

/// Directory backed by a fixed prefix list from configuration. Deployments
/// that run next to the real company management service swap in an
/// implementation that queries it.
pub struct StaticCompanyDirectory {
    prefixes: HashSet<String>,
}

impl StaticCompanyDirectory {
    pub fn new(prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl CompanyDirectory for StaticCompanyDirectory {
    async fn is_valid_prefix(&self, prefix: &str) -> Result<bool, ServiceError> {
        Ok(self.prefixes.contains(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recognizes_configured_prefixes() {
        let directory = StaticCompanyDirectory::new(["FS".to_string(), "HQ".to_string()]);
        assert!(directory.is_valid_prefix("FS").await.unwrap());
        assert!(!directory.is_valid_prefix("XX").await.unwrap());
    }
}
