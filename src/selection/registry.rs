//! Immutable list of configured providers

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{FramegateError, Result};
use crate::models::Provider;

/// Process-wide provider configuration
///
/// Providers never change after construction; health lives elsewhere.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Arc<[Arc<Provider>]>,
}

impl ProviderRegistry {
    /// Build a registry, rejecting duplicate names and empty templates
    pub fn new(providers: Vec<Provider>) -> Result<Self> {
        let mut seen = HashSet::new();
        for provider in &providers {
            if provider.name.trim().is_empty() {
                return Err(FramegateError::InvalidConfig(
                    "provider name must not be empty".into(),
                ));
            }
            if provider.base_url_template.trim().is_empty() {
                return Err(FramegateError::InvalidConfig(format!(
                    "provider {} has an empty URL template",
                    provider.name
                )));
            }
            if !seen.insert(provider.name.clone()) {
                return Err(FramegateError::DuplicateProvider(provider.name.clone()));
            }
        }

        Ok(Self {
            providers: providers.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn all(&self) -> &[Arc<Provider>] {
        &self.providers
    }

    /// Administratively enabled providers, in configuration order
    pub fn active(&self) -> Vec<Arc<Provider>> {
        self.providers.iter().filter(|p| p.active).cloned().collect()
    }

    pub fn find(&self, name: &str) -> Option<Arc<Provider>> {
        self.providers.iter().find(|p| p.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
