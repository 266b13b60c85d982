//! Model registry: alias → backend target.
//!
//! A [`ModelRegistry`] is built once from configuration and never mutated.
//! [`SharedRegistry`] holds the current snapshot behind an atomic pointer so a
//! reload can publish a new one while in-flight requests keep the old one.

use crate::adapters::{join_url, Operation, ProtocolType};
use crate::error::{BrokerError, Result};

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Base URL of the backend, e.g. `https://api.openai.com/v1/`.
    pub url: String,
    /// Model name the backend expects.
    pub model: String,
    /// Resolved API key, empty when none is configured.
    pub api_key: String,
    /// Replaces `chat/completions` for chat requests.
    pub chat_path: Option<String>,
}

impl Target {
    /// Full backend URL for an operation.
    #[must_use]
    pub fn endpoint(&self, operation: Operation) -> String {
        let path = match (operation, &self.chat_path) {
            (Operation::Chat, Some(path)) => path.as_str(),
            _ => operation.backend_path(),
        };
        join_url(&self.url, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub alias: String,
    pub protocol: ProtocolType,
    pub target: Target,
}

impl Model {
    /// Whether the client-facing alias differs from the backend model name.
    #[must_use]
    pub fn needs_rewrite(&self) -> bool {
        self.alias != self.target.model
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<Model>>,
    // Configuration order, for listing.
    order: Vec<String>,
}

impl ModelRegistry {
    /// Build a registry. Aliases must be unique.
    pub fn new(models: impl IntoIterator<Item = Model>) -> Result<Self> {
        let mut registry = Self::default();
        for model in models {
            if registry.models.contains_key(&model.alias) {
                return Err(BrokerError::config(format!(
                    "duplicate model alias '{}'",
                    model.alias
                )));
            }
            registry.order.push(model.alias.clone());
            registry
                .models
                .insert(model.alias.clone(), Arc::new(model));
        }
        Ok(registry)
    }

    pub fn lookup(&self, alias: &str) -> Result<Arc<Model>> {
        self.models
            .get(alias)
            .cloned()
            .ok_or_else(|| BrokerError::unknown_model(alias))
    }

    /// Models in configuration order.
    pub fn models(&self) -> impl Iterator<Item = &Model> + '_ {
        self.order
            .iter()
            .filter_map(|alias| self.models.get(alias).map(AsRef::as_ref))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// The live registry, swappable at runtime.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    inner: Arc<ArcSwap<ModelRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(registry)),
        }
    }

    /// The current snapshot. Holding it pins that snapshot for the caller.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ModelRegistry> {
        self.inner.load_full()
    }

    pub fn replace(&self, registry: ModelRegistry) {
        self.inner.store(Arc::new(registry));
    }
}
