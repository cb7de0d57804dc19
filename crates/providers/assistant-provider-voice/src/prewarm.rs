//! Prewarm bookkeeping: which resources should be loaded ahead of demand

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Client request to warm an optional resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrewarmRequest {
    /// Resource identifier, e.g. `tts:piper:en_US-amy-low`
    #[serde(default)]
    pub resource_id: Option<String>,
    /// Language hint
    #[serde(default)]
    pub language: Option<String>,
    /// Voice to load
    #[serde(default)]
    pub voice: Option<String>,
    /// Free-form extra attributes
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Registry {
    defaults: BTreeSet<String>,
    optional: Vec<PrewarmRequest>,
}

/// Records default resources (warmed at startup) and optional requests
#[derive(Debug, Default)]
pub struct PrewarmManager {
    registry: Mutex<Registry>,
}

impl PrewarmManager {
    /// Manager seeded with `defaults`
    pub fn new<I, S>(defaults: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let manager = Self::default();
        for resource in defaults {
            manager.register_default_resource(resource);
        }
        manager
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a resource to warm at startup; duplicates are ignored
    pub fn register_default_resource(&self, resource_id: impl Into<String>) {
        self.registry().defaults.insert(resource_id.into());
    }

    /// Default resources in sorted order
    pub fn list_default_resources(&self) -> Vec<String> {
        self.registry().defaults.iter().cloned().collect()
    }

    /// Record an optional request
    pub fn request_optional(&self, request: PrewarmRequest) {
        tracing::debug!(
            resource_id = ?request.resource_id,
            voice = ?request.voice,
            "Prewarm requested"
        );
        self.registry().optional.push(request);
    }

    /// Optional requests in arrival order
    pub fn list_optional_requests(&self) -> Vec<PrewarmRequest> {
        self.registry().optional.clone()
    }
}
