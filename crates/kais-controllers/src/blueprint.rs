//! `BlueprintController` (§4.5, C9): append-only, monotonically versioned
//! change tracking for a Blueprint's template. The previous spec hash is
//! kept as a resource annotation (the same place `CellController` keeps its
//! pod-affecting fingerprint) so the controller stays reentrant without a
//! side cache keyed off resource identity.

use std::sync::Arc;

use chrono::Utc;

use kais_blueprint::Variables;
use kais_core::{BlueprintVersion, Result};

use crate::fingerprint::fingerprint;
use crate::kube::KubeClient;

const FINGERPRINT_ANNOTATION: &str = "kais.io/spec-fingerprint";

pub struct BlueprintController {
    kube: Arc<dyn KubeClient>,
}

impl BlueprintController {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }

    /// Observe → compute desired state → diff → patch for one `Blueprint`
    /// (§4.5). Appends a new version only when the spec's content hash has
    /// changed since the last reconcile; `usageCount`/`lastUsed`/
    /// `avgSuccessRate` are untouched here (§3, §8 "Blueprint versions").
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<()> {
        let Some(mut blueprint) = self.kube.blueprints().get(namespace, name).await? else {
            return Ok(());
        };

        let current_hash = fingerprint(&blueprint.spec)?;
        let previous_hash = blueprint.meta.annotations.get(FINGERPRINT_ANNOTATION).cloned();

        if previous_hash.as_deref() != Some(current_hash.as_str()) {
            let next_version = blueprint.status.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1;
            let changes = if previous_hash.is_none() {
                vec!["initial version".to_string()]
            } else {
                vec!["spec changed".to_string()]
            };
            blueprint.status.versions.push(BlueprintVersion { version: next_version, created_at: Utc::now(), changes });
            blueprint.meta.annotations.insert(FINGERPRINT_ANNOTATION.to_string(), current_hash);
        }

        self.kube.blueprints().put(blueprint).await
    }

    /// Records the outcome of instantiating a Formation from this Blueprint,
    /// updating the running `usageCount`/`lastUsed`/`avgSuccessRate` (§3).
    pub async fn record_usage(&self, namespace: &str, name: &str, success: bool) -> Result<()> {
        let Some(mut blueprint) = self.kube.blueprints().get(namespace, name).await? else {
            return Ok(());
        };
        let n = blueprint.status.usage_count;
        let next_n = n + 1;
        let success_value = if success { 1.0 } else { 0.0 };
        blueprint.status.avg_success_rate = (blueprint.status.avg_success_rate * n as f64 + success_value) / next_n as f64;
        blueprint.status.usage_count = next_n;
        blueprint.status.last_used = Some(Utc::now());
        self.kube.blueprints().put(blueprint).await
    }

    /// Expands a Blueprint's `formation` template against declared parameter
    /// defaults overridden by `overrides` (§3 "optional default", §4.8).
    pub fn render_formation(
        &self,
        blueprint: &kais_core::Blueprint,
        overrides: &Variables,
    ) -> Result<serde_json::Value> {
        let mut vars: Variables = Variables::new();
        for param in &blueprint.spec.parameters {
            if let Some(default) = &param.default {
                vars.insert(param.name.clone(), default.clone());
            }
        }
        for (k, v) in overrides {
            vars.insert(k.clone(), v.clone());
        }
        kais_blueprint::render(&blueprint.spec.formation, &vars)
    }
}
