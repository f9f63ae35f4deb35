use crate::engine;
use crate::mappings::MappingStore;
use chrono::{DateTime, Utc};
use cinerank_core::error::LoadError;
use cinerank_core::ids::{AppUserId, CatalogId};
use cinerank_core::inference::ScoringModel;
use cinerank_core::types::{ContextSummary, Recommendations};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Everything the recommender loaded at startup.
///
/// Immutable after construction. Hosts hold it in an `Arc` and pass it to
/// each request; a new model means a new process with new artifacts.
pub struct RecommenderContext {
    model: Option<Arc<dyn ScoringModel>>,
    mappings: MappingStore,
    issues: Vec<LoadError>,
    checkpoint_sha256: Option<String>,
    loaded_at: DateTime<Utc>,
}

impl RecommenderContext {
    pub fn new(model: Option<Arc<dyn ScoringModel>>, mappings: MappingStore) -> Self {
        Self {
            model,
            mappings,
            issues: Vec::new(),
            checkpoint_sha256: None,
            loaded_at: Utc::now(),
        }
    }

    /// No model and empty maps. Every request gets an empty result.
    pub fn disabled(issues: Vec<LoadError>) -> Self {
        Self {
            issues,
            ..Self::new(None, MappingStore::empty())
        }
    }

    pub(crate) fn with_issues(mut self, issues: Vec<LoadError>) -> Self {
        self.issues = issues;
        self
    }

    pub(crate) fn with_checkpoint_sha256(mut self, digest: Option<String>) -> Self {
        self.checkpoint_sha256 = digest;
        self
    }

    pub fn model(&self) -> Option<&dyn ScoringModel> {
        self.model.as_deref()
    }

    pub fn mappings(&self) -> &MappingStore {
        &self.mappings
    }

    /// Load failures recorded at startup, in the order they happened.
    pub fn issues(&self) -> &[LoadError] {
        &self.issues
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some() && self.mappings.is_complete()
    }

    /// Rank unseen catalog items for `user`. See [`engine::recommend`].
    pub fn recommend(
        &self,
        user: AppUserId,
        rated: &HashSet<CatalogId>,
        top_n: usize,
    ) -> Recommendations {
        engine::recommend(self, user, rated, top_n)
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            enabled: self.is_enabled(),
            model: self.model.as_ref().map(|m| m.name().to_string()),
            users: self.mappings.num_users(),
            items: self.mappings.num_items(),
            catalog_links: self.mappings.num_catalog_links(),
            checkpoint_sha256: self.checkpoint_sha256.clone(),
            issues: self.issues.iter().map(|e| e.to_string()).collect(),
            loaded_at: self.loaded_at,
        }
    }
}

impl fmt::Debug for RecommenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecommenderContext")
            .field("model", &self.model.as_ref().map(|m| m.name()))
            .field("users", &self.mappings.num_users())
            .field("items", &self.mappings.num_items())
            .field("issues", &self.issues.len())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}
