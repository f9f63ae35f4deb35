use crate::ids::CatalogId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recommended movie, in the catalog provider's id space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub catalog_id: CatalogId,
    pub score: f32,
}

/// How a recommendation request ended. Every failure mode is a named
/// outcome rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RecommendOutcome {
    /// `top_n` items were found.
    Complete,
    /// Candidates ran out before `top_n` items were found.
    Partial { requested: usize, found: usize },
    /// The model or its mapping tables did not load.
    Disabled,
    /// The user was not part of the training data.
    UnseenUser,
    /// The scoring model rejected the batch.
    ScoringFailed,
}

/// Ranked recommendations, highest score first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub outcome: RecommendOutcome,
    pub items: Vec<ScoredItem>,
}

impl Recommendations {
    pub fn empty(outcome: RecommendOutcome) -> Self {
        Self {
            outcome,
            items: Vec::new(),
        }
    }

    pub fn catalog_ids(&self) -> Vec<CatalogId> {
        self.items.iter().map(|item| item.catalog_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Snapshot of what the loader produced, for status endpoints and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub enabled: bool,
    pub model: Option<String>,
    pub users: usize,
    pub items: usize,
    pub catalog_links: usize,
    pub checkpoint_sha256: Option<String>,
    pub issues: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}
