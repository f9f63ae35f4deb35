//! Scoring abstraction the recommendation engine runs against.
//!
//! The trained NCF network implements [`ScoringModel`]; anything else that can
//! score (user, item) index pairs (fixtures in tests, alternative backends)
//! can stand in for it without the engine knowing the difference.

use crate::error::InferenceError;
use crate::ids::{ItemIndex, UserIndex};

/// Read-only relevance scorer over model indices.
///
/// Implementations must be safe to call from many request threads at once
/// and must never mutate their parameters while scoring.
pub trait ScoringModel: Send + Sync {
    /// Score one user against every item in `items`, in a single batch.
    /// Returns one score in `[0, 1]` per item, in input order.
    fn score_batch(&self, user: UserIndex, items: &[ItemIndex])
        -> Result<Vec<f32>, InferenceError>;

    /// Rows in the user embedding table.
    fn num_users(&self) -> usize;

    /// Rows in the item embedding table.
    fn num_items(&self) -> usize;

    /// Name for logs and status output.
    fn name(&self) -> &str;
}
