pub mod config;
pub mod error;
pub mod ids;
pub mod inference;
pub mod types;

pub use config::AppConfig;
pub use error::{ArtifactKind, CinerankError, CinerankResult, InferenceError, LoadError};
pub use ids::{AppUserId, CatalogId, DatasetItemId, ItemIndex, UserIndex};
pub use inference::ScoringModel;
