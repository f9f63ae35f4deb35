//! Startup loader: reads the checkpoint and the two mapping artifacts and
//! assembles the immutable [`RecommenderContext`].
//!
//! Nothing here fails the process. Missing or malformed artifacts degrade to a
//! disabled context, with the cause logged and kept on the context.

use crate::checkpoint::read_checkpoint;
use crate::context::RecommenderContext;
use crate::mappings::{read_item_map, read_user_map, MappingStore};
use crate::model::{ModelDims, NcfModel};
use cinerank_core::config::RecommenderConfig;
use cinerank_core::error::{ArtifactKind, LoadError};
use cinerank_core::inference::ScoringModel;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Load the recommender described by `config`.
pub fn load(config: &RecommenderConfig) -> RecommenderContext {
    let artifacts = [
        (ArtifactKind::Checkpoint, config.model_path.as_str()),
        (ArtifactKind::UserMap, config.user_map_path.as_str()),
        (ArtifactKind::ItemMap, config.item_map_path.as_str()),
    ];
    let missing: Vec<ArtifactKind> = artifacts
        .iter()
        .filter(|(_, path)| path.is_empty() || !Path::new(path).exists())
        .map(|(kind, _)| *kind)
        .collect();

    if !missing.is_empty() {
        let issue = LoadError::ArtifactMissing { kinds: missing };
        error!(error = %issue, "Recommendations will not be available");
        return RecommenderContext::disabled(vec![issue]);
    }

    let dims = ModelDims::from_config(config);
    let mut issues = Vec::new();

    let mappings = match load_mappings(config, &dims) {
        Ok(mappings) => {
            info!(
                users = mappings.num_users(),
                items = mappings.num_items(),
                catalog_links = mappings.num_catalog_links(),
                "Loaded mapping tables"
            );
            mappings
        }
        Err(e) => {
            error!(error = %e, "Mapping tables rejected, clearing all maps");
            issues.push(e);
            MappingStore::empty()
        }
    };

    let (model, digest) = match load_model(config, dims) {
        Ok((model, digest)) => {
            info!(
                path = %config.model_path,
                sha256 = %digest,
                embedding_dim = model.dims().embedding_dim,
                hidden_dims = ?model.dims().hidden_dims,
                "Loaded model checkpoint"
            );
            (Some(Arc::new(model) as Arc<dyn ScoringModel>), Some(digest))
        }
        Err(e) => {
            error!(path = %config.model_path, error = %e, "Failed to load model checkpoint");
            issues.push(e);
            (None, None)
        }
    };

    let ctx = RecommenderContext::new(model, mappings)
        .with_issues(issues)
        .with_checkpoint_sha256(digest);

    if !ctx.is_enabled() {
        warn!(
            issues = ctx.issues().len(),
            "Recommender is incomplete, personalized recommendations are disabled"
        );
    }

    ctx
}

fn load_mappings(config: &RecommenderConfig, dims: &ModelDims) -> Result<MappingStore, LoadError> {
    let users = read_user_map(Path::new(&config.user_map_path))?;
    let items = read_item_map(Path::new(&config.item_map_path))?;
    let store = MappingStore::from_artifacts(users, items);
    store.validate(dims.num_users, dims.num_items)?;
    Ok(store)
}

fn load_model(config: &RecommenderConfig, dims: ModelDims) -> Result<(NcfModel, String), LoadError> {
    dims.validate()?;
    let checkpoint = read_checkpoint(
        Path::new(&config.model_path),
        config.checkpoint_sha256.as_deref(),
    )?;
    if !checkpoint.metadata.is_empty() {
        info!(metadata = ?checkpoint.metadata, "Checkpoint metadata");
    }
    let model = NcfModel::from_state_dict(dims, checkpoint.state_dict)?
        .with_chunk_rows(config.inference_chunk_rows);
    Ok((model, checkpoint.sha256))
}
