//! Recommendation engine: id translation, one batched forward pass over the
//! whole training catalog, exclusion of rated items, ranking, and translation
//! back to catalog ids.

use crate::context::RecommenderContext;
use cinerank_core::ids::{AppUserId, CatalogId, ItemIndex};
use cinerank_core::types::{RecommendOutcome, Recommendations, ScoredItem};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Rank the training catalog for `user`, skipping everything in `rated`, and
/// return at most `top_n` items by descending score.
///
/// Never fails: a disabled context, an unseen user or a scoring error yields
/// an empty result with the matching [`RecommendOutcome`]. Catalog ids that
/// cannot be translated are skipped silently. The result is shorter than
/// `top_n` only when candidates run out.
pub fn recommend(
    ctx: &RecommenderContext,
    user: AppUserId,
    rated: &HashSet<CatalogId>,
    top_n: usize,
) -> Recommendations {
    let model = match ctx.model() {
        Some(model) if ctx.mappings().is_complete() => model,
        _ => {
            warn!(user_id = %user, "Recommender is disabled, returning no recommendations");
            return Recommendations::empty(RecommendOutcome::Disabled);
        }
    };
    let mappings = ctx.mappings();

    let Some(user_index) = mappings.user_index(user) else {
        warn!(user_id = %user, "User not present in user map, returning no recommendations");
        return Recommendations::empty(RecommendOutcome::UnseenUser);
    };

    if top_n == 0 {
        return Recommendations::empty(RecommendOutcome::Complete);
    }

    let candidates = mappings.candidates();

    // Provider ids outside the training dataset have no index and cannot be excluded.
    let excluded: HashSet<ItemIndex> = rated
        .iter()
        .filter_map(|&catalog_id| mappings.catalog_to_index(catalog_id))
        .collect();

    debug!(
        user_id = %user,
        user_index = %user_index,
        candidates = candidates.len(),
        excluded = excluded.len(),
        "Scoring candidate batch"
    );

    let start = Instant::now();
    let scores = match model.score_batch(user_index, &candidates) {
        Ok(scores) if scores.len() == candidates.len() => scores,
        Ok(scores) => {
            error!(
                user_id = %user,
                expected = candidates.len(),
                got = scores.len(),
                model = model.name(),
                "Scoring model returned the wrong number of scores"
            );
            return Recommendations::empty(RecommendOutcome::ScoringFailed);
        }
        Err(e) => {
            error!(user_id = %user, error = %e, model = model.name(), "Batch scoring failed");
            return Recommendations::empty(RecommendOutcome::ScoringFailed);
        }
    };
    debug!(
        user_id = %user,
        latency_us = start.elapsed().as_micros() as u64,
        "Batch scored"
    );

    let mut ranked: Vec<(ItemIndex, f32)> = candidates
        .into_iter()
        .zip(scores)
        .filter(|(_, score)| !score.is_nan())
        .collect();
    // Stable: equal scores keep ascending model-index order.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let items: Vec<ScoredItem> = ranked
        .into_iter()
        .filter(|(index, _)| !excluded.contains(index))
        .filter_map(|(index, score)| {
            mappings
                .index_to_catalog(index)
                .map(|catalog_id| ScoredItem { catalog_id, score })
        })
        .take(top_n)
        .collect();

    let outcome = if items.len() < top_n {
        warn!(
            user_id = %user,
            requested = top_n,
            found = items.len(),
            "Fewer recommendations than requested after filtering rated and unmapped items"
        );
        RecommendOutcome::Partial {
            requested: top_n,
            found: items.len(),
        }
    } else {
        RecommendOutcome::Complete
    };

    Recommendations { outcome, items }
}
