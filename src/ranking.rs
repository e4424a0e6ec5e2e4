//! Top-N selection shared by every recommender.
use std::cmp::Ordering;
use std::collections::HashSet;

use super::data::IdMap;
use super::{ItemId, PredictionError};

/// Rank `candidates` by `score`, best first.
///
/// Candidates in `exclude`, or outside `restrict` when given, are dropped
/// before scoring. `score` receives the candidate's position in
/// `candidates` and its id. Ties keep the order of `candidates`. Returns
/// an error if any score is not finite.
pub fn rank<F>(
    candidates: &[ItemId],
    exclude: &HashSet<ItemId>,
    restrict: Option<&HashSet<ItemId>>,
    top_n: usize,
    mut score: F,
) -> Result<Vec<ItemId>, PredictionError>
where
    F: FnMut(usize, ItemId) -> f32,
{
    let mut scored = Vec::with_capacity(candidates.len());

    for (idx, &item_id) in candidates.iter().enumerate() {
        if exclude.contains(&item_id) {
            continue;
        }

        if let Some(restrict) = restrict {
            if !restrict.contains(&item_id) {
                continue;
            }
        }

        let value = score(idx, item_id);

        if !value.is_finite() {
            return Err(PredictionError::InvalidPredictionValue);
        }

        scored.push((item_id, value));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    Ok(scored
        .into_iter()
        .take(top_n)
        .map(|(item_id, _)| item_id)
        .collect())
}

/// Fail with `UnknownItem` if the candidate pool names an item outside
/// the model's item space.
pub fn check_candidates(
    restrict: Option<&HashSet<ItemId>>,
    items: &IdMap<ItemId>,
) -> Result<(), PredictionError> {
    if let Some(restrict) = restrict {
        let mut unknown: Vec<ItemId> = restrict
            .iter()
            .filter(|&&id| !items.contains(&id))
            .cloned()
            .collect();

        // Report the smallest unknown id so the error is deterministic.
        unknown.sort();

        if let Some(&id) = unknown.first() {
            return Err(PredictionError::UnknownItem(id));
        }
    }

    Ok(())
}
