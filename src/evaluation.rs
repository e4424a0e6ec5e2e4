//! Offline evaluation of fitted models against held-out ratings.
use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use super::data::Rating;
use super::{ItemId, PredictionError, RatingPredictor, Recommender, UserId};

/// Test ratings strictly above this value count as relevant.
const RELEVANCE_THRESHOLD: f32 = 3.0;

/// Whether an error just means the model cannot serve this user or item,
/// rather than a failure of the model.
fn is_skippable(error: &PredictionError) -> bool {
    match error {
        PredictionError::UnknownUser(_)
        | PredictionError::UnknownItem(_)
        | PredictionError::NoProfile(_) => true,
        _ => false,
    }
}

/// Root mean squared error of the model's predictions on `test`.
///
/// Ratings for users or items the model has not seen are skipped. Returns
/// NaN if no rating could be scored.
pub fn rmse_score<T: RatingPredictor + Sync>(
    model: &T,
    test: &[Rating],
) -> Result<f32, PredictionError> {
    let squared_errors = test
        .par_iter()
        .map(
            |rating| match model.predict(rating.user_id(), rating.item_id()) {
                Ok(prediction) => Ok(Some((rating.rating() - prediction).powi(2))),
                Err(ref error) if is_skippable(error) => Ok(None),
                Err(error) => Err(error),
            },
        )
        .collect::<Result<Vec<_>, _>>()?;

    let squared_errors: Vec<f32> = squared_errors.into_iter().flatten().collect();

    Ok((squared_errors.iter().sum::<f32>() / squared_errors.len() as f32).sqrt())
}

/// Mean precision of the top `k` recommendations against each test user's
/// relevant (rated above 3) items.
///
/// Users without relevant test items, and users the model cannot serve,
/// are skipped. Returns NaN if no user could be scored, and 0 when `k` is 0.
pub fn precision_at_k<T: Recommender + Sync>(
    model: &T,
    test: &[Rating],
    k: usize,
) -> Result<f32, PredictionError> {
    if k == 0 {
        return Ok(0.0);
    }

    let mut relevant: HashMap<UserId, HashSet<ItemId>> = HashMap::new();

    for rating in test.iter().filter(|x| x.rating() > RELEVANCE_THRESHOLD) {
        relevant
            .entry(rating.user_id())
            .or_insert_with(HashSet::new)
            .insert(rating.item_id());
    }

    let relevant: Vec<_> = relevant.into_iter().collect();

    let precisions = relevant
        .par_iter()
        .map(|(user_id, items)| match model.recommend(*user_id, None, k) {
            Ok(recommendations) => {
                let hits = recommendations
                    .iter()
                    .filter(|item_id| items.contains(item_id))
                    .count();
                Ok(Some(hits as f32 / k as f32))
            }
            Err(ref error) if is_skippable(error) => Ok(None),
            Err(error) => Err(error),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let precisions: Vec<f32> = precisions.into_iter().flatten().collect();

    Ok(precisions.iter().sum::<f32>() / precisions.len() as f32)
}
