//! User-user collaborative filtering.
//!
//! Users are compared by the cosine of their mean-centred ratings over the
//! items both have rated. A rating for `(u, i)` is predicted from the `k`
//! users most similar to `u` among those who rated `i`.
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use itertools::EitherOrBoth;
use itertools::Itertools;
use ndarray::Array1;
use tracing::{debug, info};

use super::super::data::{ItemMetadata, Rating};
use super::super::matrix::RatingMatrix;
use super::super::ranking::{check_candidates, rank};
use super::super::{
    ConfigError, FittingError, ItemId, PredictionError, RatingPredictor, Recommender, UserId,
};

/// Hyperparameters for the [`NeighborhoodModel`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Hyperparameters {
    num_neighbors: usize,
    abs_similarity: bool,
    deviations: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters::new()
    }
}

impl Hyperparameters {
    /// Build new hyperparameters with default values.
    pub fn new() -> Self {
        Hyperparameters {
            num_neighbors: 50,
            abs_similarity: true,
            deviations: true,
        }
    }

    /// Set the neighbourhood size `k`.
    pub fn num_neighbors(mut self, num_neighbors: usize) -> Self {
        self.num_neighbors = num_neighbors;
        self
    }

    /// Rank and weight neighbours by the absolute value of their similarity.
    pub fn abs_similarity(mut self, abs_similarity: bool) -> Self {
        self.abs_similarity = abs_similarity;
        self
    }

    /// Predict from neighbours' deviations from their own average rating,
    /// added back to the target user's average.
    pub fn deviations(mut self, deviations: bool) -> Self {
        self.deviations = deviations;
        self
    }

    /// Validate the hyperparameters and build an unfitted model.
    pub fn build(self) -> Result<NeighborhoodModel, ConfigError> {
        if self.num_neighbors == 0 {
            return Err(ConfigError::InvalidNeighborhoodSize);
        }

        Ok(NeighborhoodModel {
            hyper: self,
            model: None,
        })
    }
}

/// Memoized per-user similarity vectors.
///
/// Each vector is computed at most once per cache; concurrent readers see
/// either no entry or the complete vector.
#[derive(Debug, Default)]
pub struct SimilarityCache {
    vectors: Mutex<HashMap<usize, Arc<Array1<f32>>>>,
}

impl SimilarityCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        SimilarityCache::default()
    }

    /// Return the cached vector for `user`, computing and storing it with
    /// `compute` on a miss.
    ///
    /// The lock is not held while computing. If two threads miss at once,
    /// the first insert wins and both get the stored vector.
    pub fn get_or_insert_with<F>(&self, user: usize, compute: F) -> Arc<Array1<f32>>
    where
        F: FnOnce() -> Array1<f32>,
    {
        if let Some(vector) = self
            .vectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
        {
            return vector.clone();
        }

        let computed = Arc::new(compute());

        self.vectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user)
            .or_insert(computed)
            .clone()
    }

    /// Number of cached users.
    pub fn len(&self) -> usize {
        self.vectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is cached yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct ModelData {
    ratings: RatingMatrix,
    cache: SimilarityCache,
}

impl ModelData {
    fn pairwise_similarity(&self, user_a: usize, user_b: usize) -> f32 {
        let average_a = self.ratings.user_average(user_a);
        let average_b = self.ratings.user_average(user_b);

        let mut overlap = 0;
        let mut numerator = 0.0;
        let mut norm_a = 0.0;
        let mut norm_b = 0.0;

        let row_a = self.ratings.row(user_a);
        let row_b = self.ratings.row(user_b);

        for pair in row_a
            .iter()
            .merge_join_by(row_b.iter(), |a, b| a.0.cmp(&b.0))
        {
            if let EitherOrBoth::Both((_, rating_a), (_, rating_b)) = pair {
                let centred_a = rating_a - average_a;
                let centred_b = rating_b - average_b;

                numerator += centred_a * centred_b;
                norm_a += centred_a * centred_a;
                norm_b += centred_b * centred_b;
                overlap += 1;
            }
        }

        if overlap == 0 || norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            numerator / (norm_a.sqrt() * norm_b.sqrt())
        }
    }

    fn user_similarities(&self, user: usize) -> Arc<Array1<f32>> {
        self.cache.get_or_insert_with(user, || {
            debug!(user, "Computing user similarities");

            (0..self.ratings.num_users())
                .map(|other| self.pairwise_similarity(user, other))
                .collect()
        })
    }

    /// Up to `num_neighbors` users who rated `item`, excluding `user`, with
    /// their weights, strongest first. Ties keep ascending user order.
    fn neighborhood(
        &self,
        user: usize,
        item: usize,
        hyper: &Hyperparameters,
    ) -> Vec<(usize, f32)> {
        let similarities = self.user_similarities(user);

        let mut neighbors: Vec<(usize, f32)> = self
            .ratings
            .column(item)
            .iter()
            .filter(|&&other| other != user)
            .map(|&other| {
                let similarity = similarities[other];
                if hyper.abs_similarity {
                    (other, similarity.abs())
                } else {
                    (other, similarity)
                }
            })
            .collect();

        neighbors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        neighbors.truncate(hyper.num_neighbors);

        neighbors
    }

    fn predict_rating(&self, user: usize, item: usize, hyper: &Hyperparameters) -> f32 {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for (neighbor, weight) in self.neighborhood(user, item, hyper) {
            if let Some(rating) = self.ratings.get(neighbor, item) {
                let value = if hyper.deviations {
                    rating - self.ratings.user_average(neighbor)
                } else {
                    rating
                };

                weighted_sum += weight * value;
                total_weight += weight;
            }
        }

        let estimate = if total_weight == 0.0 {
            0.0
        } else {
            weighted_sum / total_weight
        };

        if hyper.deviations {
            self.ratings.user_average(user) + estimate
        } else {
            estimate
        }
    }

    fn user_index(&self, user_id: UserId) -> Result<usize, PredictionError> {
        self.ratings
            .users()
            .index_of(&user_id)
            .ok_or(PredictionError::UnknownUser(user_id))
    }

    fn item_index(&self, item_id: ItemId) -> Result<usize, PredictionError> {
        self.ratings
            .items()
            .index_of(&item_id)
            .ok_or(PredictionError::UnknownItem(item_id))
    }
}

/// User-user collaborative filtering model.
///
/// Similarity vectors are memoized per model instance and discarded on
/// every rebuild.
#[derive(Debug)]
pub struct NeighborhoodModel {
    hyper: Hyperparameters,
    model: Option<ModelData>,
}

impl NeighborhoodModel {
    fn model(&self) -> Result<&ModelData, PredictionError> {
        self.model.as_ref().ok_or(PredictionError::NotFitted)
    }

    /// Mean-centred cosine similarity between two users. Zero when they
    /// share no rated items or either centred vector has zero norm.
    pub fn pairwise_similarity(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<f32, PredictionError> {
        let model = self.model()?;

        Ok(model.pairwise_similarity(model.user_index(user_a)?, model.user_index(user_b)?))
    }

    /// Similarity of `user_id` to every user, in ascending user id order.
    pub fn user_similarities(&self, user_id: UserId) -> Result<Arc<Array1<f32>>, PredictionError> {
        let model = self.model()?;

        Ok(model.user_similarities(model.user_index(user_id)?))
    }

    /// The neighbours used to predict `user_id`'s rating of `item_id`, as
    /// `(user id, weight)` pairs.
    pub fn neighborhood(
        &self,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<Vec<(UserId, f32)>, PredictionError> {
        let model = self.model()?;
        let user = model.user_index(user_id)?;
        let item = model.item_index(item_id)?;

        Ok(model
            .neighborhood(user, item, &self.hyper)
            .into_iter()
            .map(|(neighbor, weight)| (model.ratings.users().id_of(neighbor), weight))
            .collect())
    }

    /// Predicted rating of `item_id` by `user_id`.
    pub fn predict_rating(&self, user_id: UserId, item_id: ItemId) -> Result<f32, PredictionError> {
        let model = self.model()?;
        let user = model.user_index(user_id)?;
        let item = model.item_index(item_id)?;

        let prediction = model.predict_rating(user, item, &self.hyper);

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }
}

impl RatingPredictor for NeighborhoodModel {
    fn predict(&self, user_id: UserId, item_id: ItemId) -> Result<f32, PredictionError> {
        self.predict_rating(user_id, item_id)
    }
}

impl Recommender for NeighborhoodModel {
    fn build_model(
        &mut self,
        ratings: &[Rating],
        _items: Option<&[ItemMetadata]>,
    ) -> Result<(), FittingError> {
        self.model = None;

        let ratings = RatingMatrix::from_ratings(ratings)?;

        info!(
            num_users = ratings.num_users(),
            num_items = ratings.num_items(),
            num_ratings = ratings.len(),
            "Built neighbourhood model"
        );

        self.model = Some(ModelData {
            ratings,
            cache: SimilarityCache::new(),
        });

        Ok(())
    }

    fn recommend(
        &self,
        user_id: UserId,
        from_item_ids: Option<&HashSet<ItemId>>,
        top_n: usize,
    ) -> Result<Vec<ItemId>, PredictionError> {
        let model = self.model()?;
        let user = model.user_index(user_id)?;

        check_candidates(from_item_ids, model.ratings.items())?;

        rank(
            model.ratings.items().ids(),
            &model.ratings.rated_items(user),
            from_item_ids,
            top_n,
            |item, _| model.predict_rating(user, item, &self.hyper),
        )
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;

    use super::*;

    fn scenario() -> Vec<Rating> {
        vec![
            Rating::new(1, 1, 5.0),
            Rating::new(1, 2, 3.0),
            Rating::new(2, 1, 4.0),
            Rating::new(2, 3, 5.0),
        ]
    }

    fn fitted(hyper: Hyperparameters, ratings: &[Rating]) -> NeighborhoodModel {
        let mut model = hyper.build().unwrap();
        model.build_model(ratings, None).unwrap();
        model
    }

    fn dense_ratings() -> Vec<Rating> {
        let mut ratings = Vec::new();

        for user in 0..12 {
            for item in 0..10 {
                if (user * 3 + item) % 4 != 0 {
                    let value = 1 + (user * item + user) % 5;
                    ratings.push(Rating::new(user, item, value as f32));
                }
            }
        }

        ratings
    }

    #[test]
    fn similarity_is_symmetric() {
        let ratings = dense_ratings();
        let model = fitted(Hyperparameters::new(), &ratings);

        for a in 0..12 {
            for b in 0..12 {
                assert_eq!(
                    model.pairwise_similarity(a, b).unwrap(),
                    model.pairwise_similarity(b, a).unwrap()
                );
            }
        }
    }

    #[test]
    fn no_overlap_means_zero_similarity() {
        let ratings = vec![
            Rating::new(1, 1, 5.0),
            Rating::new(1, 2, 1.0),
            Rating::new(2, 3, 4.0),
            Rating::new(2, 4, 2.0),
        ];
        let model = fitted(Hyperparameters::new(), &ratings);

        assert_eq!(model.pairwise_similarity(1, 2).unwrap(), 0.0);
    }

    #[test]
    fn single_neighbor_prediction() {
        let hyper = Hyperparameters::new()
            .num_neighbors(1)
            .abs_similarity(true)
            .deviations(false);
        let model = fitted(hyper.clone(), &scenario());

        // Averages are 4 and 4.5, so the overlap on item 1 centres to
        // (1, -0.5).
        assert_eq!(model.pairwise_similarity(1, 2).unwrap(), -1.0);
        assert_eq!(model.neighborhood(1, 3).unwrap(), vec![(2, 1.0)]);
        assert_eq!(model.predict_rating(1, 3).unwrap(), 5.0);

        let model = fitted(hyper.deviations(true), &scenario());
        assert_eq!(model.predict_rating(1, 3).unwrap(), 4.5);

        let signed = Hyperparameters::new()
            .num_neighbors(1)
            .abs_similarity(false)
            .deviations(false);
        let model = fitted(signed, &scenario());
        assert_eq!(model.neighborhood(1, 3).unwrap(), vec![(2, -1.0)]);
        assert_eq!(model.predict_rating(1, 3).unwrap(), 5.0);
    }

    #[test]
    fn opposite_neighbors_cancel() {
        let ratings = vec![
            Rating::new(1, 1, 5.0),
            Rating::new(1, 2, 3.0),
            Rating::new(2, 1, 5.0),
            Rating::new(2, 3, 3.0),
            Rating::new(3, 1, 3.0),
            Rating::new(3, 3, 5.0),
        ];

        let signed = Hyperparameters::new()
            .num_neighbors(2)
            .abs_similarity(false)
            .deviations(false);
        let model = fitted(signed, &ratings);

        // Signed weights sum to zero, so there is no usable estimate.
        assert_eq!(
            model.neighborhood(1, 3).unwrap(),
            vec![(2, 1.0), (3, -1.0)]
        );
        assert_eq!(model.predict_rating(1, 3).unwrap(), 0.0);
    }

    #[test]
    fn zero_norm_neighbor() {
        let ratings = vec![
            Rating::new(1, 1, 5.0),
            Rating::new(1, 2, 3.0),
            Rating::new(3, 1, 4.0),
            Rating::new(3, 2, 4.0),
            Rating::new(3, 3, 4.0),
        ];

        let plain = Hyperparameters::new().deviations(false);
        let model = fitted(plain, &ratings);

        assert_eq!(model.pairwise_similarity(1, 3).unwrap(), 0.0);
        assert_eq!(model.predict_rating(1, 3).unwrap(), 0.0);

        let model = fitted(Hyperparameters::new(), &ratings);
        assert_eq!(model.predict_rating(1, 3).unwrap(), 4.0);
    }

    #[test]
    fn cached_similarities_match_pairwise() {
        let ratings = dense_ratings();
        let model = fitted(Hyperparameters::new(), &ratings);

        let first = model.user_similarities(4).unwrap();
        let second = model.user_similarities(4).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 12);

        for other in 0..12 {
            assert_eq!(first[other as usize], model.pairwise_similarity(4, other).unwrap());
        }
    }

    #[test]
    fn cache_is_per_build() {
        let ratings = dense_ratings();
        let mut model = fitted(Hyperparameters::new(), &ratings);

        model.user_similarities(1).unwrap();
        model.user_similarities(2).unwrap();
        assert_eq!(model.model.as_ref().unwrap().cache.len(), 2);

        model.build_model(&scenario(), None).unwrap();
        assert!(model.model.as_ref().unwrap().cache.is_empty());

        let other = fitted(Hyperparameters::new(), &ratings);
        assert!(other.model.as_ref().unwrap().cache.is_empty());
    }

    #[test]
    fn concurrent_cache_access() {
        let ratings = dense_ratings();
        let model = fitted(Hyperparameters::new(), &ratings);

        let vectors: Vec<_> = (0..16)
            .into_par_iter()
            .map(|_| model.user_similarities(7).unwrap())
            .collect();

        for vector in &vectors {
            assert!(Arc::ptr_eq(vector, &vectors[0]));
        }
        assert_eq!(model.model.as_ref().unwrap().cache.len(), 1);
    }

    #[test]
    fn neighborhood_is_bounded_and_sorted() {
        let ratings = dense_ratings();
        let model = fitted(Hyperparameters::new().num_neighbors(3), &ratings);

        let neighbors = model.neighborhood(0, 5).unwrap();

        assert!(neighbors.len() <= 3);
        assert!(neighbors.iter().all(|&(user, _)| user != 0));
        assert!(neighbors.windows(2).all(|pair| pair[0].1 >= pair[1].1));
    }

    #[test]
    fn recommendations() {
        let ratings = dense_ratings();
        let model = fitted(Hyperparameters::new().num_neighbors(5), &ratings);

        let rated: HashSet<ItemId> = ratings
            .iter()
            .filter(|x| x.user_id() == 0)
            .map(|x| x.item_id())
            .collect();

        let recommended = model.recommend(0, None, 2).unwrap();
        assert_eq!(recommended.len(), 2);
        assert!(recommended.iter().all(|x| !rated.contains(x)));

        let pool: HashSet<ItemId> = vec![0, 1, 4].into_iter().collect();
        let recommended = model.recommend(0, Some(&pool), 10).unwrap();
        assert!(recommended.iter().all(|x| pool.contains(x) && !rated.contains(x)));
    }

    #[test]
    fn errors() {
        let unfitted = Hyperparameters::new().build().unwrap();
        assert_eq!(
            unfitted.recommend(1, None, 5),
            Err(PredictionError::NotFitted)
        );

        let model = fitted(Hyperparameters::new(), &scenario());
        assert_eq!(
            model.recommend(9, None, 5),
            Err(PredictionError::UnknownUser(9))
        );
        assert_eq!(
            model.predict_rating(1, 9),
            Err(PredictionError::UnknownItem(9))
        );

        assert_eq!(
            Hyperparameters::new().num_neighbors(0).build().unwrap_err(),
            ConfigError::InvalidNeighborhoodSize
        );
    }
}
