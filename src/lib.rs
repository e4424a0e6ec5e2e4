#![warn(missing_docs)]
//! # recs
//!
//! `recs` implements three interchangeable recommenders over explicit
//! user-item ratings:
//!
//! - [`models::content::ContentRecommender`]: scores items against a
//!   rating-weighted TF-IDF profile of the items the user liked,
//! - [`models::neighborhood::NeighborhoodModel`]: user-user collaborative
//!   filtering with mean-centred cosine similarity, and
//! - [`models::factorization::MatrixFactorization`]: biased latent factor
//!   model trained with stochastic gradient descent.
//!
//! All of them implement [`Recommender`], so callers can swap them freely.
//!
//! ## Example
//!
//! ```rust
//! # extern crate recs;
//! use recs::data::Rating;
//! use recs::models::factorization::Hyperparameters;
//! use recs::Recommender;
//!
//! let ratings = vec![
//!     Rating::new(1, 10, 5.0),
//!     Rating::new(1, 11, 3.0),
//!     Rating::new(2, 10, 4.0),
//!     Rating::new(2, 12, 5.0),
//!     Rating::new(3, 11, 2.0),
//!     Rating::new(3, 12, 4.0),
//! ];
//!
//! let mut model = Hyperparameters::new()
//!     .latent_dim(4)
//!     .learning_rate(0.05)
//!     .num_epochs(20)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//!
//! model.build_model(&ratings, None).unwrap();
//!
//! let recommendations = model.recommend(1, None, 5).unwrap();
//! assert_eq!(recommendations, vec![12]);
//! ```
#[macro_use]
extern crate serde_derive;

#[cfg(feature = "csv")]
extern crate csv;
#[macro_use]
extern crate failure;
extern crate itertools;
extern crate ndarray;
extern crate rand;
extern crate rand_distr;
extern crate rand_xorshift;
extern crate rayon;
extern crate serde;
extern crate sprs;
extern crate tracing;

use std::collections::HashSet;

pub mod data;
#[cfg(feature = "csv")]
pub mod datasets;
pub mod evaluation;
pub mod matrix;
pub mod models;
pub mod ranking;
pub mod text;

/// Alias for external user identifiers.
pub type UserId = u64;
/// Alias for external item identifiers.
pub type ItemId = u64;

/// Invalid hyperparameter errors, reported by `build()`.
#[derive(Debug, Fail, PartialEq)]
pub enum ConfigError {
    /// The neighbourhood size must be at least one.
    #[fail(display = "Neighbourhood size must be positive.")]
    InvalidNeighborhoodSize,
    /// The latent dimension must be at least one.
    #[fail(display = "Latent dimension must be positive.")]
    InvalidLatentDim,
    /// The minibatch size must be at least one.
    #[fail(display = "Minibatch size must be positive.")]
    InvalidMinibatchSize,
    /// Learning rate is not a positive finite number.
    #[fail(display = "Learning rate must be positive and finite, got {}.", _0)]
    InvalidLearningRate(f32),
    /// L2 penalty is negative or not finite.
    #[fail(display = "L2 penalty must be non-negative and finite, got {}.", _0)]
    InvalidL2Penalty(f32),
    /// Initialisation distribution parameters are not usable.
    #[fail(
        display = "Invalid initialisation distribution: mean {}, std {}.",
        mean, std
    )]
    InvalidInitialisation {
        /// Requested mean.
        mean: f32,
        /// Requested standard deviation.
        std: f32,
    },
    /// Positive rating threshold is not a finite number.
    #[fail(display = "Positive threshold must be finite, got {}.", _0)]
    InvalidPositiveThreshold(f32),
    /// Profile type name not recognised.
    #[fail(display = "Unknown profile type: {}.", _0)]
    UnknownProfileType(String),
}

/// Model fitting error types.
#[derive(Debug, Fail, PartialEq)]
pub enum FittingError {
    /// No ratings were given.
    #[fail(display = "No ratings provided.")]
    NoInteractions,
    /// A rating value is NaN or infinite.
    #[fail(display = "Invalid rating for user {} and item {}.", user_id, item_id)]
    InvalidRating {
        /// Offending user.
        user_id: UserId,
        /// Offending item.
        item_id: ItemId,
    },
    /// The model needs item metadata but none was supplied.
    #[fail(display = "Item metadata is required to build this model.")]
    MissingItemMetadata,
    /// The same item appears twice in the item metadata.
    #[fail(display = "Duplicate item in metadata: {}.", _0)]
    DuplicateItem(ItemId),
    /// A rated item has no metadata.
    #[fail(display = "Unknown item id: {}.", _0)]
    UnknownItem(ItemId),
    /// The text corpus is empty.
    #[fail(display = "Cannot vectorize an empty corpus.")]
    EmptyCorpus,
    /// Every token was filtered out of the corpus.
    #[fail(display = "Empty vocabulary: all documents contain only stop words.")]
    EmptyVocabulary,
}

/// Prediction error types.
#[derive(Debug, Fail, PartialEq)]
pub enum PredictionError {
    /// The model has not been built yet.
    #[fail(display = "Model must be fitted first.")]
    NotFitted,
    /// The user id was not seen when building the model.
    #[fail(display = "Unknown user id: {}.", _0)]
    UnknownUser(UserId),
    /// The item id was not seen when building the model.
    #[fail(display = "Unknown item id: {}.", _0)]
    UnknownItem(ItemId),
    /// The user has no positive ratings to build a profile from.
    #[fail(display = "User {} has no profile.", _0)]
    NoProfile(UserId),
    /// Failed prediction due to numerical issues.
    #[fail(display = "Invalid prediction value: non-finite or not a number.")]
    InvalidPredictionValue,
}

/// The common contract of all recommenders: build from historical ratings
/// (and optionally item metadata), then rank unseen items for a user.
pub trait Recommender {
    /// Build the model from scratch. Any previously built state is discarded.
    fn build_model(
        &mut self,
        ratings: &[data::Rating],
        items: Option<&[data::ItemMetadata]>,
    ) -> Result<(), FittingError>;
    /// Return up to `top_n` items the user has not rated, best first.
    ///
    /// If `from_item_ids` is given, only those items are considered; every
    /// one of them must be known to the model.
    fn recommend(
        &self,
        user_id: UserId,
        from_item_ids: Option<&HashSet<ItemId>>,
        top_n: usize,
    ) -> Result<Vec<ItemId>, PredictionError>;
}

/// Models that predict an explicit rating for a (user, item) pair.
pub trait RatingPredictor {
    /// Predict the rating `user_id` would give `item_id`.
    fn predict(&self, user_id: UserId, item_id: ItemId) -> Result<f32, PredictionError>;
}
