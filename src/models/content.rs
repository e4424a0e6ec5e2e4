//! Content-based recommendations from TF-IDF item profiles.
//!
//! Each item is described by the term weights of either its plot or its
//! metadata text. A user's profile is the rating-weighted sum of the items
//! they rated above a threshold, L2-normalized; items are scored by their
//! dot product with that profile.
use std::collections::{HashMap, HashSet};

use ndarray::Array1;
use sprs::CsMat;
use tracing::info;

use super::super::data::{IdMap, ItemMetadata, Rating};
use super::super::matrix::{select_rows, sparse_row, RatingMatrix};
use super::super::ranking::{check_candidates, rank};
use super::super::text::{StopWords, TextVectorizer, TfIdfVectorizer};
use super::super::{ConfigError, FittingError, ItemId, PredictionError, Recommender, UserId};
use super::ProfileType;

/// Hyperparameters for the [`ContentRecommender`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Hyperparameters {
    profile_type: ProfileType,
    positive_threshold: f32,
    stop_words: StopWords,
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
            profile_type: ProfileType::Plot,
            positive_threshold: 3.0,
            stop_words: StopWords::English,
        }
    }

    /// Set which item text profiles are built from.
    pub fn profile_type(mut self, profile_type: ProfileType) -> Self {
        self.profile_type = profile_type;
        self
    }

    /// Only ratings strictly above this value contribute to user profiles.
    pub fn positive_threshold(mut self, positive_threshold: f32) -> Self {
        self.positive_threshold = positive_threshold;
        self
    }

    /// Set the stop-word policy passed to the vectorizer.
    pub fn stop_words(mut self, stop_words: StopWords) -> Self {
        self.stop_words = stop_words;
        self
    }

    /// Build an unfitted model using the TF-IDF vectorizer.
    pub fn build(self) -> Result<ContentRecommender, ConfigError> {
        self.build_with_vectorizer(Box::new(TfIdfVectorizer::new()))
    }

    /// Build an unfitted model using a custom vectorizer.
    pub fn build_with_vectorizer(
        self,
        vectorizer: Box<dyn TextVectorizer + Send + Sync>,
    ) -> Result<ContentRecommender, ConfigError> {
        if !self.positive_threshold.is_finite() {
            return Err(ConfigError::InvalidPositiveThreshold(
                self.positive_threshold,
            ));
        }

        Ok(ContentRecommender {
            hyper: self,
            vectorizer,
            model: None,
        })
    }
}

#[derive(Debug)]
struct ModelData {
    ratings: RatingMatrix,
    items: IdMap<ItemId>,
    titles: Vec<String>,
    term_weights: CsMat<f32>,
    vocabulary: Vec<String>,
    profiles: HashMap<UserId, Array1<f32>>,
}

impl ModelData {
    fn item_index(&self, item_id: ItemId) -> Result<usize, PredictionError> {
        self.items
            .index_of(&item_id)
            .ok_or(PredictionError::UnknownItem(item_id))
    }

    /// Rating-weighted, L2-normalized sum of the given items' term vectors.
    /// Fails with the first item id missing from the term space.
    fn user_profile<I>(&self, rated: I) -> Result<Array1<f32>, ItemId>
    where
        I: IntoIterator<Item = (ItemId, f32)>,
    {
        let mut profile: Array1<f32> = Array1::zeros(self.term_weights.cols());

        for (item_id, rating) in rated {
            let item = self.items.index_of(&item_id).ok_or(item_id)?;

            for (term, weight) in sparse_row(&self.term_weights, item).iter() {
                profile[term] += rating * weight;
            }
        }

        let norm = profile.dot(&profile).sqrt();
        if norm > 0.0 {
            profile /= norm;
        }

        Ok(profile)
    }

    fn user_profiles(
        &self,
        ratings: &[Rating],
        threshold: f32,
    ) -> Result<HashMap<UserId, Array1<f32>>, ItemId> {
        let mut by_user: HashMap<UserId, Vec<(ItemId, f32)>> = HashMap::new();

        for rating in ratings.iter().filter(|x| x.rating() > threshold) {
            by_user
                .entry(rating.user_id())
                .or_insert_with(Vec::new)
                .push((rating.item_id(), rating.rating()));
        }

        by_user
            .into_iter()
            .map(|(user_id, rated)| {
                self.user_profile(rated)
                    .map(|profile| (user_id, profile))
            })
            .collect()
    }

    fn profile(&self, user_id: UserId) -> Result<&Array1<f32>, PredictionError> {
        if self.ratings.users().index_of(&user_id).is_none() {
            return Err(PredictionError::UnknownUser(user_id));
        }

        self.profiles
            .get(&user_id)
            .ok_or(PredictionError::NoProfile(user_id))
    }
}

/// Content-based recommender over TF-IDF item profiles.
#[derive(Debug)]
pub struct ContentRecommender {
    hyper: Hyperparameters,
    vectorizer: Box<dyn TextVectorizer + Send + Sync>,
    model: Option<ModelData>,
}

impl ContentRecommender {
    fn model(&self) -> Result<&ModelData, PredictionError> {
        self.model.as_ref().ok_or(PredictionError::NotFitted)
    }

    /// Term vectors of the given items, one row per id in the given order.
    pub fn get_item_vectors(&self, item_ids: &[ItemId]) -> Result<CsMat<f32>, PredictionError> {
        let model = self.model()?;

        let rows = item_ids
            .iter()
            .map(|&item_id| model.item_index(item_id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(select_rows(&model.term_weights, &rows))
    }

    /// Profile of `user_id` built from their ratings in `ratings`. A user
    /// with no ratings there gets the zero vector.
    pub fn get_user_profile(
        &self,
        user_id: UserId,
        ratings: &[Rating],
    ) -> Result<Array1<f32>, PredictionError> {
        let model = self.model()?;

        model
            .user_profile(
                ratings
                    .iter()
                    .filter(|x| x.user_id() == user_id)
                    .map(|x| (x.item_id(), x.rating())),
            )
            .map_err(PredictionError::UnknownItem)
    }

    /// Profiles of every user with at least one rating above the positive
    /// threshold in `ratings`.
    pub fn build_user_profiles(
        &self,
        ratings: &[Rating],
    ) -> Result<HashMap<UserId, Array1<f32>>, PredictionError> {
        self.model()?
            .user_profiles(ratings, self.hyper.positive_threshold)
            .map_err(PredictionError::UnknownItem)
    }

    /// Scores of `item_ids` against the profile of `user_id`, in order.
    pub fn recommendation_scores(
        &self,
        user_id: UserId,
        item_ids: &[ItemId],
    ) -> Result<Vec<f32>, PredictionError> {
        let model = self.model()?;
        let profile = model.profile(user_id)?;

        let rows = item_ids
            .iter()
            .map(|&item_id| model.item_index(item_id))
            .collect::<Result<Vec<_>, _>>()?;

        let scores = &select_rows(&model.term_weights, &rows) * profile;

        Ok(scores.to_vec())
    }

    /// Titles of `item_ids`, in order.
    pub fn item_titles(&self, item_ids: &[ItemId]) -> Result<Vec<&str>, PredictionError> {
        let model = self.model()?;

        item_ids
            .iter()
            .map(|&item_id| Ok(model.titles[model.item_index(item_id)?].as_str()))
            .collect()
    }

    /// Terms of the active profile space; column `j` of every item vector
    /// weighs `vocabulary()[j]`.
    pub fn vocabulary(&self) -> Result<&[String], PredictionError> {
        Ok(&self.model()?.vocabulary)
    }
}

impl Recommender for ContentRecommender {
    fn build_model(
        &mut self,
        ratings: &[Rating],
        items: Option<&[ItemMetadata]>,
    ) -> Result<(), FittingError> {
        self.model = None;

        let items = items.ok_or(FittingError::MissingItemMetadata)?;
        let matrix = RatingMatrix::from_ratings(ratings)?;

        let mut metadata: Vec<&ItemMetadata> = items.iter().collect();
        metadata.sort_by_key(|x| x.item_id);

        if let Some(duplicate) = metadata
            .windows(2)
            .find(|pair| pair[0].item_id == pair[1].item_id)
        {
            return Err(FittingError::DuplicateItem(duplicate[0].item_id));
        }

        let item_ids = IdMap::from_ids(metadata.iter().map(|x| x.item_id));

        if let Some(&missing) = matrix
            .items()
            .ids()
            .iter()
            .find(|id| !item_ids.contains(id))
        {
            return Err(FittingError::UnknownItem(missing));
        }

        let corpus: Vec<&str> = metadata
            .iter()
            .map(|x| match self.hyper.profile_type {
                ProfileType::Plot => x.plot.as_str(),
                ProfileType::Metadata => x.metadata.as_str(),
            })
            .collect();

        let (term_weights, vocabulary) = self
            .vectorizer
            .fit_transform(&corpus, &self.hyper.stop_words)?;

        let mut model = ModelData {
            ratings: matrix,
            items: item_ids,
            titles: metadata.iter().map(|x| x.title.clone()).collect(),
            term_weights,
            vocabulary,
            profiles: HashMap::new(),
        };

        model.profiles = model
            .user_profiles(ratings, self.hyper.positive_threshold)
            .map_err(FittingError::UnknownItem)?;

        info!(
            profile_type = %self.hyper.profile_type,
            num_items = model.items.len(),
            num_terms = model.vocabulary.len(),
            num_profiles = model.profiles.len(),
            "Built content model"
        );

        self.model = Some(model);

        Ok(())
    }

    fn recommend(
        &self,
        user_id: UserId,
        from_item_ids: Option<&HashSet<ItemId>>,
        top_n: usize,
    ) -> Result<Vec<ItemId>, PredictionError> {
        let model = self.model()?;
        let profile = model.profile(user_id)?;

        check_candidates(from_item_ids, &model.items)?;

        let user = model
            .ratings
            .users()
            .index_of(&user_id)
            .ok_or(PredictionError::UnknownUser(user_id))?;

        let scores = &model.term_weights * profile;

        rank(
            model.items.ids(),
            &model.ratings.rated_items(user),
            from_item_ids,
            top_n,
            |idx, _| scores[idx],
        )
    }
}
