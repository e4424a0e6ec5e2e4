//! Biased matrix factorization for explicit ratings, trained with
//! stochastic gradient descent.
//!
//! A rating is modelled as
//! `P[u] . Q[i] + mean + user_bias[u] + item_bias[i]`, with the global
//! mean and the bias terms optional.
use std::collections::{HashMap, HashSet};

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rand_xorshift::XorShiftRng;
use tracing::{debug, info};

use super::super::data::{ItemMetadata, Rating};
use super::super::matrix::RatingMatrix;
use super::super::ranking::{check_candidates, rank};
use super::super::{
    ConfigError, FittingError, ItemId, PredictionError, RatingPredictor, Recommender, UserId,
};

/// Hyperparameters for the [`MatrixFactorization`] model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hyperparameters {
    latent_dim: usize,
    learning_rate: f32,
    l2_penalty: f32,
    num_epochs: usize,
    minibatch_size: usize,
    with_average: bool,
    with_biases: bool,
    init_mean: f32,
    init_std: f32,
    rng: XorShiftRng,
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
            latent_dim: 5,
            learning_rate: 0.002,
            l2_penalty: 0.0,
            num_epochs: 5,
            minibatch_size: 1,
            with_average: true,
            with_biases: true,
            init_mean: 0.0,
            init_std: 0.1,
            rng: XorShiftRng::from_seed(thread_rng().gen()),
        }
    }

    /// Set the number of latent factors.
    pub fn latent_dim(mut self, latent_dim: usize) -> Self {
        self.latent_dim = latent_dim;
        self
    }

    /// Set the learning rate.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the L2 penalty applied to factors and biases.
    pub fn l2_penalty(mut self, l2_penalty: f32) -> Self {
        self.l2_penalty = l2_penalty;
        self
    }

    /// Set the number of training epochs.
    pub fn num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Set the minibatch size. A size of one is plain SGD.
    pub fn minibatch_size(mut self, minibatch_size: usize) -> Self {
        self.minibatch_size = minibatch_size;
        self
    }

    /// Whether to model the global rating mean.
    pub fn with_average(mut self, with_average: bool) -> Self {
        self.with_average = with_average;
        self
    }

    /// Whether to learn per-user and per-item biases.
    pub fn with_biases(mut self, with_biases: bool) -> Self {
        self.with_biases = with_biases;
        self
    }

    /// Set the mean and standard deviation of the normal distribution the
    /// latent factors are initialised from.
    pub fn initialisation(mut self, mean: f32, std: f32) -> Self {
        self.init_mean = mean;
        self.init_std = std;
        self
    }

    /// Set the random number generator from a seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = XorShiftRng::seed_from_u64(seed);
        self
    }

    /// Set the random number generator from raw seed bytes.
    pub fn from_seed(mut self, seed: [u8; 16]) -> Self {
        self.rng = XorShiftRng::from_seed(seed);
        self
    }

    /// Validate the hyperparameters and build an unfitted model.
    pub fn build(self) -> Result<MatrixFactorization, ConfigError> {
        if self.latent_dim == 0 {
            return Err(ConfigError::InvalidLatentDim);
        }

        if self.minibatch_size == 0 {
            return Err(ConfigError::InvalidMinibatchSize);
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }

        if !(self.l2_penalty.is_finite() && self.l2_penalty >= 0.0) {
            return Err(ConfigError::InvalidL2Penalty(self.l2_penalty));
        }

        let invalid_init = ConfigError::InvalidInitialisation {
            mean: self.init_mean,
            std: self.init_std,
        };

        if !self.init_mean.is_finite() || !(self.init_std.is_finite() && self.init_std >= 0.0) {
            return Err(invalid_init);
        }

        let init = Normal::new(self.init_mean, self.init_std).map_err(|_| invalid_init)?;

        Ok(MatrixFactorization {
            hyper: self,
            init,
            model: None,
        })
    }
}

#[derive(Clone, Debug)]
struct Biases {
    user: Array1<f32>,
    item: Array1<f32>,
}

#[derive(Clone, Debug)]
struct Parameters {
    user_factors: Array2<f32>,
    item_factors: Array2<f32>,
    biases: Option<Biases>,
    mean: f32,
}

impl Parameters {
    fn new<R: Rng>(
        ratings: &RatingMatrix,
        hyper: &Hyperparameters,
        init: &Normal<f32>,
        rng: &mut R,
    ) -> Self {
        let latent_dim = hyper.latent_dim;

        let user_factors =
            Array2::from_shape_fn((ratings.num_users(), latent_dim), |_| init.sample(&mut *rng));
        let item_factors =
            Array2::from_shape_fn((ratings.num_items(), latent_dim), |_| init.sample(&mut *rng));

        let biases = if hyper.with_biases {
            Some(Biases {
                user: Array1::zeros(ratings.num_users()),
                item: Array1::zeros(ratings.num_items()),
            })
        } else {
            None
        };

        let mean = if hyper.with_average {
            ratings.mean()
        } else {
            0.0
        };

        Parameters {
            user_factors,
            item_factors,
            biases,
            mean,
        }
    }

    fn predict(&self, user: usize, item: usize) -> f32 {
        let mut prediction =
            self.user_factors.row(user).dot(&self.item_factors.row(item)) + self.mean;

        if let Some(ref biases) = self.biases {
            prediction += biases.user[user] + biases.item[item];
        }

        prediction
    }

    /// Scores of every item for `user`.
    fn predict_user(&self, user: usize) -> Array1<f32> {
        let mut scores = self.item_factors.dot(&self.user_factors.row(user)) + self.mean;

        if let Some(ref biases) = self.biases {
            scores += &biases.item;
            scores += biases.user[user];
        }

        scores
    }

    /// One pass of per-sample SGD over `triples`; returns the summed squared
    /// error. Both factor updates read the factors as they were before the
    /// step.
    fn sgd_epoch(&mut self, triples: &[(usize, usize, f32)], eta: f32, lam: f32) -> f32 {
        let mut squared_error = 0.0;

        for &(user, item, rating) in triples {
            let error = rating - self.predict(user, item);
            squared_error += error * error;

            let user_factors = self.user_factors.row(user);
            let item_factors = self.item_factors.row(item);

            let user_grad = &item_factors * error - &user_factors * lam;
            let item_grad = &user_factors * error - &item_factors * lam;

            self.user_factors.row_mut(user).scaled_add(eta, &user_grad);
            self.item_factors.row_mut(item).scaled_add(eta, &item_grad);

            if let Some(ref mut biases) = self.biases {
                let user_bias = biases.user[user];
                let item_bias = biases.item[item];

                biases.user[user] += eta * (error - lam * user_bias);
                biases.item[item] += eta * (error - lam * item_bias);
            }
        }

        squared_error
    }

    /// One pass of minibatch gradient descent over `triples`. Errors within
    /// a batch use the parameters from before the batch; gradients are
    /// summed per row and applied scaled by `eta / batch_len`.
    fn minibatch_epoch(
        &mut self,
        triples: &[(usize, usize, f32)],
        minibatch_size: usize,
        eta: f32,
        lam: f32,
    ) -> f32 {
        let latent_dim = self.user_factors.ncols();
        let mut squared_error = 0.0;

        for batch in triples.chunks(minibatch_size) {
            let mut user_grads: HashMap<usize, Array1<f32>> = HashMap::new();
            let mut item_grads: HashMap<usize, Array1<f32>> = HashMap::new();
            let mut user_bias_grads: HashMap<usize, f32> = HashMap::new();
            let mut item_bias_grads: HashMap<usize, f32> = HashMap::new();

            for &(user, item, rating) in batch {
                let error = rating - self.predict(user, item);
                squared_error += error * error;

                let user_factors = self.user_factors.row(user);
                let item_factors = self.item_factors.row(item);

                let user_grad = user_grads
                    .entry(user)
                    .or_insert_with(|| Array1::zeros(latent_dim));
                user_grad.scaled_add(error, &item_factors);
                user_grad.scaled_add(-lam, &user_factors);

                let item_grad = item_grads
                    .entry(item)
                    .or_insert_with(|| Array1::zeros(latent_dim));
                item_grad.scaled_add(error, &user_factors);
                item_grad.scaled_add(-lam, &item_factors);

                if let Some(ref biases) = self.biases {
                    *user_bias_grads.entry(user).or_insert(0.0) +=
                        error - lam * biases.user[user];
                    *item_bias_grads.entry(item).or_insert(0.0) +=
                        error - lam * biases.item[item];
                }
            }

            let step = eta / batch.len() as f32;

            for (user, grad) in user_grads {
                self.user_factors.row_mut(user).scaled_add(step, &grad);
            }

            for (item, grad) in item_grads {
                self.item_factors.row_mut(item).scaled_add(step, &grad);
            }

            if let Some(ref mut biases) = self.biases {
                for (user, grad) in user_bias_grads {
                    biases.user[user] += step * grad;
                }

                for (item, grad) in item_bias_grads {
                    biases.item[item] += step * grad;
                }
            }
        }

        squared_error
    }
}

#[derive(Clone, Debug)]
struct ModelData {
    ratings: RatingMatrix,
    params: Parameters,
    epoch_losses: Vec<f32>,
}

/// Biased matrix factorization model for explicit ratings.
#[derive(Clone, Debug)]
pub struct MatrixFactorization {
    hyper: Hyperparameters,
    init: Normal<f32>,
    model: Option<ModelData>,
}

impl MatrixFactorization {
    /// Fit the model from scratch, returning the mean squared error of the
    /// final epoch (zero if no epochs are run).
    ///
    /// Fitting twice with the same hyperparameters gives identical
    /// parameters.
    pub fn fit(&mut self, ratings: &[Rating]) -> Result<f32, FittingError> {
        self.model = None;

        let matrix = RatingMatrix::from_ratings(ratings)?;
        let mut rng = self.hyper.rng.clone();

        info!(
            num_users = matrix.num_users(),
            num_items = matrix.num_items(),
            num_ratings = matrix.len(),
            "Fitting matrix factorization model"
        );

        let mut params = Parameters::new(&matrix, &self.hyper, &self.init, &mut rng);

        let mut triples: Vec<(usize, usize, f32)> = matrix.iter().collect();
        triples.shuffle(&mut rng);

        let eta = self.hyper.learning_rate;
        let lam = self.hyper.l2_penalty;
        let mut epoch_losses = Vec::with_capacity(self.hyper.num_epochs);

        for epoch in 0..self.hyper.num_epochs {
            let squared_error = if self.hyper.minibatch_size == 1 {
                params.sgd_epoch(&triples, eta, lam)
            } else {
                params.minibatch_epoch(&triples, self.hyper.minibatch_size, eta, lam)
            };

            let loss = squared_error / triples.len() as f32;
            debug!(epoch, loss, "Finished epoch");

            epoch_losses.push(loss);
        }

        let loss = epoch_losses.last().cloned().unwrap_or(0.0);

        self.model = Some(ModelData {
            ratings: matrix,
            params,
            epoch_losses,
        });

        Ok(loss)
    }

    fn model(&self) -> Result<&ModelData, PredictionError> {
        self.model.as_ref().ok_or(PredictionError::NotFitted)
    }

    fn indices(
        model: &ModelData,
        user_id: UserId,
        item_id: ItemId,
    ) -> Result<(usize, usize), PredictionError> {
        let user = model
            .ratings
            .users()
            .index_of(&user_id)
            .ok_or(PredictionError::UnknownUser(user_id))?;
        let item = model
            .ratings
            .items()
            .index_of(&item_id)
            .ok_or(PredictionError::UnknownItem(item_id))?;

        Ok((user, item))
    }

    /// Predict ratings for many `(user, item)` pairs at once by gathering
    /// the relevant factor rows.
    pub fn predict_batch(
        &self,
        pairs: &[(UserId, ItemId)],
    ) -> Result<Array1<f32>, PredictionError> {
        let model = self.model()?;

        let (users, items): (Vec<usize>, Vec<usize>) = pairs
            .iter()
            .map(|&(user_id, item_id)| Self::indices(model, user_id, item_id))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unzip();

        let params = &model.params;
        let user_factors = params.user_factors.select(Axis(0), &users);
        let item_factors = params.item_factors.select(Axis(0), &items);

        let mut predictions = (user_factors * item_factors).sum_axis(Axis(1)) + params.mean;

        if let Some(ref biases) = params.biases {
            predictions += &biases.user.select(Axis(0), &users);
            predictions += &biases.item.select(Axis(0), &items);
        }

        if predictions.iter().all(|x| x.is_finite()) {
            Ok(predictions)
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }

    /// Mean squared training error of every epoch run by the last fit.
    pub fn epoch_losses(&self) -> Result<&[f32], PredictionError> {
        Ok(&self.model()?.epoch_losses)
    }

    /// Root mean squared error of the fitted model on its training ratings.
    pub fn training_rmse(&self) -> Result<f32, PredictionError> {
        let model = self.model()?;

        let squared_error: f32 = model
            .ratings
            .iter()
            .map(|(user, item, rating)| {
                let error = rating - model.params.predict(user, item);
                error * error
            })
            .sum();

        Ok((squared_error / model.ratings.len() as f32).sqrt())
    }

    /// Latent factors of `user_id`.
    pub fn user_factors(&self, user_id: UserId) -> Result<ArrayView1<f32>, PredictionError> {
        let model = self.model()?;
        let user = model
            .ratings
            .users()
            .index_of(&user_id)
            .ok_or(PredictionError::UnknownUser(user_id))?;

        Ok(model.params.user_factors.row(user))
    }

    /// Latent factors of `item_id`.
    pub fn item_factors(&self, item_id: ItemId) -> Result<ArrayView1<f32>, PredictionError> {
        let model = self.model()?;
        let item = model
            .ratings
            .items()
            .index_of(&item_id)
            .ok_or(PredictionError::UnknownItem(item_id))?;

        Ok(model.params.item_factors.row(item))
    }
}

impl RatingPredictor for MatrixFactorization {
    fn predict(&self, user_id: UserId, item_id: ItemId) -> Result<f32, PredictionError> {
        let model = self.model()?;
        let (user, item) = Self::indices(model, user_id, item_id)?;

        let prediction = model.params.predict(user, item);

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(PredictionError::InvalidPredictionValue)
        }
    }
}

impl Recommender for MatrixFactorization {
    fn build_model(
        &mut self,
        ratings: &[Rating],
        _items: Option<&[ItemMetadata]>,
    ) -> Result<(), FittingError> {
        self.fit(ratings).map(|_| ())
    }

    fn recommend(
        &self,
        user_id: UserId,
        from_item_ids: Option<&HashSet<ItemId>>,
        top_n: usize,
    ) -> Result<Vec<ItemId>, PredictionError> {
        let model = self.model()?;
        let user = model
            .ratings
            .users()
            .index_of(&user_id)
            .ok_or(PredictionError::UnknownUser(user_id))?;

        check_candidates(from_item_ids, model.ratings.items())?;

        let scores = model.params.predict_user(user);

        rank(
            model.ratings.items().ids(),
            &model.ratings.rated_items(user),
            from_item_ids,
            top_n,
            |idx, _| scores[idx],
        )
    }
}
