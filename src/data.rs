//! Rating records, item metadata, and the external/internal id mapping.
use std::collections::HashMap;
use std::hash::Hash;

use rand::seq::SliceRandom;
use rand::Rng;

use super::{ItemId, UserId};

/// A single explicit rating.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Rating {
    #[serde(rename = "user")]
    user_id: UserId,
    #[serde(rename = "item")]
    item_id: ItemId,
    rating: f32,
}

impl Rating {
    /// Create a new rating.
    pub fn new(user_id: UserId, item_id: ItemId, rating: f32) -> Self {
        Rating {
            user_id,
            item_id,
            rating,
        }
    }

    /// The rating user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The rated item.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// The rating value; higher is better.
    pub fn rating(&self) -> f32 {
        self.rating
    }
}

/// Descriptive metadata for one item, used by the content-based model.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ItemMetadata {
    /// External item id.
    pub item_id: ItemId,
    /// Display title.
    pub title: String,
    /// Free-text plot summary.
    pub plot: String,
    /// Free-text metadata: genres, cast, keywords.
    pub metadata: String,
}

/// Randomly split ratings into `(train, test)`, with `test_fraction` of
/// the ratings going to the test set.
pub fn train_test_split<R: Rng>(
    ratings: &[Rating],
    rng: &mut R,
    test_fraction: f32,
) -> (Vec<Rating>, Vec<Rating>) {
    let mut shuffled = ratings.to_owned();
    shuffled.shuffle(rng);

    let test_size = (test_fraction.max(0.0).min(1.0) * shuffled.len() as f32) as usize;
    let train = shuffled.split_off(test_size);

    (train, shuffled)
}

/// Bijection between external ids and dense internal indices.
///
/// Internal indices are assigned by sorting the distinct external ids in
/// ascending order, so building twice from the same data gives the same
/// mapping.
#[derive(Clone, Debug)]
pub struct IdMap<T> {
    ids: Vec<T>,
    indices: HashMap<T, usize>,
}

impl<T: Ord + Hash + Copy> IdMap<T> {
    /// Build the mapping from (possibly repeated) external ids.
    pub fn from_ids<I: IntoIterator<Item = T>>(ids: I) -> Self {
        let mut ids: Vec<T> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        let indices = ids.iter().enumerate().map(|(idx, &id)| (id, idx)).collect();

        IdMap { ids, indices }
    }

    /// Internal index of `id`, if known.
    pub fn index_of(&self, id: &T) -> Option<usize> {
        self.indices.get(id).cloned()
    }

    /// External id at internal index `idx`.
    ///
    /// Panics if `idx` is out of range: internal indices only come from
    /// this map.
    pub fn id_of(&self, idx: usize) -> T {
        self.ids[idx]
    }

    /// All external ids, in internal index order.
    pub fn ids(&self) -> &[T] {
        &self.ids
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` is known.
    pub fn contains(&self, id: &T) -> bool {
        self.indices.contains_key(id)
    }
}
