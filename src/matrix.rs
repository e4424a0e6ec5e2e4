//! Sparse storage for ratings and term weights, on top of `sprs`.
use std::collections::HashSet;

use sprs::{CsMat, TriMat};

use super::data::{IdMap, Rating};
use super::{FittingError, ItemId, UserId};

/// Borrowed view of one outer slice (a row of a CSR matrix, a column of a
/// CSC matrix).
#[derive(Clone, Copy, Debug)]
pub struct SparseRow<'a> {
    /// Inner indices of the stored entries, ascending.
    pub indices: &'a [usize],
    /// Stored values, aligned with `indices`.
    pub values: &'a [f32],
}

impl<'a> SparseRow<'a> {
    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the row has no stored entries.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Value at column `col`, or `None` if not stored.
    pub fn get(&self, col: usize) -> Option<f32> {
        self.indices
            .binary_search(&col)
            .ok()
            .map(|pos| self.values[pos])
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + 'a {
        let (indices, values) = (self.indices, self.values);
        indices.iter().cloned().zip(values.iter().cloned())
    }
}

/// Outer slice `outer` of `matrix`, borrowing its index and data arrays.
pub fn sparse_row(matrix: &CsMat<f32>, outer: usize) -> SparseRow {
    let range = matrix.indptr().outer_inds_sz(outer);

    SparseRow {
        indices: &matrix.indices()[range.clone()],
        values: &matrix.data()[range],
    }
}

/// Build a CSR matrix from per-row `(column, value)` lists.
pub fn csr_from_rows<I>(num_cols: usize, rows: I) -> CsMat<f32>
where
    I: IntoIterator<Item = Vec<(usize, f32)>>,
{
    let rows: Vec<_> = rows.into_iter().collect();
    let nnz = rows.iter().map(|row| row.len()).sum();

    let mut triplets = TriMat::with_capacity((rows.len(), num_cols), nnz);

    for (row_idx, row) in rows.into_iter().enumerate() {
        for (col, value) in row {
            triplets.add_triplet(row_idx, col, value);
        }
    }

    triplets.to_csr()
}

/// A new CSR matrix made of the given rows of `matrix`, in the given order.
pub fn select_rows(matrix: &CsMat<f32>, rows: &[usize]) -> CsMat<f32> {
    csr_from_rows(
        matrix.cols(),
        rows.iter().map(|&row| sparse_row(matrix, row).iter().collect()),
    )
}

/// Sparse user by item matrix of observed ratings.
///
/// A missing entry means "not rated", never a rating of zero. The matrix is
/// read-only once built.
#[derive(Clone, Debug)]
pub struct RatingMatrix {
    users: IdMap<UserId>,
    items: IdMap<ItemId>,
    by_user: CsMat<f32>,
    by_item: CsMat<f32>,
    user_averages: Vec<f32>,
}

impl RatingMatrix {
    /// Build the matrix and its id mappings from raw ratings.
    ///
    /// At most one rating per (user, item) pair is assumed. Duplicates
    /// would be summed.
    pub fn from_ratings(ratings: &[Rating]) -> Result<RatingMatrix, FittingError> {
        if ratings.is_empty() {
            return Err(FittingError::NoInteractions);
        }

        if let Some(invalid) = ratings.iter().find(|x| !x.rating().is_finite()) {
            return Err(FittingError::InvalidRating {
                user_id: invalid.user_id(),
                item_id: invalid.item_id(),
            });
        }

        let users = IdMap::from_ids(ratings.iter().map(|x| x.user_id()));
        let items = IdMap::from_ids(ratings.iter().map(|x| x.item_id()));

        let mut triplets = TriMat::with_capacity((users.len(), items.len()), ratings.len());

        for rating in ratings {
            // Both lookups succeed: the maps were built from these ratings.
            if let (Some(user_idx), Some(item_idx)) = (
                users.index_of(&rating.user_id()),
                items.index_of(&rating.item_id()),
            ) {
                triplets.add_triplet(user_idx, item_idx, rating.rating());
            }
        }

        let by_user: CsMat<f32> = triplets.to_csr();
        let by_item = by_user.to_csc();

        let user_averages = (0..users.len())
            .map(|user_idx| {
                let row = sparse_row(&by_user, user_idx);
                if row.is_empty() {
                    0.0
                } else {
                    row.values.iter().sum::<f32>() / row.len() as f32
                }
            })
            .collect();

        Ok(RatingMatrix {
            users,
            items,
            by_user,
            by_item,
            user_averages,
        })
    }

    /// Rating of `item_idx` by `user_idx`, if observed.
    pub fn get(&self, user_idx: usize, item_idx: usize) -> Option<f32> {
        self.row(user_idx).get(item_idx)
    }

    /// All ratings by `user_idx`, keyed by item index.
    pub fn row(&self, user_idx: usize) -> SparseRow {
        sparse_row(&self.by_user, user_idx)
    }

    /// Users (ascending index) who rated `item_idx`.
    pub fn column(&self, item_idx: usize) -> &[usize] {
        let range = self.by_item.indptr().outer_inds_sz(item_idx);
        &self.by_item.indices()[range]
    }

    /// Ratings of `item_idx`, keyed by user index.
    pub fn column_ratings(&self, item_idx: usize) -> SparseRow {
        sparse_row(&self.by_item, item_idx)
    }

    /// Mean of the ratings given by `user_idx`.
    pub fn user_average(&self, user_idx: usize) -> f32 {
        self.user_averages[user_idx]
    }

    /// Number of ratings given by `user_idx`.
    pub fn user_count(&self, user_idx: usize) -> usize {
        self.by_user.indptr().outer_inds_sz(user_idx).len()
    }

    /// User id mapping.
    pub fn users(&self) -> &IdMap<UserId> {
        &self.users
    }

    /// Item id mapping.
    pub fn items(&self) -> &IdMap<ItemId> {
        &self.items
    }

    /// Number of users.
    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    /// Number of items.
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// Number of observed ratings.
    pub fn len(&self) -> usize {
        self.by_user.nnz()
    }

    /// Whether there are no ratings. Never true for a built matrix.
    pub fn is_empty(&self) -> bool {
        self.by_user.nnz() == 0
    }

    /// External ids of the items rated by `user_idx`.
    pub fn rated_items(&self, user_idx: usize) -> HashSet<ItemId> {
        self.row(user_idx)
            .indices
            .iter()
            .map(|&item_idx| self.items.id_of(item_idx))
            .collect()
    }

    /// Iterate over `(user_idx, item_idx, rating)` in user-major order.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (usize, usize, f32)> + 'a {
        (0..self.num_users()).flat_map(move |user_idx| {
            self.row(user_idx)
                .iter()
                .map(move |(item_idx, rating)| (user_idx, item_idx, rating))
        })
    }

    /// Mean of all observed ratings.
    pub fn mean(&self) -> f32 {
        let values = self.by_user.data();
        values.iter().sum::<f32>() / values.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    fn ratings() -> Vec<Rating> {
        vec![
            Rating::new(20, 7, 4.0),
            Rating::new(10, 3, 5.0),
            Rating::new(10, 5, 3.0),
            Rating::new(20, 3, 2.0),
            Rating::new(30, 5, 1.0),
        ]
    }

    #[test]
    fn csr_rows_are_sorted() {
        let mat = csr_from_rows(4, vec![vec![(3, 1.0), (0, 2.0)], vec![], vec![(1, 5.0)]]);

        assert_eq!(mat.shape(), (3, 4));
        assert!(mat.is_csr());
        assert_eq!(sparse_row(&mat, 0).indices, &[0, 3]);
        assert_eq!(sparse_row(&mat, 0).values, &[2.0, 1.0]);
        assert!(sparse_row(&mat, 1).is_empty());
        assert_eq!(sparse_row(&mat, 2).get(1), Some(5.0));
        assert_eq!(sparse_row(&mat, 2).get(2), None);
    }

    #[test]
    fn csc_copy_gives_columns() {
        let mat = csr_from_rows(3, vec![vec![(0, 1.0), (2, 2.0)], vec![(2, 3.0)]]);
        let by_col = mat.to_csc();

        assert_eq!(by_col.shape(), (2, 3));
        assert_eq!(sparse_row(&by_col, 2).indices, &[0, 1]);
        assert_eq!(sparse_row(&by_col, 2).values, &[2.0, 3.0]);
        assert!(sparse_row(&by_col, 1).is_empty());
    }

    #[test]
    fn select_and_kernel() {
        let mat = csr_from_rows(3, vec![vec![(0, 1.0)], vec![(1, 2.0), (2, 1.0)]]);
        let selected = select_rows(&mat, &[1, 0, 1]);

        assert_eq!(selected.rows(), 3);
        assert_eq!(sparse_row(&selected, 0).values, &[2.0, 1.0]);

        let dense = arr1(&[1.0, 0.5, 2.0]);
        let scores = &selected * &dense;
        assert_eq!(scores, arr1(&[3.0, 1.0, 3.0]));
    }

    #[test]
    fn rating_matrix_keeps_zero_ratings() {
        let mat = RatingMatrix::from_ratings(&[Rating::new(1, 1, 0.0), Rating::new(1, 2, 4.0)])
            .unwrap();

        assert_eq!(mat.len(), 2);
        assert_eq!(mat.get(0, 0), Some(0.0));
        assert_eq!(mat.user_average(0), 2.0);
        assert_eq!(mat.column(0), &[0]);
    }

    #[test]
    fn rating_matrix_indexing() {
        let mat = RatingMatrix::from_ratings(&ratings()).unwrap();

        assert_eq!(mat.num_users(), 3);
        assert_eq!(mat.num_items(), 3);
        assert_eq!(mat.len(), 5);

        let user = mat.users().index_of(&10).unwrap();
        let item = mat.items().index_of(&5).unwrap();

        assert_eq!(mat.get(user, item), Some(3.0));
        assert_eq!(mat.get(mat.users().index_of(&30).unwrap(), 0), None);
        assert_eq!(mat.user_count(user), 2);
        assert_eq!(mat.user_average(user), 4.0);
        assert_eq!(mat.column(item), &[0, 2]);
        assert_eq!(mat.mean(), 3.0);

        let rated = mat.rated_items(mat.users().index_of(&20).unwrap());
        assert!(rated.contains(&3) && rated.contains(&7));
        assert_eq!(rated.len(), 2);
    }

    #[test]
    fn rating_matrix_iterates_all_entries() {
        let mat = RatingMatrix::from_ratings(&ratings()).unwrap();
        let triples: Vec<_> = mat.iter().collect();

        assert_eq!(
            triples,
            vec![
                (0, 0, 5.0),
                (0, 1, 3.0),
                (1, 0, 2.0),
                (1, 2, 4.0),
                (2, 1, 1.0),
            ]
        );
    }

    #[test]
    fn rejects_empty_and_invalid() {
        assert_eq!(
            RatingMatrix::from_ratings(&[]).unwrap_err(),
            FittingError::NoInteractions
        );
        assert_eq!(
            RatingMatrix::from_ratings(&[Rating::new(1, 2, std::f32::NAN)]).unwrap_err(),
            FittingError::InvalidRating {
                user_id: 1,
                item_id: 2
            }
        );
    }
}
