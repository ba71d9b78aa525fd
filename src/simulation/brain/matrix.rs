//! Dense row-major `f32` matrix used for weights, noise and gradient buffers.

use ndarray::{Array2, ArrayView1, ArrayViewMut1, Zip};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;

use crate::simulation::rng::RandomStream;

/// A dense 2-D buffer with the elementwise operations the ES loop needs.
///
/// Binary operations require equal shapes; a mismatch is a programmer error and
/// panics.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    values: Array2<f32>,
}

impl Matrix {
    /// Zero-filled `rows × cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            values: Array2::zeros((rows, cols)),
        }
    }

    /// Matrix with entries drawn from `U(-scale, scale)`.
    pub fn random_uniform(rows: usize, cols: usize, scale: f32, rng: &mut RandomStream) -> Self {
        if scale == 0.0 {
            return Self::zeros(rows, cols);
        }
        Self {
            values: Array2::random_using((rows, cols), Uniform::new(-scale, scale), rng),
        }
    }

    /// Builds a matrix from row-major values.
    ///
    /// # Panics
    ///
    /// Panics if `values.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, values: Vec<f32>) -> Self {
        let values = Array2::from_shape_vec((rows, cols), values)
            .expect("value count does not match matrix shape");
        Self { values }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` when the matrix has no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One row as a view.
    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.values.row(index)
    }

    /// One row as a mutable view.
    pub fn row_mut(&mut self, index: usize) -> ArrayViewMut1<'_, f32> {
        self.values.row_mut(index)
    }

    /// One column as a view.
    pub fn column(&self, index: usize) -> ArrayView1<'_, f32> {
        self.values.column(index)
    }

    /// Row-major iterator over all entries.
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.values.iter()
    }

    /// Row-major mutable iterator over all entries.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.values.iter_mut()
    }

    /// Entry at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[[row, col]]
    }

    /// Sets every entry to zero.
    pub fn zero(&mut self) {
        self.values.fill(0.0);
    }

    /// Overwrites this matrix with `other`.
    pub fn copy_from(&mut self, other: &Matrix) {
        self.check_shape(other);
        self.values.assign(&other.values);
    }

    /// `self += other`.
    pub fn add(&mut self, other: &Matrix) {
        self.check_shape(other);
        self.values += &other.values;
    }

    /// `self *= factor`.
    pub fn scale(&mut self, factor: f32) {
        self.values *= factor;
    }

    /// Adds `N(0, sigma²)` noise to every entry, in row-major order.
    pub fn add_noise(&mut self, rng: &mut RandomStream, sigma: f32) {
        self.values
            .iter_mut()
            .for_each(|value| *value += rng.next_normal(0.0, sigma));
    }

    /// Replaces every entry with `N(0, sigma²)` noise, in row-major order.
    ///
    /// Consumes exactly the draws [`Matrix::add_noise`] would, so replaying a
    /// forked stream recovers the noise that was added.
    pub fn set_noise(&mut self, rng: &mut RandomStream, sigma: f32) {
        self.values
            .iter_mut()
            .for_each(|value| *value = rng.next_normal(0.0, sigma));
    }

    /// Softmax over all entries, in place.
    pub fn softmax(&mut self) {
        let max = self.values.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
        self.values.mapv_inplace(|x| (x - max).exp());
        let sum = self.values.sum();
        self.values /= sum;
    }

    /// Sum of squared entries.
    pub fn squared_norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum()
    }

    /// Sum of squared entrywise differences to `other`.
    pub fn squared_distance(&self, other: &Matrix) -> f32 {
        self.check_shape(other);
        Zip::from(&self.values)
            .and(&other.values)
            .fold(0.0, |acc, &a, &b| acc + (a - b) * (a - b))
    }

    fn check_shape(&self, other: &Matrix) {
        assert_eq!(
            self.values.dim(),
            other.values.dim(),
            "matrix shape mismatch"
        );
    }
}
