//! Flat row-major containers used for every per-frame and per-bone table.
//!
//! Both containers own their storage and bounds-check every access. Rows of
//! an [`Array2D`] are exposed as slices so hot loops can iterate without
//! repeated index arithmetic.

use std::ops::{Index, IndexMut};

/// One-dimensional owned buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array1D<T> {
    data: Vec<T>,
}

impl<T: Clone + Default> Array1D<T> {
    /// Create an array of `size` default-initialized elements
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![T::default(); size],
        }
    }

    /// Resize, keeping existing elements and default-filling new ones
    pub fn resize(&mut self, size: usize) {
        self.data.resize(size, T::default());
    }

    /// Reset every element to its default value
    pub fn zero(&mut self) {
        self.data.fill(T::default());
    }

    /// Overwrite every element with `value`
    pub fn set(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> Array1D<T> {
    pub fn from_vec(data: Vec<T>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T> Index<usize> for Array1D<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for Array1D<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.data[index]
    }
}

impl<T> From<Vec<T>> for Array1D<T> {
    fn from(data: Vec<T>) -> Self {
        Self::from_vec(data)
    }
}

/// Two-dimensional owned buffer stored row by row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array2D<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Clone + Default> Array2D<T> {
    /// Create a `rows × cols` array of default-initialized elements
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::default(); rows * cols],
            rows,
            cols,
        }
    }

    /// Change the shape. Contents are reset to defaults when the shape changes.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        if rows != self.rows || cols != self.cols {
            self.data.clear();
            self.data.resize(rows * cols, T::default());
            self.rows = rows;
            self.cols = cols;
        }
    }

    pub fn zero(&mut self) {
        self.data.fill(T::default());
    }

    pub fn set(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> Array2D<T> {
    /// Wrap an existing row-major buffer
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "buffer of {} elements cannot hold {}x{}",
            data.len(),
            rows,
            cols
        );
        Self { data, rows, cols }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, row: usize) -> &[T] {
        assert!(row < self.rows, "row {row} out of bounds ({})", self.rows);
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        assert!(row < self.rows, "row {row} out of bounds ({})", self.rows);
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T> Index<(usize, usize)> for Array2D<T> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        assert!(
            row < self.rows && col < self.cols,
            "index ({row}, {col}) out of bounds ({}x{})",
            self.rows,
            self.cols
        );
        &self.data[row * self.cols + col]
    }
}

impl<T> IndexMut<(usize, usize)> for Array2D<T> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        assert!(
            row < self.rows && col < self.cols,
            "index ({row}, {col}) out of bounds ({}x{})",
            self.rows,
            self.cols
        );
        &mut self.data[row * self.cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array2d_row_major_layout() {
        let mut a = Array2D::<f32>::new(2, 3);
        a[(1, 2)] = 5.0;
        a[(0, 1)] = 1.0;
        assert_eq!(a.as_slice(), &[0.0, 1.0, 0.0, 0.0, 0.0, 5.0]);
        assert_eq!(a.row(1), &[0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_array2d_resize_resets_on_shape_change() {
        let mut a = Array2D::<i32>::new(2, 2);
        a.set(7);
        a.resize(2, 2);
        assert_eq!(a[(1, 1)], 7);
        a.resize(3, 1);
        assert_eq!(a.rows(), 3);
        assert_eq!(a.cols(), 1);
        assert!(a.as_slice().iter().all(|&v| v == 0));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_array2d_bounds_checked() {
        let a = Array2D::<f32>::new(2, 2);
        let _ = a[(0, 2)];
    }

    #[test]
    fn test_array1d_zero_and_resize() {
        let mut a = Array1D::<f32>::new(3);
        a.set(2.0);
        a.resize(4);
        assert_eq!(a.as_slice(), &[2.0, 2.0, 2.0, 0.0]);
        a.zero();
        assert!(a.iter().all(|&v| v == 0.0));
    }
}
