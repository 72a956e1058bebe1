use equator::assert;

use crate::kernel::{ColMajor, ColMajorMut};

/// Owned column-major single precision matrix.
///
/// Element `(i, j)` lives at `data[i + j * ld]`, with the leading dimension equal to the number
/// of rows.
#[derive(Clone, Debug, PartialEq)]
pub struct SMat {
    data: Vec<f32>,
    nrows: usize,
    ncols: usize,
}

impl SMat {
    /// Returns a new matrix of dimensions `(nrows, ncols)`, filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![0.0; nrows * ncols],
            nrows,
            ncols,
        }
    }

    /// Returns the identity matrix of order `n`.
    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    /// Returns a new matrix of dimensions `(nrows, ncols)`, filled with the provided function.
    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self { data, nrows, ncols }
    }

    /// Wraps a column-major buffer.
    ///
    /// # Panics
    /// Panics if `data.len() != nrows * ncols`.
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<f32>) -> Self {
        assert!(data.len() == nrows * ncols);
        Self { data, nrows, ncols }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Leading dimension, i.e. the distance between the starts of two consecutive columns.
    #[inline]
    pub fn ld(&self) -> usize {
        self.nrows
    }

    #[inline]
    #[track_caller]
    pub fn read(&self, i: usize, j: usize) -> f32 {
        assert!(all(i < self.nrows, j < self.ncols));
        self.data[i + j * self.nrows]
    }

    #[inline]
    #[track_caller]
    pub fn write(&mut self, i: usize, j: usize, value: f32) {
        assert!(all(i < self.nrows, j < self.ncols));
        self.data[i + j * self.nrows] = value;
    }

    /// Returns the transpose as a new matrix.
    pub fn transpose(&self) -> Self {
        Self::from_fn(self.ncols, self.nrows, |i, j| self.read(j, i))
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_col_major(self) -> Vec<f32> {
        self.data
    }

    /// # Safety
    /// `(i, j)` must be a valid position or one past the last row/column.
    #[inline]
    pub(crate) unsafe fn view_at(&self, i: usize, j: usize) -> ColMajor {
        ColMajor::new(self.data.as_ptr().add(i + j * self.nrows), self.nrows)
    }

    /// # Safety
    /// `(i, j)` must be a valid position or one past the last row/column.
    #[inline]
    pub(crate) unsafe fn view_mut_at(&mut self, i: usize, j: usize) -> ColMajorMut {
        ColMajorMut::new(self.data.as_mut_ptr().add(i + j * self.nrows), self.nrows)
    }
}

impl core::ops::Index<(usize, usize)> for SMat {
    type Output = f32;

    #[inline]
    #[track_caller]
    fn index(&self, (i, j): (usize, usize)) -> &f32 {
        assert!(all(i < self.nrows, j < self.ncols));
        &self.data[i + j * self.nrows]
    }
}

impl core::ops::IndexMut<(usize, usize)> for SMat {
    #[inline]
    #[track_caller]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f32 {
        assert!(all(i < self.nrows, j < self.ncols));
        &mut self.data[i + j * self.nrows]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn col_major_layout() {
        let a = SMat::from_fn(3, 2, |i, j| (10 * i + j) as f32);
        assert_eq!(a.as_slice(), &[0.0, 10.0, 20.0, 1.0, 11.0, 21.0]);
        assert_eq!(a.ld(), 3);
        assert_eq!(a[(2, 1)], 21.0);
        assert_eq!(a.transpose().read(1, 2), 21.0);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_read() {
        let a = SMat::zeros(2, 2);
        a.read(2, 0);
    }
}
