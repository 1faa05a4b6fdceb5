//! Deterministic matrix initialization.
//!
//! A[i,j] = (i + j) mod 7 and B[i,j] = (i - j) mod 5, both computed on
//! integers and converted to f32; C is zero-filled. For i < j the difference
//! is negative, and the value of B depends on which remainder convention is
//! used; see [`RemainderConvention`].

use std::fmt;

use crate::buffers::MatrixBuffers;

/// How `(i - j) mod 5` is evaluated when `i < j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemainderConvention {
    /// Floor (Euclidean) remainder: always in `[0, 5)`. `(0 - 1) mod 5 = 4`.
    #[default]
    Euclid,
    /// Truncating remainder: takes the sign of the dividend, in `(-5, 5)`.
    /// `(0 - 1) mod 5 = -1`.
    Truncate,
    /// Difference taken in wrapping unsigned 64-bit arithmetic, then the
    /// remainder, as when the indices are subtracted unsigned:
    /// `(0 - 1) mod 5 = (2^64 - 1) mod 5 = 0`.
    Wrapping,
}

impl RemainderConvention {
    /// `(i - j) mod m` under this convention.
    pub fn diff_mod(&self, i: usize, j: usize, m: u64) -> i64 {
        match self {
            RemainderConvention::Euclid => (i as i64 - j as i64).rem_euclid(m as i64),
            RemainderConvention::Truncate => (i as i64 - j as i64) % m as i64,
            RemainderConvention::Wrapping => ((i as u64).wrapping_sub(j as u64) % m) as i64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemainderConvention::Euclid => "euclid",
            RemainderConvention::Truncate => "truncate",
            RemainderConvention::Wrapping => "wrapping",
        }
    }
}

impl fmt::Display for RemainderConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A[i,j] = (i + j) mod 7.
pub fn a_value(i: usize, j: usize) -> f32 {
    ((i + j) % 7) as f32
}

/// B[i,j] = (i - j) mod 5 under `convention`.
pub fn b_value(i: usize, j: usize, convention: RemainderConvention) -> f32 {
    convention.diff_mod(i, j, 5) as f32
}

/// Fill `a` and `b` (row-major, N×N) with the reference pattern and zero `c`.
pub fn fill(
    a: &mut [f32],
    b: &mut [f32],
    c: &mut [f32],
    n: usize,
    convention: RemainderConvention,
) {
    let rows = a
        .chunks_exact_mut(n.max(1))
        .zip(b.chunks_exact_mut(n.max(1)));
    for (i, (a_row, b_row)) in rows.enumerate() {
        for j in 0..n {
            a_row[j] = a_value(i, j);
            b_row[j] = b_value(i, j, convention);
        }
    }
    c.fill(0.0);
}

/// Initialize all three matrices of a run.
pub fn initialize(bufs: &mut MatrixBuffers, convention: RemainderConvention) {
    let n = bufs.n();
    let (a, b, c) = bufs.host_mut();
    fill(a, b, c, n, convention);
}
