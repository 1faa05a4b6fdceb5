//! Sequential reference used to check the tiled kernel.

use thiserror::Error;
use tracing::debug;

/// First element where the kernel disagrees with the reference.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("mismatch at ({row}, {col}): C={kernel} ref={reference}")]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub kernel: f32,
    pub reference: f32,
}

/// Reference value of C[i,j] = Σ_k A[i,k]·B[k,j], summed in ascending k.
#[inline]
fn reference_element(a: &[f32], b: &[f32], n: usize, i: usize, j: usize) -> f32 {
    let mut sum = 0.0f32;
    for k in 0..n {
        sum += a[i * n + k] * b[k * n + j];
    }
    sum
}

/// C = A @ B with the plain O(N³) triple loop.
pub fn reference_multiply(a: &[f32], b: &[f32], n: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; n * n];
    for i in 0..n {
        for j in 0..n {
            c[i * n + j] = reference_element(a, b, n, i, j);
        }
    }
    c
}

/// Check `c` against the reference product of `a` and `b`.
///
/// Elements are compared in row-major order with absolute tolerance `tol`;
/// the scan stops at the first element outside the tolerance.
///
/// # Errors
/// Returns the first [`Mismatch`].
pub fn verify_reference(
    a: &[f32],
    b: &[f32],
    c: &[f32],
    n: usize,
    tol: f32,
) -> std::result::Result<(), Mismatch> {
    for i in 0..n {
        for j in 0..n {
            let reference = reference_element(a, b, n, i, j);
            let kernel = c[i * n + j];
            // NaN never compares within tolerance.
            if !((kernel - reference).abs() <= tol) {
                let mismatch = Mismatch {
                    row: i,
                    col: j,
                    kernel,
                    reference,
                };
                debug!(
                    row = i,
                    col = j,
                    kernel,
                    reference,
                    "kernel result disagrees with reference"
                );
                return Err(mismatch);
            }
        }
    }
    Ok(())
}
