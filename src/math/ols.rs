//! Linear least squares.
//!
//! Both fitting paths end up here: polynomial fits solve the Vandermonde system
//! directly, and each Levenberg-Marquardt step solves the damped, augmented
//! Jacobian system
//!
//! ```text
//! [ J        ] δ = [ r ]
//! [ sqrt(λ)D ]     [ 0 ]
//! ```
//!
//! SVD is used because these systems are tall and can be close to rank-deficient
//! (e.g. a Magic Formula with E pinned at a bound). `QR::solve` in nalgebra only
//! accepts square systems.

use nalgebra::{DMatrix, DVector};

/// Solve `min ||x β - y||²` using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Progressively looser singular-value cutoffs.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Moore-Penrose pseudo-inverse of a small square matrix (used for `(JᵀJ)⁻¹`).
pub fn pseudo_inverse(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    m.clone().pseudo_inverse(1e-12).ok()
}
