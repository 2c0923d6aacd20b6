//! Least-squares fitting of a single model to an `(x, y)` channel pair.
//!
//! Polynomials are linear in their coefficients and are solved in one SVD step.
//! Magic Formula variants use Levenberg-Marquardt with Marquardt diagonal scaling:
//!
//! - central-difference Jacobian
//! - each step solves the augmented system `[J; sqrt(λ) D] δ = [r; 0]`
//! - steps are projected onto the parameter box
//! - λ shrinks ×10 on an accepted step, grows ×10 on a rejected one
//!
//! Quality metrics are computed on every finite row of the dataset passed in, even
//! when only a subset of rows (e.g. a downsampled index set) drives the fit.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{Condition, Dataset, FitQuality, FitResult, ModelKind};
use crate::error::{FitError, TireError};
use crate::math::{pseudo_inverse, solve_least_squares};

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub max_iterations: usize,
    /// Relative SSE decrease below which an accepted step counts as converged.
    pub sse_tolerance: f64,
    /// Relative parameter step below which an accepted step counts as converged.
    pub step_tolerance: f64,
    pub initial_lambda: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            sse_tolerance: 1e-12,
            step_tolerance: 1e-10,
            initial_lambda: 1e-3,
        }
    }
}

/// What to fit.
#[derive(Debug, Clone)]
pub struct FitRequest {
    pub model: ModelKind,
    pub x_channel: String,
    pub y_channel: String,
    pub initial_guess: Option<Vec<f64>>,
    /// Rows that drive the fit; `None` means every row.
    pub fit_rows: Option<Vec<usize>>,
}

impl FitRequest {
    pub fn new(model: ModelKind, x_channel: impl Into<String>, y_channel: impl Into<String>) -> Self {
        Self {
            model,
            x_channel: x_channel.into(),
            y_channel: y_channel.into(),
            initial_guess: None,
            fit_rows: None,
        }
    }

    /// Starting point for Magic Formula fits. Polynomial fits reject a guess.
    pub fn with_initial_guess(mut self, guess: Vec<f64>) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    pub fn with_fit_rows(mut self, rows: Vec<usize>) -> Self {
        self.fit_rows = Some(rows);
        self
    }
}

/// Fit of one command level.
#[derive(Debug, Clone)]
pub struct LevelFit {
    pub level: f64,
    pub rows: usize,
    pub result: Result<FitResult, TireError>,
}

/// Raw solver output.
#[derive(Debug, Clone)]
struct Solution {
    params: Vec<f64>,
    std_errors: Option<Vec<f64>>,
    iterations: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ModelFitter {
    options: FitOptions,
}

impl ModelFitter {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }

    pub fn fit(&self, dataset: &Dataset, request: &FitRequest) -> Result<FitResult, TireError> {
        let model = request.model;
        model.validate()?;
        let x = dataset.values(&request.x_channel)?;
        let y = dataset.values(&request.y_channel)?;

        let rows: Vec<usize> = match &request.fit_rows {
            Some(rows) => {
                if let Some(&bad) = rows.iter().find(|&&r| r >= dataset.len()) {
                    return Err(TireError::validation(
                        Some(&dataset.id),
                        format!("fit row {bad} out of range (len {})", dataset.len()),
                    ));
                }
                rows.clone()
            }
            None => (0..dataset.len()).collect(),
        };
        let (xs, ys): (Vec<f64>, Vec<f64>) = rows
            .iter()
            .map(|&i| (x[i], y[i]))
            .filter(|(a, b)| a.is_finite() && b.is_finite())
            .unzip();

        let solution = self.fit_xy(model, &xs, &ys, request.initial_guess.as_deref())?;
        let result = build_result(model, request, x, y, solution);
        info!(
            "Fitted {model} to {} vs {} on '{}': R²={:.4}, RMSE={:.4e} ({} iterations)",
            request.y_channel,
            request.x_channel,
            dataset.id,
            result.quality.r_squared,
            result.quality.rmse,
            result.iterations
        );
        Ok(result)
    }

    /// Fit each level of a command channel independently, in parallel.
    ///
    /// Levels are the distinct finite values of `command_channel`; unclassified
    /// (NaN) rows belong to no level. `request.fit_rows` still applies, restricted
    /// to each level's rows.
    pub fn fit_by_level(
        &self,
        dataset: &Dataset,
        request: &FitRequest,
        command_channel: &str,
    ) -> Result<Vec<LevelFit>, TireError> {
        let cmd = dataset.values(command_channel)?;
        let mut levels: Vec<f64> = cmd.iter().copied().filter(|v| v.is_finite()).collect();
        levels.sort_by(|a, b| a.abs().total_cmp(&b.abs()).then(a.total_cmp(b)));
        levels.dedup();

        let allowed: Option<HashSet<usize>> = request.fit_rows.as_ref().map(|r| r.iter().copied().collect());

        levels
            .par_iter()
            .map(|&level| {
                let rows = dataset.rows_matching(&[Condition::new(command_channel, vec![level])])?;
                let subset = dataset.select_rows(&rows)?;
                let mut local = request.clone();
                local.fit_rows = allowed.as_ref().map(|set| {
                    rows.iter()
                        .enumerate()
                        .filter_map(|(pos, r)| set.contains(r).then_some(pos))
                        .collect()
                });
                debug!("{command_channel}={level}: {} rows", rows.len());
                Ok(LevelFit {
                    level,
                    rows: rows.len(),
                    result: self.fit(&subset, &local),
                })
            })
            .collect()
    }

    fn fit_xy(&self, model: ModelKind, x: &[f64], y: &[f64], guess: Option<&[f64]>) -> Result<Solution, FitError> {
        let m = model.param_count();
        if x.len() < m {
            return Err(FitError::InsufficientData {
                model,
                required: m,
                found: x.len(),
            });
        }
        if model.is_linear() {
            if let Some(g) = guess {
                return Err(FitError::InvalidBounds {
                    model,
                    message: format!("polynomials are solved directly; an initial guess ({} values) is not used", g.len()),
                });
            }
            solve_polynomial(model, x, y)
        } else {
            self.levenberg_marquardt(model, x, y, guess)
        }
    }

    fn levenberg_marquardt(
        &self,
        model: ModelKind,
        x: &[f64],
        y: &[f64],
        guess: Option<&[f64]>,
    ) -> Result<Solution, FitError> {
        let m = model.param_count();
        let bounds = model.bounds(x, y);
        if let Some((lo, hi)) = bounds.iter().find(|(lo, hi)| !(lo <= hi)) {
            return Err(FitError::InvalidBounds {
                model,
                message: format!("lower bound {lo} exceeds upper bound {hi}"),
            });
        }

        let mut p = match guess {
            Some(g) => {
                if g.len() != m {
                    return Err(FitError::InvalidBounds {
                        model,
                        message: format!("initial guess has {} values, model has {m} parameters", g.len()),
                    });
                }
                let names = model.param_names();
                for (j, (&v, &(lo, hi))) in g.iter().zip(&bounds).enumerate() {
                    if !(v.is_finite() && v >= lo && v <= hi) {
                        return Err(FitError::InvalidBounds {
                            model,
                            message: format!("initial {} = {v} outside [{lo}, {hi}]", names[j]),
                        });
                    }
                }
                g.to_vec()
            }
            None => project(model.initial_guess(x, y), &bounds),
        };

        let mut r = residuals(model, x, y, &p);
        let mut sse = r.norm_squared();
        let mut lambda = self.options.initial_lambda;
        let n = x.len();

        for iter in 1..=self.options.max_iterations {
            let jac = jacobian(model, x, &p);
            if jac.iter().any(|v| !v.is_finite()) || is_rank_deficient(&jac) {
                return Err(FitError::SingularJacobian {
                    model,
                    iterations: iter,
                    last_params: p,
                });
            }
            let scale: Vec<f64> = (0..m).map(|j| jac.column(j).norm().max(1e-12)).collect();

            loop {
                let mut a = DMatrix::<f64>::zeros(n + m, m);
                a.view_mut((0, 0), (n, m)).copy_from(&jac);
                let sl = lambda.sqrt();
                for j in 0..m {
                    a[(n + j, j)] = sl * scale[j];
                }
                let mut b = DVector::<f64>::zeros(n + m);
                b.rows_mut(0, n).copy_from(&r);

                let Some(delta) = solve_least_squares(&a, &b) else {
                    return Err(FitError::SingularJacobian {
                        model,
                        iterations: iter,
                        last_params: p,
                    });
                };
                let candidate = project(p.iter().zip(delta.iter()).map(|(a, d)| a + d).collect(), &bounds);
                let r_new = residuals(model, x, y, &candidate);
                let sse_new = r_new.norm_squared();

                if sse_new.is_finite() && sse_new < sse {
                    let step = candidate
                        .iter()
                        .zip(&p)
                        .map(|(c, o)| (c - o).abs() / (o.abs() + 1e-12))
                        .fold(0.0, f64::max);
                    let gain = (sse - sse_new) / sse.max(f64::MIN_POSITIVE);
                    p = candidate;
                    r = r_new;
                    sse = sse_new;
                    lambda = (lambda / 10.0).max(1e-15);
                    if gain <= self.options.sse_tolerance || step <= self.options.step_tolerance {
                        return Ok(finish(model, x, &p, sse, iter));
                    }
                    break;
                }

                lambda *= 10.0;
                if lambda > 1e12 {
                    // No step improves the fit: already at the minimum.
                    return Ok(finish(model, x, &p, sse, iter));
                }
            }
        }

        Err(FitError::NotConverged {
            model,
            iterations: self.options.max_iterations,
            sse,
            last_params: p,
        })
    }
}

fn solve_polynomial(model: ModelKind, x: &[f64], y: &[f64]) -> Result<Solution, FitError> {
    let m = model.param_count();
    let vander = DMatrix::from_fn(x.len(), m, |i, j| x[i].powi(j as i32));
    let yv = DVector::from_column_slice(y);
    let beta = solve_least_squares(&vander, &yv).ok_or_else(|| FitError::SingularJacobian {
        model,
        iterations: 1,
        last_params: Vec::new(),
    })?;
    let params: Vec<f64> = beta.iter().copied().collect();
    let sse = residuals(model, x, y, &params).norm_squared();
    let std_errors = standard_errors(&vander, sse, x.len());
    Ok(Solution {
        params,
        std_errors,
        iterations: 1,
    })
}

fn finish(model: ModelKind, x: &[f64], p: &[f64], sse: f64, iterations: usize) -> Solution {
    let jac = jacobian(model, x, p);
    Solution {
        params: p.to_vec(),
        std_errors: standard_errors(&jac, sse, x.len()),
        iterations,
    }
}

/// `sqrt(diag(s² (JᵀJ)⁺))` with `s² = SSE / (n - m)`; `None` when `n <= m`.
fn standard_errors(jac: &DMatrix<f64>, sse: f64, n: usize) -> Option<Vec<f64>> {
    let m = jac.ncols();
    if n <= m {
        return None;
    }
    let s2 = sse / (n - m) as f64;
    let cov = pseudo_inverse(&(jac.transpose() * jac))?;
    Some((0..m).map(|j| (s2 * cov[(j, j)]).max(0.0).sqrt()).collect())
}

fn residuals(model: ModelKind, x: &[f64], y: &[f64], p: &[f64]) -> DVector<f64> {
    DVector::from_iterator(x.len(), x.iter().zip(y).map(|(&xi, &yi)| yi - model.evaluate(xi, p)))
}

/// Jacobian of the model prediction (not of the residual), by central differences.
fn jacobian(model: ModelKind, x: &[f64], p: &[f64]) -> DMatrix<f64> {
    let m = p.len();
    let mut jac = DMatrix::<f64>::zeros(x.len(), m);
    let mut hi = p.to_vec();
    let mut lo = p.to_vec();
    for j in 0..m {
        let h = 1e-6 * p[j].abs().max(1e-3);
        hi[j] = p[j] + h;
        lo[j] = p[j] - h;
        for (i, &xi) in x.iter().enumerate() {
            jac[(i, j)] = (model.evaluate(xi, &hi) - model.evaluate(xi, &lo)) / (2.0 * h);
        }
        hi[j] = p[j];
        lo[j] = p[j];
    }
    jac
}

fn is_rank_deficient(jac: &DMatrix<f64>) -> bool {
    let sv = jac.singular_values();
    let max = sv.max();
    max == 0.0 || sv.min() / max < 1e-13
}

fn project(mut p: Vec<f64>, bounds: &[(f64, f64)]) -> Vec<f64> {
    for (v, &(lo, hi)) in p.iter_mut().zip(bounds) {
        *v = v.clamp(lo, hi);
    }
    p
}

fn build_result(model: ModelKind, request: &FitRequest, x: &[f64], y: &[f64], solution: Solution) -> FitResult {
    let names = model.param_names();
    let residuals: Vec<f64> = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            if xi.is_finite() && yi.is_finite() {
                yi - model.evaluate(xi, &solution.params)
            } else {
                f64::NAN
            }
        })
        .collect();

    let observed: Vec<f64> = y
        .iter()
        .zip(x)
        .filter(|(yi, xi)| yi.is_finite() && xi.is_finite())
        .map(|(&yi, _)| yi)
        .collect();
    let finite_res: Vec<f64> = residuals.iter().copied().filter(|r| r.is_finite()).collect();

    let n = finite_res.len();
    let sse: f64 = finite_res.iter().map(|r| r * r).sum();
    let rmse = if n > 0 { (sse / n as f64).sqrt() } else { f64::NAN };
    let y_mean = observed.iter().sum::<f64>() / n.max(1) as f64;
    let sst: f64 = observed.iter().map(|v| (v - y_mean) * (v - y_mean)).sum();
    let r_squared = if sst > 0.0 {
        (1.0 - sse / sst).clamp(0.0, 1.0)
    } else if sse == 0.0 {
        1.0
    } else {
        0.0
    };

    let parameters: BTreeMap<String, f64> = names.iter().cloned().zip(solution.params.iter().copied()).collect();
    let uncertainties = solution
        .std_errors
        .map(|se| names.iter().cloned().zip(se).collect::<BTreeMap<_, _>>());

    FitResult {
        model,
        x_channel: request.x_channel.clone(),
        y_channel: request.y_channel.clone(),
        parameters,
        uncertainties,
        quality: FitQuality { r_squared, rmse, sse, n },
        residuals,
        iterations: solution.iterations,
    }
}
