//! Bounded Levenberg-Marquardt curve fitting.
//!
//! Minimizes `sum_i (f(t_i, x) - y_i)^2` over a box `lower <= x <= upper`:
//!
//! 1. Build the Jacobian by forward differences, stepping away from the
//!    nearer bound.
//! 2. Hold parameters fixed while they sit on a bound with the gradient
//!    pushing outward, and solve the damped normal equations
//!    `(JtJ + lambda diag(JtJ)) d = -Jt r` over the remaining ones.
//! 3. Project the trial point back onto the box; accept if the cost drops,
//!    turning lambda down on accept and up on reject.
//!
//! The evaluation budget counts calls of the model over the full sample
//! vector. Exceeding it is reported as a failure so the caller can decide on
//! a fallback; this solver never picks one itself.

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_UP: f64 = 10.0;
const LAMBDA_DOWN: f64 = 0.1;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;

/// Forward-difference relative step (sqrt of machine epsilon)
const FD_REL_STEP: f64 = 1.49e-8;

const FTOL: f64 = 1e-10;
const XTOL: f64 = 1e-10;
const GTOL: f64 = 1e-10;

/// Why a fit attempt produced no parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitFailure {
    /// Evaluation budget exhausted before convergence.
    BudgetExhausted,
    /// Damping grew past its ceiling without finding a downhill step.
    Stalled,
    /// Residuals were not finite at the starting point.
    NonFinite,
}

/// Fit `model(t, x)` to samples `(ts, ys)` within box bounds.
///
/// # Arguments
/// * `model` - Signal model, evaluated at one time point with the full
///   parameter vector
/// * `ts` - Independent variable (relaxation times)
/// * `ys` - Observed samples, same length as `ts`
/// * `x0` - Initial guess, clamped into the box before use
/// * `lower`, `upper` - Box bounds, one pair per parameter
/// * `max_evals` - Model evaluation budget
///
/// # Returns
/// The fitted parameter vector, or the failure reason.
pub fn curve_fit<F>(
    model: F,
    ts: &[f64],
    ys: &[f64],
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    max_evals: usize,
) -> Result<Vec<f64>, FitFailure>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = x0.len();
    let m = ts.len();
    debug_assert_eq!(ys.len(), m);
    debug_assert_eq!(lower.len(), n);
    debug_assert_eq!(upper.len(), n);

    let mut x: Vec<f64> = x0
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
        .collect();

    let mut evals = 0usize;
    let residuals = |p: &[f64], evals: &mut usize| -> Vec<f64> {
        *evals += 1;
        ts.iter().zip(ys).map(|(&t, &y)| model(t, p) - y).collect()
    };

    let mut r = residuals(&x, &mut evals);
    let mut cost = sum_sq(&r);
    if !cost.is_finite() {
        return Err(FitFailure::NonFinite);
    }

    let mut lambda = LAMBDA_INIT;
    let mut jac = vec![0.0; m * n];

    while evals < max_evals {
        // Jacobian by forward differences, stepping inside the box
        for j in 0..n {
            let mut h = FD_REL_STEP * x[j].abs().max(1.0);
            if x[j] + h > upper[j] {
                h = -h;
            }
            let mut xp = x.clone();
            xp[j] = (x[j] + h).clamp(lower[j], upper[j]);
            let hj = xp[j] - x[j];
            if hj == 0.0 {
                // parameter pinned by a degenerate bound interval
                for i in 0..m {
                    jac[i * n + j] = 0.0;
                }
                continue;
            }
            if evals >= max_evals {
                return Err(FitFailure::BudgetExhausted);
            }
            let rp = residuals(&xp, &mut evals);
            for i in 0..m {
                jac[i * n + j] = (rp[i] - r[i]) / hj;
            }
        }

        // normal equations JtJ and gradient Jt r
        let mut jtj = vec![0.0; n * n];
        let mut jtr = vec![0.0; n];
        for i in 0..m {
            for a in 0..n {
                let ja = jac[i * n + a];
                jtr[a] += ja * r[i];
                for b in a..n {
                    jtj[a * n + b] += ja * jac[i * n + b];
                }
            }
        }
        for a in 0..n {
            for b in 0..a {
                jtj[a * n + b] = jtj[b * n + a];
            }
        }

        // Active set: a parameter sitting on a bound with the gradient
        // pushing it outward is held fixed this iteration, so the step for
        // the remaining parameters is not distorted by an infeasible
        // direction. The set is recomputed each iteration, so a parameter
        // leaves the bound as soon as the gradient points back inside.
        let free: Vec<usize> = (0..n)
            .filter(|&j| {
                !((x[j] <= lower[j] && jtr[j] > 0.0) || (x[j] >= upper[j] && jtr[j] < 0.0))
            })
            .collect();
        let nf = free.len();

        // projected gradient norm: outward components at active bounds
        // do not count against convergence
        let gnorm = free.iter().fold(0.0f64, |acc, &j| acc.max(jtr[j].abs()));
        if gnorm < GTOL {
            return Ok(x);
        }

        // damping loop: escalate lambda until a step is accepted
        loop {
            let mut a_mat = vec![0.0; nf * nf];
            for (ai, &ja) in free.iter().enumerate() {
                for (bi, &jb) in free.iter().enumerate() {
                    a_mat[ai * nf + bi] = jtj[ja * n + jb];
                }
            }
            for (d, &jd) in free.iter().enumerate() {
                a_mat[d * nf + d] += lambda * jtj[jd * n + jd].max(1e-12);
            }
            let mut reduced: Vec<f64> = free.iter().map(|&j| -jtr[j]).collect();

            if !cholesky_solve(&mut a_mat, &mut reduced, nf) {
                lambda *= LAMBDA_UP;
                if lambda > LAMBDA_MAX {
                    return Err(FitFailure::Stalled);
                }
                continue;
            }

            let mut step = vec![0.0; n];
            for (&j, &dj) in free.iter().zip(&reduced) {
                step[j] = dj;
            }

            let x_new: Vec<f64> = x
                .iter()
                .zip(&step)
                .zip(lower.iter().zip(upper))
                .map(|((&xi, &di), (&lo, &hi))| (xi + di).clamp(lo, hi))
                .collect();

            if evals >= max_evals {
                return Err(FitFailure::BudgetExhausted);
            }
            let r_new = residuals(&x_new, &mut evals);
            let cost_new = sum_sq(&r_new);

            if cost_new.is_finite() && cost_new < cost {
                let step_norm = x
                    .iter()
                    .zip(&x_new)
                    .map(|(&a, &b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                let x_norm = x_new.iter().map(|&v| v * v).sum::<f64>().sqrt();
                let converged = cost_new <= 1e-30
                    || (cost - cost_new) <= FTOL * cost
                    || step_norm <= XTOL * (x_norm + XTOL);

                x = x_new;
                r = r_new;
                cost = cost_new;
                lambda = (lambda * LAMBDA_DOWN).max(LAMBDA_MIN);

                if converged {
                    return Ok(x);
                }
                break;
            }

            lambda *= LAMBDA_UP;
            if lambda > LAMBDA_MAX {
                return Err(FitFailure::Stalled);
            }
        }
    }

    Err(FitFailure::BudgetExhausted)
}

fn sum_sq(v: &[f64]) -> f64 {
    v.iter().map(|&e| e * e).sum()
}

/// Solve `A x = b` in place for a small symmetric positive-definite `A`.
///
/// Returns false if the factorization breaks down (not positive definite).
fn cholesky_solve(a: &mut [f64], b: &mut [f64], n: usize) -> bool {
    // factor A = L Lt, L stored in the lower triangle
    for k in 0..n {
        let mut d = a[k * n + k];
        for p in 0..k {
            d -= a[k * n + p] * a[k * n + p];
        }
        if d <= 0.0 || !d.is_finite() {
            return false;
        }
        let lkk = d.sqrt();
        a[k * n + k] = lkk;
        for i in (k + 1)..n {
            let mut s = a[i * n + k];
            for p in 0..k {
                s -= a[i * n + p] * a[k * n + p];
            }
            a[i * n + k] = s / lkk;
        }
    }

    // forward substitution L y = b
    for i in 0..n {
        let mut s = b[i];
        for p in 0..i {
            s -= a[i * n + p] * b[p];
        }
        b[i] = s / a[i * n + i];
    }

    // back substitution Lt x = y
    for i in (0..n).rev() {
        let mut s = b[i];
        for p in (i + 1)..n {
            s -= a[p * n + i] * b[p];
        }
        b[i] = s / a[i * n + i];
    }

    true
}
