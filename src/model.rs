//! Closed-form relaxation signal models used as regression targets.
//!
//! Two acquisition families are supported: inversion-recovery T1 weighting
//! (SEMS-IR) and multi-echo T2 weighting (MEMS). The variant is chosen once
//! from acquisition metadata and threaded through fitting and synthesis,
//! carrying its parameter arity, bounds policy and fit-failure fallback.

/// Relaxation model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxationModel {
    /// `SI(TI) = |Mo (1 - a e^{-TI/T1}) + C|`, parameters `[T1, Mo, C, a]`.
    T1InversionRecovery,
    /// `SI(TE) = Mo e^{-TE/T2} + C`, parameters `[T2, Mo, C]`.
    T2Decay,
}

impl RelaxationModel {
    /// Cap on model evaluations per pixel fit. A fixed protocol constant kept
    /// in lock-step with the bounds policy rather than exposed as
    /// configuration.
    pub const EVAL_BUDGET: usize = 1000;

    /// Nominal inversion efficiency of an ideal 180-degree pulse.
    pub const IDEAL_INVERSION: f64 = 2.0;

    /// Window the inversion efficiency may move in during fitting, absorbing
    /// imperfect inversion without letting it trade off against Mo.
    pub const INVERSION_WINDOW: (f64, f64) = (1.85, 2.05);

    /// Number of free parameters (including the bounded inversion efficiency
    /// for T1).
    pub fn param_count(self) -> usize {
        match self {
            RelaxationModel::T1InversionRecovery => 4,
            RelaxationModel::T2Decay => 3,
        }
    }

    /// Weighting label encoded into output filenames.
    pub fn weighting_label(self) -> &'static str {
        match self {
            RelaxationModel::T1InversionRecovery => "TI",
            RelaxationModel::T2Decay => "TE",
        }
    }

    /// Upper bound on the fitted relaxation time, ms.
    fn t_ceiling(self) -> f64 {
        match self {
            RelaxationModel::T1InversionRecovery => 7000.0,
            RelaxationModel::T2Decay => 4000.0,
        }
    }

    /// Evaluate the signal equation at `t_ms` with parameter vector `p`
    /// (layout per [`param_count`](Self::param_count)).
    pub fn evaluate(self, t_ms: f64, p: &[f64]) -> f64 {
        match self {
            RelaxationModel::T1InversionRecovery => {
                let (t1, mo, c, a) = (p[0], p[1], p[2], p[3]);
                (mo * (1.0 - a * (-t_ms / t1).exp()) + c).abs()
            }
            RelaxationModel::T2Decay => {
                let (t2, mo, c) = (p[0], p[1], p[2]);
                mo * (-t_ms / t2).exp() + c
            }
        }
    }

    /// Per-pixel box bounds `(lower, upper)`.
    ///
    /// Bounds scale with the pixel's own observed signal maximum, so
    /// background and tissue pixels are equally well-conditioned despite
    /// wildly different intensities.
    pub fn bounds(self, signal_max: f64) -> (Vec<f64>, Vec<f64>) {
        let c_span = signal_max / 100.0 + 1.0;
        let mut lower = vec![0.001, 0.9 * signal_max, -c_span];
        let mut upper = vec![self.t_ceiling(), 2.0 * signal_max + 1.0, c_span];
        if self == RelaxationModel::T1InversionRecovery {
            lower.push(Self::INVERSION_WINDOW.0);
            upper.push(Self::INVERSION_WINDOW.1);
        }
        (lower, upper)
    }

    /// Candidate relaxation-time seeds for one pixel.
    ///
    /// T2 decay is monotone, so the train mean is a serviceable single seed.
    /// The T1 magnitude curve instead has a null at `T1 ln 2` where the
    /// signal reflects, and a seed on the wrong side of it strands the fit in
    /// the reflected minimum. The sample with the smallest magnitude sits
    /// nearest the null, so its time over `ln 2` estimates T1 directly; a
    /// half/double ladder around that estimate plus the train mean covers the
    /// discretization error of the train.
    pub fn time_seeds(self, samples: &[f64], train_ms: &[f64]) -> Vec<f64> {
        let mean = train_ms.iter().sum::<f64>() / train_ms.len() as f64;
        match self {
            RelaxationModel::T2Decay => vec![mean],
            RelaxationModel::T1InversionRecovery => {
                let mut null_ms = train_ms[0];
                let mut min_signal = f64::INFINITY;
                for (&v, &t) in samples.iter().zip(train_ms) {
                    if v.abs() < min_signal {
                        min_signal = v.abs();
                        null_ms = t;
                    }
                }
                let t1_est = null_ms / std::f64::consts::LN_2;
                vec![t1_est, 0.5 * t1_est, 2.0 * t1_est, mean]
            }
        }
    }

    /// Initial parameter guess: relaxation time at `t_seed_ms` (see
    /// [`time_seeds`](Self::time_seeds)), Mo at the observed maximum, zero
    /// offset, ideal inversion; all clamped into the pixel's bounds.
    pub fn initial_guess(self, signal_max: f64, t_seed_ms: f64) -> Vec<f64> {
        let (lower, upper) = self.bounds(signal_max);
        let mut guess = vec![t_seed_ms, signal_max, 0.0];
        if self == RelaxationModel::T1InversionRecovery {
            guess.push(Self::IDEAL_INVERSION);
        }
        for (g, (lo, hi)) in guess.iter_mut().zip(lower.iter().zip(&upper)) {
            *g = g.clamp(*lo, *hi);
        }
        guess
    }

    /// Degenerate parameters substituted when a pixel's fit does not
    /// converge: near-zero relaxation time, equilibrium at the observed
    /// maximum, no offset, ideal inversion. A flat "no-decay" pixel instead
    /// of an aborted map.
    pub fn fallback_params(self, signal_max: f64) -> Vec<f64> {
        match self {
            RelaxationModel::T1InversionRecovery => {
                vec![1e-6, signal_max, 0.0, Self::IDEAL_INVERSION]
            }
            RelaxationModel::T2Decay => vec![1e-6, signal_max, 0.0],
        }
    }
}
