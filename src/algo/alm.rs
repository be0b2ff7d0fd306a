//! Augmented Lagrangian method.
//!
//! The general constraints `g(x) in D` are handled by a sequence of
//! subproblems
//!
//! ```text
//! minimize  f(x) + h(x) + 1/2 || zeta - P_D(zeta) ||^2_sigma,  zeta = g(x) + y / sigma
//! ```
//!
//! solved by the [PANOC](super::panoc) solver for fixed multipliers `y` and
//! penalty weights `sigma`. After each subproblem, the multipliers are
//! updated by the dual ascent step `y = sigma (zeta - P_D(zeta))` and the
//! penalty weights of the constraints whose violation did not decrease
//! enough are increased. The tolerance of the subproblems tightens
//! geometrically toward the final tolerance.
//!
//! Problems without general constraints are solved by a single call of the
//! inner solver.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[2\] [Constrained Optimization and Lagrange Multiplier
//! Methods](https://doi.org/10.1016/C2013-0-10366-2)

use std::time::{Duration, Instant};

use getset::{CopyGetters, Setters};
use log::debug;
use nalgebra::{convert, DVector, RealField};

use crate::core::{
    validate_problem, ConfigError, EvalCounter, InnerSolveOptions, Problem, ProblemError,
    ProblemWithCounters, SolverStatus,
};
use crate::direction::{Direction, DirectionStrategy};

use super::panoc::{PanocSolver, PanocStats};

/// Specification for initial value of the penalty weights.
#[derive(Debug, Clone, Copy)]
pub enum PenaltyInit<T> {
    /// Fixed value for all constraints.
    Fixed(T),
    /// Estimated from the objective and the constraint violation in the
    /// initial point.
    Estimated,
}

/// Options for [`AlmSolver`].
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct AlmParams<T: RealField + Copy> {
    /// Tolerance on the inner stopping criterion of the last subproblem.
    /// Default: `1e-5`.
    tolerance: T,
    /// Tolerance on the constraint violation. Default: `1e-5`.
    dual_tolerance: T,
    /// Tolerance of the first subproblem. Default: `1`.
    initial_tolerance: T,
    /// Factor by which the subproblem tolerance decreases in each outer
    /// iteration. Default: `0.1`.
    tolerance_decay_factor: T,
    /// Factor by which the penalty weights increase. Default: `10`.
    penalty_scale_factor: T,
    /// Initial penalty weights. Default: `1` (see [`PenaltyInit`]).
    initial_penalty: PenaltyInit<T>,
    /// Factor of the estimated initial penalty weights. Default: `20`.
    initial_penalty_factor: T,
    /// A penalty weight increases only if the violation of its constraint
    /// did not decrease below this fraction of the previous violation.
    /// Default: `0.1`.
    rel_penalty_increase_threshold: T,
    /// Bound on the absolute value of the multipliers. Default: `1e9`.
    max_multiplier: T,
    /// Maximum penalty weight. Default: `1e9`.
    max_penalty: T,
    /// Minimum initial penalty weight. Default: `1e-9`.
    min_penalty: T,
    /// Maximum number of outer iterations. Default: `100`.
    max_outer_iterations: usize,
    /// Time budget. Default: 5 minutes.
    max_time: Duration,
    /// Number of consecutive outer iterations without decrease of the
    /// constraint violation allowed before returning
    /// [`SolverStatus::NoProgress`]. Default: `10`.
    max_no_progress: usize,
    /// Increase all penalty weights together. Default: `false`.
    single_penalty_factor: bool,
}

impl<T: RealField + Copy> Default for AlmParams<T> {
    fn default() -> Self {
        Self {
            tolerance: convert(1e-5),
            dual_tolerance: convert(1e-5),
            initial_tolerance: T::one(),
            tolerance_decay_factor: convert(0.1),
            penalty_scale_factor: convert(10.0),
            initial_penalty: PenaltyInit::Fixed(T::one()),
            initial_penalty_factor: convert(20.0),
            rel_penalty_increase_threshold: convert(0.1),
            max_multiplier: convert(1e9),
            max_penalty: convert(1e9),
            min_penalty: convert(1e-9),
            max_outer_iterations: 100,
            max_time: Duration::from_secs(300),
            max_no_progress: 10,
            single_penalty_factor: false,
        }
    }
}

impl<T: RealField + Copy> AlmParams<T> {
    /// Checks the values of the options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = T::zero();
        let one = T::one();
        let positive = |value: T| value > zero && value.is_finite();

        if !positive(self.tolerance) || !positive(self.dual_tolerance) {
            return Err(ConfigError::invalid(
                "tolerance/dual_tolerance",
                "must be positive and finite",
            ));
        }

        if !positive(self.initial_tolerance) {
            return Err(ConfigError::invalid(
                "initial_tolerance",
                "must be positive and finite",
            ));
        }

        if !positive(self.tolerance_decay_factor) || self.tolerance_decay_factor > one {
            return Err(ConfigError::invalid(
                "tolerance_decay_factor",
                "must be in (0, 1]",
            ));
        }

        if !(self.penalty_scale_factor >= one) || !self.penalty_scale_factor.is_finite() {
            return Err(ConfigError::invalid(
                "penalty_scale_factor",
                "must be finite and at least one",
            ));
        }

        match self.initial_penalty {
            PenaltyInit::Fixed(sigma) if !positive(sigma) => {
                return Err(ConfigError::invalid(
                    "initial_penalty",
                    "must be positive and finite",
                ));
            }
            _ => {}
        }

        if !positive(self.initial_penalty_factor) {
            return Err(ConfigError::invalid(
                "initial_penalty_factor",
                "must be positive and finite",
            ));
        }

        if !(self.rel_penalty_increase_threshold >= zero)
            || self.rel_penalty_increase_threshold > one
        {
            return Err(ConfigError::invalid(
                "rel_penalty_increase_threshold",
                "must be in [0, 1]",
            ));
        }

        if !positive(self.max_multiplier) {
            return Err(ConfigError::invalid(
                "max_multiplier",
                "must be positive and finite",
            ));
        }

        if !positive(self.min_penalty) || !(self.max_penalty >= self.min_penalty) {
            return Err(ConfigError::invalid(
                "min_penalty/max_penalty",
                "must satisfy 0 < min_penalty <= max_penalty",
            ));
        }

        Ok(())
    }
}

/// Statistics of the inner solver accumulated over all subproblems.
#[derive(Debug, Clone, Copy, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct InnerStats<T: RealField + Copy> {
    /// Total number of inner iterations.
    iterations: usize,
    /// Total wall-clock time spent in the inner solver.
    elapsed_time: Duration,
    /// See [`PanocStats::linesearch_failures`].
    linesearch_failures: usize,
    /// See [`PanocStats::linesearch_backtracks`].
    linesearch_backtracks: usize,
    /// See [`PanocStats::stepsize_backtracks`].
    stepsize_backtracks: usize,
    /// See [`PanocStats::direction_failures`].
    direction_failures: usize,
    /// See [`PanocStats::direction_update_rejected`].
    direction_update_rejected: usize,
    /// See [`PanocStats::tau_1_accepted`].
    tau_1_accepted: usize,
    /// See [`PanocStats::count_tau`].
    count_tau: usize,
    /// See [`PanocStats::sum_tau`].
    sum_tau: T,
    /// Step size of the last subproblem.
    final_gamma: T,
    /// Smooth part of the last subproblem in its solution.
    final_psi: T,
    /// Nonsmooth part in the solution of the last subproblem.
    final_h: T,
    /// Envelope of the last subproblem.
    final_phi: T,
}

impl<T: RealField + Copy> Default for InnerStats<T> {
    fn default() -> Self {
        let zero = T::zero();

        Self {
            iterations: 0,
            elapsed_time: Duration::ZERO,
            linesearch_failures: 0,
            linesearch_backtracks: 0,
            stepsize_backtracks: 0,
            direction_failures: 0,
            direction_update_rejected: 0,
            tau_1_accepted: 0,
            count_tau: 0,
            sum_tau: zero,
            final_gamma: zero,
            final_psi: zero,
            final_h: zero,
            final_phi: zero,
        }
    }
}

impl<T: RealField + Copy> InnerStats<T> {
    /// Adds the statistics of a subproblem.
    pub fn accumulate(&mut self, stats: &PanocStats<T>) {
        self.iterations += stats.iterations();
        self.elapsed_time += stats.elapsed_time();
        self.linesearch_failures += stats.linesearch_failures();
        self.linesearch_backtracks += stats.linesearch_backtracks();
        self.stepsize_backtracks += stats.stepsize_backtracks();
        self.direction_failures += stats.direction_failures();
        self.direction_update_rejected += stats.direction_update_rejected();
        self.tau_1_accepted += stats.tau_1_accepted();
        self.count_tau += stats.count_tau();
        self.sum_tau += stats.sum_tau();
        self.final_gamma = stats.final_gamma();
        self.final_psi = stats.final_psi();
        self.final_h = stats.final_h();
        self.final_phi = stats.final_phi();
    }
}

/// Statistics of an [`AlmSolver::solve`] call.
#[derive(Debug, Clone, Copy, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct AlmStats<T: RealField + Copy> {
    /// Reason of the termination.
    status: SolverStatus,
    /// Number of outer iterations.
    outer_iterations: usize,
    /// Accumulated statistics of the inner solver.
    inner: InnerStats<T>,
    /// Number of subproblems that ended with a numerical error.
    inner_convergence_failures: usize,
    /// Wall-clock time of the call.
    elapsed_time: Duration,
    /// Value of the inner stopping criterion in the last subproblem.
    epsilon: T,
    /// Maximum constraint violation `||(y_hat - y) / sigma||_inf` in the
    /// returned iterate.
    delta: T,
    /// Euclidean norm of the penalty weights.
    norm_penalty: T,
    /// Problem evaluations made during the call.
    evaluations: EvalCounter,
}

impl<T: RealField + Copy> AlmStats<T> {
    fn new() -> Self {
        let zero = T::zero();

        Self {
            status: SolverStatus::MaxIterations,
            outer_iterations: 0,
            inner: InnerStats::default(),
            inner_convergence_failures: 0,
            elapsed_time: Duration::ZERO,
            epsilon: convert(f64::INFINITY),
            delta: zero,
            norm_penalty: zero,
            evaluations: EvalCounter::default(),
        }
    }
}

/// State of the solver passed to the progress callback after every outer
/// iteration.
pub struct AlmProgress<'a, T: RealField + Copy> {
    /// Outer iteration number.
    pub k: usize,
    /// Current iterate.
    pub x: &'a DVector<T>,
    /// Current multipliers.
    pub y: &'a DVector<T>,
    /// Penalty weights used in the last subproblem.
    pub sigma: &'a DVector<T>,
    /// Tolerance of the last subproblem.
    pub epsilon: T,
    /// Maximum constraint violation.
    pub delta: T,
    /// Statistics of the last subproblem.
    pub inner: &'a PanocStats<T>,
}

/// Callback invoked after every outer iteration.
pub type AlmCallback<T> = Box<dyn FnMut(&AlmProgress<'_, T>) + Send>;

/// Augmented Lagrangian solver.
///
/// See [module](self) documentation for more details.
pub struct AlmSolver<T: RealField + Copy, D = Direction<T>> {
    params: AlmParams<T>,
    inner: PanocSolver<T, D>,
    callback: Option<AlmCallback<T>>,
}

impl<T: RealField + Copy, D: DirectionStrategy<T>> AlmSolver<T, D> {
    /// Initializes the solver with given options and inner solver.
    pub fn new(params: AlmParams<T>, inner: PanocSolver<T, D>) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            params,
            inner,
            callback: None,
        })
    }

    /// Gets the options.
    pub fn params(&self) -> &AlmParams<T> {
        &self.params
    }

    /// Gets the inner solver.
    pub fn inner(&self) -> &PanocSolver<T, D> {
        &self.inner
    }

    /// Gets the inner solver for changing its callback.
    pub fn inner_mut(&mut self) -> &mut PanocSolver<T, D> {
        &mut self.inner
    }

    /// Sets the progress callback.
    pub fn set_progress_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&AlmProgress<'_, T>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Solves the problem.
    ///
    /// The variable `x` holds the initial guess on input and the solution on
    /// output, `y` the initial multipliers and the final multipliers,
    /// respectively.
    ///
    /// All non-fatal terminations are reported in the returned statistics.
    /// An error is returned only for invalid inputs, before any evaluation
    /// of the problem.
    pub fn solve<P: Problem<Field = T>>(
        &mut self,
        problem: &P,
        x: &mut DVector<T>,
        y: &mut DVector<T>,
    ) -> Result<AlmStats<T>, ConfigError> {
        let n = problem.num_variables();
        let m = problem.num_constraints();

        validate_problem(problem)?;
        ConfigError::check_dim("x", n, x.nrows())?;
        ConfigError::check_dim("y", m, y.nrows())?;

        if m == 0 {
            return self.solve_unconstrained(problem, x, y);
        }

        let start = Instant::now();
        let counted = ProblemWithCounters::new(problem);
        let mut stats = AlmStats::new();

        let status = match self.outer_loop(&counted, start, x, y, &mut stats) {
            Ok(status) => status,
            Err(error) => {
                debug!("ALM stopped on numerical error: {}", error);
                SolverStatus::NumericalError
            }
        };

        stats.status = status;
        stats.elapsed_time = start.elapsed();
        stats.evaluations = counted.evaluations();

        debug!(
            "ALM finished: {} after {} outer iterations ({} inner), delta = {}",
            stats.status,
            stats.outer_iterations,
            stats.inner.iterations,
            stats.delta
        );

        Ok(stats)
    }

    fn solve_unconstrained<P: Problem<Field = T>>(
        &mut self,
        problem: &P,
        x: &mut DVector<T>,
        y: &mut DVector<T>,
    ) -> Result<AlmStats<T>, ConfigError> {
        let start = Instant::now();
        let sigma = DVector::zeros(0);
        let mut err_z = DVector::zeros(0);

        let inner = self.inner.solve(
            problem,
            InnerSolveOptions {
                tolerance: self.params.tolerance,
                max_time: Some(self.params.max_time),
            },
            x,
            y,
            &sigma,
            &mut err_z,
        )?;

        let mut stats = AlmStats::new();
        stats.status = inner.status();
        stats.outer_iterations = 1;
        stats.inner.accumulate(&inner);
        stats.inner_convergence_failures = usize::from(inner.status() == SolverStatus::NumericalError);
        stats.epsilon = inner.epsilon();
        stats.evaluations = inner.evaluations();
        stats.elapsed_time = start.elapsed();

        Ok(stats)
    }

    fn initial_penalty<P: Problem<Field = T>>(
        &self,
        problem: &P,
        x: &DVector<T>,
        sigma: &mut DVector<T>,
    ) -> Result<(), ProblemError> {
        let params = &self.params;

        let sigma0 = match params.initial_penalty {
            PenaltyInit::Fixed(sigma0) => sigma0,
            PenaltyInit::Estimated => {
                let m = sigma.nrows();
                let mut gx = DVector::zeros(m);
                let mut e = DVector::zeros(m);

                let fx = problem.eval_objective(x)?;
                problem.eval_constraints(x, &mut gx)?;
                problem.eval_projecting_difference_constraints(&gx, &mut e)?;

                let half: T = convert(0.5);
                let violation = e.norm_squared() * half;

                if !fx.is_finite() || !violation.is_finite() {
                    return Err(ProblemError::InvalidValue);
                }

                params.initial_penalty_factor * fx.abs().max(T::one())
                    / violation.max(T::one())
            }
        };

        sigma.fill(sigma0.max(params.min_penalty).min(params.max_penalty));
        debug!("initial penalty = {}", sigma[0]);

        Ok(())
    }

    // Increases the penalty weights of the constraints whose violation did
    // not decrease enough. The weights never decrease.
    fn update_penalty(&self, sigma: &mut DVector<T>, e: &DVector<T>, e_old: &DVector<T>, norm_e: T) {
        let params = &self.params;
        let theta = params.rel_penalty_increase_threshold;
        let delta = params.penalty_scale_factor;

        if params.single_penalty_factor {
            let norm_e_old = e_old.amax();
            if norm_e > theta * norm_e_old {
                for s in sigma.iter_mut() {
                    *s = (*s).max((delta * *s).min(params.max_penalty));
                }
            }
            return;
        }

        for j in 0..sigma.nrows() {
            let ej = e[j].abs();

            if ej > theta * e_old[j].abs() {
                let scale = (delta * ej / norm_e).max(T::one());
                sigma[j] = sigma[j].max((scale * sigma[j]).min(params.max_penalty));
            }
        }
    }

    fn outer_loop<P: Problem<Field = T>>(
        &mut self,
        problem: &P,
        start: Instant,
        x: &mut DVector<T>,
        y: &mut DVector<T>,
        stats: &mut AlmStats<T>,
    ) -> Result<SolverStatus, ProblemError> {
        let params = self.params.clone();
        let m = y.nrows();

        let mut sigma = DVector::zeros(m);
        self.initial_penalty(problem, x, &mut sigma)?;
        problem.eval_projection_multipliers(y, params.max_multiplier)?;

        let mut epsilon = params.initial_tolerance.max(params.tolerance);
        let mut x_trial = x.clone();
        let mut y_trial = y.clone();
        let mut err_z = DVector::zeros(m);
        let mut err_z_old = DVector::zeros(m);
        let mut norm_e_old: Option<T> = None;
        let mut no_progress = 0;

        for k in 0..params.max_outer_iterations {
            let remaining = params.max_time.saturating_sub(start.elapsed());

            x_trial.copy_from(x);
            y_trial.copy_from(y);

            let inner = self
                .inner
                .solve(
                    problem,
                    InnerSolveOptions {
                        tolerance: epsilon,
                        max_time: Some(remaining),
                    },
                    &mut x_trial,
                    &mut y_trial,
                    &sigma,
                    &mut err_z,
                )
                .map_err(|error| {
                    debug!("inner solver rejected the subproblem: {}", error);
                    ProblemError::InvalidValue
                })?;

            stats.inner.accumulate(&inner);
            stats.outer_iterations = k + 1;
            stats.norm_penalty = sigma.norm();

            if inner.status() == SolverStatus::NumericalError {
                stats.inner_convergence_failures += 1;
                no_progress += 1;

                debug!(
                    "outer iteration {}: inner solver failed ({} failures in a row)",
                    k, no_progress
                );

                if no_progress >= params.max_no_progress {
                    return Ok(SolverStatus::NumericalError);
                }

                if start.elapsed() >= params.max_time {
                    return Ok(SolverStatus::MaxTime);
                }

                for s in sigma.iter_mut() {
                    *s = (*s).max((params.penalty_scale_factor * *s).min(params.max_penalty));
                }

                continue;
            }

            x.copy_from(&x_trial);
            problem.eval_projection_multipliers(&mut y_trial, params.max_multiplier)?;
            y.copy_from(&y_trial);

            let norm_e = err_z.amax();
            stats.epsilon = inner.epsilon();
            stats.delta = norm_e;

            if let Some(callback) = self.callback.as_deref_mut() {
                callback(&AlmProgress {
                    k,
                    x: &*x,
                    y: &*y,
                    sigma: &sigma,
                    epsilon,
                    delta: norm_e,
                    inner: &inner,
                });
            }

            debug!(
                "outer iteration {}: epsilon = {}, delta = {}, inner = {} ({} iterations)",
                k,
                epsilon,
                norm_e,
                inner.status(),
                inner.iterations()
            );

            if inner.status().is_converged()
                && epsilon <= params.tolerance
                && norm_e <= params.dual_tolerance
            {
                return Ok(SolverStatus::Converged);
            }

            if start.elapsed() >= params.max_time {
                return Ok(SolverStatus::MaxTime);
            }

            match norm_e_old {
                Some(norm_e_old) if norm_e >= norm_e_old => no_progress += 1,
                _ => no_progress = 0,
            }

            if no_progress >= params.max_no_progress {
                return Ok(SolverStatus::NoProgress);
            }

            if norm_e_old.is_some() && norm_e > params.dual_tolerance {
                self.update_penalty(&mut sigma, &err_z, &err_z_old, norm_e);
            }

            std::mem::swap(&mut err_z, &mut err_z_old);
            norm_e_old = Some(norm_e);
            epsilon = (params.tolerance_decay_factor * epsilon).max(params.tolerance);
        }

        Ok(SolverStatus::MaxIterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector};

    use crate::algo::panoc::PanocParams;
    use crate::core::Bounds;
    use crate::testing::*;

    fn inner(max_iterations: usize) -> PanocSolver<f64> {
        let mut params = PanocParams::default();
        params.set_max_iterations(max_iterations);
        PanocSolver::new(params, Direction::default()).unwrap()
    }

    fn solver(tolerance: f64) -> AlmSolver<f64> {
        let mut params = AlmParams::default();
        params.set_tolerance(tolerance).set_dual_tolerance(tolerance);
        AlmSolver::new(params, inner(500)).unwrap()
    }

    #[test]
    fn unconstrained_is_single_inner_solve() {
        let f = Rosenbrock::new(4);
        let tolerance = 1e-7;

        let mut x_alm = f.initials().remove(0);
        let mut y = DVector::zeros(0);
        let alm = solver(tolerance).solve(&f, &mut x_alm, &mut y).unwrap();

        let mut x_panoc = f.initials().remove(0);
        let panoc = inner(500).minimize(&f, tolerance, &mut x_panoc).unwrap();

        assert_eq!(alm.outer_iterations(), 1);
        assert_eq!(alm.status(), panoc.status());
        assert_eq!(alm.inner().iterations(), panoc.iterations());
        assert_eq!(alm.evaluations(), panoc.evaluations());
        assert_eq!(x_alm, x_panoc);
        assert_eq!(y.nrows(), 0);
    }

    #[test]
    fn halfspace() {
        let f = ConstrainedQuadratic::halfspace();
        let mut x = dvector![0.0, 0.0];
        let mut y = dvector![0.0];

        let stats = solver(1e-8).solve(&f, &mut x, &mut y).unwrap();

        assert_eq!(stats.status(), SolverStatus::Converged);
        assert_abs_diff_eq!(x, dvector![0.0, 1.0], epsilon = 1e-6);
        assert_abs_diff_eq!(y[0], 2.0, epsilon = 1e-5);
        assert!(stats.delta() <= 1e-8);
    }

    #[test]
    fn equality() {
        let f = ConstrainedQuadratic::equality();
        let mut x = dvector![3.0, -1.0];
        let mut y = dvector![0.0];

        let stats = solver(1e-8).solve(&f, &mut x, &mut y).unwrap();

        assert_eq!(stats.status(), SolverStatus::Converged);
        assert_abs_diff_eq!(x, dvector![0.5, 0.5], epsilon = 1e-6);
        assert_abs_diff_eq!(y[0], -1.0, epsilon = 1e-5);
    }

    #[test]
    fn estimated_penalty() {
        let f = ConstrainedQuadratic::halfspace();
        let mut params = AlmParams::default();
        params
            .set_tolerance(1e-8)
            .set_dual_tolerance(1e-8)
            .set_initial_penalty(PenaltyInit::Estimated);
        let mut solver = AlmSolver::new(params, inner(500)).unwrap();

        let mut x = dvector![5.0, 5.0];
        let mut y = dvector![0.0];
        let stats = solver.solve(&f, &mut x, &mut y).unwrap();

        assert_eq!(stats.status(), SolverStatus::Converged);
        assert_abs_diff_eq!(x, dvector![0.0, 1.0], epsilon = 1e-6);
    }

    #[test]
    fn penalty_never_decreases() {
        for single in [false, true] {
            let f = ConstrainedQuadratic::halfspace_and_equality();
            let mut params = AlmParams::default();
            params
                .set_tolerance(1e-8)
                .set_dual_tolerance(1e-8)
                .set_initial_penalty(PenaltyInit::Fixed(1e-3))
                .set_single_penalty_factor(single);
            let mut solver = AlmSolver::new(params, inner(500)).unwrap();

            let history = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&history);
            solver.set_progress_callback(move |progress| {
                sink.lock().unwrap().push(progress.sigma.clone());
            });

            let mut x = dvector![4.0, -3.0, 2.0];
            let mut y = dvector![0.0, 0.0];
            let stats = solver.solve(&f, &mut x, &mut y).unwrap();

            assert_eq!(stats.status(), SolverStatus::Converged);

            let history = history.lock().unwrap();
            assert!(history.len() > 1);
            for pair in history.windows(2) {
                assert!(pair[0].iter().zip(pair[1].iter()).all(|(a, b)| a <= b));
            }
            assert!(history.last().unwrap().iter().any(|s| *s > 1e-3));
        }
    }

    #[test]
    fn inner_failures() {
        let f = NanAfter::new(ConstrainedQuadratic::halfspace(), 0);
        let mut x = dvector![0.0, 0.0];
        let mut y = dvector![0.0];

        let stats = solver(1e-9).solve(&f, &mut x, &mut y).unwrap();

        assert_eq!(stats.status(), SolverStatus::NumericalError);
        assert_eq!(stats.inner_convergence_failures(), 10);
        assert_eq!(x, dvector![0.0, 0.0]);
        assert_eq!(y, dvector![0.0]);
    }

    #[test]
    fn max_outer_iterations() {
        let f = ConstrainedQuadratic::halfspace();
        let mut params = AlmParams::default();
        params
            .set_tolerance(1e-12)
            .set_dual_tolerance(1e-12)
            .set_max_outer_iterations(2);
        let mut solver = AlmSolver::new(params, inner(500)).unwrap();

        let mut x = dvector![0.0, 0.0];
        let mut y = dvector![0.0];
        let stats = solver.solve(&f, &mut x, &mut y).unwrap();

        assert_eq!(stats.status(), SolverStatus::MaxIterations);
        assert_eq!(stats.outer_iterations(), 2);
    }

    #[test]
    fn infeasible_constraints() {
        // x >= 1 and x <= -1.
        let f = ConstrainedQuadratic::new(
            dmatrix![1.0],
            dvector![0.0],
            0.0,
            dmatrix![1.0; 1.0],
            Bounds::new(
                dvector![1.0, f64::NEG_INFINITY],
                dvector![f64::INFINITY, -1.0],
            ),
        );

        let mut solver = solver(1e-8);
        let max_penalty = solver.params().max_penalty();

        let history = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&history);
        solver.set_progress_callback(move |progress| {
            sink.lock().unwrap().push(progress.sigma.clone());
        });

        let mut x = dvector![0.0];
        let mut y = dvector![0.0, 0.0];
        let stats = solver.solve(&f, &mut x, &mut y).unwrap();

        assert_eq!(stats.status(), SolverStatus::NoProgress);
        assert!(stats.delta() > 0.5);
        assert!(x.iter().all(|xi| xi.is_finite()));

        let history = history.lock().unwrap();
        assert_eq!(history.len(), stats.outer_iterations());
        for pair in history.windows(2) {
            assert!(pair[0].iter().zip(pair[1].iter()).all(|(a, b)| a <= b));
        }
        assert!(history
            .iter()
            .all(|sigma| sigma.iter().all(|s| *s <= max_penalty)));
    }

    #[test]
    fn max_time() {
        let f = ConstrainedQuadratic::halfspace();
        let mut params = AlmParams::default();
        params.set_max_time(Duration::ZERO);
        let mut solver = AlmSolver::new(params, inner(500)).unwrap();

        let mut x = dvector![3.0, -2.0];
        let mut y = dvector![0.0];
        let stats = solver.solve(&f, &mut x, &mut y).unwrap();

        assert_eq!(stats.status(), SolverStatus::MaxTime);
        assert_eq!(stats.outer_iterations(), 1);
        assert!(x.iter().all(|xi| xi.is_finite()));
        assert!(y.iter().all(|yi| yi.is_finite()));
    }

    #[test]
    fn solvers_are_send() {
        fn assert_send<S: Send>(_: &S) {}

        let mut solver = solver(1e-8);
        solver.set_progress_callback(|_| {});
        assert_send(&solver);

        let f = ConstrainedQuadratic::halfspace();
        let handle = std::thread::spawn(move || {
            let mut x = dvector![0.0, 0.0];
            let mut y = dvector![0.0];
            solver.solve(&f, &mut x, &mut y).unwrap().status()
        });

        assert_eq!(handle.join().unwrap(), SolverStatus::Converged);
    }

    #[test]
    fn invalid_configuration() {
        let mut params = AlmParams::<f64>::default();
        params.set_initial_penalty(PenaltyInit::Fixed(0.0));
        assert!(matches!(
            AlmSolver::new(params, inner(100)),
            Err(ConfigError::InvalidParameter {
                name: "initial_penalty",
                ..
            })
        ));

        let f = ConstrainedQuadratic::halfspace();
        let mut x = dvector![0.0, 0.0];
        let mut y = dvector![0.0, 0.0];
        assert_eq!(
            solver(1e-6).solve(&f, &mut x, &mut y).unwrap_err(),
            ConfigError::DimensionMismatch {
                what: "y",
                expected: 1,
                actual: 2,
            }
        );
    }
}
