//! PANOC: proximal averaged Newton-type method.
//!
//! PANOC minimizes `psi(x) + h(x)` where `psi` is smooth (the augmented
//! Lagrangian of the problem for fixed multipliers and penalties) and `h` is
//! the proximable part (the l1 regularization combined with the variable
//! bounds). Each iteration computes the proximal gradient step
//!
//! ```text
//! x_hat = prox_{gamma h}(x - gamma grad psi(x)),   p = x_hat - x
//! ```
//!
//! and blends it with a quasi-Newton direction `q` provided by the
//! [direction](crate::direction) in a line search on the forward-backward
//! envelope
//!
//! ```text
//! phi(x) = psi(x) + h(x_hat) + grad psi(x)^T p + ||p||^2 / (2 gamma)
//! ```
//!
//! The step size `gamma` is derived from an estimate of the Lipschitz
//! constant of `grad psi` which is increased whenever the quadratic upper
//! bound of `psi` is violated. With no available direction, the method
//! reduces to the proximal gradient method.
//!
//! The returned iterate is the proximal point `x_hat` of the last iterate, so
//! it satisfies the variable bounds exactly.
//!
//! # References
//!
//! \[1\] [PANOC: A nonlinear MPC algorithm based on proximal gradient
//! method](https://doi.org/10.1109/CDC.2017.8263933)
//!
//! \[2\] [Forward-backward quasi-Newton methods for nonsmooth optimization
//! problems](https://doi.org/10.1007/s10589-017-9912-y)

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use getset::{CopyGetters, Setters};
use log::{debug, trace};
use nalgebra::{convert, DVector, RealField};

use crate::core::{
    all_finite, validate_problem, AugmentedLagrangian, ConfigError, EvalCounter,
    InnerSolveOptions, Problem, ProblemError, ProblemWithCounters, SolverStatus,
};
use crate::derivatives;
use crate::direction::{Direction, DirectionStrategy};

/// Specification for initial value of the Lipschitz constant of the
/// gradient.
#[derive(Debug, Clone, Copy)]
pub enum LipschitzInit<T> {
    /// Estimated by finite differences of the gradient in the initial point.
    Estimated,
    /// Fixed value.
    Fixed(T),
}

/// Quantity that is compared to the tolerance to decide convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanocStoppingCriterion {
    /// `||x - x_hat||_2 / gamma`.
    FixedPointResidual,
    /// `||x - x_hat||_inf / gamma`.
    FixedPointResidualInf,
    /// `||prox_h(x - grad psi(x)) - x||_inf`, i.e., the fixed-point residual
    /// for unit step size.
    ProjectedGradientNorm,
    /// `||(x - x_hat) / gamma + grad psi(x_hat) - grad psi(x)||_inf`, an
    /// approximation of the violation of the first order optimality
    /// conditions in `x_hat`.
    ApproxKkt,
}

/// Options for [`PanocSolver`].
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct PanocParams<T: RealField + Copy> {
    /// Initial Lipschitz constant. Default: estimated (see
    /// [`LipschitzInit`]).
    lipschitz_init: LipschitzInit<T>,
    /// Relative step of the finite differences in the Lipschitz estimate.
    /// Default: `1e-6`.
    lipschitz_epsilon: T,
    /// Minimum absolute step of the finite differences in the Lipschitz
    /// estimate. Default: `1e-12`.
    lipschitz_delta: T,
    /// Ratio of the step size and the inverse of the Lipschitz constant.
    /// Default: `0.95`.
    lipschitz_gamma_factor: T,
    /// Minimum Lipschitz constant. Default: `1e-5`.
    l_min: T,
    /// Maximum Lipschitz constant. Default: `1e20`.
    l_max: T,
    /// Maximum number of iterations. Default: `100`.
    max_iterations: usize,
    /// Time budget. Default: 5 minutes.
    max_time: Duration,
    /// Stopping criterion. Default: fixed-point residual (see
    /// [`PanocStoppingCriterion`]).
    stopping_criterion: PanocStoppingCriterion,
    /// Number of previous envelope values the line search compares to.
    /// `1` gives a monotone line search. Default: `1`.
    nonmonotonicity_window: usize,
    /// Sufficient decrease factor `beta` of the line search. Default: `0.95`.
    linesearch_strictness: T,
    /// Minimum blending coefficient `tau` before falling back to the
    /// proximal gradient step. Default: `1/256`.
    min_linesearch_coefficient: T,
    /// Factor by which `tau` shrinks in backtracking. Default: `0.5`.
    linesearch_shrink_factor: T,
    /// Number of consecutive iterations without change of the iterate
    /// allowed before returning [`SolverStatus::NoProgress`]. Default: `10`.
    max_no_progress: usize,
    /// Relative tolerance on the quadratic upper bound check. Default:
    /// `10 EPSILON`.
    quadratic_upperbound_tolerance_factor: T,
    /// Relative tolerance on the sufficient decrease of the envelope.
    /// Default: `10 EPSILON`.
    linesearch_tolerance_factor: T,
}

impl<T: RealField + Copy> Default for PanocParams<T> {
    fn default() -> Self {
        Self {
            lipschitz_init: LipschitzInit::Estimated,
            lipschitz_epsilon: convert(1e-6),
            lipschitz_delta: convert(1e-12),
            lipschitz_gamma_factor: convert(0.95),
            l_min: convert(1e-5),
            l_max: convert(1e20),
            max_iterations: 100,
            max_time: Duration::from_secs(300),
            stopping_criterion: PanocStoppingCriterion::FixedPointResidual,
            nonmonotonicity_window: 1,
            linesearch_strictness: convert(0.95),
            min_linesearch_coefficient: convert(1.0 / 256.0),
            linesearch_shrink_factor: convert(0.5),
            max_no_progress: 10,
            quadratic_upperbound_tolerance_factor: convert(10.0 * f64::EPSILON),
            linesearch_tolerance_factor: convert(10.0 * f64::EPSILON),
        }
    }
}

impl<T: RealField + Copy> PanocParams<T> {
    /// Checks the values of the options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = T::zero();
        let one = T::one();
        let positive = |value: T| value > zero && value.is_finite();

        if let LipschitzInit::Fixed(l) = self.lipschitz_init {
            if !positive(l) {
                return Err(ConfigError::invalid(
                    "lipschitz_init",
                    "must be positive and finite",
                ));
            }
        }

        if !positive(self.lipschitz_epsilon) || !positive(self.lipschitz_delta) {
            return Err(ConfigError::invalid(
                "lipschitz_epsilon/lipschitz_delta",
                "must be positive and finite",
            ));
        }

        if !positive(self.lipschitz_gamma_factor) || self.lipschitz_gamma_factor >= one {
            return Err(ConfigError::invalid(
                "lipschitz_gamma_factor",
                "must be in (0, 1)",
            ));
        }

        if !positive(self.l_min) || !(self.l_max >= self.l_min) {
            return Err(ConfigError::invalid(
                "l_min/l_max",
                "must satisfy 0 < l_min <= l_max",
            ));
        }

        if self.nonmonotonicity_window == 0 {
            return Err(ConfigError::invalid(
                "nonmonotonicity_window",
                "must be positive",
            ));
        }

        if !positive(self.linesearch_strictness) || self.linesearch_strictness >= one {
            return Err(ConfigError::invalid(
                "linesearch_strictness",
                "must be in (0, 1)",
            ));
        }

        if !positive(self.min_linesearch_coefficient) || self.min_linesearch_coefficient > one {
            return Err(ConfigError::invalid(
                "min_linesearch_coefficient",
                "must be in (0, 1]",
            ));
        }

        if !positive(self.linesearch_shrink_factor) || self.linesearch_shrink_factor >= one {
            return Err(ConfigError::invalid(
                "linesearch_shrink_factor",
                "must be in (0, 1)",
            ));
        }

        if !(self.quadratic_upperbound_tolerance_factor >= zero)
            || !(self.linesearch_tolerance_factor >= zero)
        {
            return Err(ConfigError::invalid(
                "tolerance factors",
                "must be nonnegative",
            ));
        }

        Ok(())
    }
}

/// Statistics of a [`PanocSolver::solve`] call.
#[derive(Debug, Clone, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct PanocStats<T: RealField + Copy> {
    /// Reason of the termination.
    status: SolverStatus,
    /// Value of the stopping criterion in the returned iterate.
    epsilon: T,
    /// Wall-clock time of the call.
    elapsed_time: Duration,
    /// Number of iterations.
    iterations: usize,
    /// Number of iterations in which a direction was available but the line
    /// search had to fall back to the proximal gradient step.
    linesearch_failures: usize,
    /// Number of rejected line search candidates.
    linesearch_backtracks: usize,
    /// Number of times the step size was decreased.
    stepsize_backtracks: usize,
    /// Number of non-finite directions.
    direction_failures: usize,
    /// Number of steps rejected by the direction model.
    direction_update_rejected: usize,
    /// Number of iterations accepting the full quasi-Newton step.
    tau_1_accepted: usize,
    /// Number of iterations with a direction.
    count_tau: usize,
    /// Sum of the accepted blending coefficients.
    sum_tau: T,
    /// Final step size.
    final_gamma: T,
    /// Value of the smooth part in the returned iterate.
    final_psi: T,
    /// Value of the nonsmooth part in the returned iterate.
    final_h: T,
    /// Value of the forward-backward envelope in the last iterate.
    final_phi: T,
    /// Problem evaluations made during the call.
    evaluations: EvalCounter,
}

impl<T: RealField + Copy> PanocStats<T> {
    fn new() -> Self {
        let zero = T::zero();

        Self {
            status: SolverStatus::MaxIterations,
            epsilon: convert(f64::INFINITY),
            elapsed_time: Duration::ZERO,
            iterations: 0,
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
            evaluations: EvalCounter::default(),
        }
    }
}

/// State of the solver passed to the progress callback at the beginning of
/// every iteration.
pub struct PanocProgress<'a, T: RealField + Copy> {
    /// Iteration number.
    pub k: usize,
    /// Current iterate.
    pub x: &'a DVector<T>,
    /// Proximal gradient step.
    pub p: &'a DVector<T>,
    /// Squared norm of the proximal gradient step.
    pub norm_sq_p: T,
    /// Proximal point.
    pub x_hat: &'a DVector<T>,
    /// Smooth part in the current iterate.
    pub psi: T,
    /// Gradient of the smooth part in the current iterate.
    pub grad_psi: &'a DVector<T>,
    /// Smooth part in the proximal point.
    pub psi_hat: T,
    /// Forward-backward envelope in the current iterate.
    pub phi: T,
    /// Step size.
    pub gamma: T,
    /// Lipschitz constant estimate.
    pub lipschitz: T,
    /// Blending coefficient accepted in the previous iteration.
    pub tau: T,
    /// Value of the stopping criterion.
    pub epsilon: T,
}

/// Callback invoked at the beginning of every iteration.
pub type PanocCallback<T> = Box<dyn FnMut(&PanocProgress<'_, T>) + Send>;

/// PANOC solver.
///
/// See [module](self) documentation for more details.
pub struct PanocSolver<T: RealField + Copy, D = Direction<T>> {
    params: PanocParams<T>,
    direction: D,
    callback: Option<PanocCallback<T>>,
}

impl<T: RealField + Copy> PanocSolver<T> {
    /// Initializes the solver with default options and the default
    /// direction.
    pub fn with_defaults() -> Self {
        Self {
            params: PanocParams::default(),
            direction: Direction::default(),
            callback: None,
        }
    }
}

impl<T: RealField + Copy, D: DirectionStrategy<T>> PanocSolver<T, D> {
    /// Initializes the solver with given options and direction.
    pub fn new(params: PanocParams<T>, direction: D) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            params,
            direction,
            callback: None,
        })
    }

    /// Gets the options.
    pub fn params(&self) -> &PanocParams<T> {
        &self.params
    }

    /// Gets the direction.
    pub fn direction(&self) -> &D {
        &self.direction
    }

    /// Sets the progress callback.
    pub fn set_progress_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnMut(&PanocProgress<'_, T>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Removes the progress callback.
    pub fn clear_progress_callback(&mut self) -> &mut Self {
        self.callback = None;
        self
    }

    /// Minimizes a problem without general constraints.
    ///
    /// The variable `x` holds the initial guess on input and the solution on
    /// output.
    pub fn minimize<P: Problem<Field = T>>(
        &mut self,
        problem: &P,
        tolerance: T,
        x: &mut DVector<T>,
    ) -> Result<PanocStats<T>, ConfigError> {
        if problem.num_constraints() != 0 {
            return Err(ConfigError::invalid(
                "problem",
                "general constraints require multipliers and penalties",
            ));
        }

        let mut y = DVector::zeros(0);
        let sigma = DVector::zeros(0);
        let mut err_z = DVector::zeros(0);

        self.solve(
            problem,
            InnerSolveOptions {
                tolerance,
                max_time: None,
            },
            x,
            &mut y,
            &sigma,
            &mut err_z,
        )
    }

    /// Minimizes the augmented Lagrangian of a problem for multipliers `y`
    /// and penalty weights `sigma`.
    ///
    /// On output, `x` holds the solution, `y` the candidate multipliers in
    /// the solution and `err_z` the difference between the candidate and
    /// the input multipliers scaled by the inverse of the penalty weights
    /// (the constraint violation measure of the outer loop).
    ///
    /// All non-fatal terminations are reported in the returned statistics.
    /// An error is returned only for invalid inputs, before any evaluation
    /// of the problem.
    pub fn solve<P: Problem<Field = T>>(
        &mut self,
        problem: &P,
        options: InnerSolveOptions<T>,
        x: &mut DVector<T>,
        y: &mut DVector<T>,
        sigma: &DVector<T>,
        err_z: &mut DVector<T>,
    ) -> Result<PanocStats<T>, ConfigError> {
        let n = problem.num_variables();
        let m = problem.num_constraints();

        validate_problem(problem)?;
        ConfigError::check_dim("x", n, x.nrows())?;
        ConfigError::check_dim("y", m, y.nrows())?;
        ConfigError::check_dim("sigma", m, sigma.nrows())?;
        ConfigError::check_dim("err_z", m, err_z.nrows())?;

        if !sigma.iter().all(|s| *s > T::zero() && s.is_finite()) {
            return Err(ConfigError::invalid(
                "sigma",
                "penalty weights must be positive and finite",
            ));
        }

        if !(options.tolerance > T::zero()) {
            return Err(ConfigError::invalid("tolerance", "must be positive"));
        }

        let start = Instant::now();
        let max_time = options
            .max_time
            .map_or(self.params.max_time, |t| t.min(self.params.max_time));

        let counted = ProblemWithCounters::new(problem);
        let mut stats = PanocStats::new();

        let y_hat = {
            let mut psi = AugmentedLagrangian::new(&counted, y, sigma);
            let mut run = Run::new(self, n, options.tolerance, start, max_time);
            run.iterate(&mut psi, x, &mut stats);
            psi.y_hat().clone_owned()
        };

        if m > 0 && stats.status != SolverStatus::NumericalError {
            for i in 0..m {
                err_z[i] = (y_hat[i] - y[i]) / sigma[i];
            }
            y.copy_from(&y_hat);
        }

        stats.elapsed_time = start.elapsed();
        stats.evaluations = counted.evaluations();

        debug!(
            "PANOC finished: {} after {} iterations, epsilon = {}",
            stats.status, stats.iterations, stats.epsilon
        );

        Ok(stats)
    }
}

/// Iterate together with all quantities derived from it.
struct Iterate<T: RealField + Copy> {
    x: DVector<T>,
    x_hat: DVector<T>,
    p: DVector<T>,
    grad_psi: DVector<T>,
    psi: T,
    psi_hat: T,
    h_hat: T,
    norm_sq_p: T,
    grad_psi_p: T,
    phi: T,
}

impl<T: RealField + Copy> Iterate<T> {
    fn zeros(n: usize) -> Self {
        let zero = T::zero();

        Self {
            x: DVector::zeros(n),
            x_hat: DVector::zeros(n),
            p: DVector::zeros(n),
            grad_psi: DVector::zeros(n),
            psi: zero,
            psi_hat: zero,
            h_hat: zero,
            norm_sq_p: zero,
            grad_psi_p: zero,
            phi: zero,
        }
    }

    fn is_finite(&self) -> bool {
        self.psi.is_finite()
            && self.psi_hat.is_finite()
            && self.h_hat.is_finite()
            && all_finite(&self.grad_psi)
            && all_finite(&self.x_hat)
    }

    // Evaluates psi and its gradient at x.
    fn eval_psi_grad<P: Problem<Field = T>>(
        &mut self,
        psi: &mut AugmentedLagrangian<'_, P>,
    ) -> Result<(), ProblemError> {
        self.psi = psi.eval_psi_grad(&self.x, &mut self.grad_psi)?;
        Ok(())
    }

    // Computes the proximal gradient step, psi in the proximal point and the
    // envelope.
    fn eval_prox_step<P: Problem<Field = T>>(
        &mut self,
        psi: &mut AugmentedLagrangian<'_, P>,
        gamma: T,
    ) -> Result<(), ProblemError> {
        self.h_hat = psi.problem().eval_proximal_gradient_step(
            gamma,
            &self.x,
            &self.grad_psi,
            &mut self.x_hat,
            &mut self.p,
        )?;
        self.psi_hat = psi.eval_psi(&self.x_hat)?;
        self.norm_sq_p = self.p.norm_squared();
        self.grad_psi_p = self.grad_psi.dot(&self.p);
        self.update_phi(gamma);
        Ok(())
    }

    fn update_phi(&mut self, gamma: T) {
        let two = T::one() + T::one();
        self.phi = self.psi + self.h_hat + self.grad_psi_p + self.norm_sq_p / (two * gamma);
    }

    // Determines whether psi(x_hat) is below the quadratic upper bound given
    // by the Lipschitz estimate.
    fn satisfies_qub(&self, lipschitz: T, tolerance_factor: T) -> bool {
        let two = T::one() + T::one();
        let margin = (T::one() + self.psi.abs()) * tolerance_factor;
        let bound = self.psi + self.grad_psi_p + lipschitz / two * self.norm_sq_p;
        self.psi_hat <= bound + margin
    }
}

/// State of a single solve.
struct Run<'s, T: RealField + Copy, D> {
    params: &'s PanocParams<T>,
    direction: &'s mut D,
    callback: Option<&'s mut PanocCallback<T>>,
    tolerance: T,
    start: Instant,
    max_time: Duration,
    curr: Iterate<T>,
    next: Iterate<T>,
    q: DVector<T>,
    work_n: DVector<T>,
    work_grad: DVector<T>,
    window: VecDeque<T>,
    lipschitz: T,
    gamma: T,
    initialized: bool,
}

impl<'s, T: RealField + Copy, D: DirectionStrategy<T>> Run<'s, T, D> {
    fn new(
        solver: &'s mut PanocSolver<T, D>,
        n: usize,
        tolerance: T,
        start: Instant,
        max_time: Duration,
    ) -> Self {
        let PanocSolver {
            params,
            direction,
            callback,
        } = solver;

        Self {
            params,
            direction,
            callback: callback.as_mut(),
            tolerance,
            start,
            max_time,
            curr: Iterate::zeros(n),
            next: Iterate::zeros(n),
            q: DVector::zeros(n),
            work_n: DVector::zeros(n),
            work_grad: DVector::zeros(n),
            window: VecDeque::new(),
            lipschitz: T::zero(),
            gamma: T::zero(),
            initialized: false,
        }
    }

    fn iterate<P: Problem<Field = T>>(
        &mut self,
        psi: &mut AugmentedLagrangian<'_, P>,
        x: &mut DVector<T>,
        stats: &mut PanocStats<T>,
    ) {
        self.curr.x.copy_from(x);

        match self.run(psi, stats) {
            Ok(status) => {
                stats.status = status;
                x.copy_from(&self.curr.x_hat);
            }
            Err(error) => {
                debug!("PANOC stopped on numerical error: {}", error);
                stats.status = SolverStatus::NumericalError;

                // The last iterate that passed all checks, otherwise the
                // initial guess is kept.
                if self.initialized && self.curr.is_finite() {
                    x.copy_from(&self.curr.x_hat);
                }
            }
        }

        stats.final_gamma = self.gamma;
        stats.final_psi = self.curr.psi_hat;
        stats.final_h = self.curr.h_hat;
        stats.final_phi = self.curr.phi;

        // Refresh y_hat for the returned point.
        if stats.status != SolverStatus::NumericalError && psi.y().nrows() > 0 {
            let refreshed = psi.eval_psi(x);
            if refreshed.is_err() || !all_finite(psi.y_hat()) {
                debug!("evaluation of multipliers in the final iterate failed");
                stats.status = SolverStatus::NumericalError;
            }
        }
    }

    fn set_gamma(&mut self, lipschitz: T) {
        self.lipschitz = lipschitz;
        self.gamma = self.params.lipschitz_gamma_factor / lipschitz;
    }

    fn initialize<P: Problem<Field = T>>(
        &mut self,
        psi: &mut AugmentedLagrangian<'_, P>,
    ) -> Result<(), ProblemError> {
        let params = self.params;

        self.curr.eval_psi_grad(psi)?;
        if !self.curr.psi.is_finite() || !all_finite(&self.curr.grad_psi) {
            return Err(ProblemError::InvalidValue);
        }

        let lipschitz = match params.lipschitz_init {
            LipschitzInit::Fixed(l) => l,
            LipschitzInit::Estimated => {
                let Self {
                    curr,
                    work_n,
                    work_grad,
                    ..
                } = self;

                let estimate = derivatives::estimate_lipschitz(
                    |x, grad| psi.eval_psi_grad(x, grad),
                    &curr.x,
                    &curr.grad_psi,
                    params.lipschitz_epsilon,
                    params.lipschitz_delta,
                    work_n,
                    work_grad,
                )?;

                if estimate.is_finite() {
                    estimate
                } else {
                    params.l_max
                }
            }
        };

        self.set_gamma(lipschitz.max(params.l_min).min(params.l_max));
        debug!("initial L = {}, gamma = {}", self.lipschitz, self.gamma);

        self.direction.initialize(self.curr.x.nrows());
        self.curr.eval_prox_step(psi, self.gamma)?;
        self.backtrack_qub(psi)?;
        self.initialized = true;

        Ok(())
    }

    // Increases the Lipschitz estimate of the current iterate until the
    // quadratic upper bound holds.
    fn backtrack_qub<P: Problem<Field = T>>(
        &mut self,
        psi: &mut AugmentedLagrangian<'_, P>,
    ) -> Result<(), ProblemError> {
        let params = self.params;
        let two = T::one() + T::one();

        loop {
            if !self.curr.is_finite() {
                return Err(ProblemError::InvalidValue);
            }

            if self.lipschitz >= params.l_max
                || self
                    .curr
                    .satisfies_qub(self.lipschitz, params.quadratic_upperbound_tolerance_factor)
            {
                return Ok(());
            }

            let gamma_old = self.gamma;
            self.set_gamma(self.lipschitz * two);
            self.direction.changed_gamma(self.gamma, gamma_old);
            trace!("quadratic upper bound violated, L = {}", self.lipschitz);

            self.curr.eval_prox_step(psi, self.gamma)?;
        }
    }

    fn stopping_criterion<P: Problem<Field = T>>(
        &mut self,
        psi: &mut AugmentedLagrangian<'_, P>,
    ) -> Result<T, ProblemError> {
        let curr = &self.curr;

        let value = match self.params.stopping_criterion {
            PanocStoppingCriterion::FixedPointResidual => curr.norm_sq_p.sqrt() / self.gamma,
            PanocStoppingCriterion::FixedPointResidualInf => curr.p.amax() / self.gamma,
            PanocStoppingCriterion::ProjectedGradientNorm => {
                psi.problem().eval_proximal_gradient_step(
                    T::one(),
                    &curr.x,
                    &curr.grad_psi,
                    &mut self.work_n,
                    &mut self.q,
                )?;
                self.q.amax()
            }
            PanocStoppingCriterion::ApproxKkt => {
                psi.eval_psi_grad(&curr.x_hat, &mut self.work_grad)?;

                let mut value = T::zero();
                for i in 0..curr.p.nrows() {
                    let r = -curr.p[i] / self.gamma + self.work_grad[i] - curr.grad_psi[i];
                    value = value.max(r.abs());
                }
                value
            }
        };

        Ok(value)
    }

    fn report(&mut self, k: usize, tau: T, epsilon: T) {
        if let Some(callback) = self.callback.as_deref_mut() {
            let curr = &self.curr;

            callback(&PanocProgress {
                k,
                x: &curr.x,
                p: &curr.p,
                norm_sq_p: curr.norm_sq_p,
                x_hat: &curr.x_hat,
                psi: curr.psi,
                grad_psi: &curr.grad_psi,
                psi_hat: curr.psi_hat,
                phi: curr.phi,
                gamma: self.gamma,
                lipschitz: self.lipschitz,
                tau,
                epsilon,
            });
        }
    }

    fn push_phi(&mut self, phi: T) {
        if self.window.len() == self.params.nonmonotonicity_window {
            self.window.pop_front();
        }
        self.window.push_back(phi);
    }

    fn reference_phi(&self) -> T {
        self.window
            .iter()
            .copied()
            .fold(self.curr.phi, |acc, phi| acc.max(phi))
    }

    fn run<P: Problem<Field = T>>(
        &mut self,
        psi: &mut AugmentedLagrangian<'_, P>,
        stats: &mut PanocStats<T>,
    ) -> Result<SolverStatus, ProblemError> {
        let params = self.params;
        let zero = T::zero();
        let one = T::one();
        let two = one + one;

        self.initialize(psi)?;
        self.window.clear();
        self.push_phi(self.curr.phi);

        let mut k = 0;
        let mut tau = zero;
        let mut no_progress = 0;

        loop {
            let epsilon = self.stopping_criterion(psi)?;
            stats.epsilon = epsilon;
            stats.iterations = k;

            self.report(k, tau, epsilon);

            debug!(
                "iteration {}: psi = {}, phi = {}, gamma = {}, epsilon = {}",
                k, self.curr.psi, self.curr.phi, self.gamma, epsilon
            );

            if epsilon <= self.tolerance {
                return Ok(SolverStatus::Converged);
            }

            if self.start.elapsed() >= self.max_time {
                return Ok(SolverStatus::MaxTime);
            }

            if k >= params.max_iterations {
                return Ok(SolverStatus::MaxIterations);
            }

            if no_progress >= params.max_no_progress {
                return Ok(SolverStatus::NoProgress);
            }

            // Quasi-Newton direction.
            let has_direction = {
                let gamma = self.gamma;
                let Self {
                    direction, curr, q, ..
                } = self;

                let available = direction.apply(psi, gamma, &curr.x, &curr.p, &curr.grad_psi, q)?;

                if available && !all_finite(q) {
                    debug!("{} direction is not finite", direction.name());
                    stats.direction_failures += 1;
                    direction.reset();
                    false
                } else {
                    available
                }
            };

            tau = if has_direction { one } else { zero };

            let sigma_decrease = params.linesearch_strictness * (one - self.gamma * self.lipschitz)
                / (two * self.gamma)
                * self.curr.norm_sq_p;
            let phi_ref = self.reference_phi();
            let linesearch_tolerance = phi_ref.abs() * params.linesearch_tolerance_factor;

            let mut restart = false;

            loop {
                // x_next = x + (1 - tau) p + tau q
                self.next.x.copy_from(&self.curr.x);
                self.next.x.axpy(one - tau, &self.curr.p, one);
                if tau > zero {
                    self.next.x.axpy(tau, &self.q, one);
                }

                let evaluated = match self.next.eval_psi_grad(psi) {
                    Ok(()) => self.next.eval_prox_step(psi, self.gamma),
                    Err(error) => Err(error),
                };

                let finite = evaluated.is_ok() && self.next.is_finite();

                if !finite {
                    if tau == zero {
                        return Err(evaluated.err().unwrap_or(ProblemError::InvalidValue));
                    }

                    trace!("candidate is not finite, tau = {}", tau);
                    stats.linesearch_backtracks += 1;
                    tau = self.shrink_tau(tau);
                    continue;
                }

                if self.lipschitz < params.l_max
                    && !self
                        .next
                        .satisfies_qub(self.lipschitz, params.quadratic_upperbound_tolerance_factor)
                {
                    let gamma_old = self.gamma;
                    self.set_gamma(self.lipschitz * two);
                    debug!(
                        "quadratic upper bound violated in the candidate, L = {}, gamma = {}",
                        self.lipschitz, self.gamma
                    );

                    stats.stepsize_backtracks += 1;
                    self.direction.changed_gamma(self.gamma, gamma_old);

                    self.curr.eval_prox_step(psi, self.gamma)?;
                    self.backtrack_qub(psi)?;

                    self.window.clear();
                    self.push_phi(self.curr.phi);

                    restart = true;
                    break;
                }

                if tau == zero || self.next.phi <= phi_ref - sigma_decrease + linesearch_tolerance {
                    break;
                }

                trace!(
                    "candidate rejected: phi = {}, reference = {}, tau = {}",
                    self.next.phi,
                    phi_ref,
                    tau
                );
                stats.linesearch_backtracks += 1;
                tau = self.shrink_tau(tau);
            }

            if restart {
                tau = zero;
                continue;
            }

            if has_direction {
                stats.count_tau += 1;
                if tau == zero {
                    stats.linesearch_failures += 1;
                } else if tau == one {
                    stats.tau_1_accepted += 1;
                }
                stats.sum_tau += tau;
            }

            if self.next.x == self.curr.x {
                no_progress += 1;
            } else {
                no_progress = 0;

                let accepted = self.direction.update(
                    &self.curr.x,
                    &self.next.x,
                    &self.curr.p,
                    &self.next.p,
                );
                if !accepted {
                    stats.direction_update_rejected += 1;
                }
            }

            std::mem::swap(&mut self.curr, &mut self.next);
            self.push_phi(self.curr.phi);
            k += 1;
        }
    }

    fn shrink_tau(&self, tau: T) -> T {
        let tau = tau * self.params.linesearch_shrink_factor;

        if tau < self.params.min_linesearch_coefficient {
            T::zero()
        } else {
            tau
        }
    }
}
