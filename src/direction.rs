//! Quasi-Newton directions for accelerating the proximal gradient method.
//!
//! A direction provider proposes a step `q` from the current iterate, the
//! proximal gradient step `p` and the step size `gamma`. The inner solver
//! blends `q` with `p` in its line search, so a poor direction slows down
//! the convergence but never breaks it.
//!
//! The direction is stateful. After each accepted step, the solver reports
//! the step to the direction so it can improve its model. When the step size
//! changes, the model is reset or rescaled.

mod lbfgs;
mod structured;

use nalgebra::{DVector, RealField};

use crate::core::{AugmentedLagrangian, ConfigError, Problem, ProblemError};

pub use lbfgs::*;
pub use structured::*;

/// Interface of a direction provider.
pub trait DirectionStrategy<T: RealField + Copy> {
    /// Name of the direction.
    fn name(&self) -> &'static str;

    /// Prepares the internal storage for problems with `n` variables and
    /// clears the history.
    fn initialize(&mut self, n: usize);

    /// Proposes a direction `q` at iterate `x` with proximal gradient step
    /// `p`, step size `gamma` and gradient `grad_psi` of the augmented
    /// Lagrangian.
    ///
    /// Returns `false` if no direction is available. The solver then falls
    /// back to the proximal gradient step.
    fn apply<P: Problem<Field = T>>(
        &mut self,
        psi: &mut AugmentedLagrangian<'_, P>,
        gamma: T,
        x: &DVector<T>,
        p: &DVector<T>,
        grad_psi: &DVector<T>,
        q: &mut DVector<T>,
    ) -> Result<bool, ProblemError>;

    /// Records an accepted step from `x` to `x_next`. Returns `false` if the
    /// step was rejected by the model.
    fn update(
        &mut self,
        x: &DVector<T>,
        x_next: &DVector<T>,
        p: &DVector<T>,
        p_next: &DVector<T>,
    ) -> bool;

    /// Notifies about the change of the step size.
    fn changed_gamma(&mut self, gamma_new: T, gamma_old: T);

    /// Forgets the whole history.
    fn reset(&mut self);
}

/// All directions provided by the crate.
#[derive(Debug, Clone)]
pub enum Direction<T: RealField + Copy> {
    /// See [`LbfgsDirection`].
    Lbfgs(LbfgsDirection<T>),
    /// See [`StructuredLbfgsDirection`].
    StructuredLbfgs(StructuredLbfgsDirection<T>),
}

impl<T: RealField + Copy> Direction<T> {
    /// Plain L-BFGS direction.
    pub fn lbfgs(options: LbfgsParams<T>) -> Result<Self, ConfigError> {
        Ok(Direction::Lbfgs(LbfgsDirection::new(options)?))
    }

    /// L-BFGS direction that exploits the structure of the box constraints
    /// and the curvature of the augmented Lagrangian.
    pub fn structured_lbfgs(
        options: LbfgsParams<T>,
        structured: StructuredLbfgsParams<T>,
    ) -> Result<Self, ConfigError> {
        Ok(Direction::StructuredLbfgs(StructuredLbfgsDirection::new(
            options, structured,
        )?))
    }
}

impl<T: RealField + Copy> Default for Direction<T> {
    fn default() -> Self {
        Direction::Lbfgs(LbfgsDirection::default())
    }
}

impl<T: RealField + Copy> DirectionStrategy<T> for Direction<T> {
    fn name(&self) -> &'static str {
        match self {
            Direction::Lbfgs(d) => d.name(),
            Direction::StructuredLbfgs(d) => d.name(),
        }
    }

    fn initialize(&mut self, n: usize) {
        match self {
            Direction::Lbfgs(d) => d.initialize(n),
            Direction::StructuredLbfgs(d) => d.initialize(n),
        }
    }

    fn apply<P: Problem<Field = T>>(
        &mut self,
        psi: &mut AugmentedLagrangian<'_, P>,
        gamma: T,
        x: &DVector<T>,
        p: &DVector<T>,
        grad_psi: &DVector<T>,
        q: &mut DVector<T>,
    ) -> Result<bool, ProblemError> {
        match self {
            Direction::Lbfgs(d) => d.apply(psi, gamma, x, p, grad_psi, q),
            Direction::StructuredLbfgs(d) => d.apply(psi, gamma, x, p, grad_psi, q),
        }
    }

    fn update(
        &mut self,
        x: &DVector<T>,
        x_next: &DVector<T>,
        p: &DVector<T>,
        p_next: &DVector<T>,
    ) -> bool {
        match self {
            Direction::Lbfgs(d) => d.update(x, x_next, p, p_next),
            Direction::StructuredLbfgs(d) => d.update(x, x_next, p, p_next),
        }
    }

    fn changed_gamma(&mut self, gamma_new: T, gamma_old: T) {
        match self {
            Direction::Lbfgs(d) => d.changed_gamma(gamma_new, gamma_old),
            Direction::StructuredLbfgs(d) => d.changed_gamma(gamma_new, gamma_old),
        }
    }

    fn reset(&mut self) {
        match self {
            Direction::Lbfgs(d) => d.reset(),
            Direction::StructuredLbfgs(d) => d.reset(),
        }
    }
}
