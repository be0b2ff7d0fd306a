//! Abstractions for defining optimization problems.
//!
//! # Defining a problem
//!
//! A problem is any type that implements the [`Problem`] trait. It describes
//!
//! ```text
//! minimize    f(x) + h(x)
//! subject to  x in C
//!             g(x) in D
//! ```
//!
//! where `f` is smooth, `h` is a simple (proximable) regularizer, `C` is a box
//! of variable bounds and `D` is a box of bounds for the general constraints
//! `g`. The required methods are the objective and its gradient. Everything
//! else has a default implementation based on [`Problem::variable_bounds`],
//! [`Problem::general_bounds`] and [`Problem::l1_regularization`].
//!
//! ```rust
//! use proxalm::nalgebra as na;
//! use proxalm::{Bounds, Problem, ProblemError};
//! use na::{storage::{Storage, StorageMut}, Dyn, IsContiguous, Vector};
//!
//! struct Parabola {
//!     bounds: Bounds<f64>,
//! }
//!
//! impl Problem for Parabola {
//!     type Field = f64;
//!
//!     fn num_variables(&self) -> usize {
//!         2
//!     }
//!
//!     fn variable_bounds(&self) -> Option<&Bounds<Self::Field>> {
//!         Some(&self.bounds)
//!     }
//!
//!     fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
//!     where
//!         Sx: Storage<f64, Dyn> + IsContiguous,
//!     {
//!         Ok((x[0] - 3.0).powi(2) + x[1].powi(2))
//!     }
//!
//!     fn eval_objective_gradient<Sx, Sg>(
//!         &self,
//!         x: &Vector<f64, Dyn, Sx>,
//!         grad: &mut Vector<f64, Dyn, Sg>,
//!     ) -> Result<(), ProblemError>
//!     where
//!         Sx: Storage<f64, Dyn> + IsContiguous,
//!         Sg: StorageMut<f64, Dyn>,
//!     {
//!         grad[0] = 2.0 * (x[0] - 3.0);
//!         grad[1] = 2.0 * x[1];
//!         Ok(())
//!     }
//! }
//! ```

use nalgebra::{
    storage::{Storage, StorageMut},
    ComplexField, DVector, Dyn, IsContiguous, RealField, Vector,
};
use num_traits::Zero;
use thiserror::Error;

use super::bounds::{prox_l1_box_step, Bounds};
use super::solver::ConfigError;

/// Error encountered while evaluating a problem.
#[derive(Debug, Error)]
pub enum ProblemError {
    /// The problem does not provide this (optional) operation.
    #[error("operation {0} is not implemented by the problem")]
    NotImplemented(&'static str),
    /// An invalid value (NaN, positive or negative infinity) occurred.
    #[error("invalid value encountered")]
    InvalidValue,
    /// A custom error specific to the problem.
    #[error("{0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

/// The trait for defining optimization problems.
///
/// All evaluations take `x` as an immutable input and must not change the
/// state of the problem. The solvers never read anything from the problem
/// except through these methods.
pub trait Problem {
    /// Type of the field, usually f64 or f32.
    type Field: RealField + Copy;

    /// Number of variables `n`.
    fn num_variables(&self) -> usize;

    /// Number of general constraints `m`.
    fn num_constraints(&self) -> usize {
        0
    }

    /// Bounds of the variables. If not overridden, the variables are
    /// unconstrained.
    fn variable_bounds(&self) -> Option<&Bounds<Self::Field>> {
        None
    }

    /// Bounds of the general constraints. If not overridden, all constraints
    /// are equalities `g(x) = 0`.
    fn general_bounds(&self) -> Option<&Bounds<Self::Field>> {
        None
    }

    /// Weights of the l1 regularization `h(x) = sum_i lambda_i |x_i|`. Either
    /// a single weight for all variables or one weight per variable.
    fn l1_regularization(&self) -> Option<&DVector<Self::Field>> {
        None
    }

    /// Evaluates the objective `f(x)`.
    fn eval_objective<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous;

    /// Evaluates the gradient of the objective.
    fn eval_objective_gradient<Sx, Sg>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        grad: &mut Vector<Self::Field, Dyn, Sg>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sg: StorageMut<Self::Field, Dyn>;

    /// Evaluates the objective and its gradient at once. Override if the two
    /// share computations.
    fn eval_objective_and_gradient<Sx, Sg>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        grad: &mut Vector<Self::Field, Dyn, Sg>,
    ) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sg: StorageMut<Self::Field, Dyn>,
    {
        self.eval_objective_gradient(x, grad)?;
        self.eval_objective(x)
    }

    /// Evaluates the general constraints `g(x)`.
    fn eval_constraints<Sx, Sgx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        gx: &mut Vector<Self::Field, Dyn, Sgx>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sgx: StorageMut<Self::Field, Dyn>,
    {
        let _ = (x, gx);
        if self.num_constraints() == 0 {
            Ok(())
        } else {
            Err(ProblemError::NotImplemented("eval_constraints"))
        }
    }

    /// Evaluates the product of the constraint gradient with a vector
    /// `out = grad g(x) y` (the adjoint product `J(x)^T y`).
    fn eval_constraints_gradient_product<Sx, Sy, So>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        y: &Vector<Self::Field, Dyn, Sy>,
        out: &mut Vector<Self::Field, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sy: Storage<Self::Field, Dyn>,
        So: StorageMut<Self::Field, Dyn>,
    {
        let _ = (x, y);
        if self.num_constraints() == 0 {
            out.fill(Self::Field::zero());
            Ok(())
        } else {
            Err(ProblemError::NotImplemented(
                "eval_constraints_gradient_product",
            ))
        }
    }

    /// Evaluates the forward product of the constraint Jacobian with a vector
    /// `out = J(x) v`. Only needed by the structured direction.
    fn eval_constraints_jacobian_product<Sx, Sv, So>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        v: &Vector<Self::Field, Dyn, Sv>,
        out: &mut Vector<Self::Field, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sv: Storage<Self::Field, Dyn>,
        So: StorageMut<Self::Field, Dyn>,
    {
        let _ = (x, v, out);
        Err(ProblemError::NotImplemented(
            "eval_constraints_jacobian_product",
        ))
    }

    /// Evaluates the product of the Hessian of the Lagrangian with a vector
    /// `out = (scale * hess f(x) + sum_i y_i hess g_i(x)) v`. Only needed by
    /// the structured direction, which falls back to finite differences when
    /// not implemented.
    fn eval_lagrangian_hessian_product<Sx, Sy, Sv, So>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        y: &Vector<Self::Field, Dyn, Sy>,
        scale: Self::Field,
        v: &Vector<Self::Field, Dyn, Sv>,
        out: &mut Vector<Self::Field, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sy: Storage<Self::Field, Dyn>,
        Sv: Storage<Self::Field, Dyn>,
        So: StorageMut<Self::Field, Dyn>,
    {
        let _ = (x, y, scale, v, out);
        Err(ProblemError::NotImplemented(
            "eval_lagrangian_hessian_product",
        ))
    }

    /// Computes the proximal gradient step `x_hat = prox_{gamma h}(x - gamma
    /// grad)` together with `p = x_hat - x` and returns `h(x_hat)`.
    ///
    /// The default handles the l1 regularization combined with the variable
    /// bounds. Override for other regularizers.
    fn eval_proximal_gradient_step<Sx, Sg, Sxh, Sp>(
        &self,
        gamma: Self::Field,
        x: &Vector<Self::Field, Dyn, Sx>,
        grad: &Vector<Self::Field, Dyn, Sg>,
        x_hat: &mut Vector<Self::Field, Dyn, Sxh>,
        p: &mut Vector<Self::Field, Dyn, Sp>,
    ) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sg: Storage<Self::Field, Dyn>,
        Sxh: StorageMut<Self::Field, Dyn>,
        Sp: StorageMut<Self::Field, Dyn>,
    {
        Ok(prox_l1_box_step(
            self.variable_bounds(),
            self.l1_regularization(),
            gamma,
            x,
            grad,
            x_hat,
            p,
        ))
    }

    /// Computes `e = z - P_D(z)` where `P_D` is the projection onto the bounds
    /// of the general constraints.
    fn eval_projecting_difference_constraints<Sz, Se>(
        &self,
        z: &Vector<Self::Field, Dyn, Sz>,
        e: &mut Vector<Self::Field, Dyn, Se>,
    ) -> Result<(), ProblemError>
    where
        Sz: Storage<Self::Field, Dyn>,
        Se: StorageMut<Self::Field, Dyn>,
    {
        match self.general_bounds() {
            Some(bounds) => bounds.projecting_difference(z, e),
            None => e.copy_from(z),
        }
        Ok(())
    }

    /// Projects the Lagrange multipliers onto the set of admissible values
    /// limited by `max_multiplier`.
    fn eval_projection_multipliers<Sy>(
        &self,
        y: &mut Vector<Self::Field, Dyn, Sy>,
        max_multiplier: Self::Field,
    ) -> Result<(), ProblemError>
    where
        Sy: StorageMut<Self::Field, Dyn>,
    {
        match self.general_bounds() {
            Some(bounds) => bounds.project_multipliers(y, max_multiplier),
            None => y
                .iter_mut()
                .for_each(|yi| *yi = (*yi).max(-max_multiplier).min(max_multiplier)),
        }
        Ok(())
    }

    /// Collects the indices of variables for which the proximal gradient step
    /// is differentiable, i.e., lands strictly inside the bounds and away
    /// from the kink of the l1 regularization.
    fn eval_inactive_indices<Sx, Sg>(
        &self,
        gamma: Self::Field,
        x: &Vector<Self::Field, Dyn, Sx>,
        grad: &Vector<Self::Field, Dyn, Sg>,
        inactive: &mut Vec<usize>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sg: Storage<Self::Field, Dyn>,
    {
        let zero = Self::Field::zero();
        let bounds = self.variable_bounds();
        let l1 = self.l1_regularization();

        inactive.clear();

        for i in 0..x.nrows() {
            let lambda = match l1 {
                Some(l1) if l1.nrows() == 1 => l1[0],
                Some(l1) => l1[i],
                None => zero,
            };

            let v = x[i] - gamma * grad[i];
            let threshold = gamma * lambda;

            let z = if lambda > zero {
                if v > threshold {
                    v - threshold
                } else if v < -threshold {
                    v + threshold
                } else {
                    continue;
                }
            } else {
                v
            };

            if let Some(bounds) = bounds {
                if z <= bounds.lower()[i] || z >= bounds.upper()[i] {
                    continue;
                }
            }

            inactive.push(i);
        }

        Ok(())
    }
}

/// Checks that the description of the problem is consistent.
pub(crate) fn validate_problem<P: Problem>(problem: &P) -> Result<(), ConfigError> {
    let n = problem.num_variables();
    let m = problem.num_constraints();

    if n == 0 {
        return Err(ConfigError::invalid(
            "num_variables",
            "problem has no variables",
        ));
    }

    if let Some(bounds) = problem.variable_bounds() {
        ConfigError::check_dim("variable bounds", n, bounds.dim())?;
        if !bounds.is_valid() {
            return Err(ConfigError::invalid(
                "variable bounds",
                "lower bound greater than upper bound",
            ));
        }
    }

    if let Some(bounds) = problem.general_bounds() {
        ConfigError::check_dim("general bounds", m, bounds.dim())?;
        if !bounds.is_valid() {
            return Err(ConfigError::invalid(
                "general bounds",
                "lower bound greater than upper bound",
            ));
        }
    }

    if let Some(l1) = problem.l1_regularization() {
        if l1.nrows() != 1 {
            ConfigError::check_dim("l1 regularization", n, l1.nrows())?;
        }
        if !l1
            .iter()
            .all(|lambda| *lambda >= P::Field::zero() && ComplexField::is_finite(lambda))
        {
            return Err(ConfigError::invalid(
                "l1 regularization",
                "weights must be finite and nonnegative",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use nalgebra::dvector;

    use crate::testing::*;

    #[test]
    fn default_prox_uses_bounds_and_l1() {
        let f = Lasso::new(
            nalgebra::dmatrix![1.0, 0.0; 0.0, 1.0],
            dvector![1.0, -1.0],
            0.5,
        );

        let x = dvector![1.0, 1.0];
        let grad = dvector![0.0, 0.0];
        let mut x_hat = dvector![0.0, 0.0];
        let mut p = dvector![0.0, 0.0];

        let h = f
            .eval_proximal_gradient_step(1.0, &x, &grad, &mut x_hat, &mut p)
            .unwrap();

        assert_eq!(x_hat, dvector![0.5, 0.5]);
        assert_eq!(p, dvector![-0.5, -0.5]);
        assert_eq!(h, 0.5);
    }

    #[test]
    fn inactive_indices() {
        let f = BoxQuadratic::diagonal(
            dvector![1.0, 1.0, 1.0],
            dvector![0.0, 0.0, 0.0],
            [(-1.0, 1.0), (-1.0, 1.0), (-1.0, 1.0)].into_iter().collect(),
        );

        let x = dvector![0.0, 0.9, -0.5];
        let grad = dvector![0.0, -1.0, 1.0];
        let mut inactive = Vec::new();

        f.eval_inactive_indices(0.5, &x, &grad, &mut inactive)
            .unwrap();

        // x - gamma * grad = [0.0, 1.4, -1.0].
        assert_eq!(inactive, vec![0]);
    }

    #[test]
    fn validation() {
        let f = BoxQuadratic::diagonal(
            dvector![1.0, 1.0],
            dvector![0.0, 0.0],
            [(1.0, -1.0), (-1.0, 1.0)].into_iter().collect(),
        );
        assert!(matches!(
            validate_problem(&f),
            Err(ConfigError::InvalidParameter { .. })
        ));

        let f = BoxQuadratic::diagonal(
            dvector![1.0, 1.0],
            dvector![0.0, 0.0],
            [(-1.0, 1.0)].into_iter().collect(),
        );
        assert_eq!(
            validate_problem(&f),
            Err(ConfigError::DimensionMismatch {
                what: "variable bounds",
                expected: 2,
                actual: 1
            })
        );

        let f = Lasso::new(
            nalgebra::DMatrix::identity(2, 2),
            dvector![1.0, 1.0],
            f64::INFINITY,
        );
        assert!(matches!(
            validate_problem(&f),
            Err(ConfigError::InvalidParameter {
                name: "l1 regularization",
                ..
            })
        ));
    }

    #[test]
    fn equality_constraints_by_default() {
        let f = Rosenbrock::new(2);
        let z = dvector![1.0, -2.0];
        let mut e = dvector![0.0, 0.0];

        f.eval_projecting_difference_constraints(&z, &mut e)
            .unwrap();
        assert_eq!(e, z);
    }
}
