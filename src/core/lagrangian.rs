//! Augmented Lagrangian of a problem for fixed multipliers and penalties.
//!
//! For multipliers `y` and penalty weights `sigma` the augmented Lagrangian
//! is
//!
//! ```text
//! psi(x) = f(x) + 1/2 || zeta - P_D(zeta) ||^2_sigma,  zeta = g(x) + y / sigma
//! ```
//!
//! with gradient `grad f(x) + grad g(x) y_hat`, where `y_hat = sigma (zeta -
//! P_D(zeta))` is the candidate multiplier update. Without general
//! constraints, `psi = f` and no constraint evaluation is made.

use log::debug;
use nalgebra::{DVector, RealField};
use num_traits::{One, Zero};

use super::problem::{Problem, ProblemError};
use crate::derivatives;

struct Evaluator<'a, P: Problem> {
    problem: &'a P,
    y: &'a DVector<P::Field>,
    sigma: &'a DVector<P::Field>,
    zeta: DVector<P::Field>,
    y_hat: DVector<P::Field>,
    work_n: DVector<P::Field>,
}

impl<'a, P: Problem> Evaluator<'a, P> {
    fn is_constrained(&self) -> bool {
        self.y.nrows() > 0
    }

    // Evaluates g, stores y_hat and returns the penalty term.
    fn penalty(&mut self, x: &DVector<P::Field>) -> Result<P::Field, ProblemError> {
        self.problem.eval_constraints(x, &mut self.zeta)?;

        for i in 0..self.zeta.nrows() {
            self.zeta[i] += self.y[i] / self.sigma[i];
        }

        self.problem
            .eval_projecting_difference_constraints(&self.zeta, &mut self.y_hat)?;

        let mut dist = P::Field::zero();
        for i in 0..self.y_hat.nrows() {
            let di = self.y_hat[i];
            let sigma_di = self.sigma[i] * di;
            dist += sigma_di * di;
            self.y_hat[i] = sigma_di;
        }

        Ok(dist / (P::Field::one() + P::Field::one()))
    }

    fn psi(&mut self, x: &DVector<P::Field>) -> Result<P::Field, ProblemError> {
        let fx = self.problem.eval_objective(x)?;

        if !self.is_constrained() {
            return Ok(fx);
        }

        Ok(fx + self.penalty(x)?)
    }

    fn psi_grad(
        &mut self,
        x: &DVector<P::Field>,
        grad: &mut DVector<P::Field>,
    ) -> Result<P::Field, ProblemError> {
        let fx = self.problem.eval_objective_and_gradient(x, grad)?;

        if !self.is_constrained() {
            return Ok(fx);
        }

        let penalty = self.penalty(x)?;
        self.problem
            .eval_constraints_gradient_product(x, &self.y_hat, &mut self.work_n)?;
        *grad += &self.work_n;

        Ok(fx + penalty)
    }
}

/// Evaluator of the augmented Lagrangian `psi`, its gradient and products of
/// its Hessian with vectors.
pub struct AugmentedLagrangian<'a, P: Problem> {
    eval: Evaluator<'a, P>,
    jv: DVector<P::Field>,
    fd_x: DVector<P::Field>,
    fd_grad: DVector<P::Field>,
    analytic_hessian: bool,
}

impl<'a, P: Problem> AugmentedLagrangian<'a, P> {
    /// Initializes the evaluator for given multipliers and penalty weights.
    ///
    /// The lengths of `y` and `sigma` must be equal to the number of general
    /// constraints of the problem. The solvers check this before the
    /// evaluator is created.
    pub fn new(problem: &'a P, y: &'a DVector<P::Field>, sigma: &'a DVector<P::Field>) -> Self {
        let n = problem.num_variables();
        let m = y.nrows();

        Self {
            eval: Evaluator {
                problem,
                y,
                sigma,
                zeta: DVector::zeros(m),
                y_hat: DVector::zeros(m),
                work_n: DVector::zeros(if m > 0 { n } else { 0 }),
            },
            jv: DVector::zeros(m),
            fd_x: DVector::zeros(n),
            fd_grad: DVector::zeros(n),
            analytic_hessian: true,
        }
    }

    /// Gets the underlying problem.
    pub fn problem(&self) -> &'a P {
        self.eval.problem
    }

    /// Gets the penalty weights.
    pub fn sigma(&self) -> &'a DVector<P::Field> {
        self.eval.sigma
    }

    /// Gets the multipliers.
    pub fn y(&self) -> &'a DVector<P::Field> {
        self.eval.y
    }

    /// Gets the candidate multipliers `y_hat` computed in the last
    /// evaluation.
    pub fn y_hat(&self) -> &DVector<P::Field> {
        &self.eval.y_hat
    }

    /// Evaluates `psi(x)`.
    pub fn eval_psi(&mut self, x: &DVector<P::Field>) -> Result<P::Field, ProblemError> {
        self.eval.psi(x)
    }

    /// Evaluates `psi(x)` and its gradient.
    pub fn eval_psi_grad(
        &mut self,
        x: &DVector<P::Field>,
        grad: &mut DVector<P::Field>,
    ) -> Result<P::Field, ProblemError> {
        self.eval.psi_grad(x, grad)
    }

    /// Evaluates the product of the (generalized) Hessian of `psi` at `x`
    /// with vector `v`. The gradient `grad` at `x` is needed when the problem
    /// does not provide second-order information and the product is
    /// approximated by finite differences.
    pub fn eval_psi_hessian_product(
        &mut self,
        x: &DVector<P::Field>,
        grad: &DVector<P::Field>,
        v: &DVector<P::Field>,
        out: &mut DVector<P::Field>,
    ) -> Result<(), ProblemError> {
        if self.analytic_hessian {
            match self.analytic_hessian_product(x, v, out) {
                Err(ProblemError::NotImplemented(what)) => {
                    debug!("{} not available, using finite differences", what);
                    self.analytic_hessian = false;
                }
                result => return result,
            }
        }

        let Self {
            eval,
            fd_x,
            fd_grad,
            ..
        } = self;

        derivatives::hessian_vector_product(
            |x, grad| eval.psi_grad(x, grad),
            x,
            grad,
            v,
            out,
            fd_x,
            fd_grad,
        )
    }

    fn analytic_hessian_product(
        &mut self,
        x: &DVector<P::Field>,
        v: &DVector<P::Field>,
        out: &mut DVector<P::Field>,
    ) -> Result<(), ProblemError> {
        let zero = P::Field::zero();
        let eval = &mut self.eval;

        if !eval.is_constrained() {
            return eval
                .problem
                .eval_lagrangian_hessian_product(x, &eval.y_hat, P::Field::one(), v, out);
        }

        // Refresh y_hat for this point.
        eval.psi(x)?;

        eval.problem
            .eval_lagrangian_hessian_product(x, &eval.y_hat, P::Field::one(), v, out)?;
        eval.problem
            .eval_constraints_jacobian_product(x, v, &mut self.jv)?;

        // Only the constraints with nonzero distance to the set contribute.
        for i in 0..self.jv.nrows() {
            self.jv[i] = if eval.y_hat[i] != zero {
                eval.sigma[i] * self.jv[i]
            } else {
                zero
            };
        }

        eval.problem
            .eval_constraints_gradient_product(x, &self.jv, &mut eval.work_n)?;
        *out += &eval.work_n;

        Ok(())
    }
}

/// Checks that all components of a vector are finite.
pub(crate) fn all_finite<T: RealField + Copy>(v: &DVector<T>) -> bool {
    v.iter().all(|vi| vi.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    use crate::testing::*;

    #[test]
    fn unconstrained_psi_is_objective() {
        let f = Rosenbrock::new(2);
        let y = DVector::zeros(0);
        let sigma = DVector::zeros(0);
        let mut psi = AugmentedLagrangian::new(&f, &y, &sigma);

        let x = dvector![0.5, 2.0];
        let mut grad = dvector![0.0, 0.0];
        let mut expected = dvector![0.0, 0.0];

        let value = psi.eval_psi_grad(&x, &mut grad).unwrap();
        let fx = f.eval_objective_and_gradient(&x, &mut expected).unwrap();

        assert_eq!(value, fx);
        assert_eq!(grad, expected);
    }

    #[test]
    fn penalty_and_candidate_multipliers() {
        // min (x0 - 1)^2 + (x1 - 2)^2  s.t.  x0 + x1 <= 1
        let f = ConstrainedQuadratic::halfspace();
        let y = dvector![1.0];
        let sigma = dvector![2.0];
        let mut psi = AugmentedLagrangian::new(&f, &y, &sigma);

        let x = dvector![1.0, 1.0];
        let mut grad = dvector![0.0, 0.0];
        let value = psi.eval_psi_grad(&x, &mut grad).unwrap();

        // zeta = 2 + 1/2, distance to (-inf, 1] is 1.5, y_hat = 3.
        assert_abs_diff_eq!(psi.y_hat()[0], 3.0);
        assert_abs_diff_eq!(value, 1.0 + 0.5 * 2.0 * 1.5 * 1.5);
        assert_abs_diff_eq!(grad, dvector![0.0 + 3.0, -2.0 + 3.0]);
    }

    #[test]
    fn hessian_product_analytic_and_finite_differences_agree() {
        let f = ConstrainedQuadratic::halfspace();
        let y = dvector![1.0];
        let sigma = dvector![2.0];

        let x = dvector![1.0, 1.0];
        let v = dvector![0.3, -1.0];
        let mut grad = dvector![0.0, 0.0];

        let mut psi = AugmentedLagrangian::new(&f, &y, &sigma);
        psi.eval_psi_grad(&x, &mut grad).unwrap();

        let mut analytic = dvector![0.0, 0.0];
        psi.eval_psi_hessian_product(&x, &grad, &v, &mut analytic)
            .unwrap();

        // Hessian is 2 I + sigma a a^T with a = [1, 1].
        let expected = dvector![2.0 * 0.3 + 2.0 * (0.3 - 1.0), -2.0 + 2.0 * (0.3 - 1.0)];
        assert_abs_diff_eq!(analytic, expected, epsilon = 1e-12);

        let f = WithoutHessian(ConstrainedQuadratic::halfspace());
        let mut psi = AugmentedLagrangian::new(&f, &y, &sigma);
        let mut approx = dvector![0.0, 0.0];
        psi.eval_psi_hessian_product(&x, &grad, &v, &mut approx)
            .unwrap();

        assert_abs_diff_eq!(approx, expected, epsilon = 1e-5);
    }
}
