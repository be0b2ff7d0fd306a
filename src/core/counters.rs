//! Counting of problem evaluations.

use std::cell::Cell;
use std::ops::AddAssign;

use nalgebra::{
    storage::{Storage, StorageMut},
    DVector, Dyn, IsContiguous, Vector,
};

use super::bounds::Bounds;
use super::problem::{Problem, ProblemError};

/// Number of calls of each problem evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalCounter {
    /// Calls of [`Problem::eval_objective`].
    pub objective: usize,
    /// Calls of [`Problem::eval_objective_gradient`].
    pub objective_gradient: usize,
    /// Calls of [`Problem::eval_objective_and_gradient`].
    pub objective_and_gradient: usize,
    /// Calls of [`Problem::eval_constraints`].
    pub constraints: usize,
    /// Calls of [`Problem::eval_constraints_gradient_product`].
    pub constraints_gradient_product: usize,
    /// Calls of [`Problem::eval_constraints_jacobian_product`].
    pub constraints_jacobian_product: usize,
    /// Calls of [`Problem::eval_lagrangian_hessian_product`].
    pub lagrangian_hessian_product: usize,
    /// Calls of [`Problem::eval_proximal_gradient_step`].
    pub proximal_gradient_step: usize,
    /// Calls of [`Problem::eval_projecting_difference_constraints`].
    pub projecting_difference_constraints: usize,
    /// Calls of [`Problem::eval_projection_multipliers`].
    pub projection_multipliers: usize,
    /// Calls of [`Problem::eval_inactive_indices`].
    pub inactive_indices: usize,
}

impl EvalCounter {
    /// Total number of evaluations of the objective or its gradient.
    pub fn objective_total(&self) -> usize {
        self.objective + self.objective_gradient + self.objective_and_gradient
    }
}

impl AddAssign for EvalCounter {
    fn add_assign(&mut self, rhs: Self) {
        self.objective += rhs.objective;
        self.objective_gradient += rhs.objective_gradient;
        self.objective_and_gradient += rhs.objective_and_gradient;
        self.constraints += rhs.constraints;
        self.constraints_gradient_product += rhs.constraints_gradient_product;
        self.constraints_jacobian_product += rhs.constraints_jacobian_product;
        self.lagrangian_hessian_product += rhs.lagrangian_hessian_product;
        self.proximal_gradient_step += rhs.proximal_gradient_step;
        self.projecting_difference_constraints += rhs.projecting_difference_constraints;
        self.projection_multipliers += rhs.projection_multipliers;
        self.inactive_indices += rhs.inactive_indices;
    }
}

/// A wrapper of a problem that counts all evaluations.
///
/// The solvers wrap the problem they are given, so the counts are available
/// in their statistics without the need to use this type directly.
pub struct ProblemWithCounters<'p, P: Problem> {
    problem: &'p P,
    counter: Cell<EvalCounter>,
}

impl<'p, P: Problem> ProblemWithCounters<'p, P> {
    /// Wraps the problem with all counters set to zero.
    pub fn new(problem: &'p P) -> Self {
        Self {
            problem,
            counter: Cell::new(EvalCounter::default()),
        }
    }

    /// Gets the current counts.
    pub fn evaluations(&self) -> EvalCounter {
        self.counter.get()
    }

    /// Gets the wrapped problem.
    pub fn inner(&self) -> &'p P {
        self.problem
    }

    fn count(&self, which: fn(&mut EvalCounter) -> &mut usize) {
        let mut counter = self.counter.get();
        *which(&mut counter) += 1;
        self.counter.set(counter);
    }
}

impl<'p, P: Problem> Problem for ProblemWithCounters<'p, P> {
    type Field = P::Field;

    fn num_variables(&self) -> usize {
        self.problem.num_variables()
    }

    fn num_constraints(&self) -> usize {
        self.problem.num_constraints()
    }

    fn variable_bounds(&self) -> Option<&Bounds<Self::Field>> {
        self.problem.variable_bounds()
    }

    fn general_bounds(&self) -> Option<&Bounds<Self::Field>> {
        self.problem.general_bounds()
    }

    fn l1_regularization(&self) -> Option<&DVector<Self::Field>> {
        self.problem.l1_regularization()
    }

    fn eval_objective<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        self.count(|c| &mut c.objective);
        self.problem.eval_objective(x)
    }

    fn eval_objective_gradient<Sx, Sg>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        grad: &mut Vector<Self::Field, Dyn, Sg>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sg: StorageMut<Self::Field, Dyn>,
    {
        self.count(|c| &mut c.objective_gradient);
        self.problem.eval_objective_gradient(x, grad)
    }

    fn eval_objective_and_gradient<Sx, Sg>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        grad: &mut Vector<Self::Field, Dyn, Sg>,
    ) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sg: StorageMut<Self::Field, Dyn>,
    {
        self.count(|c| &mut c.objective_and_gradient);
        self.problem.eval_objective_and_gradient(x, grad)
    }

    fn eval_constraints<Sx, Sgx>(
        &self,
        x: &Vector<Self::Field, Dyn, Sx>,
        gx: &mut Vector<Self::Field, Dyn, Sgx>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
        Sgx: StorageMut<Self::Field, Dyn>,
    {
        self.count(|c| &mut c.constraints);
        self.problem.eval_constraints(x, gx)
    }

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
        self.count(|c| &mut c.constraints_gradient_product);
        self.problem.eval_constraints_gradient_product(x, y, out)
    }

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
        self.count(|c| &mut c.constraints_jacobian_product);
        self.problem.eval_constraints_jacobian_product(x, v, out)
    }

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
        self.count(|c| &mut c.lagrangian_hessian_product);
        self.problem
            .eval_lagrangian_hessian_product(x, y, scale, v, out)
    }

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
        self.count(|c| &mut c.proximal_gradient_step);
        self.problem
            .eval_proximal_gradient_step(gamma, x, grad, x_hat, p)
    }

    fn eval_projecting_difference_constraints<Sz, Se>(
        &self,
        z: &Vector<Self::Field, Dyn, Sz>,
        e: &mut Vector<Self::Field, Dyn, Se>,
    ) -> Result<(), ProblemError>
    where
        Sz: Storage<Self::Field, Dyn>,
        Se: StorageMut<Self::Field, Dyn>,
    {
        self.count(|c| &mut c.projecting_difference_constraints);
        self.problem.eval_projecting_difference_constraints(z, e)
    }

    fn eval_projection_multipliers<Sy>(
        &self,
        y: &mut Vector<Self::Field, Dyn, Sy>,
        max_multiplier: Self::Field,
    ) -> Result<(), ProblemError>
    where
        Sy: StorageMut<Self::Field, Dyn>,
    {
        self.count(|c| &mut c.projection_multipliers);
        self.problem.eval_projection_multipliers(y, max_multiplier)
    }

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
        self.count(|c| &mut c.inactive_indices);
        self.problem.eval_inactive_indices(gamma, x, grad, inactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nalgebra::dvector;

    use crate::testing::*;

    #[test]
    fn counts_each_operation() {
        let f = Rosenbrock::new(2);
        let counted = ProblemWithCounters::new(&f);

        let x = dvector![0.5, 0.5];
        let mut grad = dvector![0.0, 0.0];

        counted.eval_objective(&x).unwrap();
        counted.eval_objective(&x).unwrap();
        counted.eval_objective_and_gradient(&x, &mut grad).unwrap();

        let evaluations = counted.evaluations();
        assert_eq!(evaluations.objective, 2);
        assert_eq!(evaluations.objective_and_gradient, 1);
        assert_eq!(evaluations.objective_gradient, 0);
        assert_eq!(evaluations.objective_total(), 3);
    }

    #[test]
    fn accumulation() {
        let mut total = EvalCounter {
            objective: 1,
            constraints: 2,
            ..EvalCounter::default()
        };
        total += EvalCounter {
            objective: 3,
            proximal_gradient_step: 4,
            ..EvalCounter::default()
        };

        assert_eq!(total.objective, 4);
        assert_eq!(total.constraints, 2);
        assert_eq!(total.proximal_gradient_step, 4);
    }
}
