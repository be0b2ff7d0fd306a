//! Testing problems and utilities useful for benchmarking, debugging and
//! smoke testing.
//!
//! [`BoxQuadratic`] and [`Rosenbrock`] are recommended for first tests.
//! [`ConstrainedQuadratic`] exercises the general constraints with known
//! solutions and multipliers, [`Lasso`] the l1 regularization with a planted
//! sparse solution. [`WithoutHessian`] and [`NanAfter`] wrap other problems
//! to simulate missing second-order information and evaluation failures.
//!
//! # References
//!
//! \[1\] [A Literature Survey of Benchmark Functions For Global Optimization
//! Problems](https://arxiv.org/abs/1308.4008)
//!
//! \[2\] [Regression Shrinkage and Selection via the
//! Lasso](https://doi.org/10.1111/j.2517-6161.1996.tb02080.x)

#![allow(unused)]

use std::cell::Cell;

use nalgebra::{
    dvector,
    storage::{Storage, StorageMut},
    DMatrix, DVector, Dyn, IsContiguous, Vector,
};
use rand::{rngs::StdRng, seq::index::sample, Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::core::{Bounds, Problem, ProblemError};

/// Extension of the [`Problem`] trait that provides additional information
/// that is useful for testing solvers.
pub trait TestProblem: Problem<Field = f64> {
    /// Standard initial values for the problem. Using the same initial values
    /// is essential for fair comparison of methods.
    fn initials(&self) -> Vec<DVector<f64>>;

    /// Tests if given point is a stationary point of the objective over the
    /// variable bounds and regularization, given the tolerance `eps` on the
    /// fixed-point residual for unit step size. General constraints are not
    /// considered.
    fn is_optimal(&self, x: &DVector<f64>, eps: f64) -> bool {
        let n = x.nrows();
        let mut grad = DVector::zeros(n);
        let mut x_hat = DVector::zeros(n);
        let mut p = DVector::zeros(n);

        if self.eval_objective_gradient(x, &mut grad).is_err() {
            return false;
        }

        if self
            .eval_proximal_gradient_step(1.0, x, &grad, &mut x_hat, &mut p)
            .is_err()
        {
            return false;
        }

        p.amax() <= eps
    }
}

/// Convex quadratic `1/2 x^T Q x + c^T x` over a box.
#[derive(Debug, Clone)]
pub struct BoxQuadratic {
    q: DMatrix<f64>,
    c: DVector<f64>,
    bounds: Bounds<f64>,
}

impl BoxQuadratic {
    /// Initializes the problem with given symmetric positive (semi)definite
    /// matrix, linear term and bounds.
    pub fn new(q: DMatrix<f64>, c: DVector<f64>, bounds: Bounds<f64>) -> Self {
        assert!(q.is_square(), "Q must be square");
        assert_eq!(q.nrows(), c.nrows(), "Q and c must have the same dimension");

        Self { q, c, bounds }
    }

    /// Initializes the problem with a diagonal matrix.
    pub fn diagonal(q: DVector<f64>, c: DVector<f64>, bounds: Bounds<f64>) -> Self {
        Self::new(DMatrix::from_diagonal(&q), c, bounds)
    }
}

impl Problem for BoxQuadratic {
    type Field = f64;

    fn num_variables(&self) -> usize {
        self.c.nrows()
    }

    fn variable_bounds(&self) -> Option<&Bounds<Self::Field>> {
        Some(&self.bounds)
    }

    fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let qx = &self.q * x;
        Ok(0.5 * x.dot(&qx) + self.c.dot(x))
    }

    fn eval_objective_gradient<Sx, Sg>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        grad: &mut Vector<f64, Dyn, Sg>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        grad.copy_from(&(&self.q * x));
        *grad += &self.c;
        Ok(())
    }

    fn eval_lagrangian_hessian_product<Sx, Sy, Sv, So>(
        &self,
        _x: &Vector<f64, Dyn, Sx>,
        _y: &Vector<f64, Dyn, Sy>,
        scale: f64,
        v: &Vector<f64, Dyn, Sv>,
        out: &mut Vector<f64, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sy: Storage<f64, Dyn>,
        Sv: Storage<f64, Dyn>,
        So: StorageMut<f64, Dyn>,
    {
        out.copy_from(&(&self.q * v));
        *out *= scale;
        Ok(())
    }
}

impl TestProblem for BoxQuadratic {
    fn initials(&self) -> Vec<DVector<f64>> {
        let n = self.num_variables();
        let far = DVector::from_fn(n, |i, _| if i % 2 == 0 { 10.0 } else { -10.0 });

        vec![DVector::zeros(n), far]
    }
}

/// [Extended Rosenbrock
/// function](https://en.wikipedia.org/wiki/Rosenbrock_function) \[1\]
/// without constraints.
///
/// The global minimum `x = (1, ..., 1)` is inside a long, narrow, parabolic
/// shaped flat valley.
#[derive(Debug, Clone, Copy)]
pub struct Rosenbrock {
    n: usize,
}

impl Rosenbrock {
    /// Initializes the problem with given dimension.
    ///
    /// The dimension **must** be a multiple of 2.
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "n must be greater than zero");
        assert!(n % 2 == 0, "n must be a multiple of 2");

        Self { n }
    }
}

impl Problem for Rosenbrock {
    type Field = f64;

    fn num_variables(&self) -> usize {
        self.n
    }

    fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let mut fx = 0.0;

        for i in (0..self.n).step_by(2) {
            let (a, b) = (x[i], x[i + 1]);
            fx += 100.0 * (b - a * a).powi(2) + (1.0 - a).powi(2);
        }

        Ok(fx)
    }

    fn eval_objective_gradient<Sx, Sg>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        grad: &mut Vector<f64, Dyn, Sg>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        for i in (0..self.n).step_by(2) {
            let (a, b) = (x[i], x[i + 1]);
            grad[i] = -400.0 * a * (b - a * a) - 2.0 * (1.0 - a);
            grad[i + 1] = 200.0 * (b - a * a);
        }

        Ok(())
    }

    fn eval_lagrangian_hessian_product<Sx, Sy, Sv, So>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        _y: &Vector<f64, Dyn, Sy>,
        scale: f64,
        v: &Vector<f64, Dyn, Sv>,
        out: &mut Vector<f64, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sy: Storage<f64, Dyn>,
        Sv: Storage<f64, Dyn>,
        So: StorageMut<f64, Dyn>,
    {
        for i in (0..self.n).step_by(2) {
            let (a, b) = (x[i], x[i + 1]);
            let h_aa = 1200.0 * a * a - 400.0 * b + 2.0;
            let h_ab = -400.0 * a;
            let h_bb = 200.0;

            out[i] = scale * (h_aa * v[i] + h_ab * v[i + 1]);
            out[i + 1] = scale * (h_ab * v[i] + h_bb * v[i + 1]);
        }

        Ok(())
    }
}

impl TestProblem for Rosenbrock {
    fn initials(&self) -> Vec<DVector<f64>> {
        let standard = DVector::from_fn(self.n, |i, _| if i % 2 == 0 { -1.2 } else { 1.0 });
        let origin = DVector::zeros(self.n);

        vec![standard, origin]
    }
}

/// Convex quadratic `1/2 x^T Q x + c^T x + offset` with linear constraints
/// `A x in D`.
#[derive(Debug, Clone)]
pub struct ConstrainedQuadratic {
    q: DMatrix<f64>,
    c: DVector<f64>,
    offset: f64,
    a: DMatrix<f64>,
    bounds: Bounds<f64>,
}

impl ConstrainedQuadratic {
    /// Initializes the problem.
    pub fn new(
        q: DMatrix<f64>,
        c: DVector<f64>,
        offset: f64,
        a: DMatrix<f64>,
        bounds: Bounds<f64>,
    ) -> Self {
        assert!(q.is_square(), "Q must be square");
        assert_eq!(q.nrows(), c.nrows(), "Q and c must have the same dimension");
        assert_eq!(a.ncols(), c.nrows(), "A must have n columns");
        assert_eq!(a.nrows(), bounds.dim(), "A must have m rows");

        Self {
            q,
            c,
            offset,
            a,
            bounds,
        }
    }

    /// `(x0 - 1)^2 + (x1 - 2)^2` subject to `x0 + x1 <= 1`.
    ///
    /// The solution is `(0, 1)` with multiplier `2`.
    pub fn halfspace() -> Self {
        Self::new(
            DMatrix::from_diagonal(&dvector![2.0, 2.0]),
            dvector![-2.0, -4.0],
            5.0,
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            Bounds::upper_only(dvector![1.0]),
        )
    }

    /// `x0^2 + x1^2` subject to `x0 + x1 = 1`.
    ///
    /// The solution is `(0.5, 0.5)` with multiplier `-1`.
    pub fn equality() -> Self {
        Self::new(
            DMatrix::from_diagonal(&dvector![2.0, 2.0]),
            dvector![0.0, 0.0],
            0.0,
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0]),
            Bounds::equal(dvector![1.0]),
        )
    }

    /// `1/2 ||x - (1, 2, 3)||^2` subject to `x0 + x1 + x2 <= 1` and `x0 = x2`.
    pub fn halfspace_and_equality() -> Self {
        Self::new(
            DMatrix::identity(3, 3),
            dvector![-1.0, -2.0, -3.0],
            7.0,
            DMatrix::from_row_slice(2, 3, &[1.0, 1.0, 1.0, 1.0, 0.0, -1.0]),
            [(f64::NEG_INFINITY, 1.0), (0.0, 0.0)].into_iter().collect(),
        )
    }
}

impl Problem for ConstrainedQuadratic {
    type Field = f64;

    fn num_variables(&self) -> usize {
        self.c.nrows()
    }

    fn num_constraints(&self) -> usize {
        self.a.nrows()
    }

    fn general_bounds(&self) -> Option<&Bounds<Self::Field>> {
        Some(&self.bounds)
    }

    fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let qx = &self.q * x;
        Ok(0.5 * x.dot(&qx) + self.c.dot(x) + self.offset)
    }

    fn eval_objective_gradient<Sx, Sg>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        grad: &mut Vector<f64, Dyn, Sg>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        grad.copy_from(&(&self.q * x));
        *grad += &self.c;
        Ok(())
    }

    fn eval_constraints<Sx, Sgx>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        gx: &mut Vector<f64, Dyn, Sgx>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sgx: StorageMut<f64, Dyn>,
    {
        gx.copy_from(&(&self.a * x));
        Ok(())
    }

    fn eval_constraints_gradient_product<Sx, Sy, So>(
        &self,
        _x: &Vector<f64, Dyn, Sx>,
        y: &Vector<f64, Dyn, Sy>,
        out: &mut Vector<f64, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sy: Storage<f64, Dyn>,
        So: StorageMut<f64, Dyn>,
    {
        out.copy_from(&self.a.tr_mul(y));
        Ok(())
    }

    fn eval_constraints_jacobian_product<Sx, Sv, So>(
        &self,
        _x: &Vector<f64, Dyn, Sx>,
        v: &Vector<f64, Dyn, Sv>,
        out: &mut Vector<f64, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sv: Storage<f64, Dyn>,
        So: StorageMut<f64, Dyn>,
    {
        out.copy_from(&(&self.a * v));
        Ok(())
    }

    fn eval_lagrangian_hessian_product<Sx, Sy, Sv, So>(
        &self,
        _x: &Vector<f64, Dyn, Sx>,
        _y: &Vector<f64, Dyn, Sy>,
        scale: f64,
        v: &Vector<f64, Dyn, Sv>,
        out: &mut Vector<f64, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sy: Storage<f64, Dyn>,
        Sv: Storage<f64, Dyn>,
        So: StorageMut<f64, Dyn>,
    {
        // Linear constraints have no curvature.
        out.copy_from(&(&self.q * v));
        *out *= scale;
        Ok(())
    }
}

impl TestProblem for ConstrainedQuadratic {
    fn initials(&self) -> Vec<DVector<f64>> {
        vec![DVector::zeros(self.num_variables())]
    }
}

/// Nonnegative lasso `1/2 ||A x - b||^2 + lambda ||x||_1` subject to
/// `x >= 0` \[2\].
#[derive(Debug, Clone)]
pub struct Lasso {
    a: DMatrix<f64>,
    b: DVector<f64>,
    lambda: DVector<f64>,
    bounds: Bounds<f64>,
    x_true: Option<DVector<f64>>,
}

impl Lasso {
    /// Initializes the problem with given data and regularization weight.
    pub fn new(a: DMatrix<f64>, b: DVector<f64>, lambda: f64) -> Self {
        assert_eq!(a.nrows(), b.nrows(), "A must have as many rows as b");
        assert!(lambda >= 0.0, "lambda must be nonnegative");

        let n = a.ncols();

        Self {
            a,
            b,
            lambda: dvector![lambda],
            bounds: Bounds::nonnegative(n),
            x_true: None,
        }
    }

    /// Generates a problem with `m` observations of `n` variables whose
    /// noiseless data come from a nonnegative solution with `k` nonzero
    /// entries. The entries of `A` are standard normal, the nonzero entries
    /// of the planted solution uniform in `[0.5, 1.5]`.
    pub fn random(m: usize, n: usize, k: usize, lambda: f64, seed: u64) -> Self {
        assert!(k <= n, "k must not exceed n");

        let mut rng = StdRng::seed_from_u64(seed);
        let a = DMatrix::from_fn(m, n, |_, _| rng.sample::<f64, _>(StandardNormal));

        let mut x_true = DVector::zeros(n);
        for i in sample(&mut rng, n, k).into_iter() {
            x_true[i] = rng.gen_range(0.5..1.5);
        }

        let b = &a * &x_true;

        let mut lasso = Self::new(a, b, lambda);
        lasso.x_true = Some(x_true);
        lasso
    }

    /// Planted solution of a generated problem.
    pub fn x_true(&self) -> Option<&DVector<f64>> {
        self.x_true.as_ref()
    }

    /// Value of the whole objective `f(x) + h(x)`.
    pub fn total_objective(&self, x: &DVector<f64>) -> f64 {
        let residual = &self.a * x - &self.b;
        0.5 * residual.norm_squared() + self.lambda[0] * x.lp_norm(1)
    }
}

impl Problem for Lasso {
    type Field = f64;

    fn num_variables(&self) -> usize {
        self.a.ncols()
    }

    fn variable_bounds(&self) -> Option<&Bounds<Self::Field>> {
        Some(&self.bounds)
    }

    fn l1_regularization(&self) -> Option<&DVector<Self::Field>> {
        Some(&self.lambda)
    }

    fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        let residual = &self.a * x - &self.b;
        Ok(0.5 * residual.norm_squared())
    }

    fn eval_objective_gradient<Sx, Sg>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        grad: &mut Vector<f64, Dyn, Sg>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        let residual = &self.a * x - &self.b;
        grad.copy_from(&self.a.tr_mul(&residual));
        Ok(())
    }

    fn eval_objective_and_gradient<Sx, Sg>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        grad: &mut Vector<f64, Dyn, Sg>,
    ) -> Result<f64, ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        let residual = &self.a * x - &self.b;
        grad.copy_from(&self.a.tr_mul(&residual));
        Ok(0.5 * residual.norm_squared())
    }

    fn eval_lagrangian_hessian_product<Sx, Sy, Sv, So>(
        &self,
        _x: &Vector<f64, Dyn, Sx>,
        _y: &Vector<f64, Dyn, Sy>,
        scale: f64,
        v: &Vector<f64, Dyn, Sv>,
        out: &mut Vector<f64, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sy: Storage<f64, Dyn>,
        Sv: Storage<f64, Dyn>,
        So: StorageMut<f64, Dyn>,
    {
        let av = &self.a * v;
        out.copy_from(&self.a.tr_mul(&av));
        *out *= scale;
        Ok(())
    }
}

impl TestProblem for Lasso {
    fn initials(&self) -> Vec<DVector<f64>> {
        vec![DVector::zeros(self.num_variables())]
    }
}

/// Wrapper that hides the second-order information of a problem.
#[derive(Debug, Clone)]
pub struct WithoutHessian<P>(pub P);

impl<P: Problem> Problem for WithoutHessian<P> {
    type Field = P::Field;

    fn num_variables(&self) -> usize {
        self.0.num_variables()
    }

    fn num_constraints(&self) -> usize {
        self.0.num_constraints()
    }

    fn variable_bounds(&self) -> Option<&Bounds<Self::Field>> {
        self.0.variable_bounds()
    }

    fn general_bounds(&self) -> Option<&Bounds<Self::Field>> {
        self.0.general_bounds()
    }

    fn l1_regularization(&self) -> Option<&DVector<Self::Field>> {
        self.0.l1_regularization()
    }

    fn eval_objective<Sx>(&self, x: &Vector<Self::Field, Dyn, Sx>) -> Result<Self::Field, ProblemError>
    where
        Sx: Storage<Self::Field, Dyn> + IsContiguous,
    {
        self.0.eval_objective(x)
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
        self.0.eval_objective_gradient(x, grad)
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
        self.0.eval_constraints(x, gx)
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
        self.0.eval_constraints_gradient_product(x, y, out)
    }
}

/// Wrapper that makes the objective and its gradient return NaN after the
/// given number of evaluations.
#[derive(Debug, Clone)]
pub struct NanAfter<P> {
    problem: P,
    remaining: Cell<usize>,
}

impl<P> NanAfter<P> {
    /// Wraps the problem.
    pub fn new(problem: P, evaluations: usize) -> Self {
        Self {
            problem,
            remaining: Cell::new(evaluations),
        }
    }

    fn exhausted(&self) -> bool {
        let remaining = self.remaining.get();

        if remaining == 0 {
            true
        } else {
            self.remaining.set(remaining - 1);
            false
        }
    }
}

impl<P: Problem<Field = f64>> Problem for NanAfter<P> {
    type Field = f64;

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

    fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
    {
        if self.exhausted() {
            Ok(f64::NAN)
        } else {
            self.problem.eval_objective(x)
        }
    }

    fn eval_objective_gradient<Sx, Sg>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        grad: &mut Vector<f64, Dyn, Sg>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sg: StorageMut<f64, Dyn>,
    {
        if self.exhausted() {
            grad.fill(f64::NAN);
            Ok(())
        } else {
            self.problem.eval_objective_gradient(x, grad)
        }
    }

    fn eval_constraints<Sx, Sgx>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        gx: &mut Vector<f64, Dyn, Sgx>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sgx: StorageMut<f64, Dyn>,
    {
        self.problem.eval_constraints(x, gx)
    }

    fn eval_constraints_gradient_product<Sx, Sy, So>(
        &self,
        x: &Vector<f64, Dyn, Sx>,
        y: &Vector<f64, Dyn, Sy>,
        out: &mut Vector<f64, Dyn, So>,
    ) -> Result<(), ProblemError>
    where
        Sx: Storage<f64, Dyn> + IsContiguous,
        Sy: Storage<f64, Dyn>,
        So: StorageMut<f64, Dyn>,
    {
        self.problem.eval_constraints_gradient_product(x, y, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn rosenbrock_optimum() {
        let f = Rosenbrock::new(4);
        let x = dvector![1.0, 1.0, 1.0, 1.0];

        assert_eq!(f.eval_objective(&x).unwrap(), 0.0);
        assert!(f.is_optimal(&x, 1e-12));
        assert!(!f.is_optimal(&f.initials()[0], 1e-3));
    }

    #[test]
    fn halfspace_optimum() {
        let f = ConstrainedQuadratic::halfspace();
        let x = dvector![0.0, 1.0];
        let mut grad = dvector![0.0, 0.0];
        let mut jty = dvector![0.0, 0.0];

        // KKT: grad f + y grad g = 0 with y = 2.
        f.eval_objective_gradient(&x, &mut grad).unwrap();
        f.eval_constraints_gradient_product(&x, &dvector![2.0], &mut jty)
            .unwrap();
        assert_abs_diff_eq!(grad + jty, dvector![0.0, 0.0]);
    }

    #[test]
    fn lasso_is_reproducible() {
        let f = Lasso::random(10, 8, 3, 0.1, 42);
        let g = Lasso::random(10, 8, 3, 0.1, 42);

        let x_true = f.x_true().unwrap();
        assert_eq!(x_true, g.x_true().unwrap());
        assert_eq!(x_true.iter().filter(|xi| **xi != 0.0).count(), 3);
        assert!(x_true.iter().all(|xi| *xi == 0.0 || (0.5..1.5).contains(xi)));
    }

    #[test]
    fn nan_after() {
        let f = NanAfter::new(Rosenbrock::new(2), 1);
        let x = dvector![0.0, 0.0];

        assert!(f.eval_objective(&x).unwrap().is_finite());
        assert!(f.eval_objective(&x).unwrap().is_nan());
    }
}
