//! Finite-difference tools for first- and second-order information of the
//! smooth part of a problem.

use nalgebra::{convert, DVector, RealField};

use crate::core::ProblemError;

/// Square root of double precision machine epsilon. This value is a standard
/// constant for epsilons in approximating first-order derivate-based concepts.
pub const EPSILON_SQRT: f64 = 0.000000014901161193847656;

/// Estimates the local Lipschitz constant of a gradient at `x` as
///
/// ```text
/// L = || grad(x + h) - grad(x) || / || h ||,   h_i = max(|x_i| epsilon, delta)
/// ```
///
/// `grad_x` is the gradient at `x`, `work_x` and `work_grad` are buffers of
/// the same dimension used to avoid allocations.
pub fn estimate_lipschitz<T, G>(
    mut gradient: G,
    x: &DVector<T>,
    grad_x: &DVector<T>,
    epsilon: T,
    delta: T,
    work_x: &mut DVector<T>,
    work_grad: &mut DVector<T>,
) -> Result<T, ProblemError>
where
    T: RealField + Copy,
    G: FnMut(&DVector<T>, &mut DVector<T>) -> Result<T, ProblemError>,
{
    let mut h_norm_squared = T::zero();

    for i in 0..x.nrows() {
        let h = (x[i].abs() * epsilon).max(delta);
        work_x[i] = x[i] + h;
        h_norm_squared += h * h;
    }

    gradient(&*work_x, work_grad)?;

    *work_grad -= grad_x;
    Ok(work_grad.norm() / h_norm_squared.sqrt())
}

/// Approximates the product of the Hessian with vector `v` by forward
/// difference of the gradient along `v`:
///
/// ```text
/// H v = (grad(x + t v) - grad(x)) / t
/// ```
///
/// `grad_x` is the gradient at `x`, `work_x` and `work_grad` are buffers of
/// the same dimension.
pub fn hessian_vector_product<T, G>(
    mut gradient: G,
    x: &DVector<T>,
    grad_x: &DVector<T>,
    v: &DVector<T>,
    out: &mut DVector<T>,
    work_x: &mut DVector<T>,
    work_grad: &mut DVector<T>,
) -> Result<(), ProblemError>
where
    T: RealField + Copy,
    G: FnMut(&DVector<T>, &mut DVector<T>) -> Result<T, ProblemError>,
{
    let v_norm = v.norm();

    if v_norm == T::zero() {
        out.fill(T::zero());
        return Ok(());
    }

    // The step is scaled by the magnitude of x to keep enough good digits in
    // the difference, and by the norm of v to make it a step in x.
    let eps: T = convert(EPSILON_SQRT);
    let t = eps * x.norm().max(T::one()) / v_norm;

    work_x.copy_from(x);
    work_x.axpy(t, v, T::one());

    gradient(&*work_x, work_grad)?;

    out.copy_from(work_grad);
    *out -= grad_x;
    *out /= t;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector};

    use crate::core::{Bounds, Problem};
    use crate::testing::*;

    #[test]
    fn lipschitz_of_quadratic() {
        let f = BoxQuadratic::new(
            dmatrix![4.0, 1.0; 1.0, 3.0],
            dvector![1.0, 1.0],
            Bounds::unbounded(2),
        );

        let x = dvector![1.0, -2.0];
        let mut grad = dvector![0.0, 0.0];
        f.eval_objective_gradient(&x, &mut grad).unwrap();

        let mut work_x = dvector![0.0, 0.0];
        let mut work_grad = dvector![0.0, 0.0];

        let lipschitz = estimate_lipschitz(
            |x, g| f.eval_objective_and_gradient(x, g),
            &x,
            &grad,
            1e-6,
            1e-12,
            &mut work_x,
            &mut work_grad,
        )
        .unwrap();

        // h = [1e-6, 2e-6], so L = || Q h || / || h ||.
        let h = dvector![1.0, 2.0];
        let expected = (dmatrix![4.0, 1.0; 1.0, 3.0] * &h).norm() / h.norm();
        assert_abs_diff_eq!(lipschitz, expected, epsilon = 1e-6);

        let max_eigenvalue = 3.5 + 1.25f64.sqrt();
        assert!(lipschitz <= max_eigenvalue + 1e-6);
    }

    #[test]
    fn rosenbrock_hessian_product() {
        let f = Rosenbrock::new(2);
        let x = dvector![-1.2, 1.0];
        let v = dvector![1.0, 0.5];

        let mut grad = dvector![0.0, 0.0];
        f.eval_objective_gradient(&x, &mut grad).unwrap();

        let mut out = dvector![0.0, 0.0];
        let mut work_x = dvector![0.0, 0.0];
        let mut work_grad = dvector![0.0, 0.0];

        hessian_vector_product(
            |x, g| f.eval_objective_and_gradient(x, g),
            &x,
            &grad,
            &v,
            &mut out,
            &mut work_x,
            &mut work_grad,
        )
        .unwrap();

        let mut expected = dvector![0.0, 0.0];
        f.eval_lagrangian_hessian_product(&x, &DVector::<f64>::zeros(0), 1.0, &v, &mut expected)
            .unwrap();

        assert_abs_diff_eq!(out, expected, epsilon = 1e-3);
    }

    #[test]
    fn zero_direction() {
        let f = Rosenbrock::new(2);
        let x = dvector![-1.2, 1.0];
        let v = dvector![0.0, 0.0];
        let grad = dvector![0.0, 0.0];
        let mut out = dvector![1.0, 1.0];
        let mut work_x = dvector![0.0, 0.0];
        let mut work_grad = dvector![0.0, 0.0];

        hessian_vector_product(
            |x, g| f.eval_objective_and_gradient(x, g),
            &x,
            &grad,
            &v,
            &mut out,
            &mut work_x,
            &mut work_grad,
        )
        .unwrap();

        assert_eq!(out, dvector![0.0, 0.0]);
    }
}
