//! Structured L-BFGS.
//!
//! Variables are split by the proximal gradient step into the *active* set
//! `K` (the step lands on a bound or on the kink of the l1 term) and the
//! *inactive* set `J`. On `K`, the direction is the proximal gradient step
//! itself. On `J`, the quasi-Newton estimate is applied to the proximal
//! gradient step corrected by the curvature of the augmented Lagrangian
//! along the active components:
//!
//! ```text
//! q_K = p_K
//! q_J = H_J (p_J - factor gamma (hess psi * q_K)_J)
//! ```
//!
//! With `factor = 0` the direction is identical to the plain
//! [L-BFGS](super::LbfgsDirection).

use getset::{CopyGetters, Setters};
use log::trace;
use nalgebra::{DVector, RealField};

use crate::core::{AugmentedLagrangian, ConfigError, Problem, ProblemError};

use super::{DirectionStrategy, Lbfgs, LbfgsParams};

/// Options for [`StructuredLbfgsDirection`].
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct StructuredLbfgsParams<T: RealField + Copy> {
    /// Weight of the Hessian-vector correction of the inactive components.
    /// Zero disables the structure and gives the plain L-BFGS direction.
    /// Default: `0`.
    hessian_vec_factor: T,
}

impl<T: RealField + Copy> Default for StructuredLbfgsParams<T> {
    fn default() -> Self {
        Self {
            hessian_vec_factor: T::zero(),
        }
    }
}

impl<T: RealField + Copy> StructuredLbfgsParams<T> {
    /// Checks the values of the options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.hessian_vec_factor >= T::zero()) || !self.hessian_vec_factor.is_finite() {
            return Err(ConfigError::invalid(
                "hessian_vec_factor",
                "must be nonnegative and finite",
            ));
        }

        Ok(())
    }
}

/// L-BFGS direction restricted to the inactive variables.
#[derive(Debug, Clone)]
pub struct StructuredLbfgsDirection<T: RealField + Copy> {
    options: StructuredLbfgsParams<T>,
    lbfgs: Lbfgs<T>,
    inactive: Vec<usize>,
    q_active: DVector<T>,
    hq: DVector<T>,
}

impl<T: RealField + Copy> StructuredLbfgsDirection<T> {
    /// Initializes the direction with given options.
    pub fn new(
        lbfgs: LbfgsParams<T>,
        options: StructuredLbfgsParams<T>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;

        Ok(Self {
            options,
            lbfgs: Lbfgs::new(lbfgs)?,
            inactive: Vec::new(),
            q_active: DVector::zeros(0),
            hq: DVector::zeros(0),
        })
    }

    /// Gets the structure options.
    pub fn options(&self) -> &StructuredLbfgsParams<T> {
        &self.options
    }

    /// Gets the curvature pair storage.
    pub fn lbfgs(&self) -> &Lbfgs<T> {
        &self.lbfgs
    }
}

impl<T: RealField + Copy> DirectionStrategy<T> for StructuredLbfgsDirection<T> {
    fn name(&self) -> &'static str {
        "structured L-BFGS"
    }

    fn initialize(&mut self, n: usize) {
        self.lbfgs.resize(n);
        self.inactive = Vec::with_capacity(n);
        self.q_active = DVector::zeros(n);
        self.hq = DVector::zeros(n);
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
        q.copy_from(p);

        let factor = self.options.hessian_vec_factor;

        if factor == T::zero() {
            return Ok(self.lbfgs.apply(q));
        }

        psi.problem()
            .eval_inactive_indices(gamma, x, grad_psi, &mut self.inactive)?;

        if self.inactive.is_empty() {
            trace!("all variables active, using proximal gradient step");
            return Ok(true);
        }

        let n = x.nrows();

        if self.inactive.len() < n {
            self.q_active.copy_from(p);
            for &j in self.inactive.iter() {
                self.q_active[j] = T::zero();
            }

            psi.eval_psi_hessian_product(x, grad_psi, &self.q_active, &mut self.hq)?;

            for &j in self.inactive.iter() {
                q[j] -= factor * gamma * self.hq[j];
            }
        }

        Ok(self.lbfgs.apply_masked(q, &self.inactive))
    }

    fn update(
        &mut self,
        x: &DVector<T>,
        x_next: &DVector<T>,
        p: &DVector<T>,
        p_next: &DVector<T>,
    ) -> bool {
        self.lbfgs.update(x, x_next, p, p_next)
    }

    fn changed_gamma(&mut self, gamma_new: T, gamma_old: T) {
        if self.lbfgs.options().rescale_on_step_size_changes() {
            self.lbfgs.scale_y(gamma_new / gamma_old);
        } else {
            self.lbfgs.reset();
        }
    }

    fn reset(&mut self) {
        self.lbfgs.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use nalgebra::dvector;

    use crate::core::Bounds;
    use crate::direction::LbfgsDirection;
    use crate::testing::*;

    fn prox_step(f: &BoxQuadratic, gamma: f64, x: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        let mut grad = DVector::zeros(x.nrows());
        let mut x_hat = DVector::zeros(x.nrows());
        let mut p = DVector::zeros(x.nrows());
        f.eval_objective_gradient(x, &mut grad).unwrap();
        f.eval_proximal_gradient_step(gamma, x, &grad, &mut x_hat, &mut p)
            .unwrap();
        (grad, p)
    }

    #[test]
    fn zero_factor_is_plain_lbfgs() {
        let f = BoxQuadratic::diagonal(
            dvector![1.0, 4.0, 9.0],
            dvector![-1.0, 1.0, 0.5],
            Bounds::new(dvector![-0.5, -0.5, -0.5], dvector![0.5, 0.5, 0.5]),
        );
        let y = DVector::zeros(0);
        let sigma = DVector::zeros(0);
        let mut psi = AugmentedLagrangian::new(&f, &y, &sigma);

        let mut plain = LbfgsDirection::new(LbfgsParams::default()).unwrap();
        let mut structured =
            StructuredLbfgsDirection::new(LbfgsParams::default(), StructuredLbfgsParams::default())
                .unwrap();
        plain.initialize(3);
        structured.initialize(3);

        let gamma = 0.1;
        let x0 = dvector![0.0, 0.0, 0.0];
        let x1 = dvector![0.2, -0.1, 0.05];
        let (_, p0) = prox_step(&f, gamma, &x0);
        let (grad1, p1) = prox_step(&f, gamma, &x1);

        assert!(plain.update(&x0, &x1, &p0, &p1));
        assert!(structured.update(&x0, &x1, &p0, &p1));

        let mut q_plain = DVector::zeros(3);
        let mut q_structured = DVector::zeros(3);
        let has_plain = plain
            .apply(&mut psi, gamma, &x1, &p1, &grad1, &mut q_plain)
            .unwrap();
        let has_structured = structured
            .apply(&mut psi, gamma, &x1, &p1, &grad1, &mut q_structured)
            .unwrap();

        assert!(has_plain);
        assert!(has_structured);
        assert_eq!(q_plain, q_structured);
    }

    #[test]
    fn active_components_follow_proximal_step() {
        let f = BoxQuadratic::diagonal(
            dvector![1.0, 1.0],
            dvector![-10.0, 0.1],
            Bounds::new(dvector![-1.0, -1.0], dvector![1.0, 1.0]),
        );
        let y = DVector::zeros(0);
        let sigma = DVector::zeros(0);
        let mut psi = AugmentedLagrangian::new(&f, &y, &sigma);

        let mut structured_options = StructuredLbfgsParams::default();
        structured_options.set_hessian_vec_factor(1.0);
        let mut direction =
            StructuredLbfgsDirection::new(LbfgsParams::default(), structured_options).unwrap();
        direction.initialize(2);

        let gamma = 0.5;
        let x0 = dvector![0.0, 0.5];
        let x1 = dvector![0.5, 0.2];
        let (_, p0) = prox_step(&f, gamma, &x0);
        let (grad1, p1) = prox_step(&f, gamma, &x1);
        assert!(direction.update(&x0, &x1, &p0, &p1));

        let mut q = DVector::zeros(2);
        let available = direction
            .apply(&mut psi, gamma, &x1, &p1, &grad1, &mut q)
            .unwrap();

        // The first variable is pushed onto its upper bound.
        assert!(available);
        assert_eq!(q[0], p1[0]);
        assert!(q[1].is_finite());
    }

    #[test]
    fn negative_factor_is_rejected() {
        let mut options = StructuredLbfgsParams::default();
        options.set_hessian_vec_factor(-1.0);

        assert!(StructuredLbfgsDirection::new(LbfgsParams::default(), options).is_err());
    }
}
