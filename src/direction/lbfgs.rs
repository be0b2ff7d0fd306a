//! Limited-memory BFGS.
//!
//! The quasi-Newton approximation is built for the fixed-point residual
//! `R(x) = x - x_hat(x)` of the proximal gradient step. Curvature pairs are
//! `s = x_next - x` and `y = p - p_next` where `p = x_hat - x = -R(x)`, so
//! applying the inverse Jacobian estimate to `p` gives a Newton-type step for
//! `R(x) = 0`.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[2\] [On the Global Convergence of BFGS Method for Nonconvex
//! Unconstrained Optimization Problems](https://doi.org/10.1137/S1052623499354242)

use getset::{CopyGetters, Setters};
use log::{debug, trace};
use nalgebra::{convert, DVector, RealField};

use crate::core::{AugmentedLagrangian, ConfigError, Problem, ProblemError};

use super::DirectionStrategy;

/// Options for [`Lbfgs`].
#[derive(Debug, Clone, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct LbfgsParams<T: RealField + Copy> {
    /// Number of stored curvature pairs. Default: `10`.
    memory: usize,
    /// A pair is rejected if `y^T s <= min_div_fac * s^T s`. Default:
    /// `EPSILON`.
    min_div_fac: T,
    /// A pair is rejected if `s^T s <= min_abs_s`. Default: `EPSILON^2`.
    min_abs_s: T,
    /// Exponent of the cautious BFGS condition
    /// `y^T s / s^T s >= cbfgs_epsilon * ||p||^cbfgs_alpha`. Default: `1`.
    cbfgs_alpha: T,
    /// Factor of the cautious BFGS condition, zero disables it. Default: `0`.
    cbfgs_epsilon: T,
    /// Rescale the stored pairs instead of discarding them when the step
    /// size changes. Default: `false`.
    rescale_on_step_size_changes: bool,
}

impl<T: RealField + Copy> Default for LbfgsParams<T> {
    fn default() -> Self {
        let eps: T = convert(f64::EPSILON);

        Self {
            memory: 10,
            min_div_fac: eps,
            min_abs_s: eps * eps,
            cbfgs_alpha: T::one(),
            cbfgs_epsilon: T::zero(),
            rescale_on_step_size_changes: false,
        }
    }
}

impl<T: RealField + Copy> LbfgsParams<T> {
    /// Checks the values of the options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory == 0 {
            return Err(ConfigError::invalid("memory", "must be positive"));
        }

        if !(self.min_div_fac >= T::zero()) || !(self.min_abs_s >= T::zero()) {
            return Err(ConfigError::invalid(
                "min_div_fac/min_abs_s",
                "must be nonnegative",
            ));
        }

        if !(self.cbfgs_epsilon >= T::zero()) || !self.cbfgs_alpha.is_finite() {
            return Err(ConfigError::invalid(
                "cbfgs_epsilon/cbfgs_alpha",
                "must be nonnegative and finite",
            ));
        }

        Ok(())
    }
}

/// Circular buffer of curvature pairs with the two-loop recursion.
#[derive(Debug, Clone)]
pub struct Lbfgs<T: RealField + Copy> {
    options: LbfgsParams<T>,
    s: Vec<DVector<T>>,
    y: Vec<DVector<T>>,
    rho: Vec<T>,
    alpha: Vec<T>,
    rho_masked: Vec<T>,
    order: Vec<usize>,
    new_s: DVector<T>,
    new_y: DVector<T>,
    idx: usize,
    full: bool,
}

impl<T: RealField + Copy> Lbfgs<T> {
    /// Initializes the storage with given options.
    pub fn new(options: LbfgsParams<T>) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self::unchecked(options))
    }

    fn unchecked(options: LbfgsParams<T>) -> Self {
        Self {
            options,
            s: Vec::new(),
            y: Vec::new(),
            rho: Vec::new(),
            alpha: Vec::new(),
            rho_masked: Vec::new(),
            order: Vec::new(),
            new_s: DVector::zeros(0),
            new_y: DVector::zeros(0),
            idx: 0,
            full: false,
        }
    }

    /// Gets the options.
    pub fn options(&self) -> &LbfgsParams<T> {
        &self.options
    }

    /// Allocates the storage for vectors of dimension `n` and clears the
    /// history.
    pub fn resize(&mut self, n: usize) {
        let memory = self.options.memory;

        self.s = vec![DVector::zeros(n); memory];
        self.y = vec![DVector::zeros(n); memory];
        self.rho = vec![T::zero(); memory];
        self.alpha = vec![T::zero(); memory];
        self.rho_masked = vec![T::zero(); memory];
        self.order = Vec::with_capacity(memory);
        self.new_s = DVector::zeros(n);
        self.new_y = DVector::zeros(n);
        self.reset();
    }

    /// Clears the history.
    pub fn reset(&mut self) {
        self.idx = 0;
        self.full = false;
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        if self.full {
            self.options.memory
        } else {
            self.idx
        }
    }

    /// Determines whether there are no stored pairs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decides whether a pair with given inner products can be stored.
    pub fn update_valid(&self, yts: T, sts: T, pts: T) -> bool {
        let LbfgsParams {
            min_div_fac,
            min_abs_s,
            cbfgs_alpha,
            cbfgs_epsilon,
            ..
        } = self.options;

        if !yts.is_finite() || !sts.is_finite() || !pts.is_finite() {
            return false;
        }

        if sts <= min_abs_s || yts <= min_div_fac * sts {
            return false;
        }

        if cbfgs_epsilon > T::zero() {
            let p_norm = pts.sqrt();
            if yts / sts < cbfgs_epsilon * p_norm.powf(cbfgs_alpha) {
                return false;
            }
        }

        true
    }

    /// Stores the pair `s = x_next - x`, `y = p - p_next` if it satisfies the
    /// curvature condition. Returns whether the pair was stored.
    pub fn update(
        &mut self,
        x: &DVector<T>,
        x_next: &DVector<T>,
        p: &DVector<T>,
        p_next: &DVector<T>,
    ) -> bool {
        x_next.sub_to(x, &mut self.new_s);
        p.sub_to(p_next, &mut self.new_y);

        let yts = self.new_y.dot(&self.new_s);
        let sts = self.new_s.norm_squared();
        let pts = p_next.norm_squared();

        if !self.update_valid(yts, sts, pts) {
            trace!("curvature pair rejected: y^T s = {}, s^T s = {}", yts, sts);
            return false;
        }

        let k = self.idx;
        std::mem::swap(&mut self.s[k], &mut self.new_s);
        std::mem::swap(&mut self.y[k], &mut self.new_y);
        self.rho[k] = T::one() / yts;

        self.idx += 1;
        if self.idx == self.options.memory {
            self.idx = 0;
            self.full = true;
        }

        true
    }

    /// Scales all stored `y` vectors by `factor`.
    pub fn scale_y(&mut self, factor: T) {
        for i in 0..self.len() {
            self.y[i] *= factor;
            self.rho[i] /= factor;
        }
    }

    fn collect_order(&mut self) {
        let end = if self.full { self.options.memory } else { self.idx };
        self.order.clear();
        self.order.extend((0..self.idx).rev().chain((self.idx..end).rev()));
    }

    fn newest(&self) -> usize {
        let memory = self.options.memory;
        (self.idx + memory - 1) % memory
    }

    /// Applies the inverse Jacobian estimate to `q` in place using the
    /// two-loop recursion. Returns `false` (and leaves `q` untouched) if
    /// there is no stored pair.
    pub fn apply(&mut self, q: &mut DVector<T>) -> bool {
        if self.is_empty() {
            return false;
        }

        self.collect_order();

        for &i in self.order.iter() {
            self.alpha[i] = self.rho[i] * self.s[i].dot(q);
            q.axpy(-self.alpha[i], &self.y[i], T::one());
        }

        // Initial inverse Hessian approximation s^T y / y^T y.
        let newest = self.newest();
        let gamma0 = T::one() / (self.rho[newest] * self.y[newest].norm_squared());
        *q *= gamma0;

        for &i in self.order.iter().rev() {
            let beta = self.rho[i] * self.y[i].dot(q);
            q.axpy(self.alpha[i] - beta, &self.s[i], T::one());
        }

        true
    }

    /// Like [`Lbfgs::apply`], but only the components with indices in `mask`
    /// are used and updated. Pairs with nonpositive curvature restricted to
    /// the mask are skipped.
    pub fn apply_masked(&mut self, q: &mut DVector<T>, mask: &[usize]) -> bool {
        if self.is_empty() || mask.is_empty() {
            return false;
        }

        let dot = |a: &DVector<T>, b: &DVector<T>| {
            mask.iter()
                .fold(T::zero(), |acc, &j| acc + a[j] * b[j])
        };

        self.collect_order();
        self.rho_masked.fill(T::zero());
        let mut gamma0 = None;

        for &i in self.order.iter() {
            let yts = dot(&self.s[i], &self.y[i]);
            if !(yts > T::zero()) {
                continue;
            }

            self.rho_masked[i] = T::one() / yts;
            if gamma0.is_none() {
                gamma0 = Some(yts / dot(&self.y[i], &self.y[i]));
            }

            self.alpha[i] = self.rho_masked[i] * dot(&self.s[i], q);
            for &j in mask {
                q[j] -= self.alpha[i] * self.y[i][j];
            }
        }

        let gamma0 = match gamma0 {
            Some(gamma0) => gamma0,
            None => return false,
        };

        for &j in mask {
            q[j] *= gamma0;
        }

        for &i in self.order.iter().rev() {
            if self.rho_masked[i] == T::zero() {
                continue;
            }

            let beta = self.rho_masked[i] * dot(&self.y[i], q);
            for &j in mask {
                q[j] += (self.alpha[i] - beta) * self.s[i][j];
            }
        }

        true
    }
}

/// Plain L-BFGS direction.
#[derive(Debug, Clone)]
pub struct LbfgsDirection<T: RealField + Copy> {
    lbfgs: Lbfgs<T>,
}

impl<T: RealField + Copy> LbfgsDirection<T> {
    /// Initializes the direction with given options.
    pub fn new(options: LbfgsParams<T>) -> Result<Self, ConfigError> {
        Ok(Self {
            lbfgs: Lbfgs::new(options)?,
        })
    }

    /// Gets the curvature pair storage.
    pub fn lbfgs(&self) -> &Lbfgs<T> {
        &self.lbfgs
    }
}

impl<T: RealField + Copy> Default for LbfgsDirection<T> {
    fn default() -> Self {
        Self {
            lbfgs: Lbfgs::unchecked(LbfgsParams::default()),
        }
    }
}

impl<T: RealField + Copy> DirectionStrategy<T> for LbfgsDirection<T> {
    fn name(&self) -> &'static str {
        "L-BFGS"
    }

    fn initialize(&mut self, n: usize) {
        self.lbfgs.resize(n);
    }

    fn apply<P: Problem<Field = T>>(
        &mut self,
        _psi: &mut AugmentedLagrangian<'_, P>,
        _gamma: T,
        _x: &DVector<T>,
        p: &DVector<T>,
        _grad_psi: &DVector<T>,
        q: &mut DVector<T>,
    ) -> Result<bool, ProblemError> {
        q.copy_from(p);
        Ok(self.lbfgs.apply(q))
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
            debug!("step size changed, resetting curvature history");
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

    use approx::assert_abs_diff_eq;
    use nalgebra::{dmatrix, dvector, DMatrix};

    fn lbfgs(memory: usize, n: usize) -> Lbfgs<f64> {
        let mut options = LbfgsParams::default();
        options.set_memory(memory);
        let mut lbfgs = Lbfgs::new(options).unwrap();
        lbfgs.resize(n);
        lbfgs
    }

    // Pushes the pair (s, y) by choosing x = 0, x_next = s, p = y, p_next = 0.
    fn push(lbfgs: &mut Lbfgs<f64>, s: &DVector<f64>, y: &DVector<f64>) -> bool {
        let zero = DVector::zeros(s.nrows());
        lbfgs.update(&zero, s, y, &zero)
    }

    #[test]
    fn empty_history_gives_no_direction() {
        let mut lbfgs = lbfgs(5, 2);
        let mut q = dvector![1.0, 2.0];

        assert!(!lbfgs.apply(&mut q));
        assert_eq!(q, dvector![1.0, 2.0]);
    }

    #[test]
    fn secant_equation() {
        let a: DMatrix<f64> = dmatrix![3.0, 1.0, 0.0; 1.0, 2.0, 0.5; 0.0, 0.5, 1.0];
        let mut lbfgs = lbfgs(5, 3);

        let steps = [dvector![1.0, 0.0, 0.0], dvector![0.0, 1.0, 0.0], dvector![0.3, -0.2, 1.0]];
        for s in steps.iter() {
            assert!(push(&mut lbfgs, s, &(&a * s)));
        }

        // BFGS satisfies H y = s for the newest pair.
        let s = &steps[2];
        let mut q = &a * s;
        assert!(lbfgs.apply(&mut q));
        assert_abs_diff_eq!(q, s.clone(), epsilon = 1e-12);
    }

    #[test]
    fn curvature_condition() {
        let mut lbfgs = lbfgs(5, 2);

        assert!(!push(&mut lbfgs, &dvector![1.0, 0.0], &dvector![-1.0, 0.0]));
        assert!(!push(&mut lbfgs, &dvector![0.0, 0.0], &dvector![1.0, 0.0]));
        assert!(!push(&mut lbfgs, &dvector![1.0, 0.0], &dvector![f64::NAN, 0.0]));
        assert!(lbfgs.is_empty());

        assert!(push(&mut lbfgs, &dvector![1.0, 0.0], &dvector![1.0, 0.0]));
        assert_eq!(lbfgs.len(), 1);
    }

    #[test]
    fn circular_buffer_never_exceeds_memory() {
        let mut lbfgs = lbfgs(3, 2);

        for k in 0..10 {
            let s = dvector![1.0, k as f64];
            assert!(push(&mut lbfgs, &s, &(&s * 2.0)));
            assert!(lbfgs.len() <= 3);
        }

        assert_eq!(lbfgs.len(), 3);

        // All pairs share the same curvature, so H = I / 2.
        let mut q = dvector![1.0, -1.0];
        assert!(lbfgs.apply(&mut q));
        assert_abs_diff_eq!(q, dvector![0.5, -0.5], epsilon = 1e-12);
    }

    #[test]
    fn masked_apply_on_full_mask_equals_apply() {
        let a: DMatrix<f64> = dmatrix![2.0, 0.5; 0.5, 1.0];
        let mut lbfgs = lbfgs(4, 2);

        for s in [dvector![1.0, 0.2], dvector![-0.3, 1.0]].iter() {
            assert!(push(&mut lbfgs, s, &(&a * s)));
        }

        let mut q1 = dvector![0.7, -0.4];
        let mut q2 = q1.clone();
        assert!(lbfgs.apply(&mut q1));
        assert!(lbfgs.apply_masked(&mut q2, &[0, 1]));

        assert_abs_diff_eq!(q1, q2, epsilon = 1e-12);
    }

    #[test]
    fn masked_apply_keeps_other_components() {
        let mut lbfgs = lbfgs(4, 3);
        assert!(push(&mut lbfgs, &dvector![1.0, 1.0, 1.0], &dvector![2.0, 2.0, 2.0]));

        let mut q = dvector![1.0, 1.0, 7.0];
        assert!(lbfgs.apply_masked(&mut q, &[0, 1]));

        assert_eq!(q[2], 7.0);
        assert_abs_diff_eq!(q[0], 0.5, epsilon = 1e-14);
        assert_abs_diff_eq!(q[1], 0.5, epsilon = 1e-14);
    }

    #[test]
    fn repeated_apply_after_wrap_around() {
        let a: DMatrix<f64> = dmatrix![2.0, 0.5; 0.5, 1.0];
        let mut lbfgs = lbfgs(2, 2);

        for s in [dvector![1.0, 0.2], dvector![-0.3, 1.0], dvector![0.5, 0.5]].iter() {
            assert!(push(&mut lbfgs, s, &(&a * s)));
        }

        let mut first = dvector![0.7, -0.4];
        assert!(lbfgs.apply(&mut first));

        let mut masked = dvector![0.7, -0.4];
        assert!(lbfgs.apply_masked(&mut masked, &[0, 1]));

        let mut second = dvector![0.7, -0.4];
        assert!(lbfgs.apply(&mut second));

        assert_eq!(first, second);
        assert_abs_diff_eq!(first, masked, epsilon = 1e-12);
    }

    #[test]
    fn invalid_memory() {
        let mut options = LbfgsParams::<f64>::default();
        options.set_memory(0);

        assert!(matches!(
            Lbfgs::new(options),
            Err(ConfigError::InvalidParameter { name: "memory", .. })
        ));
    }
}
