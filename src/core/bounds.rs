//! Rectangular sets used for variable bounds and for the bounds of general
//! constraints.

use std::iter::FromIterator;

use nalgebra::{
    convert,
    storage::{Storage, StorageMut},
    DVector, Dyn, RealField, Vector,
};

/// Rectangular set `{ z : lower <= z <= upper }`.
///
/// Positive and negative infinity can be used to indicate a component
/// unbounded in that direction. A component with equal lower and upper bound
/// is an equality.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds<T: RealField + Copy> {
    lower: DVector<T>,
    upper: DVector<T>,
}

impl<T: RealField + Copy> Bounds<T> {
    /// Creates bounds that do not restrict any of `dim` components.
    pub fn unbounded(dim: usize) -> Self {
        let inf: T = convert(f64::INFINITY);

        Self {
            lower: DVector::from_element(dim, -inf),
            upper: DVector::from_element(dim, inf),
        }
    }

    /// Creates bounds `lower <= z <= upper`.
    pub fn new(lower: DVector<T>, upper: DVector<T>) -> Self {
        assert!(
            lower.nrows() == upper.nrows(),
            "lower and upper have different size"
        );

        Self { lower, upper }
    }

    /// Creates the bounds `[0, inf)^dim`.
    pub fn nonnegative(dim: usize) -> Self {
        Self::new(DVector::zeros(dim), Self::unbounded(dim).upper)
    }

    /// Creates the bounds `(-inf, upper]`.
    pub fn upper_only(upper: DVector<T>) -> Self {
        let lower = Self::unbounded(upper.nrows()).lower;
        Self::new(lower, upper)
    }

    /// Creates the set `{ value }` representing equality constraints.
    pub fn equal(value: DVector<T>) -> Self {
        Self::new(value.clone(), value)
    }

    /// Gets the dimension of the set.
    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    /// Gets the lower bounds.
    pub fn lower(&self) -> &DVector<T> {
        &self.lower
    }

    /// Gets the upper bounds.
    pub fn upper(&self) -> &DVector<T> {
        &self.upper
    }

    /// Determines whether all lower bounds are less or equal than the upper
    /// ones. NaN bounds make the set invalid.
    pub fn is_valid(&self) -> bool {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .all(|(li, ui)| li <= ui)
    }

    /// Determines whether given point lies in the set.
    pub fn contains<Sx>(&self, x: &Vector<T, Dyn, Sx>) -> bool
    where
        Sx: Storage<T, Dyn>,
    {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .zip(x.iter())
            .all(|((li, ui), xi)| li <= xi && xi <= ui)
    }

    /// Projects given point onto the set. Returns `true` if the point was
    /// not feasible.
    pub fn project<Sx>(&self, x: &mut Vector<T, Dyn, Sx>) -> bool
    where
        Sx: StorageMut<T, Dyn>,
    {
        let mut not_feasible = false;

        self.lower
            .iter()
            .zip(self.upper.iter())
            .zip(x.iter_mut())
            .for_each(|((li, ui), xi)| {
                if &*xi < li {
                    *xi = *li;
                    not_feasible = true;
                } else if &*xi > ui {
                    *xi = *ui;
                    not_feasible = true;
                }
            });

        not_feasible
    }

    /// Computes `e = z - P(z)` where `P` is the projection onto the set.
    pub fn projecting_difference<Sz, Se>(&self, z: &Vector<T, Dyn, Sz>, e: &mut Vector<T, Dyn, Se>)
    where
        Sz: Storage<T, Dyn>,
        Se: StorageMut<T, Dyn>,
    {
        for i in 0..z.nrows() {
            let zi = z[i];
            e[i] = zi - zi.max(self.lower[i]).min(self.upper[i]);
        }
    }

    /// Projects Lagrange multipliers of constraints `z` in this set onto the
    /// admissible region. Multipliers of sides that are unbounded must be
    /// zero; all components are limited to `[-max_multiplier, max_multiplier]`.
    pub fn project_multipliers<Sy>(&self, y: &mut Vector<T, Dyn, Sy>, max_multiplier: T)
    where
        Sy: StorageMut<T, Dyn>,
    {
        let zero = T::zero();

        for i in 0..y.nrows() {
            let lo = if self.lower[i].is_finite() {
                -max_multiplier
            } else {
                zero
            };
            let hi = if self.upper[i].is_finite() {
                max_multiplier
            } else {
                zero
            };
            y[i] = y[i].max(lo).min(hi);
        }
    }
}

/// Proximal step of `h = sum_i lambda_i |x_i| + indicator(bounds)` with
/// step size `gamma`, evaluated at `x - gamma * grad`.
///
/// Writes the proximal point into `x_hat` and the step `x_hat - x` into `p`,
/// and returns `h(x_hat)`. Both `bounds` and `l1` are optional; `l1` has
/// either a single element applied to all components or one per component.
pub fn prox_l1_box_step<T, Sx, Sg, Sxh, Sp>(
    bounds: Option<&Bounds<T>>,
    l1: Option<&DVector<T>>,
    gamma: T,
    x: &Vector<T, Dyn, Sx>,
    grad: &Vector<T, Dyn, Sg>,
    x_hat: &mut Vector<T, Dyn, Sxh>,
    p: &mut Vector<T, Dyn, Sp>,
) -> T
where
    T: RealField + Copy,
    Sx: Storage<T, Dyn>,
    Sg: Storage<T, Dyn>,
    Sxh: StorageMut<T, Dyn>,
    Sp: StorageMut<T, Dyn>,
{
    let zero = T::zero();
    let mut h = zero;

    for i in 0..x.nrows() {
        let lambda = match l1 {
            Some(l1) if l1.nrows() == 1 => l1[0],
            Some(l1) => l1[i],
            None => zero,
        };

        let v = x[i] - gamma * grad[i];

        // Soft thresholding followed by clamping is the exact proximal map of
        // a one-dimensional convex function plus an interval indicator.
        let threshold = gamma * lambda;
        let mut z = if v > threshold {
            v - threshold
        } else if v < -threshold {
            v + threshold
        } else {
            zero
        };

        if let Some(bounds) = bounds {
            z = z.max(bounds.lower[i]).min(bounds.upper[i]);
        }

        x_hat[i] = z;
        p[i] = z - x[i];
        h += lambda * z.abs();
    }

    h
}

impl<T: RealField + Copy> FromIterator<(T, T)> for Bounds<T> {
    fn from_iter<I: IntoIterator<Item = (T, T)>>(iter: I) -> Self {
        let (lower, upper): (Vec<_>, Vec<_>) = iter.into_iter().unzip();
        Self::new(DVector::from_vec(lower), DVector::from_vec(upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    #[test]
    fn projection() {
        let bounds: Bounds<f64> = [(0.0, 1.0), (-1.0, f64::INFINITY), (2.0, 2.0)]
            .into_iter()
            .collect();

        let mut x = dvector![-3.0, 5.0, 0.0];
        assert!(bounds.project(&mut x));
        assert_eq!(x, dvector![0.0, 5.0, 2.0]);
        assert!(bounds.contains(&x));
        assert!(!bounds.project(&mut x));
    }

    #[test]
    fn projecting_difference() {
        let bounds = Bounds::upper_only(dvector![1.0, 1.0]);
        let z = dvector![3.0, -4.0];
        let mut e = dvector![0.0, 0.0];

        bounds.projecting_difference(&z, &mut e);
        assert_eq!(e, dvector![2.0, 0.0]);
    }

    #[test]
    fn multipliers_of_one_sided_constraints() {
        let bounds = Bounds::upper_only(dvector![1.0, 1.0, 1.0]);
        let mut y = dvector![-2.0, 3.0, 1e12];

        bounds.project_multipliers(&mut y, 1e9);
        assert_eq!(y, dvector![0.0, 3.0, 1e9]);

        let bounds = Bounds::equal(dvector![0.0]);
        let mut y = dvector![-2.0];
        bounds.project_multipliers(&mut y, 1e9);
        assert_eq!(y, dvector![-2.0]);
    }

    #[test]
    fn prox_soft_threshold_and_clamp() {
        let bounds = Bounds::nonnegative(3);
        let l1 = dvector![1.0];
        let x = dvector![2.0, 0.5, -1.0];
        let grad = dvector![0.0, 0.0, -1.0];
        let mut x_hat = dvector![0.0, 0.0, 0.0];
        let mut p = dvector![0.0, 0.0, 0.0];

        let h = prox_l1_box_step(Some(&bounds), Some(&l1), 0.5, &x, &grad, &mut x_hat, &mut p);

        // v = [2.0, 0.5, -0.5], threshold = 0.5.
        assert_abs_diff_eq!(x_hat, dvector![1.5, 0.0, 0.0]);
        assert_abs_diff_eq!(p, dvector![-0.5, -0.5, 1.0]);
        assert_abs_diff_eq!(h, 1.5);
    }

    #[test]
    fn prox_without_regularization_is_projection() {
        let bounds: Bounds<f64> = [(-1.0, 1.0), (-1.0, 1.0)].into_iter().collect();
        let x = dvector![0.5, 0.5];
        let grad = dvector![-10.0, 1.0];
        let mut x_hat = dvector![0.0, 0.0];
        let mut p = dvector![0.0, 0.0];

        let h = prox_l1_box_step(Some(&bounds), None, 0.1, &x, &grad, &mut x_hat, &mut p);

        assert_eq!(h, 0.0);
        assert_abs_diff_eq!(x_hat, dvector![1.0, 0.4], epsilon = 1e-15);
    }
}
