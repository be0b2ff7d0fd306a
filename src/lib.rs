#![allow(clippy::many_single_char_names)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![warn(missing_docs)]

//! # Proxalm
//!
//! A pure Rust implementation of proximal quasi-Newton methods for
//! constrained, possibly nonconvex and nonsmooth optimization problems.
//!
//! The library combines two nested algorithms. The inner solver,
//! [PANOC](algo::panoc), minimizes a smooth function plus a simple
//! nonsmooth term (l1 regularization and bound constraints) using the
//! proximal gradient method accelerated by a quasi-Newton
//! [direction](direction). The outer solver, [ALM](algo::alm), handles
//! general nonlinear constraints by a sequence of such subproblems with
//! updated Lagrange multipliers and penalty weights.
//!
//! ## Algorithms
//!
//! * [PANOC](algo::panoc) -- Proximal averaged Newton-type method with
//!   a nonmonotone line search on the forward-backward envelope. Solves
//!   problems without general constraints directly.
//! * [ALM](algo::alm) -- Augmented Lagrangian method that turns general
//!   constraints into a sequence of PANOC subproblems.
//! * [L-BFGS](direction::LbfgsDirection) -- Default direction of PANOC.
//! * [Structured L-BFGS](direction::StructuredLbfgsDirection) -- L-BFGS
//!   restricted to the variables that are not fixed by the proximal step,
//!   optionally corrected with Hessian-vector products.
//!
//! ## Problem
//!
//! Mathematically, the problem is formulated as
//!
//! ```text
//! minimize    f(x) + h(x)
//! subject to  L <= x <= U
//!             g(x) in D
//! ```
//!
//! where `f` is smooth, `h(x) = lambda ||x||_1` (optional), `[L, U]` are the
//! variable bounds and `D` is a box for the general constraints `g`. The
//! bounds can be negative/positive infinity, effectively making the variable
//! unconstrained.
//!
//! When it comes to code, the problem is any type that implements the
//! [`Problem`] trait. Only the objective and its gradient are required.
//!
//! ```rust
//! // Proxalm is based on `nalgebra` crate.
//! use proxalm::nalgebra as na;
//! use proxalm::{Bounds, Problem, ProblemError};
//! use na::{dvector, storage::{Storage, StorageMut}, DVector, Dyn, IsContiguous, Vector};
//!
//! // A problem is represented by a type.
//! struct Projection {
//!     target: DVector<f64>,
//!     bounds: Bounds<f64>,
//! }
//!
//! impl Problem for Projection {
//!     // The numeric type. Usually f64 or f32.
//!     type Field = f64;
//!
//!     fn num_variables(&self) -> usize {
//!         2
//!     }
//!
//!     // One general constraint: x0 + x1 <= 1.
//!     fn num_constraints(&self) -> usize {
//!         1
//!     }
//!
//!     fn general_bounds(&self) -> Option<&Bounds<Self::Field>> {
//!         Some(&self.bounds)
//!     }
//!
//!     fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
//!     where
//!         Sx: Storage<f64, Dyn> + IsContiguous,
//!     {
//!         Ok((x - &self.target).norm_squared())
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
//!         grad.copy_from(&((x - &self.target) * 2.0));
//!         Ok(())
//!     }
//!
//!     fn eval_constraints<Sx, Sgx>(
//!         &self,
//!         x: &Vector<f64, Dyn, Sx>,
//!         gx: &mut Vector<f64, Dyn, Sgx>,
//!     ) -> Result<(), ProblemError>
//!     where
//!         Sx: Storage<f64, Dyn> + IsContiguous,
//!         Sgx: StorageMut<f64, Dyn>,
//!     {
//!         gx[0] = x[0] + x[1];
//!         Ok(())
//!     }
//!
//!     fn eval_constraints_gradient_product<Sx, Sy, So>(
//!         &self,
//!         _x: &Vector<f64, Dyn, Sx>,
//!         y: &Vector<f64, Dyn, Sy>,
//!         out: &mut Vector<f64, Dyn, So>,
//!     ) -> Result<(), ProblemError>
//!     where
//!         Sx: Storage<f64, Dyn> + IsContiguous,
//!         Sy: Storage<f64, Dyn>,
//!         So: StorageMut<f64, Dyn>,
//!     {
//!         out.fill(y[0]);
//!         Ok(())
//!     }
//! }
//! ```
//!
//! The second-order information (Hessian-vector products of the Lagrangian
//! and Jacobian-vector products of the constraints) is optional. If not
//! provided, it is approximated by [finite
//! differences](derivatives) of the gradient when needed.
//!
//! ## Solving
//!
//! When you have your problem available, you can use the [`AlmDriver`] to
//! run the solvers until convergence or until the budget is exhausted.
//!
//! ```rust
//! use proxalm::AlmDriver;
//! # use proxalm::nalgebra as na;
//! # use proxalm::{Bounds, Problem, ProblemError};
//! # use na::{dvector, storage::{Storage, StorageMut}, DVector, Dyn, IsContiguous, Vector};
//! #
//! # struct Projection {
//! #     target: DVector<f64>,
//! #     bounds: Bounds<f64>,
//! # }
//! #
//! # impl Problem for Projection {
//! #     type Field = f64;
//! #
//! #     fn num_variables(&self) -> usize {
//! #         2
//! #     }
//! #
//! #     fn num_constraints(&self) -> usize {
//! #         1
//! #     }
//! #
//! #     fn general_bounds(&self) -> Option<&Bounds<Self::Field>> {
//! #         Some(&self.bounds)
//! #     }
//! #
//! #     fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
//! #     where
//! #         Sx: Storage<f64, Dyn> + IsContiguous,
//! #     {
//! #         Ok((x - &self.target).norm_squared())
//! #     }
//! #
//! #     fn eval_objective_gradient<Sx, Sg>(
//! #         &self,
//! #         x: &Vector<f64, Dyn, Sx>,
//! #         grad: &mut Vector<f64, Dyn, Sg>,
//! #     ) -> Result<(), ProblemError>
//! #     where
//! #         Sx: Storage<f64, Dyn> + IsContiguous,
//! #         Sg: StorageMut<f64, Dyn>,
//! #     {
//! #         grad.copy_from(&((x - &self.target) * 2.0));
//! #         Ok(())
//! #     }
//! #
//! #     fn eval_constraints<Sx, Sgx>(
//! #         &self,
//! #         x: &Vector<f64, Dyn, Sx>,
//! #         gx: &mut Vector<f64, Dyn, Sgx>,
//! #     ) -> Result<(), ProblemError>
//! #     where
//! #         Sx: Storage<f64, Dyn> + IsContiguous,
//! #         Sgx: StorageMut<f64, Dyn>,
//! #     {
//! #         gx[0] = x[0] + x[1];
//! #         Ok(())
//! #     }
//! #
//! #     fn eval_constraints_gradient_product<Sx, Sy, So>(
//! #         &self,
//! #         _x: &Vector<f64, Dyn, Sx>,
//! #         y: &Vector<f64, Dyn, Sy>,
//! #         out: &mut Vector<f64, Dyn, So>,
//! #     ) -> Result<(), ProblemError>
//! #     where
//! #         Sx: Storage<f64, Dyn> + IsContiguous,
//! #         Sy: Storage<f64, Dyn>,
//! #         So: StorageMut<f64, Dyn>,
//! #     {
//! #         out.fill(y[0]);
//! #         Ok(())
//! #     }
//! # }
//!
//! let f = Projection {
//!     target: dvector![1.0, 2.0],
//!     bounds: Bounds::upper_only(dvector![1.0]),
//! };
//!
//! let mut driver = AlmDriver::builder(&f)
//!     .with_initial(vec![10.0, -5.0])
//!     .build()
//!     .expect("valid configuration");
//!
//! let solution = driver.solve().expect("valid configuration");
//!
//! println!(
//!     "{} after {} outer iterations: x = {:?}, y = {:?}",
//!     solution.stats.status(),
//!     solution.stats.outer_iterations(),
//!     solution.x.as_slice(),
//!     solution.y.as_slice(),
//! );
//! ```
//!
//! For the full control over the process (progress callbacks, custom
//! directions, reusing the solvers for many problems), use
//! [`AlmSolver`](algo::AlmSolver) and [`PanocSolver`](algo::PanocSolver)
//! directly.
//!
//! ## License
//!
//! Licensed under MIT.

pub mod algo;
mod core;
pub mod derivatives;
pub mod direction;
pub mod driver;

pub use core::*;
pub use driver::{AlmDriver, Solution};

#[cfg(feature = "testing")]
pub mod testing;

#[cfg(not(feature = "testing"))]
pub(crate) mod testing;

pub use nalgebra;
