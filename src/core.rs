//! Core abstractions and types.
//!
//! *Users* are mainly interested in implementing the [`Problem`] trait,
//! optionally specifying the [bounds](Bounds) of variables and constraints.
//!
//! Algorithm *developers* are interested in the [`AugmentedLagrangian`]
//! evaluator, the [counting wrapper](ProblemWithCounters) and the tools in
//! the [derivatives](crate::derivatives) module.

mod bounds;
mod counters;
mod lagrangian;
mod problem;
mod solver;

pub use bounds::*;
pub use counters::*;
pub use lagrangian::AugmentedLagrangian;
pub use problem::*;
pub use solver::*;

pub(crate) use lagrangian::all_finite;
pub(crate) use problem::validate_problem;
