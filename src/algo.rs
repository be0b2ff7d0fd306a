//! The collection of implemented algorithms.

pub mod alm;
pub mod panoc;

pub use alm::{AlmCallback, AlmParams, AlmProgress, AlmSolver, AlmStats, InnerStats, PenaltyInit};
pub use panoc::{
    LipschitzInit, PanocCallback, PanocParams, PanocProgress, PanocSolver, PanocStats, PanocStoppingCriterion,
};
