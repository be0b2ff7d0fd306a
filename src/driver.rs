//! High-level API for solving.
//!
//! The driver encapsulates the solvers together with the current iterate and
//! multipliers. The simplest way of using the driver is to initialize it with
//! the defaults:
//!
//! ```rust
//! use proxalm::AlmDriver;
//! # use proxalm::nalgebra as na;
//! # use proxalm::{Problem, ProblemError};
//! # use na::{storage::{Storage, StorageMut}, Dyn, IsContiguous, Vector};
//! #
//! # struct MyProblem;
//! #
//! # impl Problem for MyProblem {
//! #     type Field = f64;
//! #
//! #     fn num_variables(&self) -> usize {
//! #         2
//! #     }
//! #
//! #     fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
//! #     where
//! #         Sx: Storage<f64, Dyn> + IsContiguous,
//! #     {
//! #         Ok(x.norm_squared())
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
//! #         grad.copy_from(x);
//! #         *grad *= 2.0;
//! #         Ok(())
//! #     }
//! # }
//!
//! let f = MyProblem;
//!
//! let mut driver = AlmDriver::new(&f).expect("valid problem");
//! let solution = driver.solve().expect("valid configuration");
//!
//! if solution.stats.status().is_converged() {
//!     println!("x = {:?}", solution.x.as_slice());
//! }
//! ```
//!
//! If you need to specify additional settings, use the builder:
//!
//! ```rust
//! use proxalm::{algo::{AlmParams, PanocParams}, AlmDriver};
//! # use proxalm::nalgebra as na;
//! # use proxalm::{Problem, ProblemError};
//! # use na::{storage::{Storage, StorageMut}, Dyn, IsContiguous, Vector};
//! #
//! # struct MyProblem;
//! #
//! # impl Problem for MyProblem {
//! #     type Field = f64;
//! #
//! #     fn num_variables(&self) -> usize {
//! #         2
//! #     }
//! #
//! #     fn eval_objective<Sx>(&self, x: &Vector<f64, Dyn, Sx>) -> Result<f64, ProblemError>
//! #     where
//! #         Sx: Storage<f64, Dyn> + IsContiguous,
//! #     {
//! #         Ok(x.norm_squared())
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
//! #         grad.copy_from(x);
//! #         *grad *= 2.0;
//! #         Ok(())
//! #     }
//! # }
//!
//! let f = MyProblem;
//!
//! let mut alm = AlmParams::default();
//! alm.set_tolerance(1e-8);
//!
//! let mut panoc = PanocParams::default();
//! panoc.set_max_iterations(500);
//!
//! let mut driver = AlmDriver::builder(&f)
//!     .with_initial(vec![10.0, -10.0])
//!     .with_alm_params(alm)
//!     .with_panoc_params(panoc)
//!     .build()
//!     .expect("valid configuration");
//! ```
//!
//! The driver keeps the solution between the calls of [`AlmDriver::solve`],
//! so solving a sequence of similar problems (e.g., in model predictive
//! control) warm starts every solve from the previous solution.

use nalgebra::DVector;

use crate::{
    algo::{AlmParams, AlmSolver, AlmStats, PanocParams, PanocSolver},
    direction::{Direction, DirectionStrategy},
    ConfigError, Problem,
};

/// Builder for the [`AlmDriver`].
pub struct AlmBuilder<'a, P: Problem, D = Direction<<P as Problem>::Field>> {
    problem: &'a P,
    x0: DVector<P::Field>,
    y0: DVector<P::Field>,
    alm: AlmParams<P::Field>,
    panoc: PanocParams<P::Field>,
    direction: D,
}

impl<'a, P: Problem> AlmBuilder<'a, P> {
    fn new(problem: &'a P) -> Self {
        Self {
            problem,
            x0: DVector::zeros(problem.num_variables()),
            y0: DVector::zeros(problem.num_constraints()),
            alm: AlmParams::default(),
            panoc: PanocParams::default(),
            direction: Direction::default(),
        }
    }
}

impl<'a, P: Problem, D: DirectionStrategy<P::Field>> AlmBuilder<'a, P, D> {
    /// Sets the initial point from which the iterative process starts.
    pub fn with_initial(mut self, x0: Vec<P::Field>) -> Self {
        self.x0 = DVector::from_vec(x0);
        self
    }

    /// Sets the initial estimate of the Lagrange multipliers.
    pub fn with_multipliers(mut self, y0: Vec<P::Field>) -> Self {
        self.y0 = DVector::from_vec(y0);
        self
    }

    /// Sets the options of the outer solver.
    pub fn with_alm_params(mut self, params: AlmParams<P::Field>) -> Self {
        self.alm = params;
        self
    }

    /// Sets the options of the inner solver.
    pub fn with_panoc_params(mut self, params: PanocParams<P::Field>) -> Self {
        self.panoc = params;
        self
    }

    /// Sets the direction used by the inner solver.
    pub fn with_direction<D2>(self, direction: D2) -> AlmBuilder<'a, P, D2>
    where
        D2: DirectionStrategy<P::Field>,
    {
        AlmBuilder {
            problem: self.problem,
            x0: self.x0,
            y0: self.y0,
            alm: self.alm,
            panoc: self.panoc,
            direction,
        }
    }

    /// Builds the [`AlmDriver`].
    ///
    /// The initial point is projected onto the variable bounds.
    pub fn build(self) -> Result<AlmDriver<'a, P, D>, ConfigError> {
        let AlmBuilder {
            problem,
            mut x0,
            y0,
            alm,
            panoc,
            direction,
        } = self;

        ConfigError::check_dim("x", problem.num_variables(), x0.nrows())?;
        ConfigError::check_dim("y", problem.num_constraints(), y0.nrows())?;

        if let Some(bounds) = problem.variable_bounds() {
            ConfigError::check_dim("variable bounds", x0.nrows(), bounds.dim())?;
            bounds.project(&mut x0);
        }

        let inner = PanocSolver::new(panoc, direction)?;
        let solver = AlmSolver::new(alm, inner)?;

        Ok(AlmDriver {
            problem,
            solver,
            x: x0,
            y: y0,
        })
    }
}

/// Result of [`AlmDriver::solve`].
#[derive(Debug, Clone)]
pub struct Solution<T: nalgebra::RealField + Copy> {
    /// Final iterate.
    pub x: DVector<T>,
    /// Final Lagrange multipliers.
    pub y: DVector<T>,
    /// Statistics of the solve.
    pub stats: AlmStats<T>,
}

/// The driver for the process of solving a constrained optimization problem.
///
/// For default settings, use [`AlmDriver::new`]. For more flexibility, use
/// [`AlmDriver::builder`]. For the usage of the driver, see [module](self)
/// documentation.
pub struct AlmDriver<'a, P: Problem, D = Direction<<P as Problem>::Field>> {
    problem: &'a P,
    solver: AlmSolver<P::Field, D>,
    x: DVector<P::Field>,
    y: DVector<P::Field>,
}

impl<'a, P: Problem> AlmDriver<'a, P> {
    /// Returns the builder for specifying additional settings.
    pub fn builder(problem: &'a P) -> AlmBuilder<'a, P> {
        AlmBuilder::new(problem)
    }

    /// Initializes the driver with the default settings.
    pub fn new(problem: &'a P) -> Result<Self, ConfigError> {
        AlmDriver::builder(problem).build()
    }
}

impl<'a, P: Problem, D: DirectionStrategy<P::Field>> AlmDriver<'a, P, D> {
    /// Returns reference to the current point.
    pub fn x(&self) -> &[P::Field] {
        self.x.as_slice()
    }

    /// Returns reference to the current multipliers.
    pub fn y(&self) -> &[P::Field] {
        self.y.as_slice()
    }

    /// Gets the solver for changing its options or callbacks.
    pub fn solver_mut(&mut self) -> &mut AlmSolver<P::Field, D> {
        &mut self.solver
    }

    /// Solves the problem starting from the current point and multipliers
    /// and stores the result as the starting point of the next call.
    pub fn solve(&mut self) -> Result<Solution<P::Field>, ConfigError> {
        let stats = self.solver.solve(self.problem, &mut self.x, &mut self.y)?;

        Ok(Solution {
            x: self.x.clone(),
            y: self.y.clone(),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra::dvector;

    use crate::algo::PanocParams;
    use crate::core::{Bounds, SolverStatus};
    use crate::direction::{LbfgsParams, StructuredLbfgsParams};
    use crate::testing::*;

    #[test]
    fn lasso_recovers_planted_solution() {
        let (m, n, k) = (60, 20, 3);
        let f = Lasso::random(m, n, k, 0.1, 3);

        let mut alm = AlmParams::default();
        alm.set_tolerance(1e-8);
        let mut panoc = PanocParams::default();
        panoc.set_max_iterations(1000);

        let mut driver = AlmDriver::builder(&f)
            .with_alm_params(alm)
            .with_panoc_params(panoc)
            .build()
            .unwrap();
        let solution = driver.solve().unwrap();

        assert_eq!(solution.stats.status(), SolverStatus::Converged);

        let x_true = f.x_true().unwrap();
        let x = &solution.x;

        assert!(f.total_objective(x) <= f.total_objective(x_true) * (1.0 + 1e-6));
        assert!(x.iter().filter(|xi| **xi != 0.0).count() <= 2 * k);
        assert!((x - x_true).norm() / x_true.norm() <= 0.05);
        assert!(x.iter().all(|xi| *xi >= 0.0));
    }

    #[test]
    fn lasso_with_structured_direction() {
        let f = Lasso::random(40, 15, 2, 0.1, 7);

        let mut panoc = PanocParams::default();
        panoc.set_max_iterations(1000);
        let mut structured = StructuredLbfgsParams::default();
        structured.set_hessian_vec_factor(1.0);

        let mut driver = AlmDriver::builder(&f)
            .with_panoc_params(panoc)
            .with_direction(Direction::structured_lbfgs(LbfgsParams::default(), structured).unwrap())
            .build()
            .unwrap();
        let solution = driver.solve().unwrap();

        assert_eq!(solution.stats.status(), SolverStatus::Converged);
        assert!(f.is_optimal(&solution.x, 1e-4));
    }

    #[test]
    fn constrained() {
        let f = ConstrainedQuadratic::halfspace();

        let mut alm = AlmParams::default();
        alm.set_tolerance(1e-8);
        alm.set_dual_tolerance(1e-8);
        let mut panoc = PanocParams::default();
        panoc.set_max_iterations(500);

        let mut driver = AlmDriver::builder(&f)
            .with_alm_params(alm)
            .with_panoc_params(panoc)
            .build()
            .unwrap();
        let solution = driver.solve().unwrap();

        assert_eq!(solution.stats.status(), SolverStatus::Converged);
        assert_abs_diff_eq!(solution.x, dvector![0.0, 1.0], epsilon = 1e-6);
        assert_abs_diff_eq!(solution.y, dvector![2.0], epsilon = 1e-5);
        assert_eq!(driver.x(), solution.x.as_slice());
        assert_eq!(driver.y(), solution.y.as_slice());
    }

    #[test]
    fn warm_start() {
        let f = ConstrainedQuadratic::halfspace();

        let mut panoc = PanocParams::default();
        panoc.set_max_iterations(500);

        let mut driver = AlmDriver::builder(&f)
            .with_initial(vec![5.0, -5.0])
            .with_panoc_params(panoc)
            .build()
            .unwrap();

        let cold = driver.solve().unwrap();
        let warm = driver.solve().unwrap();

        assert!(cold.stats.status().is_converged());
        assert!(warm.stats.status().is_converged());
        assert!(warm.stats.inner().iterations() <= cold.stats.inner().iterations());
    }

    #[test]
    fn initial_is_projected() {
        let f = BoxQuadratic::diagonal(
            dvector![1.0, 1.0],
            dvector![0.0, 0.0],
            Bounds::new(dvector![-1.0, -1.0], dvector![1.0, 1.0]),
        );

        let driver = AlmDriver::builder(&f)
            .with_initial(vec![5.0, -0.5])
            .build()
            .unwrap();

        assert_eq!(driver.x(), &[1.0, -0.5]);
    }

    #[test]
    fn dimension_mismatch() {
        let f = ConstrainedQuadratic::halfspace();

        assert_eq!(
            AlmDriver::builder(&f)
                .with_initial(vec![0.0, 0.0, 0.0])
                .build()
                .err(),
            Some(ConfigError::DimensionMismatch {
                what: "x",
                expected: 2,
                actual: 3
            })
        );

        assert!(AlmDriver::builder(&f)
            .with_multipliers(vec![])
            .build()
            .is_err());
    }
}
