use criterion::{criterion_group, criterion_main, Criterion};
use proxalm::{
    algo::{AlmParams, AlmSolver, PanocParams, PanocSolver},
    direction::{Direction, LbfgsParams, StructuredLbfgsParams},
    nalgebra as na,
    testing::*,
    InnerSolveOptions, Problem,
};

const MAX_ITERS: usize = 10_000;
const TOLERANCE: f64 = 1e-8;

fn panoc(direction: Direction<f64>) -> PanocSolver<f64> {
    let mut params = PanocParams::default();
    params.set_max_iterations(MAX_ITERS);

    PanocSolver::new(params, direction).expect("valid parameters")
}

fn structured() -> Direction<f64> {
    let mut params = StructuredLbfgsParams::default();
    params.set_hessian_vec_factor(1.0);

    Direction::structured_lbfgs(LbfgsParams::default(), params).expect("valid parameters")
}

fn minimize<P: Problem<Field = f64>>(
    solver: &mut PanocSolver<f64>,
    f: &P,
    mut x: na::DVector<f64>,
) -> bool {
    solver
        .minimize(f, TOLERANCE, &mut x)
        .map(|stats| stats.status().is_converged())
        .unwrap_or(false)
}

fn rosenbrock(c: &mut Criterion) {
    let f = Rosenbrock::new(2);
    let x = &f.initials()[0];

    c.bench_function("panoc lbfgs rosenbrock 2", |b| {
        let mut solver = panoc(Direction::default());
        b.iter(|| assert!(minimize(&mut solver, &f, x.clone())))
    });

    c.bench_function("panoc structured lbfgs rosenbrock 2", |b| {
        let mut solver = panoc(structured());
        b.iter(|| assert!(minimize(&mut solver, &f, x.clone())))
    });

    let f = Rosenbrock::new(10);
    let x = &f.initials()[0];

    c.bench_function("panoc lbfgs rosenbrock 10", |b| {
        let mut solver = panoc(Direction::default());
        b.iter(|| assert!(minimize(&mut solver, &f, x.clone())))
    });
}

fn lasso(c: &mut Criterion) {
    let f = Lasso::random(200, 50, 5, 0.1, 1);
    let x = &f.initials()[0];

    c.bench_function("panoc lbfgs lasso 200x50", |b| {
        let mut solver = panoc(Direction::default());
        b.iter(|| assert!(minimize(&mut solver, &f, x.clone())))
    });

    c.bench_function("panoc structured lbfgs lasso 200x50", |b| {
        let mut solver = panoc(structured());
        b.iter(|| assert!(minimize(&mut solver, &f, x.clone())))
    });
}

fn constrained(c: &mut Criterion) {
    let f = ConstrainedQuadratic::halfspace_and_equality();
    let x = &f.initials()[0];

    let mut params = AlmParams::default();
    params.set_tolerance(1e-8);
    params.set_dual_tolerance(1e-8);

    c.bench_function("alm halfspace and equality", |b| {
        let mut solver =
            AlmSolver::new(params.clone(), panoc(Direction::default())).expect("valid parameters");

        b.iter(|| {
            let mut x = x.clone();
            let mut y = na::DVector::zeros(f.num_constraints());
            let stats = solver.solve(&f, &mut x, &mut y).expect("valid inputs");
            assert!(stats.status().is_converged());
        })
    });

    // Warm start from the solution, as in model predictive control.
    c.bench_function("alm halfspace and equality warm", |b| {
        let mut solver =
            AlmSolver::new(params.clone(), panoc(Direction::default())).expect("valid parameters");

        let mut x_star = x.clone();
        let mut y_star = na::DVector::zeros(f.num_constraints());
        solver
            .solve(&f, &mut x_star, &mut y_star)
            .expect("valid inputs");

        b.iter(|| {
            let mut x = x_star.clone();
            let mut y = y_star.clone();
            let stats = solver.solve(&f, &mut x, &mut y).expect("valid inputs");
            assert!(stats.status().is_converged());
        })
    });

    let mut panoc_params = PanocParams::default();
    panoc_params.set_max_iterations(MAX_ITERS);

    c.bench_function("panoc inner solve box", |b| {
        let f = BoxQuadratic::diagonal(
            na::dvector![1.0, 10.0, 100.0, 1000.0],
            na::dvector![-2.0, 5.0, -50.0, 1.0],
            proxalm::Bounds::new(na::DVector::from_element(4, -1.0), na::DVector::from_element(4, 1.0)),
        );
        let mut solver =
            PanocSolver::new(panoc_params.clone(), structured()).expect("valid parameters");
        let y = na::DVector::zeros(0);
        let sigma = na::DVector::zeros(0);

        b.iter(|| {
            let mut x = na::DVector::zeros(4);
            let mut y = y.clone();
            let mut err_z = na::DVector::zeros(0);
            let stats = solver
                .solve(
                    &f,
                    InnerSolveOptions {
                        tolerance: TOLERANCE,
                        max_time: None,
                    },
                    &mut x,
                    &mut y,
                    &sigma,
                    &mut err_z,
                )
                .expect("valid inputs");
            assert!(stats.status().is_converged());
        })
    });
}

criterion_group!(benches, rosenbrock, lasso, constrained);
criterion_main!(benches);
