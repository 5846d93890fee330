use ibns2::solver::cases::{l2_velocity_error, mms_solver, mms_velocity, run_mms};
use ibns2::solver::NewtonOutcome;

#[test]
fn l2_error_decreases_under_uniform_refinement() {
    let mut errors = Vec::new();
    let mut solver = mms_solver(3);

    for cycle in 0..3 {
        let outcome = solver.solve(1e-8, 10).unwrap();
        assert!(
            matches!(outcome, NewtonOutcome::Converged { .. }),
            "cycle {cycle}: {outcome:?}"
        );
        let err = l2_velocity_error(
            &solver.mesh,
            &solver.dof_map,
            &solver.state.solution,
            mms_velocity,
        );
        println!("cycle {cycle}: L2 velocity error {err:.6e}");
        errors.push(err);

        if cycle < 2 {
            let fine = solver.mesh.refine_global();
            let transferred = solver
                .mesh
                .interpolate_to_refined(&fine, &solver.state.solution, 3);
            let refinement = 4 + cycle as u32;
            solver = mms_solver(refinement);
            solver.set_initial_solution(transferred);
        }
    }

    // Strictly decreasing, and roughly second order (each halving of h
    // should cut the error well below 60%).
    for w in errors.windows(2) {
        assert!(w[1] < w[0], "error grew: {} -> {}", w[0], w[1]);
        assert!(w[1] < 0.6 * w[0], "poor reduction: {} -> {}", w[0], w[1]);
    }
}

// The full five-cycle study the binary runs; the finest mesh is 128x128,
// so this is kept out of the default test run.
#[test]
#[ignore]
fn full_five_cycle_study_decreases_monotonically() {
    let path = std::env::temp_dir().join("ibns2_mms_l2error_full.dat");
    let outcome = run_mms(5, &path).unwrap();
    assert!(matches!(outcome, NewtonOutcome::Converged { .. }));

    let body = std::fs::read_to_string(&path).unwrap();
    let errors: Vec<f64> = body
        .lines()
        .map(|line| line.split_whitespace().nth(1).unwrap().parse().unwrap())
        .collect();
    assert_eq!(errors.len(), 5);
    for w in errors.windows(2) {
        assert!(w[1] < 0.6 * w[0], "poor reduction: {} -> {}", w[0], w[1]);
    }

    std::fs::remove_file(&path).ok();
}

#[test]
fn convergence_study_writes_the_error_file() {
    let path = std::env::temp_dir().join("ibns2_mms_l2error_test.dat");
    let outcome = run_mms(2, &path).unwrap();
    assert!(matches!(outcome, NewtonOutcome::Converged { .. }));

    let body = std::fs::read_to_string(&path).unwrap();
    let mut rows = Vec::new();
    for line in body.lines() {
        let mut parts = line.split_whitespace();
        let refinement: u32 = parts.next().unwrap().parse().unwrap();
        let err: f64 = parts.next().unwrap().parse().unwrap();
        rows.push((refinement, err));
    }
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, 3);
    assert_eq!(rows[1].0, 4);
    assert!(rows[1].1 < rows[0].1);

    std::fs::remove_file(&path).ok();
}
