use log::{debug, info};

use crate::solver::assembly::StabilizedAssembler;
use crate::solver::dofs::{ConstraintSet, DofMap};
use crate::solver::error::SolverError;
use crate::solver::linear_solver::{norm, solve_bicgstab};
use crate::solver::mesh::Mesh;

/// Result of a Newton run. Non-convergence is reported, not fatal: the
/// caller may refine and retry from the transferred solution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NewtonOutcome {
    Converged { iterations: usize, residual: f64 },
    NonConverged { residual: f64 },
}

/// Solution vector plus the residual norm it was last evaluated at.
#[derive(Clone, Debug)]
pub struct NonlinearState {
    pub solution: Vec<f64>,
    pub residual: f64,
}

/// Damped Newton iteration for the stabilized steady system.
///
/// The first step solves with the nonzero constraint set, which pulls the
/// boundary values into the field (starting from zero this is exactly the
/// full solve becoming the solution); subsequent steps solve the update
/// equation with zero constraints and backtrack alpha = 1, 1/2, 1/4, ...
/// (floor 1e-3), accepting the first step length that decreases the
/// residual, else the smallest tried.
pub struct SteadyNsSolver {
    pub mesh: Mesh,
    pub dof_map: DofMap,
    pub assembler: StabilizedAssembler,
    pub nonzero_constraints: ConstraintSet,
    pub zero_constraints: ConstraintSet,
    pub state: NonlinearState,
    linear_max_iter: usize,
    linear_rel_tol: f64,
}

impl SteadyNsSolver {
    pub fn new(
        mesh: Mesh,
        assembler: StabilizedAssembler,
        nonzero_constraints: ConstraintSet,
        zero_constraints: ConstraintSet,
    ) -> Self {
        let dof_map = DofMap::new(&mesh);
        let n = dof_map.num_dofs();
        Self {
            mesh,
            dof_map,
            assembler,
            nonzero_constraints,
            zero_constraints,
            state: NonlinearState {
                solution: vec![0.0; n],
                residual: f64::INFINITY,
            },
            linear_max_iter: 2000.max(2 * n),
            linear_rel_tol: 1e-9,
        }
    }

    /// Seeds the iteration from an existing solution (e.g. transferred from
    /// a coarser mesh) instead of zero.
    pub fn set_initial_solution(&mut self, solution: Vec<f64>) {
        assert_eq!(solution.len(), self.dof_map.num_dofs());
        self.state.solution = solution;
    }

    pub fn solve(
        &mut self,
        tolerance: f64,
        max_iterations: usize,
    ) -> Result<NewtonOutcome, SolverError> {
        let mut first = true;
        for iter in 0..max_iterations {
            self.newton_step(first)?;
            first = false;
            info!(
                "newton iteration {}: residual {:.6e}",
                iter + 1,
                self.state.residual
            );
            if self.state.residual < tolerance {
                return Ok(NewtonOutcome::Converged {
                    iterations: iter + 1,
                    residual: self.state.residual,
                });
            }
        }
        Ok(NewtonOutcome::NonConverged {
            residual: self.state.residual,
        })
    }

    fn newton_step(&mut self, first: bool) -> Result<(), SolverError> {
        let n = self.dof_map.num_dofs();

        if first {
            // Constrain the first update to carry the boundary data the
            // current field is still missing. From a zero start this is the
            // plain nonzero constraint set.
            let mut lift = ConstraintSet::new(n);
            for dof in 0..n {
                if self.nonzero_constraints.is_constrained(dof) {
                    lift.constrain(
                        dof,
                        self.nonzero_constraints.value(dof) - self.state.solution[dof],
                    );
                }
            }

            let (matrix, rhs) = self.assembler.assemble_system(
                &self.mesh,
                &self.dof_map,
                &self.state.solution,
                &lift,
            )?;
            let mut update = vec![0.0; n];
            let stats = solve_bicgstab(
                &matrix,
                &rhs,
                &mut update,
                self.linear_max_iter,
                self.linear_rel_tol,
            )?;
            debug!(
                "linear solve: {} iterations, residual {:.3e}",
                stats.iterations, stats.residual
            );
            lift.distribute(&mut update);
            for i in 0..n {
                self.state.solution[i] += update[i];
            }

            let residual = self.assembler.assemble_residual(
                &self.mesh,
                &self.dof_map,
                &self.state.solution,
                &self.zero_constraints,
            )?;
            self.state.residual = norm(&residual);
            return Ok(());
        }

        let (matrix, rhs) = self.assembler.assemble_system(
            &self.mesh,
            &self.dof_map,
            &self.state.solution,
            &self.zero_constraints,
        )?;
        let mut update = vec![0.0; n];
        let stats = solve_bicgstab(
            &matrix,
            &rhs,
            &mut update,
            self.linear_max_iter,
            self.linear_rel_tol,
        )?;
        debug!(
            "linear solve: {} iterations, residual {:.3e}",
            stats.iterations, stats.residual
        );
        self.zero_constraints.distribute(&mut update);

        let mut trial = self.state.solution.clone();
        let mut trial_residual = f64::INFINITY;
        let mut alpha = 1.0;
        while alpha > 1e-3 {
            for i in 0..n {
                trial[i] = self.state.solution[i] + alpha * update[i];
            }
            let rhs = self.assembler.assemble_residual(
                &self.mesh,
                &self.dof_map,
                &trial,
                &self.zero_constraints,
            )?;
            trial_residual = norm(&rhs);
            debug!("  alpha = {alpha:.6}, residual = {trial_residual:.6e}");
            if trial_residual < self.state.residual {
                break;
            }
            alpha *= 0.5;
        }

        // Either the first decreasing step, or the smallest step tried.
        self.state.solution = trial;
        self.state.residual = trial_residual;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::assembly::Forcing;
    use crate::solver::dofs::COMPS;
    use crate::solver::levelset::BoundaryCombiner;
    use nalgebra::Vector2;

    fn no_forcing() -> Forcing {
        Box::new(|_| Vector2::zeros())
    }

    fn couette_solver(refinement: u32) -> SteadyNsSolver {
        let mesh = Mesh::hyper_cube(0.0, 1.0, refinement);
        let dof_map = DofMap::new(&mesh);
        let n = dof_map.num_dofs();

        let mut nonzero = ConstraintSet::new(n);
        let mut zero = ConstraintSet::new(n);
        for node in 0..mesh.num_nodes() {
            if mesh.is_boundary_node(node) {
                let pt = mesh.nodes[node];
                nonzero.constrain(dof_map.dof(node, 0), pt.y);
                nonzero.constrain(dof_map.dof(node, 1), 0.0);
                for c in 0..2 {
                    zero.constrain(dof_map.dof(node, c), 0.0);
                }
            }
        }
        // Fix the pressure gauge at the first node.
        nonzero.constrain(dof_map.dof(0, 2), 0.0);
        zero.constrain(dof_map.dof(0, 2), 0.0);

        let assembler =
            StabilizedAssembler::new(1.0, no_forcing(), BoundaryCombiner::default());
        SteadyNsSolver::new(mesh, assembler, nonzero, zero)
    }

    #[test]
    fn converges_on_small_couette_flow() {
        let mut solver = couette_solver(2);
        let outcome = solver.solve(1e-6, 5).unwrap();
        match outcome {
            NewtonOutcome::Converged { residual, .. } => assert!(residual < 1e-6),
            NewtonOutcome::NonConverged { residual } => {
                panic!("did not converge, residual {residual:.3e}")
            }
        }

        // The exact shear profile u = (y, 0) is in the Q1 space.
        for (node, pt) in solver.mesh.nodes.iter().enumerate() {
            let u = solver.state.solution[solver.dof_map.dof(node, 0)];
            let v = solver.state.solution[solver.dof_map.dof(node, 1)];
            assert!((u - pt.y).abs() < 1e-5, "u at {pt:?}: {u}");
            assert!(v.abs() < 1e-5, "v at {pt:?}: {v}");
        }
    }

    #[test]
    fn residual_history_is_monotone_after_first_step() {
        let mut solver = couette_solver(2);
        solver.newton_step(true).unwrap();
        let mut prev = solver.state.residual;
        for _ in 0..3 {
            if prev < 1e-12 {
                break;
            }
            solver.newton_step(false).unwrap();
            assert!(
                solver.state.residual <= prev + 1e-12,
                "residual grew: {} -> {}",
                prev,
                solver.state.residual
            );
            prev = solver.state.residual;
        }
    }

    #[test]
    fn seeding_with_exact_solution_converges_immediately() {
        let mut solver = couette_solver(2);
        let mut exact = vec![0.0; solver.dof_map.num_dofs()];
        for (node, pt) in solver.mesh.nodes.iter().enumerate() {
            exact[COMPS * node] = pt.y;
        }
        solver.set_initial_solution(exact);
        let outcome = solver.solve(1e-6, 5).unwrap();
        assert!(matches!(outcome, NewtonOutcome::Converged { iterations, .. } if iterations <= 2));
    }
}
