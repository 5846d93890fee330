use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use nalgebra::{Point2, Vector2};

use crate::solver::assembly::{Forcing, StabilizedAssembler};
use crate::solver::dofs::{ConstraintSet, DofMap};
use crate::solver::error::SolverError;
use crate::solver::fem::QuadFe;
use crate::solver::levelset::{BoundaryCombiner, LevelSetShape};
use crate::solver::mesh::Mesh;
use crate::solver::newton::{NewtonOutcome, SteadyNsSolver};

const VISCOSITY: f64 = 1.0;

/// Verification cases shipped with the binary.
#[derive(Clone, Copy, Debug)]
pub enum SimulationCase {
    /// Plane shear flow on the unit square: linear exact velocity, zero
    /// forcing, one solve on a fixed mesh.
    CouetteX,
    /// Manufactured solution on [-1, 1]^2 with a uniform-refinement
    /// convergence study; L2 velocity errors go to `L2Error.dat`.
    Mms { cycles: usize },
}

impl SimulationCase {
    pub fn run(self) -> Result<NewtonOutcome, SolverError> {
        match self {
            SimulationCase::CouetteX => run_couette(),
            SimulationCase::Mms { cycles } => run_mms(cycles, Path::new("L2Error.dat")),
        }
    }
}

pub fn couette_velocity(p: &Point2<f64>) -> Vector2<f64> {
    Vector2::new(p.y, 0.0)
}

pub fn mms_velocity(p: &Point2<f64>) -> Vector2<f64> {
    let (x, y) = (p.x, p.y);
    Vector2::new(
        (PI * x).sin().powi(2) * (2.0 * PI * y).sin(),
        -(2.0 * PI * x).sin() * (PI * y).sin().powi(2),
    )
}

pub fn mms_pressure(p: &Point2<f64>) -> f64 {
    (PI * p.x).sin() * (PI * p.y).sin()
}

/// Momentum forcing that makes `mms_velocity` / `mms_pressure` an exact
/// steady solution: (u . grad) u + grad p - nu lap(u).
pub fn mms_forcing(p: &Point2<f64>, nu: f64) -> Vector2<f64> {
    let (x, y) = (p.x, p.y);
    let sx = (PI * x).sin();
    let sy = (PI * y).sin();
    let s2x = (2.0 * PI * x).sin();
    let s2y = (2.0 * PI * y).sin();
    let c2x = (2.0 * PI * x).cos();
    let c2y = (2.0 * PI * y).cos();

    let conv_x = PI * sx * sx * s2x * (s2y * s2y - 2.0 * sy * sy * c2y);
    let conv_y = PI * sy * sy * s2y * (s2x * s2x - 2.0 * sx * sx * c2x);

    let grad_p_x = PI * (PI * x).cos() * sy;
    let grad_p_y = PI * sx * (PI * y).cos();

    let visc_x = -nu * 2.0 * PI * PI * s2y * (2.0 * c2x - 1.0);
    let visc_y = -nu * 2.0 * PI * PI * s2x * (1.0 - 2.0 * c2y);

    Vector2::new(conv_x + grad_p_x + visc_x, conv_y + grad_p_y + visc_y)
}

/// Constraint sets for a fully Dirichlet velocity boundary: the nonzero set
/// carries the exact boundary velocity, the zero set the homogeneous form
/// used for Newton updates. One pressure dof is pinned in both sets to fix
/// the constant-pressure null space (both cases have zero exact pressure at
/// the pinned corner).
fn dirichlet_constraints(
    mesh: &Mesh,
    dof_map: &DofMap,
    exact_velocity: fn(&Point2<f64>) -> Vector2<f64>,
) -> (ConstraintSet, ConstraintSet) {
    let n = dof_map.num_dofs();
    let mut nonzero = ConstraintSet::new(n);
    let mut zero = ConstraintSet::new(n);
    for node in 0..mesh.num_nodes() {
        if mesh.is_boundary_node(node) {
            let g = exact_velocity(&mesh.nodes[node]);
            for c in 0..2 {
                nonzero.constrain(dof_map.dof(node, c), g[c]);
                zero.constrain(dof_map.dof(node, c), 0.0);
            }
        }
    }
    nonzero.constrain(dof_map.dof(0, 2), 0.0);
    zero.constrain(dof_map.dof(0, 2), 0.0);
    (nonzero, zero)
}

pub fn couette_solver(refinement: u32) -> SteadyNsSolver {
    let mesh = Mesh::hyper_cube(0.0, 1.0, refinement);
    let dof_map = DofMap::new(&mesh);
    let (nonzero, zero) = dirichlet_constraints(&mesh, &dof_map, couette_velocity);
    let forcing: Forcing = Box::new(|_| Vector2::zeros());
    let assembler = StabilizedAssembler::new(VISCOSITY, forcing, BoundaryCombiner::default());
    SteadyNsSolver::new(mesh, assembler, nonzero, zero)
}

pub fn mms_solver(refinement: u32) -> SteadyNsSolver {
    let mesh = Mesh::hyper_cube(-1.0, 1.0, refinement);
    let dof_map = DofMap::new(&mesh);
    let (nonzero, zero) = dirichlet_constraints(&mesh, &dof_map, mms_velocity);
    let forcing: Forcing = Box::new(|p| mms_forcing(p, VISCOSITY));
    let assembler = StabilizedAssembler::new(VISCOSITY, forcing, BoundaryCombiner::default());
    SteadyNsSolver::new(mesh, assembler, nonzero, zero)
}

/// Annulus boundary complex: two concentric circles with opposite
/// inside conventions and distinct payloads, fluid in the ring between them.
pub fn annulus_combiner() -> BoundaryCombiner {
    let center = Point2::new(0.5, 0.5);
    let inner = LevelSetShape::circle(center, 0.15, Vector2::zeros(), 0.0, 1.0, false);
    let outer = LevelSetShape::circle(center, 0.37, Vector2::zeros(), 0.0, 2.0, true);
    BoundaryCombiner::new(vec![inner, outer])
}

/// L2 norm of the velocity error against an exact field, integrated with
/// the cell quadrature.
pub fn l2_velocity_error(
    mesh: &Mesh,
    dof_map: &DofMap,
    solution: &[f64],
    exact: fn(&Point2<f64>) -> Vector2<f64>,
) -> f64 {
    let mut total = 0.0;
    for cell in 0..mesh.num_cells() {
        let vertices = mesh.cell_vertices(cell);
        let fe = QuadFe::new(&vertices);
        let dofs = dof_map.cell_dofs(&mesh.cells[cell]);
        for q in 0..4 {
            let mut u_h = Vector2::zeros();
            for a in 0..4 {
                u_h += fe.shape[q][a]
                    * Vector2::new(solution[dofs[3 * a]], solution[dofs[3 * a + 1]]);
            }
            let diff = u_h - exact(&fe.q_points[q]);
            total += diff.norm_squared() * fe.jxw[q];
        }
    }
    total.sqrt()
}

pub fn run_couette() -> Result<NewtonOutcome, SolverError> {
    let mut solver = couette_solver(3);
    let outcome = solver.solve(1e-6, 5)?;
    let err = l2_velocity_error(
        &solver.mesh,
        &solver.dof_map,
        &solver.state.solution,
        couette_velocity,
    );
    info!("couette: {outcome:?}, L2 velocity error {err:.6e}");
    Ok(outcome)
}

/// Uniform-refinement convergence study. Each cycle solves, records the L2
/// velocity error, then transfers the solution to the refined mesh as the
/// next initial guess. Errors are written to `output` as one
/// "refinement error" pair per line.
pub fn run_mms(cycles: usize, output: &Path) -> Result<NewtonOutcome, SolverError> {
    let mut refinement = 3u32;
    let mut solver = mms_solver(refinement);
    let mut errors = Vec::with_capacity(cycles);
    let mut outcome = NewtonOutcome::NonConverged { residual: f64::INFINITY };

    for cycle in 0..cycles {
        outcome = solver.solve(1e-8, 10)?;
        let err = l2_velocity_error(
            &solver.mesh,
            &solver.dof_map,
            &solver.state.solution,
            mms_velocity,
        );
        info!("mms cycle {cycle} (refinement {refinement}): {outcome:?}, L2 error {err:.6e}");
        errors.push((refinement, err));

        if cycle + 1 < cycles {
            let fine = solver.mesh.refine_global();
            let transferred =
                solver
                    .mesh
                    .interpolate_to_refined(&fine, &solver.state.solution, 3);
            refinement += 1;
            solver = mms_solver(refinement);
            solver.set_initial_solution(transferred);
        }
    }

    write_l2_errors(output, &errors).map_err(|e| {
        SolverError::InvalidConfiguration(format!("cannot write {}: {e}", output.display()))
    })?;
    Ok(outcome)
}

pub fn write_l2_errors(path: &Path, errors: &[(u32, f64)]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for (refinement, err) in errors {
        writeln!(out, "{refinement} {err:.12e}")?;
    }
    Ok(())
}
