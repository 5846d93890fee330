pub mod assembly;
pub mod cases;
pub mod classify;
pub mod decompose;
pub mod dofs;
pub mod error;
pub mod fem;
pub mod levelset;
pub mod linear_solver;
pub mod mesh;
pub mod newton;

pub use assembly::{tau, CellContribution, StabilizedAssembler};
pub use cases::SimulationCase;
pub use classify::{classify, CellClass};
pub use decompose::{decompose, Decomposition, NodeStatus};
pub use error::{GeometryError, SolverError};
pub use levelset::{BoundaryCombiner, LevelSetShape, ShapeKind};
pub use mesh::{CellGeometry, Mesh};
pub use newton::{NewtonOutcome, SteadyNsSolver};
