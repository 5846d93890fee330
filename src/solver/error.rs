use thiserror::Error;

/// Failure modes of the cut-cell decomposition. Fatal to the owning cell's
/// contribution; the assembler must propagate these, never skip the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("expected 2 interface crossings, found {found}")]
    CrossingCount { found: usize },
    #[error("vertex {vertex} lies on the interface (ambiguous cut)")]
    VertexOnInterface { vertex: usize },
    #[error("fluid-side polygon is not convex")]
    NonConvexPolygon,
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("geometry failure in cell {cell}: {source}")]
    Geometry {
        cell: usize,
        source: GeometryError,
    },
    #[error("linear solve failed after {iterations} iterations, residual {residual:.3e}")]
    LinearSolve { iterations: usize, residual: f64 },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
