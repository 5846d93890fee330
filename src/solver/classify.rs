/// How a quadrilateral cell sits relative to the immersed boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellClass {
    /// All four vertex distances strictly positive.
    Fluid,
    /// All four vertex distances non-positive.
    Solid,
    /// Mixed signs: the boundary crosses the cell.
    Cut,
}

/// Classifies a cell from its four vertex signed distances. Pure and total.
///
/// Zero distances count as non-positive here, so a cell touching the
/// interface only at vertices lands in `Solid`/`Cut` and never produces a
/// spurious fluid quadrature region.
pub fn classify(distances: &[f64; 4]) -> CellClass {
    if distances.iter().all(|&d| d > 0.0) {
        CellClass::Fluid
    } else if distances.iter().all(|&d| d <= 0.0) {
        CellClass::Solid
    } else {
        CellClass::Cut
    }
}
