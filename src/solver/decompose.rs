use nalgebra::Point2;

use crate::solver::error::GeometryError;

/// Status of one cell vertex relative to the interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    Fluid,
    Solid,
    /// The vertex sits exactly on the zero level set. The decomposition
    /// refuses such cells as ambiguous.
    BoundaryOnEdge,
}

/// Fluid-side decomposition of a cut quadrilateral.
///
/// Point ids 0..=3 are the original cell vertices, ids 4 and 5 the two
/// interpolated boundary points. `corresp` maps triangle vertex slots
/// (3 per triangle, up to 9) back to point ids; `triangles` is the same
/// information grouped per sub-triangle.
#[derive(Clone, Debug, PartialEq)]
pub struct Decomposition {
    pub boundary_points: [Point2<f64>; 2],
    pub triangles: Vec<[usize; 3]>,
    pub corresp: Vec<usize>,
    pub status: [NodeStatus; 4],
}

impl Decomposition {
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Physical coordinates of a decomposition point id.
    pub fn point(&self, id: usize, vertices: &[Point2<f64>; 4]) -> Point2<f64> {
        if id < 4 {
            vertices[id]
        } else {
            self.boundary_points[id - 4]
        }
    }

    pub fn triangle_points(&self, tri: usize, vertices: &[Point2<f64>; 4]) -> [Point2<f64>; 3] {
        let t = self.triangles[tri];
        [
            self.point(t[0], vertices),
            self.point(t[1], vertices),
            self.point(t[2], vertices),
        ]
    }

    /// Total area of the fluid-side sub-triangles.
    pub fn fluid_area(&self, vertices: &[Point2<f64>; 4]) -> f64 {
        (0..self.num_triangles())
            .map(|t| {
                let [a, b, c] = self.triangle_points(t, vertices);
                0.5 * ((b - a).x * (c - a).y - (b - a).y * (c - a).x).abs()
            })
            .sum()
    }
}

/// Decomposes a cut quadrilateral into fluid-only sub-triangles.
///
/// The four vertices must be ordered counter-clockwise around the cell.
/// Exactly one interface segment per cell is supported: two edge crossings,
/// found by linear interpolation of the vertex distances. The fluid-side
/// vertices and the two boundary points form a convex polygon in walk order,
/// which is fan-triangulated into at most 3 triangles.
pub fn decompose(
    vertices: &[Point2<f64>; 4],
    distances: &[f64; 4],
) -> Result<Decomposition, GeometryError> {
    let mut status = [NodeStatus::Fluid; 4];
    for (v, &d) in distances.iter().enumerate() {
        status[v] = if d > 0.0 {
            NodeStatus::Fluid
        } else if d < 0.0 {
            NodeStatus::Solid
        } else {
            // A crossing that coincides with a vertex has no unique edge.
            return Err(GeometryError::VertexOnInterface { vertex: v });
        };
    }

    // Edge crossings, in cell-walk order.
    let mut crossings: Vec<(usize, Point2<f64>)> = Vec::with_capacity(2);
    for k in 0..4 {
        let k1 = (k + 1) % 4;
        if distances[k] * distances[k1] < 0.0 {
            let t = distances[k] / (distances[k] - distances[k1]);
            let p = vertices[k] + (vertices[k1] - vertices[k]) * t;
            crossings.push((k, p));
        }
    }
    if crossings.len() != 2 {
        return Err(GeometryError::CrossingCount {
            found: crossings.len(),
        });
    }

    // Walk the cell boundary once, keeping fluid vertices and inserting the
    // boundary points where their edges are crossed. The walk order keeps the
    // polygon in the cell's winding.
    let mut polygon: Vec<usize> = Vec::with_capacity(5);
    for k in 0..4 {
        if status[k] == NodeStatus::Fluid {
            polygon.push(k);
        }
        for (c, &(edge, _)) in crossings.iter().enumerate() {
            if edge == k {
                polygon.push(4 + c);
            }
        }
    }

    let boundary_points = [crossings[0].1, crossings[1].1];
    let coords = |id: usize| -> Point2<f64> {
        if id < 4 {
            vertices[id]
        } else {
            boundary_points[id - 4]
        }
    };

    // All turns must agree with the winding; a flipped turn means the input
    // quad was degenerate or non-convex.
    let n = polygon.len();
    for i in 0..n {
        let a = coords(polygon[i]);
        let b = coords(polygon[(i + 1) % n]);
        let c = coords(polygon[(i + 2) % n]);
        let cross = (b - a).x * (c - b).y - (b - a).y * (c - b).x;
        if cross < -1e-12 {
            return Err(GeometryError::NonConvexPolygon);
        }
    }

    // Fan triangulation from the first polygon point.
    let mut triangles = Vec::with_capacity(n - 2);
    for i in 1..n - 1 {
        triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
    let corresp = triangles.iter().flatten().copied().collect();

    Ok(Decomposition {
        boundary_points,
        triangles,
        corresp,
        status,
    })
}
