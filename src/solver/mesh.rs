use nalgebra::Point2;

use crate::solver::levelset::BoundaryCombiner;

/// Per-cell geometric data consumed by the assembler: the four CCW vertices,
/// their signed distances to the immersed boundary, and the size measure
/// h = sqrt(4 * area / pi) used by the stabilization.
#[derive(Clone, Copy, Debug)]
pub struct CellGeometry {
    pub vertices: [Point2<f64>; 4],
    pub distances: [f64; 4],
    pub h: f64,
}

/// Uniform quadrilateral mesh of the square [a, b]^2 with 2^refinement cells
/// per side. Nodes are stored row-major, bottom row first; cell vertices are
/// counter-clockwise starting at the lower-left corner.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub a: f64,
    pub b: f64,
    /// Cells per side.
    pub n: usize,
    pub nodes: Vec<Point2<f64>>,
    pub cells: Vec<[usize; 4]>,
}

impl Mesh {
    pub fn hyper_cube(a: f64, b: f64, refinement: u32) -> Self {
        let n = 1usize << refinement;
        let dx = (b - a) / n as f64;

        let mut nodes = Vec::with_capacity((n + 1) * (n + 1));
        for j in 0..=n {
            for i in 0..=n {
                nodes.push(Point2::new(a + i as f64 * dx, a + j as f64 * dx));
            }
        }

        let mut cells = Vec::with_capacity(n * n);
        for j in 0..n {
            for i in 0..n {
                let v00 = j * (n + 1) + i;
                let v10 = v00 + 1;
                let v01 = v00 + (n + 1);
                let v11 = v01 + 1;
                cells.push([v00, v10, v11, v01]);
            }
        }

        Self { a, b, n, nodes, cells }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_vertices(&self, cell: usize) -> [Point2<f64>; 4] {
        let c = self.cells[cell];
        [
            self.nodes[c[0]],
            self.nodes[c[1]],
            self.nodes[c[2]],
            self.nodes[c[3]],
        ]
    }

    /// True for nodes on the outer boundary of the square.
    pub fn is_boundary_node(&self, node: usize) -> bool {
        let i = node % (self.n + 1);
        let j = node / (self.n + 1);
        i == 0 || i == self.n || j == 0 || j == self.n
    }

    pub fn cell_geometry(&self, cell: usize, combiner: &BoundaryCombiner) -> CellGeometry {
        let vertices = self.cell_vertices(cell);
        let distances = [
            combiner.value(&vertices[0]),
            combiner.value(&vertices[1]),
            combiner.value(&vertices[2]),
            combiner.value(&vertices[3]),
        ];
        let hx = vertices[1].x - vertices[0].x;
        let hy = vertices[3].y - vertices[0].y;
        let h = (4.0 * hx * hy / std::f64::consts::PI).sqrt();
        CellGeometry { vertices, distances, h }
    }

    /// The same square with every cell split in four.
    pub fn refine_global(&self) -> Self {
        let refinement = self.n.trailing_zeros() + 1;
        Self::hyper_cube(self.a, self.b, refinement)
    }

    /// Transfers a nodal vector with `comps` interleaved components per node
    /// onto `fine` (one global refinement of `self`) by bilinear
    /// interpolation. Exact for Q1 fields, so the transferred solution is the
    /// same finite-element function on the finer mesh.
    pub fn interpolate_to_refined(&self, fine: &Mesh, values: &[f64], comps: usize) -> Vec<f64> {
        assert_eq!(fine.n, 2 * self.n);
        assert_eq!(values.len(), comps * self.num_nodes());

        let n = self.n;
        let mut out = vec![0.0; comps * fine.num_nodes()];
        for j in 0..=fine.n {
            for i in 0..=fine.n {
                let node = j * (fine.n + 1) + i;
                // Coarse cell containing the fine node, with local weights
                // of 0, 1/2 or 1 along each axis.
                let i0 = (i / 2).min(n - 1);
                let j0 = (j / 2).min(n - 1);
                let fx = 0.5 * (i as f64 - 2.0 * i0 as f64);
                let fy = 0.5 * (j as f64 - 2.0 * j0 as f64);
                let corner = |di: usize, dj: usize| (j0 + dj) * (n + 1) + i0 + di;
                let w = [
                    (corner(0, 0), (1.0 - fx) * (1.0 - fy)),
                    (corner(1, 0), fx * (1.0 - fy)),
                    (corner(1, 1), fx * fy),
                    (corner(0, 1), (1.0 - fx) * fy),
                ];
                for c in 0..comps {
                    out[comps * node + c] = w
                        .iter()
                        .map(|&(coarse, weight)| weight * values[comps * coarse + c])
                        .sum();
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyper_cube_counts_and_ordering() {
        let mesh = Mesh::hyper_cube(0.0, 1.0, 2);
        assert_eq!(mesh.n, 4);
        assert_eq!(mesh.num_nodes(), 25);
        assert_eq!(mesh.num_cells(), 16);

        // First cell is the lower-left one, CCW from the origin.
        let v = mesh.cell_vertices(0);
        assert!((v[0] - Point2::new(0.0, 0.0)).norm() < 1e-15);
        assert!((v[1] - Point2::new(0.25, 0.0)).norm() < 1e-15);
        assert!((v[2] - Point2::new(0.25, 0.25)).norm() < 1e-15);
        assert!((v[3] - Point2::new(0.0, 0.25)).norm() < 1e-15);
    }

    #[test]
    fn boundary_node_detection() {
        let mesh = Mesh::hyper_cube(-1.0, 1.0, 1);
        let boundary: Vec<usize> = (0..mesh.num_nodes())
            .filter(|&i| mesh.is_boundary_node(i))
            .collect();
        // 3x3 grid: all but the center node.
        assert_eq!(boundary, vec![0, 1, 2, 3, 5, 6, 7, 8]);
    }

    #[test]
    fn cell_size_measure() {
        let mesh = Mesh::hyper_cube(0.0, 1.0, 3);
        let geo = mesh.cell_geometry(0, &BoundaryCombiner::default());
        let area = 0.125 * 0.125;
        assert!((geo.h - (4.0 * area / std::f64::consts::PI).sqrt()).abs() < 1e-15);
        // Empty boundary complex: every distance reads fluid.
        assert!(geo.distances.iter().all(|&d| d == f64::INFINITY));
    }

    #[test]
    fn transfer_is_exact_for_bilinear_fields() {
        let coarse = Mesh::hyper_cube(-1.0, 1.0, 2);
        let fine = coarse.refine_global();
        assert_eq!(fine.n, 8);

        // x*y is bilinear, hence in the Q1 space on every rectangle.
        let values: Vec<f64> = coarse.nodes.iter().map(|p| p.x * p.y).collect();
        let transferred = coarse.interpolate_to_refined(&fine, &values, 1);
        for (node, p) in fine.nodes.iter().enumerate() {
            assert!(
                (transferred[node] - p.x * p.y).abs() < 1e-14,
                "mismatch at {p:?}"
            );
        }
    }

    #[test]
    fn transfer_interleaves_components() {
        let coarse = Mesh::hyper_cube(0.0, 1.0, 1);
        let fine = coarse.refine_global();
        let mut values = vec![0.0; 3 * coarse.num_nodes()];
        for (node, p) in coarse.nodes.iter().enumerate() {
            values[3 * node] = p.x;
            values[3 * node + 1] = p.y;
            values[3 * node + 2] = 1.0 - p.x;
        }
        let out = coarse.interpolate_to_refined(&fine, &values, 3);
        for (node, p) in fine.nodes.iter().enumerate() {
            assert!((out[3 * node] - p.x).abs() < 1e-14);
            assert!((out[3 * node + 1] - p.y).abs() < 1e-14);
            assert!((out[3 * node + 2] - (1.0 - p.x)).abs() < 1e-14);
        }
    }
}
