use nalgebra::{Point2, Vector2};

/// Q1 shape-function data on an axis-aligned rectangular cell, evaluated at
/// the 2x2 Gauss points. Vertices must be ordered counter-clockwise starting
/// at the lower-left corner, matching the mesh convention.
///
/// Bilinear shapes on axis-aligned rectangles have identically zero physical
/// Laplacian, so no second-derivative table is carried.
pub struct QuadFe {
    pub q_points: [Point2<f64>; 4],
    pub jxw: [f64; 4],
    /// `shape[q][node]`
    pub shape: [[f64; 4]; 4],
    /// `grad[q][node]`
    pub grad: [[Vector2<f64>; 4]; 4],
}

// Reference corner coordinates on [-1, 1]^2, counter-clockwise.
const XI: [f64; 4] = [-1.0, 1.0, 1.0, -1.0];
const ETA: [f64; 4] = [-1.0, -1.0, 1.0, 1.0];

impl QuadFe {
    pub fn new(vertices: &[Point2<f64>; 4]) -> Self {
        let hx = vertices[1].x - vertices[0].x;
        let hy = vertices[3].y - vertices[0].y;
        debug_assert!(hx > 0.0 && hy > 0.0, "vertices must be CCW from lower-left");

        let g = 1.0 / 3.0_f64.sqrt();
        let gauss = [(-g, -g), (g, -g), (g, g), (-g, g)];

        let mut q_points = [Point2::origin(); 4];
        let mut jxw = [0.0; 4];
        let mut shape = [[0.0; 4]; 4];
        let mut grad = [[Vector2::zeros(); 4]; 4];

        for (q, &(xi, eta)) in gauss.iter().enumerate() {
            q_points[q] = Point2::new(
                vertices[0].x + 0.5 * (xi + 1.0) * hx,
                vertices[0].y + 0.5 * (eta + 1.0) * hy,
            );
            jxw[q] = 0.25 * hx * hy;
            for i in 0..4 {
                shape[q][i] = 0.25 * (1.0 + xi * XI[i]) * (1.0 + eta * ETA[i]);
                grad[q][i] = Vector2::new(
                    0.25 * XI[i] * (1.0 + eta * ETA[i]) * 2.0 / hx,
                    0.25 * ETA[i] * (1.0 + xi * XI[i]) * 2.0 / hy,
                );
            }
        }

        Self {
            q_points,
            jxw,
            shape,
            grad,
        }
    }
}

/// P1 shape-function data on a triangle, evaluated with the 3-point
/// edge-midpoint rule (exact for quadratics). Gradients are constant.
pub struct TriFe {
    pub q_points: [Point2<f64>; 3],
    pub jxw: [f64; 3],
    /// `shape[q][node]`
    pub shape: [[f64; 3]; 3],
    pub grad: [Vector2<f64>; 3],
    pub area: f64,
}

impl TriFe {
    pub fn new(vertices: &[Point2<f64>; 3]) -> Self {
        let [a, b, c] = *vertices;
        let two_a = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
        let area = 0.5 * two_a.abs();

        let grad = [
            Vector2::new(b.y - c.y, c.x - b.x) / two_a,
            Vector2::new(c.y - a.y, a.x - c.x) / two_a,
            Vector2::new(a.y - b.y, b.x - a.x) / two_a,
        ];

        let mid = |p: Point2<f64>, q: Point2<f64>| Point2::from((p.coords + q.coords) * 0.5);
        let q_points = [mid(a, b), mid(b, c), mid(c, a)];
        // Barycentric values at the opposite edge midpoints.
        let shape = [
            [0.5, 0.5, 0.0],
            [0.0, 0.5, 0.5],
            [0.5, 0.0, 0.5],
        ];
        let jxw = [area / 3.0; 3];

        Self {
            q_points,
            jxw,
            shape,
            grad,
            area,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_partition_of_unity_and_gradient_sum() {
        let verts = [
            Point2::new(0.2, 0.1),
            Point2::new(0.7, 0.1),
            Point2::new(0.7, 0.4),
            Point2::new(0.2, 0.4),
        ];
        let fe = QuadFe::new(&verts);
        let area: f64 = fe.jxw.iter().sum();
        assert!((area - 0.15).abs() < 1e-14);

        for q in 0..4 {
            let s: f64 = fe.shape[q].iter().sum();
            assert!((s - 1.0).abs() < 1e-14);
            let g: Vector2<f64> = fe.grad[q].iter().sum();
            assert!(g.norm() < 1e-13);
        }
    }

    #[test]
    fn quad_interpolates_linear_fields_exactly() {
        let verts = [
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let fe = QuadFe::new(&verts);
        // f = 3x - 2y + 1
        let nodal: Vec<f64> = verts.iter().map(|p| 3.0 * p.x - 2.0 * p.y + 1.0).collect();
        for q in 0..4 {
            let mut val = 0.0;
            let mut grad = Vector2::zeros();
            for i in 0..4 {
                val += nodal[i] * fe.shape[q][i];
                grad += nodal[i] * fe.grad[q][i];
            }
            let p = fe.q_points[q];
            assert!((val - (3.0 * p.x - 2.0 * p.y + 1.0)).abs() < 1e-13);
            assert!((grad - Vector2::new(3.0, -2.0)).norm() < 1e-13);
        }
    }

    #[test]
    fn triangle_quadrature_integrates_quadratics() {
        let verts = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
        ];
        let fe = TriFe::new(&verts);
        assert!((fe.area - 0.5).abs() < 1e-14);

        // Integral of x^2 over the reference triangle is 1/12.
        let integral: f64 = (0..3).map(|q| fe.q_points[q].x.powi(2) * fe.jxw[q]).sum();
        assert!((integral - 1.0 / 12.0).abs() < 1e-14);

        // Constant P1 gradients reproduce linear fields.
        let nodal: Vec<f64> = verts.iter().map(|p| 2.0 * p.x + 5.0 * p.y).collect();
        let grad: Vector2<f64> = (0..3).map(|i| nodal[i] * fe.grad[i]).sum();
        assert!((grad - Vector2::new(2.0, 5.0)).norm() < 1e-13);
    }
}
