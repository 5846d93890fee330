use nalgebra::DMatrix;

use crate::solver::mesh::Mesh;

/// Components per node: velocity x, velocity y, pressure.
pub const COMPS: usize = 3;

/// Node-interleaved dof numbering: dof = 3 * node + comp.
#[derive(Clone, Copy, Debug)]
pub struct DofMap {
    pub num_nodes: usize,
}

impl DofMap {
    pub fn new(mesh: &Mesh) -> Self {
        Self {
            num_nodes: mesh.num_nodes(),
        }
    }

    pub fn num_dofs(&self) -> usize {
        COMPS * self.num_nodes
    }

    pub fn dof(&self, node: usize, comp: usize) -> usize {
        debug_assert!(comp < COMPS);
        COMPS * node + comp
    }

    /// Global dofs of one quad cell, local ordering 3 * vertex + comp.
    pub fn cell_dofs(&self, cell: &[usize; 4]) -> [usize; 12] {
        let mut dofs = [0; 12];
        for (v, &node) in cell.iter().enumerate() {
            for c in 0..COMPS {
                dofs[COMPS * v + c] = self.dof(node, c);
            }
        }
        dofs
    }
}

/// Dirichlet constraints condensed during assembly. Constrained rows are
/// replaced by identity rows; constrained columns are moved to the
/// right-hand side, so the assembled system stays square and nonsingular.
#[derive(Clone, Debug)]
pub struct ConstraintSet {
    values: Vec<Option<f64>>,
}

impl ConstraintSet {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            values: vec![None; num_dofs],
        }
    }

    pub fn constrain(&mut self, dof: usize, value: f64) {
        self.values[dof] = Some(value);
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.values[dof].is_some()
    }

    pub fn value(&self, dof: usize) -> f64 {
        self.values[dof].unwrap_or(0.0)
    }

    pub fn num_constrained(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Scatters a local system into triplets and the global rhs, condensing
    /// constraints in place. Rows of constrained dofs are dropped (their
    /// identity rows are added once by `append_identity_rows`); entries in
    /// constrained columns become rhs contributions.
    pub fn distribute_local_to_global(
        &self,
        dofs: &[usize],
        local_matrix: &DMatrix<f64>,
        local_rhs: &[f64],
        triplets: &mut Vec<(usize, usize, f64)>,
        rhs: &mut [f64],
    ) {
        debug_assert_eq!(local_matrix.nrows(), dofs.len());
        debug_assert_eq!(local_rhs.len(), dofs.len());

        for (i, &gi) in dofs.iter().enumerate() {
            if self.is_constrained(gi) {
                continue;
            }
            rhs[gi] += local_rhs[i];
            for (j, &gj) in dofs.iter().enumerate() {
                let a = local_matrix[(i, j)];
                if a == 0.0 {
                    continue;
                }
                if let Some(g) = self.values[gj] {
                    rhs[gi] -= a * g;
                } else {
                    triplets.push((gi, gj, a));
                }
            }
        }
    }

    /// One identity row and rhs entry per constrained dof. Call exactly once
    /// after all cells have been scattered.
    pub fn append_identity_rows(&self, triplets: &mut Vec<(usize, usize, f64)>, rhs: &mut [f64]) {
        for (dof, v) in self.values.iter().enumerate() {
            if let Some(g) = v {
                triplets.push((dof, dof, 1.0));
                rhs[dof] = *g;
            }
        }
    }

    /// Overwrites constrained entries of a solution vector with their
    /// prescribed values.
    pub fn distribute(&self, x: &mut [f64]) {
        for (dof, v) in self.values.iter().enumerate() {
            if let Some(g) = v {
                x[dof] = *g;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::mesh::Mesh;

    #[test]
    fn dof_numbering_is_node_interleaved() {
        let mesh = Mesh::hyper_cube(0.0, 1.0, 1);
        let map = DofMap::new(&mesh);
        assert_eq!(map.num_dofs(), 27);
        assert_eq!(map.dof(0, 0), 0);
        assert_eq!(map.dof(0, 2), 2);
        assert_eq!(map.dof(4, 1), 13);

        let dofs = map.cell_dofs(&mesh.cells[0]);
        // Cell 0 of the 2x2 mesh touches nodes 0, 1, 4, 3.
        assert_eq!(&dofs[0..3], &[0, 1, 2]);
        assert_eq!(&dofs[3..6], &[3, 4, 5]);
        assert_eq!(&dofs[6..9], &[12, 13, 14]);
        assert_eq!(&dofs[9..12], &[9, 10, 11]);
    }

    #[test]
    fn condensation_moves_columns_to_rhs() {
        // 2-dof system: [[2, 1], [1, 3]] x = [1, 1], with x1 = 5 prescribed.
        let mut constraints = ConstraintSet::new(2);
        constraints.constrain(1, 5.0);

        let local = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let local_rhs = [1.0, 1.0];
        let mut triplets = Vec::new();
        let mut rhs = vec![0.0; 2];
        constraints.distribute_local_to_global(
            &[0, 1],
            &local,
            &local_rhs,
            &mut triplets,
            &mut rhs,
        );
        constraints.append_identity_rows(&mut triplets, &mut rhs);

        // Row 0: 2*x0 = 1 - 1*5; row 1: identity.
        assert_eq!(triplets, vec![(0, 0, 2.0), (1, 1, 1.0)]);
        assert_eq!(rhs, vec![-4.0, 5.0]);
    }

    #[test]
    fn distribute_overwrites_constrained_entries() {
        let mut constraints = ConstraintSet::new(3);
        constraints.constrain(2, -1.5);
        let mut x = vec![9.0, 9.0, 9.0];
        constraints.distribute(&mut x);
        assert_eq!(x, vec![9.0, 9.0, -1.5]);
    }
}
