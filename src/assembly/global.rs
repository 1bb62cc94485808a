//! Row-owned parallel assembly of the global system.
//!
//! Every owned node is processed by exactly one thread, which produces the rows of all
//! components of that node using the node-centric traversals. Entries are routed by the
//! following rules, where `row` and `col` are degrees of freedom:
//!
//! - constrained `row`: the inner block holds the diagonal `1` and nothing else;
//! - free `row`, constrained `col`: the full boundary block holds the entry;
//! - free `row`, free `col`: the inner block holds the entry if `row <= col`.
//!
//! The inner block therefore stores the upper triangle of the matrix of the unknowns, while the
//! boundary block stores everything needed to eliminate the constrained values from the
//! right-hand side.
use crate::assembly::cache::QuadratureCache;
use crate::assembly::kernels::{basis_integral, source_integral, BilinearForm};
use crate::assembly::portrait::{ColumnMarker, CsrBuilder};
use crate::assembly::traversal::{for_each_local_pair_of_node, for_each_nonlocal_pair_of_node};
use crate::element::ReferenceElement;
use crate::error::FemError;
use crate::mesh::Mesh;
use eyre::eyre;
use log::info;
use nalgebra::{DVector, Point};
use nalgebra_sparse::CsrMatrix;
use nonlocal_fem_sparse::{LinearOperator, SolveErrorKind, SymmetricCsrOperator};
use rayon::prelude::*;
use std::cell::RefCell;
use std::ops::Range;
use std::time::Instant;
use thread_local::ThreadLocal;

/// Numbering of the degrees of freedom and their classification.
///
/// Degree of freedom `solution_dim * node + component` belongs to the given component of the
/// node. When augmented, one Lagrange multiplier per component is appended after the last
/// node's degrees of freedom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofLayout {
    solution_dim: usize,
    node_count: usize,
    owned_nodes: Range<usize>,
    constrained: Vec<bool>,
    augmented: bool,
}

impl DofLayout {
    pub fn new(solution_dim: usize, node_count: usize, owned_nodes: Range<usize>) -> Self {
        assert!(solution_dim > 0);
        assert!(owned_nodes.start <= owned_nodes.end && owned_nodes.end <= node_count);
        Self {
            solution_dim,
            node_count,
            owned_nodes,
            constrained: vec![false; solution_dim * node_count],
            augmented: false,
        }
    }

    /// Layout of all nodes of the mesh, restricted to the mesh's owned node range.
    pub fn for_mesh<const D: usize, E: ReferenceElement<D>>(mesh: &Mesh<D, E>, solution_dim: usize) -> Self {
        Self::new(solution_dim, mesh.node_count(), mesh.owned_nodes())
    }

    pub fn solution_dim(&self) -> usize {
        self.solution_dim
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn owned_nodes(&self) -> Range<usize> {
        self.owned_nodes.clone()
    }

    /// Number of nodal degrees of freedom.
    pub fn dof_count(&self) -> usize {
        self.solution_dim * self.node_count
    }

    /// Number of unknowns including Lagrange multipliers.
    pub fn system_size(&self) -> usize {
        self.dof_count() + if self.augmented { self.solution_dim } else { 0 }
    }

    pub fn dof(&self, node: usize, component: usize) -> usize {
        debug_assert!(component < self.solution_dim);
        self.solution_dim * node + component
    }

    pub fn set_constrained(&mut self, dof: usize) {
        self.constrained[dof] = true;
    }

    /// Whether the nodal degree of freedom has a prescribed value. Multipliers are never
    /// constrained.
    pub fn is_constrained(&self, dof: usize) -> bool {
        self.constrained.get(dof).copied().unwrap_or(false)
    }

    pub fn constrained_count(&self) -> usize {
        self.constrained.iter().filter(|&&c| c).count()
    }

    pub fn set_augmented(&mut self, augmented: bool) {
        self.augmented = augmented;
    }

    pub fn is_augmented(&self) -> bool {
        self.augmented
    }

    /// Index of the Lagrange multiplier of the given component.
    pub fn augmented_dof(&self, component: usize) -> usize {
        self.dof_count() + component
    }

    /// The multiplier rows belong to whoever owns the last node.
    pub fn owns_augmented_rows(&self) -> bool {
        self.augmented && self.owned_nodes.end == self.node_count
    }

    /// Degree of freedom of the first locally stored row.
    pub fn first_row(&self) -> usize {
        self.solution_dim * self.owned_nodes.start
    }

    /// Number of locally stored rows.
    pub fn row_count(&self) -> usize {
        let multipliers = if self.owns_augmented_rows() { self.solution_dim } else { 0 };
        self.solution_dim * self.owned_nodes.len() + multipliers
    }

    /// Whether all rows are stored locally.
    pub fn is_complete(&self) -> bool {
        self.owned_nodes == (0..self.node_count)
    }

    fn target(&self, row: usize, col: usize) -> Target {
        if self.is_constrained(row) {
            Target::Skip
        } else if self.is_constrained(col) {
            Target::Bound
        } else if row <= col {
            Target::Inner
        } else {
            Target::Skip
        }
    }

    /// Whether the block coupling two nodes has any entry that is stored.
    fn stores_block(&self, row_node: usize, col_node: usize) -> bool {
        let rows = self.dof(row_node, 0)..self.dof(row_node, 0) + self.solution_dim;
        let cols = self.dof(col_node, 0)..self.dof(col_node, 0) + self.solution_dim;
        rows.into_iter()
            .any(|row| cols.clone().any(|col| self.target(row, col) != Target::Skip))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Inner,
    Bound,
    Skip,
}

/// Global system matrix of the locally owned rows, split into the inner and boundary blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMatrix {
    inner: CsrMatrix<f64>,
    bound: CsrMatrix<f64>,
    first_row: usize,
    solution_dim: usize,
    constrained_rows: Vec<usize>,
    nonlocal: bool,
}

impl SystemMatrix {
    /// Upper triangle of the matrix of the unknowns, with unit rows for constrained degrees of
    /// freedom and the multiplier columns of an augmented system.
    pub fn inner(&self) -> &CsrMatrix<f64> {
        &self.inner
    }

    /// Couplings of unknowns (rows) to constrained degrees of freedom (columns).
    pub fn bound(&self) -> &CsrMatrix<f64> {
        &self.bound
    }

    /// Degree of freedom of the first stored row.
    pub fn first_row(&self) -> usize {
        self.first_row
    }

    /// Whether the portrait includes the nonlocal couplings.
    pub fn is_nonlocal(&self) -> bool {
        self.nonlocal
    }

    /// The inner block as a symmetric operator, for the linear solvers.
    pub fn operator(&self) -> Result<SymmetricCsrOperator<'_>, SolveErrorKind> {
        SymmetricCsrOperator::from_upper_triangle(&self.inner)
    }

    /// Product `A x` of the full symmetric matrix, including the couplings to constrained
    /// degrees of freedom. Constrained rows yield their own entry of `x`.
    ///
    /// Requires all rows to be stored locally.
    pub fn apply(&self, x: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        if self.first_row != 0 || self.inner.nrows() != x.len() || self.inner.ncols() != x.len() {
            return Err(FemError::SizeMismatch {
                what: "vector multiplied with the system matrix",
                expected: self.inner.nrows(),
                actual: x.len(),
            }
            .into());
        }
        let operator = self
            .operator()
            .map_err(|kind| eyre!("Invalid system matrix: {kind}"))?;
        let mut y = DVector::zeros(x.len());
        operator
            .apply((&mut y).into(), x.into())
            .map_err(|err| eyre!(err))?;
        for (row, bound_row) in self.bound.row_iter().enumerate() {
            y[row] += bound_row
                .col_indices()
                .iter()
                .zip(bound_row.values())
                .map(|(&col, &value)| value * x[col])
                .sum::<f64>();
        }
        Ok(y)
    }

    /// Adds `scale * other` to this matrix. Unit rows of constrained degrees of freedom are kept.
    ///
    /// # Panics
    ///
    /// Panics if the two matrices do not share the same portrait.
    pub fn scaled_add(&mut self, scale: f64, other: &SystemMatrix) {
        assert_eq!(self.inner.pattern(), other.inner.pattern(), "Inner portraits differ");
        assert_eq!(self.bound.pattern(), other.bound.pattern(), "Boundary portraits differ");
        for (a, b) in self.inner.values_mut().iter_mut().zip(other.inner.values()) {
            *a += scale * b;
        }
        for (a, b) in self.bound.values_mut().iter_mut().zip(other.bound.values()) {
            *a += scale * b;
        }
        self.reset_constrained_rows();
    }

    /// Sets all values to zero, apart from the unit rows of constrained degrees of freedom.
    pub fn set_zero(&mut self) {
        self.inner.values_mut().fill(0.0);
        self.bound.values_mut().fill(0.0);
        self.reset_constrained_rows();
    }

    fn reset_constrained_rows(&mut self) {
        for &row in &self.constrained_rows {
            let mut csr_row = self.inner.row_mut(row);
            csr_row.values_mut().fill(1.0);
        }
    }
}

/// Splits the values of a CSR matrix into blocks of `rows_per_block` consecutive rows.
fn split_row_blocks<'a>(offsets: &[usize], mut values: &'a mut [f64], rows_per_block: usize) -> Vec<&'a mut [f64]> {
    let nrows = offsets.len() - 1;
    let mut blocks = Vec::with_capacity((nrows + rows_per_block - 1) / rows_per_block);
    for first in (0..nrows).step_by(rows_per_block) {
        let last = (first + rows_per_block).min(nrows);
        let (block, rest) = std::mem::take(&mut values).split_at_mut(offsets[last] - offsets[first]);
        blocks.push(block);
        values = rest;
    }
    blocks
}

/// Mutable access to the values of the rows of one node in both blocks.
struct NodeRows<'a> {
    first_local_row: usize,
    inner_offsets: &'a [usize],
    inner_columns: &'a [usize],
    inner_values: &'a mut [f64],
    bound_offsets: &'a [usize],
    bound_columns: &'a [usize],
    bound_values: &'a mut [f64],
}

impl<'a> NodeRows<'a> {
    fn add(&mut self, local_row: usize, col: usize, value: f64, target: Target) {
        let (offsets, columns, values) = match target {
            Target::Inner => (self.inner_offsets, self.inner_columns, &mut *self.inner_values),
            Target::Bound => (self.bound_offsets, self.bound_columns, &mut *self.bound_values),
            Target::Skip => return,
        };
        let row_range = offsets[local_row]..offsets[local_row + 1];
        let index = columns[row_range.clone()]
            .binary_search(&col)
            .expect("Internal error: entry is missing from the portrait");
        values[row_range.start - offsets[self.first_local_row] + index] += value;
    }
}

#[derive(Debug, Default)]
struct RowWorkspace {
    marker: ColumnMarker,
    column_nodes: Vec<usize>,
    block: Vec<f64>,
}

/// Collects the distinct nodes coupled to `node`, in order of first appearance.
fn collect_column_nodes<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    node: usize,
    nonlocal: bool,
    marker: &mut ColumnMarker,
    column_nodes: &mut Vec<usize>,
) {
    marker.reset(mesh.node_count());
    column_nodes.clear();
    for_each_local_pair_of_node(mesh, node, |element, _, j| {
        let col = mesh.node_number(element, j);
        if marker.insert(col) {
            column_nodes.push(col);
        }
    });
    if nonlocal {
        for_each_nonlocal_pair_of_node(mesh, node, |_, neighbor, _, j| {
            let col = mesh.node_number(neighbor, j);
            if marker.insert(col) {
                column_nodes.push(col);
            }
        });
    }
}

/// Builds portraits and assembles global matrices, reusing per-thread buffers.
#[derive(Debug, Default)]
pub struct SystemAssembler {
    workspace: ThreadLocal<RefCell<RowWorkspace>>,
}

impl SystemAssembler {
    /// Builds the portraits of the inner and boundary blocks.
    ///
    /// The returned matrix has all values zero, except for the unit diagonal of constrained
    /// rows.
    pub fn build_portrait<const D: usize, E: ReferenceElement<D>>(
        &self,
        mesh: &Mesh<D, E>,
        layout: &DofLayout,
        nonlocal: bool,
    ) -> eyre::Result<SystemMatrix> {
        if nonlocal && !mesh.has_neighbors() {
            return Err(FemError::MissingNeighbors.into());
        }
        if layout.node_count() != mesh.node_count() {
            return Err(FemError::SizeMismatch {
                what: "nodes of the degree of freedom layout",
                expected: mesh.node_count(),
                actual: layout.node_count(),
            }
            .into());
        }

        let timer = Instant::now();
        let sd = layout.solution_dim();
        let owned = layout.owned_nodes();
        let first_row = layout.first_row();
        let multiplier_count = |row: usize| usize::from(layout.is_augmented() && !layout.is_constrained(row));

        // Count entries per row, one node per task
        let counts: Vec<(usize, usize)> = owned
            .clone()
            .into_par_iter()
            .flat_map_iter(|node| {
                let ws = &mut *self.workspace.get_or_default().borrow_mut();
                collect_column_nodes(mesh, node, nonlocal, &mut ws.marker, &mut ws.column_nodes);
                (0..sd)
                    .map(|a| {
                        let row = layout.dof(node, a);
                        if layout.is_constrained(row) {
                            return (1, 0);
                        }
                        let (mut inner, mut bound) = (multiplier_count(row), 0);
                        for &col_node in &ws.column_nodes {
                            for b in 0..sd {
                                match layout.target(row, layout.dof(col_node, b)) {
                                    Target::Inner => inner += 1,
                                    Target::Bound => bound += 1,
                                    Target::Skip => {}
                                }
                            }
                        }
                        (inner, bound)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let (nrows, ncols) = (layout.row_count(), layout.system_size());
        let mut inner = CsrBuilder::new(nrows, ncols);
        let mut bound = CsrBuilder::new(nrows, ncols);
        for (local_row, &(inner_count, bound_count)) in counts.iter().enumerate() {
            inner.reserve_row(local_row, inner_count);
            bound.reserve_row(local_row, bound_count);
        }
        for local_row in counts.len()..nrows {
            // Explicit zero diagonal of the multiplier rows
            inner.reserve_row(local_row, 1);
        }

        // Fill the column indices, again one node per task
        inner
            .row_blocks_mut(sd)
            .into_par_iter()
            .zip(bound.row_blocks_mut(sd))
            .enumerate()
            .for_each(|(k, (mut inner_rows, mut bound_rows))| {
                if k >= owned.len() {
                    for a in 0..sd {
                        let row = inner_rows.first_row() + a;
                        inner_rows.append_entry(row, layout.augmented_dof(a), 0.0);
                    }
                    return;
                }
                let node = owned.start + k;
                let ws = &mut *self.workspace.get_or_default().borrow_mut();
                collect_column_nodes(mesh, node, nonlocal, &mut ws.marker, &mut ws.column_nodes);
                for a in 0..sd {
                    let row = layout.dof(node, a);
                    let local_row = row - first_row;
                    if layout.is_constrained(row) {
                        inner_rows.append_entry(local_row, row, 1.0);
                        continue;
                    }
                    for &col_node in &ws.column_nodes {
                        for b in 0..sd {
                            let col = layout.dof(col_node, b);
                            match layout.target(row, col) {
                                Target::Inner => inner_rows.append_entry(local_row, col, 0.0),
                                Target::Bound => bound_rows.append_entry(local_row, col, 0.0),
                                Target::Skip => {}
                            }
                        }
                    }
                    if multiplier_count(row) > 0 {
                        inner_rows.append_entry(local_row, layout.augmented_dof(a), 0.0);
                    }
                }
            });

        let inner = inner.finalize()?;
        let bound = bound.finalize()?;
        let constrained_rows = layout
            .owned_nodes()
            .flat_map(|node| (0..sd).map(move |a| layout.dof(node, a)))
            .filter(|&dof| layout.is_constrained(dof))
            .map(|dof| dof - first_row)
            .collect();
        info!(
            "Built {} portrait with {} rows: {} inner and {} boundary entries in {:.3?}",
            if nonlocal { "nonlocal" } else { "local" },
            nrows,
            inner.nnz(),
            bound.nnz(),
            timer.elapsed()
        );

        Ok(SystemMatrix {
            inner,
            bound,
            first_row,
            solution_dim: sd,
            constrained_rows,
            nonlocal,
        })
    }

    /// Adds the given bilinear form to the matrix.
    pub fn assemble_into<const D: usize, E, F>(
        &self,
        matrix: &mut SystemMatrix,
        mesh: &Mesh<D, E>,
        cache: &QuadratureCache<D>,
        layout: &DofLayout,
        form: &F,
    ) -> eyre::Result<()>
    where
        E: ReferenceElement<D>,
        F: BilinearForm<D>,
    {
        let sd = layout.solution_dim();
        check_compatibility(matrix, mesh, cache, layout)?;
        if form.solution_dim() != sd {
            return Err(FemError::SizeMismatch {
                what: "solution dimension of the bilinear form",
                expected: sd,
                actual: form.solution_dim(),
            }
            .into());
        }
        if form.is_nonlocal() && !matrix.is_nonlocal() {
            return Err(FemError::MissingNeighbors.into());
        }

        let timer = Instant::now();
        let owned = layout.owned_nodes();
        let (inner_offsets, inner_columns, inner_values) = matrix.inner.csr_data_mut();
        let (bound_offsets, bound_columns, bound_values) = matrix.bound.csr_data_mut();
        let inner_blocks = split_row_blocks(inner_offsets, inner_values, sd);
        let bound_blocks = split_row_blocks(bound_offsets, bound_values, sd);

        inner_blocks
            .into_par_iter()
            .zip(bound_blocks)
            .take(owned.len())
            .enumerate()
            .for_each(|(k, (inner_values, bound_values))| {
                let node = owned.start + k;
                if (0..sd).all(|a| layout.is_constrained(layout.dof(node, a))) {
                    return;
                }
                let mut rows = NodeRows {
                    first_local_row: sd * k,
                    inner_offsets,
                    inner_columns,
                    inner_values,
                    bound_offsets,
                    bound_columns,
                    bound_values,
                };
                let ws = &mut *self.workspace.get_or_default().borrow_mut();
                ws.block.resize(sd * sd, 0.0);
                let block = &mut ws.block;
                let mut scatter = |col_node: usize, block: &[f64]| {
                    for a in 0..sd {
                        let row = layout.dof(node, a);
                        for b in 0..sd {
                            let col = layout.dof(col_node, b);
                            rows.add(sd * k + a, col, block[sd * a + b], layout.target(row, col));
                        }
                    }
                };

                for_each_local_pair_of_node(mesh, node, |element, i, j| {
                    let col_node = mesh.node_number(element, j);
                    if layout.stores_block(node, col_node) {
                        block.fill(0.0);
                        form.add_local_block(&cache.element(element), i, j, block);
                        scatter(col_node, block);
                    }
                });
                if form.is_nonlocal() {
                    for_each_nonlocal_pair_of_node(mesh, node, |element, neighbor, i, j| {
                        let col_node = mesh.node_number(neighbor, j);
                        if layout.stores_block(node, col_node) {
                            block.fill(0.0);
                            form.add_nonlocal_block(&cache.element(element), &cache.element(neighbor), i, j, block);
                            scatter(col_node, block);
                        }
                    });
                }
            });

        info!(
            "Assembled {} form into {} rows in {:.3?}",
            if form.is_nonlocal() { "nonlocal" } else { "local" },
            layout.row_count(),
            timer.elapsed()
        );
        Ok(())
    }

    /// Fills the multiplier columns of an augmented system with the basis integrals `∫ N_i`.
    pub fn assemble_augmentation<const D: usize, E: ReferenceElement<D>>(
        &self,
        matrix: &mut SystemMatrix,
        mesh: &Mesh<D, E>,
        cache: &QuadratureCache<D>,
        layout: &DofLayout,
    ) -> eyre::Result<()> {
        if !layout.is_augmented() {
            return Ok(());
        }
        check_compatibility(matrix, mesh, cache, layout)?;
        let sd = layout.solution_dim();
        let owned = layout.owned_nodes();
        let (inner_offsets, inner_columns, inner_values) = matrix.inner.csr_data_mut();
        let (bound_offsets, bound_columns) = (matrix.bound.row_offsets(), matrix.bound.col_indices());

        split_row_blocks(inner_offsets, inner_values, sd)
            .into_par_iter()
            .take(owned.len())
            .enumerate()
            .for_each(|(k, inner_values)| {
                let node = owned.start + k;
                let integral: f64 = mesh
                    .node_elements(node)
                    .iter()
                    .map(|&element| {
                        let i = mesh
                            .global_to_local(element, node)
                            .expect("Internal error: node-to-element map is inconsistent");
                        basis_integral(&cache.element(element), i)
                    })
                    .sum();
                let mut rows = NodeRows {
                    first_local_row: sd * k,
                    inner_offsets,
                    inner_columns,
                    inner_values,
                    bound_offsets,
                    bound_columns,
                    bound_values: &mut [],
                };
                for a in 0..sd {
                    if !layout.is_constrained(layout.dof(node, a)) {
                        rows.add(sd * k + a, layout.augmented_dof(a), integral, Target::Inner);
                    }
                }
            });
        Ok(())
    }
}

fn check_compatibility<const D: usize, E: ReferenceElement<D>>(
    matrix: &SystemMatrix,
    mesh: &Mesh<D, E>,
    cache: &QuadratureCache<D>,
    layout: &DofLayout,
) -> eyre::Result<()> {
    if cache.element_count() != mesh.element_count() {
        return Err(FemError::SizeMismatch {
            what: "elements of the quadrature cache",
            expected: mesh.element_count(),
            actual: cache.element_count(),
        }
        .into());
    }
    if matrix.inner.nrows() != layout.row_count()
        || matrix.inner.ncols() != layout.system_size()
        || matrix.first_row != layout.first_row()
        || matrix.solution_dim != layout.solution_dim()
    {
        return Err(FemError::SizeMismatch {
            what: "rows of the system matrix",
            expected: layout.row_count(),
            actual: matrix.inner.nrows(),
        }
        .into());
    }
    Ok(())
}

/// Assembles `∫ N_i f_c dx` for every owned degree of freedom, where `source(x, c)` is
/// component `c` of the source. The vector spans the whole system, rows that are not owned are
/// zero.
pub fn assemble_load_vector<const D: usize, E, S>(
    mesh: &Mesh<D, E>,
    cache: &QuadratureCache<D>,
    layout: &DofLayout,
    source: S,
) -> DVector<f64>
where
    E: ReferenceElement<D>,
    S: Fn(&Point<f64, D>, usize) -> f64 + Sync,
{
    let sd = layout.solution_dim();
    let owned = layout.owned_nodes();
    let nodal: Vec<f64> = owned
        .clone()
        .into_par_iter()
        .flat_map_iter(|node| {
            let source = &source;
            (0..sd).map(move |a| {
                mesh.node_elements(node)
                    .iter()
                    .map(|&element| {
                        let i = mesh
                            .global_to_local(element, node)
                            .expect("Internal error: node-to-element map is inconsistent");
                        source_integral(&cache.element(element), i, |x| source(x, a))
                    })
                    .sum::<f64>()
            })
        })
        .collect();

    let mut f = DVector::zeros(layout.system_size());
    f.rows_mut(layout.first_row(), nodal.len()).copy_from_slice(&nodal);
    f
}
