//! The mesh container and its derived topology.
use crate::element::{map_reference_coords, QuadrilateralElement, ReferenceElement, SegmentElement};
use crate::error::FemError;
use eyre::eyre;
use log::info;
use nalgebra::Point;
use rustc_hash::FxHashMap;
use std::ops::Range;

pub mod neighbors;
pub mod procedural;

/// A facet of the mesh boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Facet {
    /// End point of a 1D mesh.
    Point(usize),
    /// Boundary edge of a 2D mesh, with nodes ordered as in [`SegmentElement`].
    Segment(SegmentElement, Vec<usize>),
}

impl Facet {
    pub fn nodes(&self) -> &[usize] {
        match self {
            Self::Point(node) => std::slice::from_ref(node),
            Self::Segment(_, nodes) => nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryGroup {
    name: String,
    facets: Vec<Facet>,
}

impl BoundaryGroup {
    pub fn new(name: impl Into<String>, facets: Vec<Facet>) -> Self {
        Self {
            name: name.into(),
            facets,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    /// Sorted, deduplicated nodes of all facets of the group.
    pub fn nodes(&self) -> Vec<usize> {
        let mut nodes: Vec<_> = self.facets.iter().flat_map(|facet| facet.nodes()).copied().collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }
}

/// Index-based mesh with per-element kinds, boundary groups and nonlocal neighbor lists.
///
/// Besides the geometry, the mesh stores the topology needed by node-centric assembly: the
/// elements adjacent to each node, and for each element the map from global node index to
/// local node index. The mesh is immutable apart from the neighbor lists and the owned node
/// range, which are set up before any assembly takes place.
#[derive(Debug, Clone)]
pub struct Mesh<const D: usize, E> {
    vertices: Vec<Point<f64, D>>,
    elements: Vec<E>,
    connectivity: Vec<Vec<usize>>,
    boundary_groups: Vec<BoundaryGroup>,
    node_elements: Vec<Vec<usize>>,
    global_to_local: Vec<FxHashMap<usize, usize>>,
    element_neighbors: Vec<Vec<usize>>,
    node_neighbors: Vec<Vec<usize>>,
    neighbor_radius: Option<f64>,
    owned_nodes: Range<usize>,
}

pub type Mesh1d = Mesh<1, SegmentElement>;
pub type Mesh2d = Mesh<2, QuadrilateralElement>;

impl<const D: usize, E: ReferenceElement<D>> Mesh<D, E> {
    /// Constructs a mesh, validating the connectivity.
    ///
    /// Every element must reference exactly `element.node_count()` distinct, in-bounds nodes,
    /// and boundary facets may only reference existing nodes.
    pub fn from_vertices_and_connectivity(
        vertices: Vec<Point<f64, D>>,
        elements: Vec<E>,
        connectivity: Vec<Vec<usize>>,
        boundary_groups: Vec<BoundaryGroup>,
    ) -> eyre::Result<Self> {
        if elements.len() != connectivity.len() {
            return Err(FemError::SizeMismatch {
                what: "element kinds",
                expected: connectivity.len(),
                actual: elements.len(),
            }
            .into());
        }

        let n = vertices.len();
        let mut node_elements = vec![Vec::new(); n];
        let mut global_to_local = Vec::with_capacity(connectivity.len());
        for (e, (element, nodes)) in elements.iter().zip(&connectivity).enumerate() {
            if nodes.len() != element.node_count() {
                return Err(eyre!(
                    "Element {e} has {} nodes, but its kind {element:?} requires {}",
                    nodes.len(),
                    element.node_count()
                ));
            }
            let mut local = FxHashMap::default();
            for (i, &node) in nodes.iter().enumerate() {
                if node >= n {
                    return Err(eyre!("Element {e} references node {node}, but the mesh has {n} nodes"));
                }
                if local.insert(node, i).is_some() {
                    return Err(eyre!("Element {e} references node {node} more than once"));
                }
                node_elements[node].push(e);
            }
            global_to_local.push(local);
        }

        for group in &boundary_groups {
            if let Some(&node) = group.facets.iter().flat_map(Facet::nodes).find(|&&node| node >= n) {
                return Err(eyre!(
                    "Boundary group \"{}\" references node {node}, but the mesh has {n} nodes",
                    group.name
                ));
            }
        }

        Ok(Self {
            vertices,
            elements,
            connectivity,
            boundary_groups,
            node_elements,
            global_to_local,
            element_neighbors: Vec::new(),
            node_neighbors: Vec::new(),
            neighbor_radius: None,
            owned_nodes: 0..n,
        })
    }

    pub fn node_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn vertices(&self) -> &[Point<f64, D>] {
        &self.vertices
    }

    pub fn node(&self, node: usize) -> &Point<f64, D> {
        &self.vertices[node]
    }

    pub fn element(&self, element: usize) -> &E {
        &self.elements[element]
    }

    /// Distinct element kinds present in the mesh, in order of first appearance.
    pub fn element_kinds(&self) -> Vec<E> {
        let mut kinds: Vec<E> = Vec::new();
        for element in &self.elements {
            if !kinds.contains(element) {
                kinds.push(*element);
            }
        }
        kinds
    }

    pub fn element_nodes(&self, element: usize) -> &[usize] {
        &self.connectivity[element]
    }

    /// Global index of local node `local_node` of the given element.
    pub fn node_number(&self, element: usize, local_node: usize) -> usize {
        self.connectivity[element][local_node]
    }

    /// Local index of the global node within the given element, if the element contains it.
    pub fn global_to_local(&self, element: usize, node: usize) -> Option<usize> {
        self.global_to_local[element].get(&node).copied()
    }

    /// Elements containing the given node, in increasing order.
    pub fn node_elements(&self, node: usize) -> &[usize] {
        &self.node_elements[node]
    }

    pub fn element_vertices(&self, element: usize) -> impl Iterator<Item = Point<f64, D>> + '_ {
        self.connectivity[element].iter().map(|&node| self.vertices[node])
    }

    /// Physical image of the reference element center.
    pub fn element_center(&self, element: usize) -> Point<f64, D> {
        let kind = &self.elements[element];
        let mut basis = vec![0.0; kind.node_count()];
        kind.populate_basis(&mut basis, &Point::origin());
        map_reference_coords(self.element_vertices(element), &basis)
    }

    pub fn boundary_groups_count(&self) -> usize {
        self.boundary_groups.len()
    }

    pub fn boundary_groups(&self) -> &[BoundaryGroup] {
        &self.boundary_groups
    }

    pub fn boundary_group(&self, group: usize) -> &BoundaryGroup {
        &self.boundary_groups[group]
    }

    /// Index of the boundary group with the given name.
    pub fn find_boundary_group(&self, name: &str) -> Option<usize> {
        self.boundary_groups.iter().position(|group| group.name == name)
    }

    /// Computes the element and node neighbor lists for the given influence radius.
    ///
    /// Element `b` is a neighbor of element `a` if their centers are at most `radius` apart,
    /// a node's neighbors are the elements whose centers lie within `radius` of the node.
    pub fn find_neighbors(&mut self, radius: f64) {
        let centers: Vec<_> = (0..self.element_count()).map(|e| self.element_center(e)).collect();
        self.element_neighbors = neighbors::points_within_radius(&centers, &centers, radius);
        self.node_neighbors = neighbors::points_within_radius(&centers, &self.vertices, radius);
        self.neighbor_radius = Some(radius);
        let total: usize = self.element_neighbors.iter().map(Vec::len).sum();
        info!(
            "Found {} element neighbor pairs for radius {} (average {:.1} per element)",
            total,
            radius,
            total as f64 / self.element_count().max(1) as f64
        );
    }

    pub fn has_neighbors(&self) -> bool {
        self.neighbor_radius.is_some()
    }

    pub fn neighbor_radius(&self) -> Option<f64> {
        self.neighbor_radius
    }

    /// Elements interacting nonlocally with the given element, including itself.
    ///
    /// Empty until [`find_neighbors`](Self::find_neighbors) has been called.
    pub fn neighbors(&self, element: usize) -> &[usize] {
        self.element_neighbors.get(element).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Elements whose centers lie within the influence radius of the given node.
    pub fn node_neighbors(&self, node: usize) -> &[usize] {
        self.node_neighbors.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes whose rows are produced by assembly on this mesh. Columns always refer to all nodes.
    pub fn owned_nodes(&self) -> Range<usize> {
        self.owned_nodes.clone()
    }

    pub fn set_owned_nodes(&mut self, nodes: Range<usize>) -> Result<(), FemError> {
        if nodes.start > nodes.end || nodes.end > self.node_count() {
            return Err(FemError::SizeMismatch {
                what: "owned node range",
                expected: self.node_count(),
                actual: nodes.end,
            });
        }
        self.owned_nodes = nodes;
        Ok(())
    }
}
