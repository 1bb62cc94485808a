//! Enumeration of the node pairs that interact through the local and the nonlocal forms.
//!
//! Every assembly routine is written as a rule invoked by one of these traversals, so the
//! iteration order over elements, neighbors and local nodes lives in one place. The rules are
//! plain closures: the element-centric traversals are run in parallel by handing each thread a
//! disjoint set of elements, the node-centric ones by handing each thread a disjoint set of
//! output rows.
use crate::element::ReferenceElement;
use crate::mesh::Mesh;

/// Invokes `rule(i, j)` for every pair of local nodes of `element`.
pub fn for_each_local_pair_in_element<const D: usize, E, F>(mesh: &Mesh<D, E>, element: usize, mut rule: F)
where
    E: ReferenceElement<D>,
    F: FnMut(usize, usize),
{
    let n = mesh.element(element).node_count();
    for i in 0..n {
        for j in 0..n {
            rule(i, j);
        }
    }
}

/// Invokes `rule(neighbor, i_local, j_nonlocal)` for every neighbor of `element` and every
/// pair of a local node of `element` with a local node of the neighbor.
///
/// Elements without neighbors produce no invocations.
pub fn for_each_nonlocal_pair_in_element<const D: usize, E, F>(mesh: &Mesh<D, E>, element: usize, mut rule: F)
where
    E: ReferenceElement<D>,
    F: FnMut(usize, usize, usize),
{
    let n = mesh.element(element).node_count();
    for &neighbor in mesh.neighbors(element) {
        let m = mesh.element(neighbor).node_count();
        for i in 0..n {
            for j in 0..m {
                rule(neighbor, i, j);
            }
        }
    }
}

/// Invokes `rule(element, i, j)` for every element and every pair of its local nodes.
pub fn for_each_local_pair<const D: usize, E, F>(mesh: &Mesh<D, E>, mut rule: F)
where
    E: ReferenceElement<D>,
    F: FnMut(usize, usize, usize),
{
    for element in 0..mesh.element_count() {
        for_each_local_pair_in_element(mesh, element, |i, j| rule(element, i, j));
    }
}

/// Invokes `rule(element, neighbor, i_local, j_nonlocal)` for every element, every one of its
/// neighbors and every pair of their local nodes.
pub fn for_each_nonlocal_pair<const D: usize, E, F>(mesh: &Mesh<D, E>, mut rule: F)
where
    E: ReferenceElement<D>,
    F: FnMut(usize, usize, usize, usize),
{
    for element in 0..mesh.element_count() {
        for_each_nonlocal_pair_in_element(mesh, element, |neighbor, i, j| rule(element, neighbor, i, j));
    }
}

/// Node-centric local traversal: invokes `rule(element, i, j)` for every element containing
/// `node`, where `i` is the local index of `node` in that element and `j` ranges over all of
/// the element's local nodes.
///
/// All invocations contribute to the row of `node` only.
pub fn for_each_local_pair_of_node<const D: usize, E, F>(mesh: &Mesh<D, E>, node: usize, mut rule: F)
where
    E: ReferenceElement<D>,
    F: FnMut(usize, usize, usize),
{
    for &element in mesh.node_elements(node) {
        let i = local_index(mesh, element, node);
        for j in 0..mesh.element(element).node_count() {
            rule(element, i, j);
        }
    }
}

/// Node-centric nonlocal traversal: invokes `rule(element, neighbor, i, j)` for every element
/// containing `node`, every neighbor of that element and every local node `j` of the neighbor,
/// where `i` is the local index of `node` in `element`.
pub fn for_each_nonlocal_pair_of_node<const D: usize, E, F>(mesh: &Mesh<D, E>, node: usize, mut rule: F)
where
    E: ReferenceElement<D>,
    F: FnMut(usize, usize, usize, usize),
{
    for &element in mesh.node_elements(node) {
        let i = local_index(mesh, element, node);
        for &neighbor in mesh.neighbors(element) {
            for j in 0..mesh.element(neighbor).node_count() {
                rule(element, neighbor, i, j);
            }
        }
    }
}

fn local_index<const D: usize, E: ReferenceElement<D>>(mesh: &Mesh<D, E>, element: usize, node: usize) -> usize {
    mesh.global_to_local(element, node)
        .expect("Internal error: node-to-element map is inconsistent with the connectivity")
}
