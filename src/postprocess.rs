//! Quantities derived from a solution: nodal gradients, strains and stresses, integrals and
//! energies.
//!
//! Nodal gradients are evaluated at the reference nodes of every adjacent element and averaged,
//! since the gradient of a continuous finite element field is discontinuous across elements.
use crate::assembly::traversal::{for_each_local_pair_in_element, for_each_nonlocal_pair_in_element};
use crate::assembly::{BilinearForm, QuadratureCache};
use crate::config::{AssemblyConfig, ModelParameters};
use crate::element::{cofactor_and_determinant, reference_jacobian, ReferenceElement};
use crate::error::FemError;
use crate::influence::InfluenceFunction;
use crate::materials::PlaneStress;
use crate::mesh::Mesh;
use nalgebra::{DVector, SVector, Vector3};
use rayon::prelude::*;

fn check_solution_len<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    solution: &DVector<f64>,
    solution_dim: usize,
) -> Result<(), FemError> {
    if solution.len() < solution_dim * mesh.node_count() {
        return Err(FemError::SizeMismatch {
            what: "nodal solution",
            expected: solution_dim * mesh.node_count(),
            actual: solution.len(),
        });
    }
    Ok(())
}

/// Averaged nodal gradients of every solution component. Entry `node * solution_dim + c` is
/// the gradient of component `c` at `node`.
fn averaged_nodal_gradients<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    solution: &DVector<f64>,
    solution_dim: usize,
) -> Vec<SVector<f64, D>> {
    let contributions: Vec<Vec<(usize, SVector<f64, D>)>> = (0..mesh.element_count())
        .into_par_iter()
        .map(|element| {
            let kind = mesh.element(element);
            let nodes = mesh.element_nodes(element);
            let mut gradients = vec![SVector::zeros(); kind.node_count()];
            let mut result = Vec::with_capacity(nodes.len() * solution_dim);
            for i in 0..kind.node_count() {
                kind.populate_basis_gradients(&mut gradients, &kind.reference_node(i));
                let jacobian = reference_jacobian(mesh.element_vertices(element), &gradients);
                let (cofactor, det) = cofactor_and_determinant(&jacobian);
                for c in 0..solution_dim {
                    let reference_gradient = nodes
                        .iter()
                        .zip(&gradients)
                        .fold(SVector::zeros(), |sum: SVector<f64, D>, (&node, g)| {
                            sum + g * solution[solution_dim * node + c]
                        });
                    result.push((solution_dim * nodes[i] + c, cofactor * reference_gradient / det));
                }
            }
            result
        })
        .collect();

    let mut sums = vec![SVector::zeros(); solution_dim * mesh.node_count()];
    for (index, gradient) in contributions.into_iter().flatten() {
        sums[index] += gradient;
    }
    for (index, sum) in sums.iter_mut().enumerate() {
        let count = mesh.node_elements(index / solution_dim).len();
        if count > 0 {
            *sum /= count as f64;
        }
    }
    sums
}

/// Gradient of a scalar field (e.g. the temperature) at every node.
pub fn nodal_gradient<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    solution: &DVector<f64>,
) -> eyre::Result<Vec<SVector<f64, D>>> {
    check_solution_len(mesh, solution, 1)?;
    Ok(averaged_nodal_gradients(mesh, solution, 1))
}

/// Integral `∫ u dx` of a scalar field.
pub fn integrate_solution<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    cache: &QuadratureCache<D>,
    solution: &DVector<f64>,
) -> eyre::Result<f64> {
    check_solution_len(mesh, solution, 1)?;
    Ok((0..mesh.element_count())
        .into_par_iter()
        .map(|element| {
            let quadrature = cache.element(element);
            let nodes = mesh.element_nodes(element);
            (0..quadrature.quadrature_node_count())
                .map(|q| {
                    let value: f64 = nodes
                        .iter()
                        .zip(quadrature.shape_values_at(q))
                        .map(|(&node, n)| n * solution[node])
                        .sum();
                    quadrature.measure(q) * value
                })
                .sum::<f64>()
        })
        .sum())
}

/// The energy `u^T K u` of a nodal solution with respect to the given bilinear form, e.g.
/// `∫ λ |∇T|² dx` for the local heat stiffness.
///
/// The matrix is never formed, the form is evaluated element by element.
pub fn energy<const D: usize, E, F>(
    mesh: &Mesh<D, E>,
    cache: &QuadratureCache<D>,
    form: &F,
    solution: &DVector<f64>,
) -> eyre::Result<f64>
where
    E: ReferenceElement<D>,
    F: BilinearForm<D>,
{
    let sd = form.solution_dim();
    check_solution_len(mesh, solution, sd)?;
    if form.is_nonlocal() && !mesh.has_neighbors() {
        return Err(FemError::MissingNeighbors.into());
    }

    let couple = |node_i: usize, node_j: usize, block: &[f64]| -> f64 {
        let mut sum = 0.0;
        for a in 0..sd {
            for b in 0..sd {
                sum += solution[sd * node_i + a] * block[a * sd + b] * solution[sd * node_j + b];
            }
        }
        sum
    };

    Ok((0..mesh.element_count())
        .into_par_iter()
        .map(|element| {
            let quadrature = cache.element(element);
            let nodes = mesh.element_nodes(element);
            let mut block = vec![0.0; sd * sd];
            let mut total = 0.0;
            for_each_local_pair_in_element(mesh, element, |i, j| {
                block.fill(0.0);
                form.add_local_block(&quadrature, i, j, &mut block);
                total += couple(nodes[i], nodes[j], &block);
            });
            if form.is_nonlocal() {
                for_each_nonlocal_pair_in_element(mesh, element, |neighbor, i, j| {
                    block.fill(0.0);
                    form.add_nonlocal_block(&quadrature, &cache.element(neighbor), i, j, &mut block);
                    total += couple(nodes[i], mesh.node_number(neighbor, j), &block);
                });
            }
            total
        })
        .sum())
}

/// Strains `[ε_xx, ε_yy, ε_xy]` at every node for interleaved displacements
/// `[u_x(0), u_y(0), u_x(1), ...]`. The shear component is the tensor shear
/// `ε_xy = (∂u_x/∂y + ∂u_y/∂x) / 2`.
pub fn nodal_strains<E: ReferenceElement<2>>(
    mesh: &Mesh<2, E>,
    displacement: &DVector<f64>,
) -> eyre::Result<Vec<Vector3<f64>>> {
    check_solution_len(mesh, displacement, 2)?;
    let gradients = averaged_nodal_gradients(mesh, displacement, 2);
    Ok(gradients
        .chunks_exact(2)
        .map(|g| Vector3::new(g[0][0], g[1][1], 0.5 * (g[0][1] + g[1][0])))
        .collect())
}

/// Stresses `[σ_xx, σ_yy, σ_xy]` at every node for the given nodal strains.
///
/// The local stress `D ε(x)` is weighted by `p1`. For a nonlocal model the term
/// `(1 - p1) Σ_e ∫_e φ(x, y) D ε(y) dy` over the elements within the influence radius of the
/// node is added, with the strain interpolated from the nodal strains.
pub fn nodal_stresses<E, F>(
    mesh: &Mesh<2, E>,
    cache: &QuadratureCache<2>,
    material: &PlaneStress,
    model: &ModelParameters,
    config: &AssemblyConfig,
    influence: F,
    strains: &[Vector3<f64>],
) -> eyre::Result<Vec<Vector3<f64>>>
where
    E: ReferenceElement<2>,
    F: InfluenceFunction<2>,
{
    if strains.len() != mesh.node_count() {
        return Err(FemError::SizeMismatch {
            what: "nodal strains",
            expected: mesh.node_count(),
            actual: strains.len(),
        }
        .into());
    }
    let nonlocal = model.is_nonlocal(config);
    if nonlocal && !mesh.has_neighbors() {
        return Err(FemError::MissingNeighbors.into());
    }

    let p1 = model.local_weight;
    let p2 = model.nonlocal_weight();
    Ok((0..mesh.node_count())
        .into_par_iter()
        .map(|node| {
            let mut stress = p1 * material.stress(&strains[node]);
            if nonlocal {
                let x = mesh.node(node);
                for &element in mesh.node_neighbors(node) {
                    let quadrature = cache.element(element);
                    let nodes = mesh.element_nodes(element);
                    for q in 0..quadrature.quadrature_node_count() {
                        let strain = nodes
                            .iter()
                            .zip(quadrature.shape_values_at(q))
                            .fold(Vector3::zeros(), |sum, (&n, value)| sum + strains[n] * *value);
                        let weight = quadrature.measure(q) * influence.evaluate(x, quadrature.point(q));
                        stress += p2 * weight * material.stress(&strain);
                    }
                }
            }
            stress
        })
        .collect())
}
