//! Legacy VTK output of meshes with nodal fields.
use crate::element::ReferenceElement;
use crate::mesh::Mesh;
use eyre::WrapErr;
use std::convert::TryInto;
use std::path::Path;
use vtkio::model::{
    Attribute, Attributes, ByteOrder, Cells, DataArray, DataSet, ElementType, IOBuffer, Piece, UnstructuredGridPiece,
    Version, VertexNumbers, Vtk,
};

/// Builds an unstructured grid data set from a mesh and named nodal scalar fields.
///
/// Points of 1D and 2D meshes are padded with zero coordinates, since VTK points are always
/// three-dimensional.
pub struct MeshDataSetBuilder<'a, const D: usize, E> {
    mesh: &'a Mesh<D, E>,
    fields: Vec<(String, Vec<f64>)>,

    // Only used for exporting directly to file
    title: Option<String>,
}

impl<'a, const D: usize, E> MeshDataSetBuilder<'a, D, E>
where
    E: ReferenceElement<D>,
{
    pub fn from_mesh(mesh: &'a Mesh<D, E>) -> Self {
        Self {
            mesh,
            fields: Vec::new(),
            title: None,
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }

    /// Adds a scalar field with one value per node.
    pub fn with_point_scalars(mut self, name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        self.fields.push((name.into(), values.into_iter().collect()));
        self
    }

    pub fn try_build(&self) -> eyre::Result<DataSet> {
        assert!(D <= 3, "Unable to support dimensions larger than 3.");
        let points: Vec<f64> = self
            .mesh
            .vertices()
            .iter()
            .flat_map(|v| (0..3).map(move |i| if i < D { v[i] } else { 0.0 }))
            .collect();

        // Vertices is laid out as follows: N, i_1, i_2, ... i_N,
        // so for e.g. quads this becomes 4 followed by the four indices making up the quad
        let mut vertices: Vec<u32> = Vec::new();
        let mut cell_types = Vec::new();
        for element in 0..self.mesh.element_count() {
            let nodes = self.mesh.element_nodes(element);
            vertices.push(nodes.len().try_into().wrap_err("Too many nodes in element")?);
            for &node in nodes {
                vertices.push(node.try_into().wrap_err("Node index does not fit into VTK index")?);
            }
            cell_types.push(self.mesh.element(element).vtk_cell_type());
        }

        let mut point_data = Vec::with_capacity(self.fields.len());
        for (name, values) in &self.fields {
            if values.len() != self.mesh.node_count() {
                return Err(eyre::eyre!(
                    "Field {name} has {} values, but the mesh has {} nodes",
                    values.len(),
                    self.mesh.node_count()
                ));
            }
            point_data.push(Attribute::DataArray(DataArray {
                name: name.clone(),
                elem: ElementType::Scalars {
                    num_comp: 1,
                    lookup_table: None,
                },
                data: IOBuffer::F64(values.clone()),
            }));
        }

        let piece = UnstructuredGridPiece {
            points: points.into(),
            cells: Cells {
                cell_verts: VertexNumbers::Legacy {
                    num_cells: self.mesh.element_count().try_into().wrap_err("Too many cells")?,
                    vertices,
                },
                types: cell_types,
            },
            data: Attributes {
                point: point_data,
                cell: Vec::new(),
            },
        };

        Ok(DataSet::UnstructuredGrid {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        })
    }

    /// Exports the data set as an ASCII legacy VTK file.
    pub fn try_export(&self, filename: impl AsRef<Path>) -> eyre::Result<()> {
        let filepath = filename.as_ref();
        let fallback_title = filepath
            .file_stem()
            .map(|os_str| os_str.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());
        let dataset = self.try_build()?;
        Vtk {
            version: Version { major: 4, minor: 2 },
            // If we don't have a title then just make the filepath the title
            title: self.title.clone().unwrap_or(fallback_title),
            byte_order: ByteOrder::BigEndian,
            data: dataset,
            file_path: None,
        }
        .export_ascii(filepath)
        .wrap_err_with(|| format!("Failed to write VTK file {}", filepath.display()))?;
        Ok(())
    }
}
