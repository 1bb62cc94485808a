//! CSV output of nodal fields as rows `x, value` (1D) or `x, y, value` (2D).
use crate::element::ReferenceElement;
use crate::mesh::Mesh;
use ::csv::Writer;
use eyre::{eyre, WrapErr};
use nalgebra::Point;
use std::path::Path;

/// Writes one row per point: its coordinates followed by the value, with `precision` digits
/// after the decimal point.
pub fn write_points_csv<const D: usize>(
    points: &[Point<f64, D>],
    values: &[f64],
    precision: usize,
    path: impl AsRef<Path>,
) -> eyre::Result<()> {
    let path = path.as_ref();
    if points.len() != values.len() {
        return Err(eyre!(
            "Cannot write {} values for {} points to {}",
            values.len(),
            points.len(),
            path.display()
        ));
    }
    let mut writer =
        Writer::from_path(path).wrap_err_with(|| format!("Failed to create CSV file {}", path.display()))?;
    let mut record = Vec::with_capacity(D + 1);
    for (point, value) in points.iter().zip(values) {
        record.clear();
        record.extend(point.coords.iter().map(|x| format!("{x:.precision$}")));
        record.push(format!("{value:.precision$}"));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a nodal field of the mesh, one row per node.
pub fn write_nodal_csv<const D: usize, E: ReferenceElement<D>>(
    mesh: &Mesh<D, E>,
    values: &[f64],
    precision: usize,
    path: impl AsRef<Path>,
) -> eyre::Result<()> {
    write_points_csv(mesh.vertices(), values, precision, path)
}
