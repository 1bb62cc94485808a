//! Output of solutions to VTK and CSV files.
pub mod csv;
pub mod vtk;
