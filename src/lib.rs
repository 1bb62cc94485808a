//! Finite element assembly and solution of local and nonlocal heat conduction and plane-stress
//! elasticity problems on 1D and 2D meshes.
pub mod assembly;
pub mod boundary;
pub mod config;
pub mod element;
pub mod error;
pub mod influence;
pub mod io;
pub mod materials;
pub mod mesh;
pub mod postprocess;
pub mod quadrature;
pub mod solve;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate vtkio;
pub use nonlocal_fem_sparse;
