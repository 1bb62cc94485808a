//! Assembly of the global system: quadrature cache, traversals, portraits and kernels.
pub mod cache;
pub mod global;
pub mod kernels;
pub mod portrait;
pub mod traversal;

pub use cache::{ElementQuadrature, QuadratureCache};
pub use global::{assemble_load_vector, DofLayout, SystemAssembler, SystemMatrix};
pub use kernels::{BilinearForm, HeatCapacity, HeatStiffness, PlaneStressStiffness};
pub use portrait::CsrBuilder;
