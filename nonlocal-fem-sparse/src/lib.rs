//! Sparse symmetric linear solvers used by `nonlocal-fem`.
//!
//! System matrices produced by the assembly only store their upper triangle, so every solver in
//! this crate works through [`SymmetricCsrOperator`], which applies the full symmetric matrix
//! without ever materializing the lower triangle.
//!
//! Three solvers are provided:
//!
//! - [`cg::ConjugateGradient`] for symmetric positive definite systems,
//! - [`minres::Minres`] for symmetric indefinite (and consistent singular) systems, such as the
//!   saddle-point systems obtained by augmenting a pure Neumann problem with Lagrange multipliers,
//! - [`dense::DenseLu`], a dense LU fallback intended for small systems.
//!
//! They are unified behind the [`LinearSolver`] trait.

pub mod cg;
pub mod dense;
pub mod minres;

mod error;
mod operator;
mod solver;

pub use error::{DimensionMismatch, SolveError, SolveErrorKind, SolveOutput};
pub use operator::{
    DiagonalPreconditioner, IdentityOperator, LinearOperator, OperatorError, SymmetricCsrOperator,
};
pub use solver::{LinearSolver, SymmetricSolver};

pub extern crate nalgebra_sparse;
