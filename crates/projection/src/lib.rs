//! Coordinate reference system transformations.
//!
//! Implements the EASE-Grid 2.0 global projection used by SMAP Level 3
//! products, without external dependencies.

pub mod ease2;
pub mod error;

pub use ease2::{Ease2Global, Ease2Resolution};
pub use error::{ProjectionError, ProjectionResult};
