//! Collaborator contracts implemented by the storage crate (or by test
//! doubles).

mod traits;

pub use traits::*;
