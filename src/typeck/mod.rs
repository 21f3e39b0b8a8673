//! Structural type checking: the type model, assignability, expression
//! and statement checking, and export signatures.

mod checker;
mod exports;
mod types;

pub use checker::check;
pub use exports::export_signatures;
pub use types::{assignable, StructDef, Type};
