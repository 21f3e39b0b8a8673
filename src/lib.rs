#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]

//! Core library for the Loam compiler: a statically structured surface
//! language lowered to readable Lua/Luau with no runtime support code.

pub mod analysis;
pub mod cli;
pub mod diagnostics;
pub mod driver;
pub mod emit;
pub mod error;
pub mod frontend;
pub mod link;
pub mod logging;
pub mod optimize;
pub mod target;
pub mod typeck;

pub use driver::{compile, compile_modules, CompileOptions};
pub use error::{Error, Result};
pub use target::Target;
