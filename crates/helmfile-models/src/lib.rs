//! Helmfile parsing and release dependency validation.
//!
//! Parses `helmfile.yaml` documents into a typed model, enforces the
//! required release fields, validates explicit `needs` references, detects
//! dependency cycles, and orders releases topologically.

#![forbid(unsafe_code)]

pub mod deps;
pub mod model;
pub mod parser;

pub use deps::{detect_cycles, releases_in_order, validate_dependencies};
pub use model::{
    Environment, HelmDefaults, Helmfile, Release, Repository, SetValue,
};
pub use parser::HelmfileParser;
