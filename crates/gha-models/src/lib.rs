//! Typed GitHub Actions workflow models and a tolerant parser.
//!
//! The model mirrors what workflows actually declare: triggers as a tagged
//! union, jobs as an insertion-ordered mapping, and steps as a run/uses
//! union. The parser degrades gracefully: malformed jobs and steps are
//! dropped with diagnostics rather than failing the document.

#![forbid(unsafe_code)]

pub mod common;
pub mod event;
pub mod parser;
pub mod workflow;

pub use common::{
    Concurrency, Defaults, PermissionLevel, Permissions, RunDefaults, UsesCoordinate,
    UsesError,
};
pub use event::{DispatchInput, Trigger};
pub use parser::WorkflowParser;
pub use workflow::{
    Container, Job, JobEnvironment, RunsOn, Step, StepCommon, Strategy, Workflow,
};
