//! `connx-backend` runs ONNX models on the connx runtime.
//!
//! It decides whether a model's operators are available at its declared operator set
//! ([`Backend::is_compatible`]), compiles the model into an artifact directory
//! ([`Backend::prepare`]) and runs that artifact through the external `connx` executable
//! ([`ExecutionTarget::run`]). Single operators can be run in isolation with
//! [`Backend::run_node`].

pub mod compat;
pub mod compiler;
pub mod config;
pub mod locate;
pub mod logger;
pub mod node_harness;
pub mod target;

mod backend;
mod error;

pub use backend::{Backend, Prepared};
pub use compiler::{Artifact, ArtifactManifest, Compiler, StagingCompiler};
pub use config::{BackendConfig, PrepareOptions};
pub use error::{BackendError, CompileError, ConfigError, ExecutionError};
pub use target::ExecutionTarget;
