use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use connx_ir::{
    ConnxOpsetResolver, Model, Node, OpsetDeclaration, OpsetResolver, TensorValue, ValueInfo,
};

use crate::compat;
use crate::compiler::{ArtifactManifest, Compiler, StagingCompiler};
use crate::config::{BackendConfig, PrepareOptions};
use crate::error::BackendError;
use crate::locate::locate_runtime;
use crate::node_harness::single_node_model;
use crate::target::ExecutionTarget;

/// Entry point for checking, preparing and running models on the connx runtime.
pub struct Backend {
    config: BackendConfig,
    compiler: Box<dyn Compiler>,
    resolver: Box<dyn OpsetResolver>,
}

/// Result of [`Backend::prepare`]: the model that was compiled and the target that runs it.
#[derive(Debug)]
pub struct Prepared {
    /// The validated model, including any injected operator set declaration.
    pub model: Model,
    /// The compiled artifact bound to the runtime.
    pub target: ExecutionTarget,
}

impl Prepared {
    /// Run the prepared artifact.
    pub fn run(&self, inputs: &[TensorValue]) -> Result<Vec<TensorValue>, BackendError> {
        self.target.run(inputs)
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

impl Backend {
    /// Create a backend with the staging compiler and the built-in operator table.
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            compiler: Box::new(StagingCompiler::new()),
            resolver: Box::new(ConnxOpsetResolver),
        }
    }

    /// Replace the compile stage.
    pub fn with_compiler(mut self, compiler: impl Compiler + 'static) -> Self {
        self.compiler = Box::new(compiler);
        self
    }

    /// Replace the operator set resolver.
    pub fn with_resolver(mut self, resolver: impl OpsetResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Whether every operator of the model is implemented at its declared operator set.
    pub fn is_compatible(&self, model: &Model) -> bool {
        compat::is_compatible(model, self.resolver.as_ref())
    }

    /// Validate and compile a model into an execution target.
    ///
    /// The caller's model is left untouched; the returned copy carries a `("", 1)` declaration
    /// when the original declared no operator set. Nothing is written to disk when validation
    /// fails or the runtime cannot be found. A temporary artifact directory is removed again if
    /// compilation fails, while a caller-supplied `out` keeps whatever was written.
    pub fn prepare(
        &self,
        model: &Model,
        options: &PrepareOptions,
    ) -> Result<Prepared, BackendError> {
        connx_ir::check_model(model)?;

        let mut model = model.clone();
        if model.opset_imports.is_empty() {
            log::info!("Model declares no operator set, assuming ai.onnx v1");
            model.opset_imports.push(OpsetDeclaration::default_domain(1));
        }

        let runtime = locate_runtime(&self.config.runtime_candidates).ok_or_else(|| {
            BackendError::RuntimeNotFound {
                candidates: self.config.runtime_candidates.clone(),
            }
        })?;

        // Owned directories are cleaned up by the target if anything below fails.
        let target = match &options.out {
            Some(out) => {
                fs::create_dir_all(out)?;
                ExecutionTarget::new(runtime, out, false)
            }
            None => ExecutionTarget::new(runtime, unique_temp_dir()?, true),
        };
        log::debug!("Output directory: {:?}", target.dir());

        ArtifactManifest::remove_stale(target.dir())?;
        let artifact = self.compiler.compile(&model, target.dir())?;

        let (_, opset_version) = self.resolver.resolve(&model.opset_imports);
        ArtifactManifest::new(&model, &artifact, opset_version).save(target.dir())?;
        log::info!("Model compiled into {}", target.dir().display());

        Ok(Prepared { model, target })
    }

    /// Prepare a model, run it once and dispose of the target.
    pub fn run_model(
        &self,
        model: &Model,
        inputs: &[TensorValue],
        options: &PrepareOptions,
    ) -> Result<Vec<TensorValue>, BackendError> {
        let prepared = self.prepare(model, options)?;
        let outputs = prepared.run(inputs)?;
        prepared.target.dispose()?;
        Ok(outputs)
    }

    /// Run a single node on the given inputs.
    ///
    /// `outputs_info` is accepted for harness compatibility but has no effect.
    pub fn run_node(
        &self,
        node: &Node,
        inputs: &[TensorValue],
        outputs_info: Option<&[ValueInfo]>,
    ) -> Result<Vec<TensorValue>, BackendError> {
        if let Some(info) = outputs_info {
            log::debug!("Ignoring {} output signatures for node {}", info.len(), node.name);
        }

        let model = single_node_model(node, inputs)?;
        self.run_model(&model, inputs, &PrepareOptions::default())
    }

    /// Whether the backend can execute on the named device.
    pub fn supports_device(device: &str) -> bool {
        matches!(device, "CPU" | "cpu")
    }
}

/// Create a fresh directory under the system temp root, named after the current time plus
/// random characters.
fn unique_temp_dir() -> std::io::Result<PathBuf> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let prefix = format!("connx.{}.{}.", now.as_secs(), now.subsec_nanos());

    Ok(tempfile::Builder::new().prefix(&prefix).tempdir()?.keep())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devices() {
        assert!(Backend::supports_device("CPU"));
        assert!(Backend::supports_device("cpu"));
        assert!(!Backend::supports_device("CUDA"));
        assert!(!Backend::supports_device("Cpu"));
    }

    #[test]
    fn temp_dirs_are_distinct() {
        let a = unique_temp_dir().unwrap();
        let b = unique_temp_dir().unwrap();
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("connx."));
        fs::remove_dir_all(a).unwrap();
        fs::remove_dir_all(b).unwrap();
    }
}
