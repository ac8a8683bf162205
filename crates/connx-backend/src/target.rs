use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use connx_ir::TensorValue;

use crate::compiler::ArtifactManifest;
use crate::error::{BackendError, ExecutionError};

/// A compiled artifact bound to the runtime that executes it.
///
/// A directory owned by the target is removed by [`dispose`](Self::dispose) or on drop. A
/// caller-owned directory is never touched.
#[derive(Debug)]
pub struct ExecutionTarget {
    runtime: PathBuf,
    dir: PathBuf,
    owns_dir: bool,
    disposed: bool,
}

impl ExecutionTarget {
    pub fn new(runtime: impl Into<PathBuf>, dir: impl Into<PathBuf>, owns_dir: bool) -> Self {
        Self {
            runtime: runtime.into(),
            dir: dir.into(),
            owns_dir,
            disposed: false,
        }
    }

    /// Path of the runtime executable.
    pub fn runtime(&self) -> &Path {
        &self.runtime
    }

    /// Directory holding the compiled artifact.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the directory is removed together with the target.
    pub fn owns_dir(&self) -> bool {
        self.owns_dir
    }

    /// Run the artifact on the given inputs and collect its outputs.
    ///
    /// Inputs are written as `input_<i>.pb` tensor files into a scratch directory and the
    /// runtime is invoked as `<runtime> <artifact dir> -o <scratch dir> <input files...>`. It is
    /// expected to leave `output_<i>.pb` files in the scratch directory.
    pub fn run(&self, inputs: &[TensorValue]) -> Result<Vec<TensorValue>, BackendError> {
        let manifest =
            ArtifactManifest::load(&self.dir).map_err(|source| ExecutionError::InvalidManifest {
                dir: self.dir.clone(),
                source,
            })?;
        let scratch = tempfile::Builder::new().prefix("connx.run.").tempdir()?;

        let mut input_files = Vec::with_capacity(inputs.len());
        for (i, input) in inputs.iter().enumerate() {
            let name = manifest
                .as_ref()
                .and_then(|m| m.inputs.get(i).cloned())
                .unwrap_or_else(|| format!("input_{i}"));
            let path = scratch.path().join(format!("input_{i}.pb"));
            connx_ir::save_tensor(&name, input, &path)?;
            input_files.push(path);
        }

        log::debug!(
            "Running {} on {} with {} inputs",
            self.runtime.display(),
            self.dir.display(),
            inputs.len()
        );
        let output = Command::new(&self.runtime)
            .arg(&self.dir)
            .arg("-o")
            .arg(scratch.path())
            .args(&input_files)
            .output()
            .map_err(|source| ExecutionError::Spawn {
                path: self.runtime.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExecutionError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let expected = manifest.as_ref().map(|m| m.outputs.len());
        Ok(read_outputs(scratch.path(), expected)?)
    }

    /// Remove an owned artifact directory now, reporting failures.
    pub fn dispose(mut self) -> Result<(), BackendError> {
        self.disposed = true;
        if self.owns_dir {
            log::debug!("Removing artifact directory {}", self.dir.display());
            remove_dir(&self.dir)?;
        }
        Ok(())
    }
}

impl Drop for ExecutionTarget {
    fn drop(&mut self) {
        if self.owns_dir
            && !self.disposed
            && let Err(err) = remove_dir(&self.dir)
        {
            log::warn!(
                "Failed to remove artifact directory {}: {err}",
                self.dir.display()
            );
        }
    }
}

fn remove_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

/// Read `output_<i>.pb` files in index order.
///
/// With a known output count every file must exist. Otherwise reading stops at the first
/// missing index.
fn read_outputs(dir: &Path, expected: Option<usize>) -> Result<Vec<TensorValue>, ExecutionError> {
    let mut outputs = Vec::new();
    for i in 0.. {
        if expected.is_some_and(|n| i >= n) {
            break;
        }

        let path = dir.join(format!("output_{i}.pb"));
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if expected.is_some() {
                    return Err(ExecutionError::MissingOutput(path));
                }
                break;
            }
            Err(err) => return Err(err.into()),
        };

        let tensor = connx_ir::parse_tensor(&bytes)
            .map_err(|source| ExecutionError::MalformedOutput { path, source })?;
        outputs.push(tensor);
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_dir() -> PathBuf {
        tempfile::Builder::new()
            .prefix("connx.test.")
            .tempdir()
            .unwrap()
            .keep()
    }

    #[test]
    fn dispose_removes_owned_dir() {
        let dir = owned_dir();
        let target = ExecutionTarget::new("connx", &dir, true);
        target.dispose().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn drop_removes_owned_dir() {
        let dir = owned_dir();
        drop(ExecutionTarget::new("connx", &dir, true));
        assert!(!dir.exists());
    }

    #[test]
    fn caller_owned_dir_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let target = ExecutionTarget::new("connx", dir.path(), false);
        assert!(!target.owns_dir());
        target.dispose().unwrap();
        drop(ExecutionTarget::new("connx", dir.path(), false));
        assert!(dir.path().exists());
    }

    #[test]
    fn unreadable_manifest_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(crate::compiler::MANIFEST_FILE), "not json").unwrap();
        let target = ExecutionTarget::new("connx", dir.path(), false);

        let err = target.run(&[]).unwrap_err();
        assert!(matches!(
            err,
            BackendError::Execution(ExecutionError::InvalidManifest { dir: ref path, .. })
                if path == dir.path()
        ));
    }

    #[test]
    fn dispose_of_vanished_dir_is_ok() {
        let dir = owned_dir();
        fs::remove_dir_all(&dir).unwrap();
        ExecutionTarget::new("connx", &dir, true).dispose().unwrap();
    }

    #[test]
    fn missing_runtime_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let target = ExecutionTarget::new(dir.path().join("no-connx"), dir.path(), false);
        assert!(matches!(
            target.run(&[]),
            Err(BackendError::Execution(ExecutionError::Spawn { .. }))
        ));
    }

    #[test]
    fn outputs_are_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = TensorValue::new(vec![1.0f32], vec![1]);
        let b = TensorValue::new(vec![2i64, 3], vec![2]);
        connx_ir::save_tensor("a", &a, dir.path().join("output_0.pb")).unwrap();
        connx_ir::save_tensor("b", &b, dir.path().join("output_1.pb")).unwrap();
        connx_ir::save_tensor("c", &a, dir.path().join("output_3.pb")).unwrap();

        assert_eq!(read_outputs(dir.path(), None).unwrap(), vec![a.clone(), b.clone()]);
        assert_eq!(read_outputs(dir.path(), Some(1)).unwrap(), vec![a]);
        assert!(matches!(
            read_outputs(dir.path(), Some(3)),
            Err(ExecutionError::MissingOutput(path)) if path.ends_with("output_2.pb")
        ));
    }

    #[test]
    fn malformed_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("output_0.pb"), [0xff, 0xff, 0xff]).unwrap();
        assert!(matches!(
            read_outputs(dir.path(), None),
            Err(ExecutionError::MalformedOutput { .. })
        ));
    }
}
