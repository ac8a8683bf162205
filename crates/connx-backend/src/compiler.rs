use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use connx_ir::Model;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;

/// File name of the serialized model inside an artifact directory.
pub const MODEL_FILE: &str = "model.onnx";

/// File name of the artifact manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Turns a validated model into files the runtime can load.
pub trait Compiler {
    /// Populate `out_dir` with a loadable artifact. The directory exists when this is called.
    fn compile(&self, model: &Model, out_dir: &Path) -> Result<Artifact, CompileError>;
}

/// Files written by a [`Compiler`], relative to the artifact directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    pub files: Vec<PathBuf>,
}

/// Compiler that stages the serialized model for the runtime to load.
#[derive(Debug, Clone, Default)]
pub struct StagingCompiler {
    development: bool,
}

impl StagingCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write a readable dump of the graph next to the model.
    pub fn development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }
}

impl Compiler for StagingCompiler {
    fn compile(&self, model: &Model, out_dir: &Path) -> Result<Artifact, CompileError> {
        let model_file = out_dir.join(MODEL_FILE);
        log::debug!("Writing model file: {model_file:?}");
        connx_ir::save_model(model, &model_file)?;

        let mut files = vec![PathBuf::from(MODEL_FILE)];
        if self.development {
            let graph_file = out_dir.join("model.graph.txt");
            log::debug!("Writing debug graph file: {graph_file:?}");
            fs::write(&graph_file, format!("{:#?}", model.graph))?;
            files.push(PathBuf::from("model.graph.txt"));
        }

        Ok(Artifact { files })
    }
}

/// Description of a compiled artifact, written as `manifest.json` next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactManifest {
    /// Files of the artifact, relative to its directory.
    pub files: Vec<PathBuf>,
    /// Graph input names, in order.
    pub inputs: Vec<String>,
    /// Graph output names, in order.
    pub outputs: Vec<String>,
    /// Resolved default-domain operator set version.
    pub opset_version: i64,
}

impl ArtifactManifest {
    pub fn new(model: &Model, artifact: &Artifact, opset_version: i64) -> Self {
        let names = |values: &[connx_ir::ValueInfo]| -> Vec<String> {
            values.iter().map(|v| v.name.clone()).collect()
        };

        let files = artifact
            .files
            .iter()
            .filter(|file| {
                let inside = is_inside(file);
                if !inside {
                    log::warn!(
                        "Leaving {} out of the manifest, it is not inside the artifact directory",
                        file.display()
                    );
                }
                inside
            })
            .cloned()
            .collect();

        Self {
            files,
            inputs: names(&model.graph.inputs),
            outputs: names(&model.graph.outputs),
            opset_version,
        }
    }

    /// Read the manifest of a directory, `None` if there is none.
    pub fn load(dir: &Path) -> Result<Option<Self>, CompileError> {
        match fs::read_to_string(dir.join(MANIFEST_FILE)) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<(), CompileError> {
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Remove the artifact described by a previous manifest in `dir`, if any.
    ///
    /// Only files listed in the manifest are touched. An unreadable manifest is left alone.
    pub fn remove_stale(dir: &Path) -> Result<(), CompileError> {
        let manifest = match Self::load(dir) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => return Ok(()),
            Err(CompileError::Manifest(err)) => {
                log::warn!("Ignoring unreadable manifest in {}: {err}", dir.display());
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        for file in &manifest.files {
            if !is_inside(file) {
                log::warn!("Not removing {}, it is not inside {}", file.display(), dir.display());
                continue;
            }

            let path = dir.join(file);
            log::debug!("Removing stale artifact file {}", path.display());
            match fs::remove_file(&path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }
        }
        fs::remove_file(dir.join(MANIFEST_FILE))?;
        Ok(())
    }
}

/// Whether a manifest entry names a path below the artifact directory.
fn is_inside(file: &Path) -> bool {
    file.components().next().is_some()
        && file
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use connx_ir::{ElementType, Graph, Node, OpsetDeclaration, ValueInfo};

    fn relu_model() -> Model {
        let mut graph = Graph::new("relu");
        graph.inputs = vec![ValueInfo::tensor("x", ElementType::Float32, &[4])];
        graph.outputs = vec![ValueInfo::tensor("y", ElementType::Float32, &[4])];
        graph.nodes = vec![Node::new("Relu", ["x"], ["y"])];
        Model::new(graph).with_opset(OpsetDeclaration::default_domain(14))
    }

    #[test]
    fn staging_compiler_writes_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = relu_model();

        let artifact = StagingCompiler::new().compile(&model, dir.path()).unwrap();
        assert_eq!(artifact.files, vec![PathBuf::from(MODEL_FILE)]);
        assert_eq!(connx_ir::load_model(dir.path().join(MODEL_FILE)).unwrap(), model);
    }

    #[test]
    fn development_mode_dumps_graph() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = StagingCompiler::new()
            .development(true)
            .compile(&relu_model(), dir.path())
            .unwrap();
        assert_eq!(artifact.files.len(), 2);
        let dump = fs::read_to_string(dir.path().join("model.graph.txt")).unwrap();
        assert!(dump.contains("Relu"));
    }

    #[test]
    fn manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model = relu_model();
        let artifact = Artifact {
            files: vec![PathBuf::from(MODEL_FILE)],
        };
        let manifest = ArtifactManifest::new(&model, &artifact, 14);
        assert_eq!(manifest.inputs, vec!["x"]);
        assert_eq!(manifest.outputs, vec!["y"]);

        assert_eq!(ArtifactManifest::load(dir.path()).unwrap(), None);
        manifest.save(dir.path()).unwrap();
        assert_eq!(ArtifactManifest::load(dir.path()).unwrap(), Some(manifest));
    }

    #[test]
    fn remove_stale_only_touches_listed_files() {
        let dir = tempfile::tempdir().unwrap();
        let model = relu_model();
        let artifact = StagingCompiler::new().compile(&model, dir.path()).unwrap();
        ArtifactManifest::new(&model, &artifact, 14)
            .save(dir.path())
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        ArtifactManifest::remove_stale(dir.path()).unwrap();
        assert!(!dir.path().join(MODEL_FILE).exists());
        assert!(!dir.path().join(MANIFEST_FILE).exists());
        assert!(dir.path().join("notes.txt").exists());

        // Nothing left to remove.
        ArtifactManifest::remove_stale(dir.path()).unwrap();
    }

    #[test]
    fn remove_stale_stays_inside_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(root.path().join("victim.txt"), "keep me").unwrap();
        fs::write(out.join("model.onnx"), "stale").unwrap();

        let manifest = ArtifactManifest {
            files: vec![
                PathBuf::from("../victim.txt"),
                root.path().join("victim.txt"),
                PathBuf::from("./model.onnx"),
                PathBuf::from("model.onnx"),
            ],
            inputs: vec![],
            outputs: vec![],
            opset_version: 1,
        };
        manifest.save(&out).unwrap();

        ArtifactManifest::remove_stale(&out).unwrap();
        assert!(root.path().join("victim.txt").exists());
        assert!(!out.join("model.onnx").exists());
        assert!(!out.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn escaping_artifact_files_are_not_recorded() {
        let artifact = Artifact {
            files: vec![
                PathBuf::from(MODEL_FILE),
                PathBuf::from("../elsewhere.bin"),
                PathBuf::from("/tmp/absolute.bin"),
                PathBuf::new(),
                PathBuf::from("weights/w0.bin"),
            ],
        };

        let manifest = ArtifactManifest::new(&relu_model(), &artifact, 14);
        assert_eq!(
            manifest.files,
            vec![PathBuf::from(MODEL_FILE), PathBuf::from("weights/w0.bin")]
        );
    }

    #[test]
    fn unreadable_manifest_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "not json").unwrap();
        ArtifactManifest::remove_stale(dir.path()).unwrap();
        assert!(dir.path().join(MANIFEST_FILE).exists());
    }
}
