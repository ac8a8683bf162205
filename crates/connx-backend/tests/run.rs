#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use connx_backend::{Backend, BackendConfig, BackendError, ExecutionError, PrepareOptions};
use connx_ir::{ElementType, Graph, Model, Node, OpsetDeclaration, TensorValue, ValueInfo};

/// Echoes every input file back as an output, after checking the artifact is in place.
const ECHO_RUNTIME: &str = r#"#!/bin/sh
[ -f "$1/model.onnx" ] || { echo "no model in $1" >&2; exit 7; }
[ "$2" = "-o" ] || exit 8
out="$3"
shift 3
i=0
for f in "$@"; do
  cp "$f" "$out/output_$i.pb"
  i=$((i+1))
done
"#;

const FAILING_RUNTIME: &str = "#!/bin/sh\necho \"unsupported operator Relu\" >&2\nexit 3\n";

const SILENT_RUNTIME: &str = "#!/bin/sh\nexit 0\n";

struct Runtimes {
    echo: PathBuf,
    failing: PathBuf,
    silent: PathBuf,
}

// All scripts are written before any test spawns one, so no script is open for writing
// while another thread executes it.
fn runtimes() -> &'static Runtimes {
    static RUNTIMES: OnceLock<Runtimes> = OnceLock::new();
    RUNTIMES.get_or_init(|| {
        let dir = tempfile::Builder::new()
            .prefix("connx.runtimes.")
            .tempdir()
            .unwrap()
            .keep();
        let write = |name: &str, script: &str| {
            let path = dir.join(name);
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        };

        Runtimes {
            echo: write("echo", ECHO_RUNTIME),
            failing: write("failing", FAILING_RUNTIME),
            silent: write("silent", SILENT_RUNTIME),
        }
    })
}

fn backend(runtime: &Path) -> Backend {
    Backend::new(
        BackendConfig::default().with_runtime_candidates([runtime.to_string_lossy().to_string()]),
    )
}

fn identity_model() -> Model {
    let mut graph = Graph::new("identity");
    graph.inputs = vec![ValueInfo::tensor("x", ElementType::Float32, &[2, 2])];
    graph.outputs = vec![ValueInfo::tensor("y", ElementType::Float32, &[2, 2])];
    graph.nodes = vec![Node::new("Identity", ["x"], ["y"])];
    Model::new(graph).with_opset(OpsetDeclaration::default_domain(LATEST))
}

const LATEST: i64 = connx_ir::LATEST_OPSET_VERSION;

#[test]
fn outputs_come_back_from_the_runtime() {
    let backend = backend(&runtimes().echo);
    let input = TensorValue::new(vec![1.0f32, -2.0, 3.5, 0.0], vec![2, 2]);

    let prepared = backend
        .prepare(&identity_model(), &PrepareOptions::default())
        .unwrap();
    let dir = prepared.target.dir().to_path_buf();
    assert!(dir.join("model.onnx").exists());

    let outputs = prepared.run(std::slice::from_ref(&input)).unwrap();
    assert_eq!(outputs, vec![input]);

    prepared.target.dispose().unwrap();
    assert!(!dir.exists());
}

#[test]
fn run_model_keeps_caller_owned_out() {
    let backend = backend(&runtimes().echo);
    let scratch = tempfile::tempdir().unwrap();
    let input = TensorValue::new(vec![5.0f32; 4], vec![2, 2]);

    let outputs = backend
        .run_model(
            &identity_model(),
            std::slice::from_ref(&input),
            &PrepareOptions::default().with_out(scratch.path()),
        )
        .unwrap();

    assert_eq!(outputs, vec![input]);
    assert!(scratch.path().join("model.onnx").exists());
    assert!(scratch.path().join("manifest.json").exists());
}

#[test]
fn only_declared_outputs_are_read() {
    let backend = backend(&runtimes().echo);
    let node = Node::new("Add", ["a", "b"], ["sum"]).with_name("add");
    let a = TensorValue::new(vec![1i32, 2, 3], vec![3]);
    let b = TensorValue::new(vec![4i32, 5, 6], vec![3]);

    // The echo runtime writes two files, the single-node model declares one output.
    let outputs = backend
        .run_node(&node, &[a.clone(), b], None)
        .unwrap();
    assert_eq!(outputs, vec![a]);
}

#[test]
fn run_node_ignores_output_signatures() {
    let backend = backend(&runtimes().echo);
    let node = Node::new("Relu", ["x"], ["y"]).with_name("relu");
    let x = TensorValue::new(vec![-1.0f32, 1.0], vec![2]);
    let info = [ValueInfo::tensor("y", ElementType::Float64, &[7])];

    let with_info = backend
        .run_node(&node, std::slice::from_ref(&x), Some(&info))
        .unwrap();
    let without_info = backend
        .run_node(&node, std::slice::from_ref(&x), None)
        .unwrap();
    assert_eq!(with_info, without_info);
}

#[test]
fn run_node_rejects_wrong_input_count() {
    let backend = backend(&runtimes().echo);
    let node = Node::new("Add", ["a", "b"], ["sum"]);

    let err = backend
        .run_node(&node, &[TensorValue::new(vec![1.0f32], vec![1])], None)
        .unwrap_err();
    assert!(matches!(
        err,
        BackendError::InputCountMismatch {
            expected: 2,
            actual: 1
        }
    ));
}

#[test]
fn runtime_failure_reports_stderr() {
    let backend = backend(&runtimes().failing);
    let prepared = backend
        .prepare(&identity_model(), &PrepareOptions::default())
        .unwrap();

    let err = prepared
        .run(&[TensorValue::new(vec![0.0f32; 4], vec![2, 2])])
        .unwrap_err();
    match err {
        BackendError::Execution(ExecutionError::Failed { status, stderr }) => {
            assert_eq!(status.code(), Some(3));
            assert_eq!(stderr, "unsupported operator Relu");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_outputs_are_reported() {
    let backend = backend(&runtimes().silent);
    let err = backend
        .run_model(
            &identity_model(),
            &[TensorValue::new(vec![0.0f32; 4], vec![2, 2])],
            &PrepareOptions::default(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        BackendError::Execution(ExecutionError::MissingOutput(path)) if path.ends_with("output_0.pb")
    ));
}
