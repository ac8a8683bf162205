#![allow(missing_docs)]

use crate::ir::ElementType;

/// Error type for parsing ONNX protobuf data into the IR and back.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protobuf error: {0}")]
    Protobuf(#[from] protobuf::Error),

    #[error("Unsupported ONNX data type {0}")]
    UnsupportedDataType(i32),

    #[error("Value '{name}' is not a tensor ({kind})")]
    UnsupportedValueType { name: String, kind: String },

    #[error("Attribute '{name}' has unsupported type {kind}")]
    UnsupportedAttribute { name: String, kind: String },

    #[error("Tensor '{name}' stores its data externally, which is not supported")]
    ExternalData { name: String },

    #[error("Tensor '{name}' has negative dimensions {dims:?}")]
    NegativeDimension { name: String, dims: Vec<i64> },

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),
}

/// Error type for typed access to tensor values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("Element type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ElementType,
        actual: ElementType,
    },

    #[error("Payload holds {actual} bytes but the shape requires {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Element type {0} has no fixed-size binary representation")]
    UnsupportedElementType(ElementType),

    #[error("Shape {0:?} is too large to address")]
    SizeOverflow(Vec<usize>),
}

/// A structural defect found by [`check_model`](crate::check_model).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid IR version {0}")]
    InvalidIrVersion(i64),

    #[error("Operator set '{domain}' has invalid version {version}")]
    InvalidOpsetVersion { domain: String, version: i64 },

    #[error("Operator set '{0}' is declared more than once")]
    DuplicateOpsetDomain(String),

    #[error("Node {index} ('{name}') has no operator type")]
    EmptyOpType { index: usize, name: String },

    #[error("Graph {0} has a value without a name")]
    UnnamedValue(&'static str),

    #[error("Graph input '{0}' is declared more than once")]
    DuplicateGraphInput(String),

    #[error("Value '{0}' is assigned more than once")]
    DuplicateValue(String),

    #[error("Node {index} ('{op_type}') reads '{input}' before it is defined")]
    UndefinedInput {
        index: usize,
        op_type: String,
        input: String,
    },

    #[error("Graph output '{0}' is never produced")]
    UndefinedOutput(String),

    #[error("Initializer '{name}' is malformed: {reason}")]
    MalformedInitializer { name: String, reason: String },
}
