//! In-memory representation of an ONNX model.
//!
//! The types mirror the subset of `ModelProto` the backend works with: one graph of nodes,
//! the declared operator sets and the input/output signatures.

use core::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::tensor::TensorValue;

/// IR version written into the models this crate synthesizes.
pub const IR_VERSION: i64 = 10;

/// The default ONNX operator domain.
pub const DEFAULT_DOMAIN: &str = "";

/// Alias of the default domain accepted in operator set declarations.
pub const ONNX_DOMAIN_ALIAS: &str = "ai.onnx";

/// Whether the domain names the default ONNX operator set.
pub fn is_default_domain(domain: &str) -> bool {
    domain == DEFAULT_DOMAIN || domain == ONNX_DOMAIN_ALIAS
}

/// A `(domain, version)` pair asserting which versioned operator vocabulary a model uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpsetDeclaration {
    /// Operator domain, empty for the default ONNX domain.
    pub domain: String,
    /// Operator set version.
    pub version: i64,
}

impl OpsetDeclaration {
    /// Create a declaration for any domain.
    pub fn new(domain: impl Into<String>, version: i64) -> Self {
        Self {
            domain: domain.into(),
            version,
        }
    }

    /// Create a declaration for the default ONNX domain.
    pub fn default_domain(version: i64) -> Self {
        Self::new(DEFAULT_DOMAIN, version)
    }
}

impl fmt::Display for OpsetDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.domain.is_empty() {
            write!(f, "ai.onnx v{}", self.version)
        } else {
            write!(f, "{} v{}", self.domain, self.version)
        }
    }
}

/// The type of a tensor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum ElementType {
    Float32,
    Uint8,
    Int8,
    Uint16,
    Int16,
    Int32,
    Int64,
    String,
    Bool,
    Float16,
    Float64,
    Uint32,
    Uint64,
    BFloat16,
}

impl ElementType {
    /// Size in bytes of one element, `None` for variable sized strings.
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::Bool | Self::Uint8 | Self::Int8 => Some(1),
            Self::Uint16 | Self::Int16 | Self::Float16 | Self::BFloat16 => Some(2),
            Self::Float32 | Self::Int32 | Self::Uint32 => Some(4),
            Self::Float64 | Self::Int64 | Self::Uint64 => Some(8),
            Self::String => None,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64
        )
    }
}

/// One dimension of a value signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Known extent.
    Value(i64),
    /// Symbolic extent, e.g. `batch`.
    Param(String),
    /// Neither a value nor a symbol was given.
    Unknown,
}

/// Name, element type and shape of a graph input, output or intermediate value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    /// The value name.
    pub name: String,
    /// The element type of the tensor.
    pub elem_type: ElementType,
    /// The shape, `None` when the rank is unknown.
    pub shape: Option<Vec<Dim>>,
}

impl ValueInfo {
    /// Create a tensor signature with a fully known shape.
    pub fn tensor(name: impl Into<String>, elem_type: ElementType, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            elem_type,
            shape: Some(shape.iter().map(|&d| Dim::Value(d as i64)).collect()),
        }
    }

    /// The rank, if known.
    pub fn rank(&self) -> Option<usize> {
        self.shape.as_ref().map(Vec::len)
    }

    /// The shape if every dimension is a known value.
    pub fn static_shape(&self) -> Option<Vec<usize>> {
        self.shape
            .as_ref()?
            .iter()
            .map(|dim| match dim {
                Dim::Value(v) if *v >= 0 => Some(*v as usize),
                _ => None,
            })
            .collect()
    }
}

/// The value of a node attribute.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum AttributeValue {
    Float32(f32),
    Float32s(Vec<f32>),
    Int64(i64),
    Int64s(Vec<i64>),
    String(String),
    Strings(Vec<String>),
    Tensor(TensorValue),
    Tensors(Vec<TensorValue>),
    /// Subgraph of a control flow operator.
    Graph(Box<Graph>),
    Graphs(Vec<Graph>),
}

/// A named attribute of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// The attribute name.
    pub name: String,
    /// The attribute value.
    pub value: AttributeValue,
}

/// A single operator invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    /// The name of the node, may be empty.
    pub name: String,
    /// The operator type, e.g. `Add`.
    pub op_type: String,
    /// The operator domain, empty for the default ONNX domain.
    pub domain: String,
    /// Names of the input values, in slot order. Empty names mark omitted optional inputs.
    pub inputs: Vec<String>,
    /// Names of the output values, in slot order.
    pub outputs: Vec<String>,
    /// Attributes in declaration order.
    pub attributes: Vec<Attribute>,
}

impl Node {
    /// Create a default-domain node.
    pub fn new<I, O, S1, S2>(op_type: impl Into<String>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator<Item = S1>,
        O: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            op_type: op_type.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the node name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the operator domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Append an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            value,
        });
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| &attr.value)
    }
}

/// A constant tensor bound to a value name.
#[derive(Debug, Clone, PartialEq)]
pub struct Initializer {
    /// The value name.
    pub name: String,
    /// The tensor data.
    pub value: TensorValue,
}

/// ONNX graph representation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Graph {
    /// The graph name.
    pub name: String,
    /// The nodes of the graph, in topological order.
    pub nodes: Vec<Node>,
    /// The inputs of the graph.
    pub inputs: Vec<ValueInfo>,
    /// The outputs of the graph.
    pub outputs: Vec<ValueInfo>,
    /// Constant values.
    pub initializers: Vec<Initializer>,
    /// Signatures of intermediate values.
    pub value_info: Vec<ValueInfo>,
    /// Free-form documentation.
    pub doc_string: String,
}

impl Graph {
    /// Create an empty graph with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A model: one graph plus the operator sets it was authored against.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// The ONNX IR version.
    pub ir_version: i64,
    /// Declared operator sets.
    pub opset_imports: Vec<OpsetDeclaration>,
    /// Name of the tool that produced the model.
    pub producer_name: String,
    /// Version of the tool that produced the model.
    pub producer_version: String,
    /// Model namespace.
    pub domain: String,
    /// Model version.
    pub model_version: i64,
    /// Free-form documentation.
    pub doc_string: String,
    /// The computation graph.
    pub graph: Graph,
}

impl Model {
    /// Wrap a graph into a model without operator set declarations.
    pub fn new(graph: Graph) -> Self {
        Self {
            ir_version: IR_VERSION,
            opset_imports: Vec::new(),
            producer_name: String::from("connx-backend"),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            domain: String::new(),
            model_version: 0,
            doc_string: String::new(),
            graph,
        }
    }

    /// Append an operator set declaration.
    pub fn with_opset(mut self, opset: OpsetDeclaration) -> Self {
        self.opset_imports.push(opset);
        self
    }

    /// The declared version of the default ONNX domain, if any.
    pub fn default_opset_version(&self) -> Option<i64> {
        self.opset_imports
            .iter()
            .filter(|opset| is_default_domain(&opset.domain))
            .map(|opset| opset.version)
            .max()
    }
}
