//! Conversion between the generated ONNX protobuf messages and the IR types.

use std::fs;
use std::path::Path;

use bytes::Bytes;
use protobuf::{Enum, EnumOrUnknown, Message, MessageField};

use crate::error::ParseError;
use crate::ir::{
    Attribute, AttributeValue, Dim, ElementType, Graph, Initializer, Model, Node,
    OpsetDeclaration, ValueInfo,
};
use crate::protos::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto, attribute_proto::AttributeType,
    tensor_proto::DataLocation, tensor_proto::DataType as DT, tensor_shape_proto::Dimension,
    tensor_shape_proto::dimension::Value, type_proto,
};
use crate::tensor::TensorValue;

/// Convert ONNX protobuf DataType to ElementType
pub fn element_type_from_proto(dt_i32: i32) -> Result<ElementType, ParseError> {
    match DT::from_i32(dt_i32).ok_or(ParseError::UnsupportedDataType(dt_i32))? {
        DT::FLOAT => Ok(ElementType::Float32),
        DT::UINT8 => Ok(ElementType::Uint8),
        DT::INT8 => Ok(ElementType::Int8),
        DT::UINT16 => Ok(ElementType::Uint16),
        DT::INT16 => Ok(ElementType::Int16),
        DT::INT32 => Ok(ElementType::Int32),
        DT::INT64 => Ok(ElementType::Int64),
        DT::STRING => Ok(ElementType::String),
        DT::BOOL => Ok(ElementType::Bool),
        DT::FLOAT16 => Ok(ElementType::Float16),
        DT::DOUBLE => Ok(ElementType::Float64),
        DT::UINT32 => Ok(ElementType::Uint32),
        DT::UINT64 => Ok(ElementType::Uint64),
        DT::BFLOAT16 => Ok(ElementType::BFloat16),
        _ => Err(ParseError::UnsupportedDataType(dt_i32)),
    }
}

/// Convert ElementType to the ONNX protobuf DataType code
pub fn element_type_to_proto(elem_type: ElementType) -> i32 {
    let dt = match elem_type {
        ElementType::Float32 => DT::FLOAT,
        ElementType::Uint8 => DT::UINT8,
        ElementType::Int8 => DT::INT8,
        ElementType::Uint16 => DT::UINT16,
        ElementType::Int16 => DT::INT16,
        ElementType::Int32 => DT::INT32,
        ElementType::Int64 => DT::INT64,
        ElementType::String => DT::STRING,
        ElementType::Bool => DT::BOOL,
        ElementType::Float16 => DT::FLOAT16,
        ElementType::Float64 => DT::DOUBLE,
        ElementType::Uint32 => DT::UINT32,
        ElementType::Uint64 => DT::UINT64,
        ElementType::BFloat16 => DT::BFLOAT16,
    };
    dt.value()
}

/// Helper to convert a slice of POD elements to bytes::Bytes
fn vec_to_bytes<T: bytemuck::Pod>(data: &[T]) -> Bytes {
    Bytes::copy_from_slice(bytemuck::cast_slice(data))
}

fn narrow<T: bytemuck::Pod>(data: &[i32], cast: impl Fn(i32) -> T) -> Bytes {
    let narrowed: Vec<T> = data.iter().map(|&x| cast(x)).collect();
    vec_to_bytes(&narrowed)
}

/// Decode a tensor from either `raw_data` or the typed repeated fields.
///
/// Narrow integer types, booleans and 16-bit floats are stored widened in `int32_data` (the
/// floats as bit patterns), 32-bit unsigned integers in `uint64_data`.
impl TryFrom<TensorProto> for TensorValue {
    type Error = ParseError;

    fn try_from(tensor: TensorProto) -> Result<TensorValue, Self::Error> {
        let elem_type = element_type_from_proto(tensor.data_type)?;

        if tensor.data_location.enum_value() == Ok(DataLocation::EXTERNAL)
            || !tensor.external_data.is_empty()
        {
            return Err(ParseError::ExternalData { name: tensor.name });
        }

        if tensor.dims.iter().any(|&d| d < 0) {
            return Err(ParseError::NegativeDimension {
                name: tensor.name,
                dims: tensor.dims,
            });
        }
        let shape = tensor
            .dims
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                crate::TensorError::SizeOverflow(tensor.dims.iter().map(|&d| d as usize).collect())
            })?;

        let bytes = if !tensor.raw_data.is_empty() {
            tensor.raw_data
        } else {
            match elem_type {
                ElementType::Float32 => vec_to_bytes(&tensor.float_data),
                ElementType::Float64 => vec_to_bytes(&tensor.double_data),
                ElementType::Int32 => vec_to_bytes(&tensor.int32_data),
                ElementType::Int64 => vec_to_bytes(&tensor.int64_data),
                ElementType::Uint64 => vec_to_bytes(&tensor.uint64_data),
                ElementType::Uint32 => {
                    let data: Vec<u32> = tensor.uint64_data.iter().map(|&x| x as u32).collect();
                    vec_to_bytes(&data)
                }
                ElementType::Int8 => narrow(&tensor.int32_data, |x| x as i8),
                ElementType::Int16 => narrow(&tensor.int32_data, |x| x as i16),
                ElementType::Uint8 => narrow(&tensor.int32_data, |x| x as u8),
                ElementType::Bool => narrow(&tensor.int32_data, |x| (x != 0) as u8),
                ElementType::Uint16 | ElementType::Float16 | ElementType::BFloat16 => {
                    narrow(&tensor.int32_data, |x| x as u16)
                }
                ElementType::String => {
                    return Err(crate::TensorError::UnsupportedElementType(elem_type).into());
                }
            }
        };

        Ok(TensorValue::from_bytes(elem_type, shape, bytes)?)
    }
}

/// Encode a tensor with its payload in `raw_data`.
impl From<&TensorValue> for TensorProto {
    fn from(value: &TensorValue) -> Self {
        TensorProto {
            dims: value.shape().iter().map(|&d| d as i64).collect(),
            data_type: element_type_to_proto(value.elem_type()),
            raw_data: value.bytes(),
            ..Default::default()
        }
    }
}

fn tensor_to_named_proto(name: &str, value: &TensorValue) -> TensorProto {
    let mut proto = TensorProto::from(value);
    proto.name = name.to_string();
    proto
}

fn convert_dim(dim: Dimension) -> Dim {
    match dim.value {
        Some(Value::DimValue(v)) => Dim::Value(v),
        Some(Value::DimParam(p)) => Dim::Param(p),
        None => Dim::Unknown,
    }
}

fn value_kind(ty: &TypeProto) -> &'static str {
    match ty.value {
        Some(type_proto::Value::TensorType(_)) => "tensor",
        Some(type_proto::Value::SequenceType(_)) => "sequence",
        Some(type_proto::Value::MapType(_)) => "map",
        Some(type_proto::Value::OptionalType(_)) => "optional",
        Some(type_proto::Value::SparseTensorType(_)) => "sparse tensor",
        None => "untyped",
    }
}

impl TryFrom<ValueInfoProto> for ValueInfo {
    type Error = ParseError;

    fn try_from(value: ValueInfoProto) -> Result<ValueInfo, Self::Error> {
        let ty = value.type_.into_option().unwrap_or_default();
        let kind = value_kind(&ty);
        let tensor = match ty.value {
            Some(type_proto::Value::TensorType(tensor)) => tensor,
            _ => {
                return Err(ParseError::UnsupportedValueType {
                    name: value.name,
                    kind: kind.to_string(),
                });
            }
        };

        let elem_type = element_type_from_proto(tensor.elem_type)?;
        let shape = tensor
            .shape
            .into_option()
            .map(|shape| shape.dim.into_iter().map(convert_dim).collect());

        Ok(ValueInfo {
            name: value.name,
            elem_type,
            shape,
        })
    }
}

impl From<&ValueInfo> for ValueInfoProto {
    fn from(info: &ValueInfo) -> Self {
        let mut tensor = type_proto::Tensor {
            elem_type: element_type_to_proto(info.elem_type),
            ..Default::default()
        };
        if let Some(shape) = &info.shape {
            let dim = shape
                .iter()
                .map(|d| Dimension {
                    value: match d {
                        Dim::Value(v) => Some(Value::DimValue(*v)),
                        Dim::Param(p) => Some(Value::DimParam(p.clone())),
                        Dim::Unknown => None,
                    },
                    ..Default::default()
                })
                .collect();
            tensor.shape = MessageField::some(TensorShapeProto {
                dim,
                ..Default::default()
            });
        }

        let mut ty = TypeProto::new();
        ty.set_tensor_type(tensor);

        ValueInfoProto {
            name: info.name.clone(),
            type_: MessageField::some(ty),
            ..Default::default()
        }
    }
}

fn to_string(bytes: Bytes, context: &str) -> Result<String, ParseError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidUtf8(context.to_string()))
}

fn convert_vec_tensor_proto(tensors: Vec<TensorProto>) -> Result<Vec<TensorValue>, ParseError> {
    tensors.into_iter().map(TensorValue::try_from).collect()
}

impl TryFrom<AttributeProto> for Attribute {
    type Error = ParseError;

    fn try_from(attr: AttributeProto) -> Result<Attribute, Self::Error> {
        let unsupported = |kind: String| ParseError::UnsupportedAttribute {
            name: attr.name.clone(),
            kind,
        };
        let attr_type = attr
            .type_
            .enum_value()
            .map_err(|code| unsupported(format!("code {code}")))?;

        let value = match attr_type {
            AttributeType::FLOAT => AttributeValue::Float32(attr.f),
            AttributeType::INT => AttributeValue::Int64(attr.i),
            AttributeType::STRING => AttributeValue::String(to_string(attr.s, &attr.name)?),
            AttributeType::TENSOR => AttributeValue::Tensor(TensorValue::try_from(
                attr.t.into_option().unwrap_or_default(),
            )?),
            AttributeType::GRAPH => AttributeValue::Graph(Box::new(Graph::try_from(
                attr.g.into_option().unwrap_or_default(),
            )?)),
            AttributeType::FLOATS => AttributeValue::Float32s(attr.floats),
            AttributeType::INTS => AttributeValue::Int64s(attr.ints),
            AttributeType::STRINGS => AttributeValue::Strings(
                attr.strings
                    .into_iter()
                    .map(|s| to_string(s, &attr.name))
                    .collect::<Result<_, _>>()?,
            ),
            AttributeType::TENSORS => {
                AttributeValue::Tensors(convert_vec_tensor_proto(attr.tensors)?)
            }
            AttributeType::GRAPHS => AttributeValue::Graphs(
                attr.graphs
                    .into_iter()
                    .map(Graph::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            other => return Err(unsupported(format!("{other:?}"))),
        };

        Ok(Attribute {
            name: attr.name,
            value,
        })
    }
}

impl From<&Attribute> for AttributeProto {
    fn from(attr: &Attribute) -> Self {
        let mut proto = AttributeProto {
            name: attr.name.clone(),
            ..Default::default()
        };
        let attr_type = match &attr.value {
            AttributeValue::Float32(f) => {
                proto.f = *f;
                AttributeType::FLOAT
            }
            AttributeValue::Float32s(fs) => {
                proto.floats = fs.clone();
                AttributeType::FLOATS
            }
            AttributeValue::Int64(i) => {
                proto.i = *i;
                AttributeType::INT
            }
            AttributeValue::Int64s(is) => {
                proto.ints = is.clone();
                AttributeType::INTS
            }
            AttributeValue::String(s) => {
                proto.s = Bytes::from(s.clone());
                AttributeType::STRING
            }
            AttributeValue::Strings(ss) => {
                proto.strings = ss.iter().cloned().map(Bytes::from).collect();
                AttributeType::STRINGS
            }
            AttributeValue::Tensor(t) => {
                proto.t = MessageField::some(TensorProto::from(t));
                AttributeType::TENSOR
            }
            AttributeValue::Tensors(ts) => {
                proto.tensors = ts.iter().map(TensorProto::from).collect();
                AttributeType::TENSORS
            }
            AttributeValue::Graph(g) => {
                proto.g = MessageField::some(GraphProto::from(g.as_ref()));
                AttributeType::GRAPH
            }
            AttributeValue::Graphs(gs) => {
                proto.graphs = gs.iter().map(GraphProto::from).collect();
                AttributeType::GRAPHS
            }
        };
        proto.type_ = EnumOrUnknown::new(attr_type);
        proto
    }
}

impl TryFrom<NodeProto> for Node {
    type Error = ParseError;

    fn try_from(node: NodeProto) -> Result<Node, Self::Error> {
        let attributes = node
            .attribute
            .into_iter()
            .map(Attribute::try_from)
            .collect::<Result<_, _>>()?;

        Ok(Node {
            name: node.name,
            op_type: node.op_type,
            domain: node.domain,
            inputs: node.input,
            outputs: node.output,
            attributes,
        })
    }
}

impl From<&Node> for NodeProto {
    fn from(node: &Node) -> Self {
        NodeProto {
            input: node.inputs.clone(),
            output: node.outputs.clone(),
            name: node.name.clone(),
            op_type: node.op_type.clone(),
            domain: node.domain.clone(),
            attribute: node.attributes.iter().map(AttributeProto::from).collect(),
            ..Default::default()
        }
    }
}

impl TryFrom<GraphProto> for Graph {
    type Error = ParseError;

    fn try_from(graph: GraphProto) -> Result<Graph, Self::Error> {
        if let Some(sparse) = graph.sparse_initializer.first() {
            return Err(ParseError::UnsupportedValueType {
                name: sparse.values.name.clone(),
                kind: "sparse initializer".to_string(),
            });
        }

        let nodes = graph
            .node
            .into_iter()
            .map(Node::try_from)
            .collect::<Result<_, _>>()?;
        let inputs = graph
            .input
            .into_iter()
            .map(ValueInfo::try_from)
            .collect::<Result<_, _>>()?;
        let outputs = graph
            .output
            .into_iter()
            .map(ValueInfo::try_from)
            .collect::<Result<_, _>>()?;
        let initializers = graph
            .initializer
            .into_iter()
            .map(|tensor| {
                let name = tensor.name.clone();
                TensorValue::try_from(tensor).map(|value| Initializer { name, value })
            })
            .collect::<Result<_, _>>()?;

        // Intermediate annotations are only hints, so non-tensor ones are dropped.
        let mut value_info = Vec::with_capacity(graph.value_info.len());
        for info in graph.value_info {
            let name = info.name.clone();
            match ValueInfo::try_from(info) {
                Ok(info) => value_info.push(info),
                Err(err) => log::debug!("Skipping value info '{name}': {err}"),
            }
        }

        Ok(Graph {
            name: graph.name,
            nodes,
            inputs,
            outputs,
            initializers,
            value_info,
            doc_string: graph.doc_string,
        })
    }
}

impl From<&Graph> for GraphProto {
    fn from(graph: &Graph) -> Self {
        GraphProto {
            node: graph.nodes.iter().map(NodeProto::from).collect(),
            name: graph.name.clone(),
            initializer: graph
                .initializers
                .iter()
                .map(|init| tensor_to_named_proto(&init.name, &init.value))
                .collect(),
            doc_string: graph.doc_string.clone(),
            input: graph.inputs.iter().map(ValueInfoProto::from).collect(),
            output: graph.outputs.iter().map(ValueInfoProto::from).collect(),
            value_info: graph.value_info.iter().map(ValueInfoProto::from).collect(),
            ..Default::default()
        }
    }
}

impl TryFrom<ModelProto> for Model {
    type Error = ParseError;

    fn try_from(model: ModelProto) -> Result<Model, Self::Error> {
        if !model.functions.is_empty() {
            log::warn!(
                "Model declares {} local functions, they are not carried over",
                model.functions.len()
            );
        }
        if !model.metadata_props.is_empty() {
            log::debug!(
                "Dropping {} metadata properties of the model",
                model.metadata_props.len()
            );
        }
        if !model.training_info.is_empty() {
            log::debug!(
                "Dropping {} training info entries of the model",
                model.training_info.len()
            );
        }

        let graph = match model.graph.into_option() {
            Some(graph) => Graph::try_from(graph)?,
            None => Graph::default(),
        };

        Ok(Model {
            ir_version: model.ir_version,
            opset_imports: model
                .opset_import
                .into_iter()
                .map(|opset| OpsetDeclaration::new(opset.domain, opset.version))
                .collect(),
            producer_name: model.producer_name,
            producer_version: model.producer_version,
            domain: model.domain,
            model_version: model.model_version,
            doc_string: model.doc_string,
            graph,
        })
    }
}

impl From<&Model> for ModelProto {
    fn from(model: &Model) -> Self {
        ModelProto {
            ir_version: model.ir_version,
            opset_import: model
                .opset_imports
                .iter()
                .map(|opset| OperatorSetIdProto {
                    domain: opset.domain.clone(),
                    version: opset.version,
                    ..Default::default()
                })
                .collect(),
            producer_name: model.producer_name.clone(),
            producer_version: model.producer_version.clone(),
            domain: model.domain.clone(),
            model_version: model.model_version,
            doc_string: model.doc_string.clone(),
            graph: MessageField::some(GraphProto::from(&model.graph)),
            ..Default::default()
        }
    }
}

/// Decode a serialized `ModelProto`.
pub fn parse_model(bytes: &[u8]) -> Result<Model, ParseError> {
    Model::try_from(ModelProto::parse_from_bytes(bytes)?)
}

/// Read and decode an `.onnx` file.
pub fn load_model(path: impl AsRef<Path>) -> Result<Model, ParseError> {
    let path = path.as_ref();
    log::debug!("Loading model from {}", path.display());
    parse_model(&fs::read(path)?)
}

/// Serialize a model into `ModelProto` bytes.
pub fn model_to_bytes(model: &Model) -> Result<Vec<u8>, ParseError> {
    Ok(ModelProto::from(model).write_to_bytes()?)
}

/// Serialize a model into an `.onnx` file.
pub fn save_model(model: &Model, path: impl AsRef<Path>) -> Result<(), ParseError> {
    fs::write(path, model_to_bytes(model)?)?;
    Ok(())
}

/// Decode a serialized `TensorProto`.
pub fn parse_tensor(bytes: &[u8]) -> Result<TensorValue, ParseError> {
    TensorValue::try_from(TensorProto::parse_from_bytes(bytes)?)
}

/// Read and decode a `.pb` tensor file.
pub fn load_tensor(path: impl AsRef<Path>) -> Result<TensorValue, ParseError> {
    parse_tensor(&fs::read(path)?)
}

/// Serialize a tensor into `TensorProto` bytes, tagged with `name`.
pub fn tensor_to_bytes(name: &str, value: &TensorValue) -> Result<Vec<u8>, ParseError> {
    Ok(tensor_to_named_proto(name, value).write_to_bytes()?)
}

/// Serialize a tensor into a `.pb` file, tagged with `name`.
pub fn save_tensor(name: &str, value: &TensorValue, path: impl AsRef<Path>) -> Result<(), ParseError> {
    fs::write(path, tensor_to_bytes(name, value)?)?;
    Ok(())
}
