#![warn(missing_docs)]

//! `connx-ir` holds the ONNX model representation used by the connx backend.
//!
//! It decodes ONNX protobuf files into a strongly typed [`Model`](ir::Model), encodes it back,
//! checks it for structural well-formedness and resolves declared operator sets into the table of
//! operators the connx runtime can execute.

pub mod checker;
pub mod ir;
pub mod opset;
pub mod proto_conversion;
pub mod protos;
pub mod tensor;

mod error;

pub use checker::check_model;
pub use error::{ParseError, TensorError, ValidationError};
pub use ir::*;
pub use opset::{
    ConnxOpsetResolver, LATEST_OPSET_VERSION, OperatorSupport, OperatorSupportTable, OpsetResolver,
};
pub use proto_conversion::{
    load_model, load_tensor, model_to_bytes, parse_model, parse_tensor, save_model, save_tensor,
    tensor_to_bytes,
};
pub use tensor::{Element, TensorValue};
