//! Structural validation of models before they are handed to the compile stage.

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::ir::{Graph, Initializer, Model, ValueInfo, is_default_domain};

/// Check that a model is structurally well formed.
///
/// This covers the IR version, the operator set declarations and the graph: node operator
/// types, value naming, single assignment, topological order and initializer signatures. It does
/// not look at operator semantics.
pub fn check_model(model: &Model) -> Result<(), ValidationError> {
    if model.ir_version < 1 {
        return Err(ValidationError::InvalidIrVersion(model.ir_version));
    }

    check_opsets(model)?;
    check_graph(&model.graph)
}

fn check_opsets(model: &Model) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for opset in &model.opset_imports {
        if opset.version < 1 {
            return Err(ValidationError::InvalidOpsetVersion {
                domain: opset.domain.clone(),
                version: opset.version,
            });
        }

        let key = if is_default_domain(&opset.domain) {
            ""
        } else {
            opset.domain.as_str()
        };
        if !seen.insert(key) {
            return Err(ValidationError::DuplicateOpsetDomain(opset.domain.clone()));
        }
    }
    Ok(())
}

fn check_graph(graph: &Graph) -> Result<(), ValidationError> {
    let mut defined: HashSet<&str> = HashSet::new();

    for input in &graph.inputs {
        if input.name.is_empty() {
            return Err(ValidationError::UnnamedValue("input"));
        }
        if !defined.insert(input.name.as_str()) {
            return Err(ValidationError::DuplicateGraphInput(input.name.clone()));
        }
    }

    let mut initialized = HashSet::new();
    for init in &graph.initializers {
        if init.name.is_empty() {
            return Err(ValidationError::UnnamedValue("initializer"));
        }
        if !initialized.insert(init.name.as_str()) {
            return Err(ValidationError::DuplicateValue(init.name.clone()));
        }

        // Older models list initializers as graph inputs too, which is not a reassignment.
        match graph.inputs.iter().find(|input| input.name == init.name) {
            Some(input) => check_initializer_signature(init, input)?,
            None => {
                defined.insert(init.name.as_str());
            }
        }
    }

    for (index, node) in graph.nodes.iter().enumerate() {
        if node.op_type.is_empty() {
            return Err(ValidationError::EmptyOpType {
                index,
                name: node.name.clone(),
            });
        }

        for input in node.inputs.iter().filter(|name| !name.is_empty()) {
            if !defined.contains(input.as_str()) {
                return Err(ValidationError::UndefinedInput {
                    index,
                    op_type: node.op_type.clone(),
                    input: input.clone(),
                });
            }
        }

        for output in node.outputs.iter().filter(|name| !name.is_empty()) {
            if !defined.insert(output.as_str()) {
                return Err(ValidationError::DuplicateValue(output.clone()));
            }
        }
    }

    for output in &graph.outputs {
        if output.name.is_empty() {
            return Err(ValidationError::UnnamedValue("output"));
        }
        if !defined.contains(output.name.as_str()) {
            return Err(ValidationError::UndefinedOutput(output.name.clone()));
        }
    }

    Ok(())
}

fn check_initializer_signature(init: &Initializer, input: &ValueInfo) -> Result<(), ValidationError> {
    let malformed = |reason: String| ValidationError::MalformedInitializer {
        name: init.name.clone(),
        reason,
    };

    if input.elem_type != init.value.elem_type() {
        return Err(malformed(format!(
            "holds {} but the graph input is declared {}",
            init.value.elem_type(),
            input.elem_type
        )));
    }
    if let Some(shape) = input.static_shape()
        && shape != init.value.shape()
    {
        return Err(malformed(format!(
            "has shape {:?} but the graph input is declared {:?}",
            init.value.shape(),
            shape
        )));
    }
    Ok(())
}
