use connx_ir::{
    ElementType, Graph, LATEST_OPSET_VERSION, Model, Node, OpsetDeclaration, TensorValue,
    ValueInfo,
};

use crate::error::BackendError;

/// Wrap a single node into a model that can be prepared on its own.
///
/// The model targets the newest known default-domain operator set. Graph inputs take the
/// element type and shape of the supplied tensors, paired positionally with the node's input
/// slots. Outputs are declared as `float32` tensors of shape `[0]` because their real types are
/// only known to the runtime.
pub fn single_node_model(node: &Node, inputs: &[TensorValue]) -> Result<Model, BackendError> {
    if node.inputs.len() != inputs.len() {
        return Err(BackendError::InputCountMismatch {
            expected: node.inputs.len(),
            actual: inputs.len(),
        });
    }

    let mut graph = Graph::new(format!(
        "{} test (auto generated by connx backend)",
        node.name
    ));
    graph.nodes.push(node.clone());
    graph.inputs = node
        .inputs
        .iter()
        .zip(inputs)
        .map(|(name, tensor)| ValueInfo::tensor(name.clone(), tensor.elem_type(), tensor.shape()))
        .collect();
    graph.outputs = node
        .outputs
        .iter()
        .map(|name| ValueInfo::tensor(name.clone(), ElementType::Float32, &[0]))
        .collect();

    Ok(Model::new(graph).with_opset(OpsetDeclaration::default_domain(LATEST_OPSET_VERSION)))
}
