use connx_ir::{Model, OpsetResolver};

/// Whether every node of the model can be executed by the runtime.
///
/// The support table is resolved from the model's operator set declarations on every call. A
/// model without declarations is checked against version 1 of the default domain.
pub fn is_compatible(model: &Model, resolver: &dyn OpsetResolver) -> bool {
    let (table, version) = resolver.resolve(&model.opset_imports);

    match model
        .graph
        .nodes
        .iter()
        .find(|node| !table.is_available(&node.op_type))
    {
        Some(node) => {
            log::debug!(
                "Operator {} ({}) is not supported at opset version {version}",
                node.op_type,
                node.name
            );
            false
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connx_ir::{
        ConnxOpsetResolver, Graph, Node, OperatorSupport, OperatorSupportTable, OpsetDeclaration,
    };
    use rstest::rstest;
    use std::cell::Cell;

    fn model(ops: &[&str], opsets: &[OpsetDeclaration]) -> Model {
        let mut graph = Graph::new("g");
        graph.nodes = ops
            .iter()
            .enumerate()
            .map(|(i, op)| Node::new(*op, [format!("v{i}")], [format!("v{}", i + 1)]))
            .collect();
        let mut model = Model::new(graph);
        model.opset_imports = opsets.to_vec();
        model
    }

    #[rstest]
    #[case::empty_graph(&[], &[], true)]
    #[case::empty_graph_foreign_domain(&[], &[OpsetDeclaration::new("ai.onnx.ml", 2)], true)]
    #[case::supported(&["Relu", "Add"], &[OpsetDeclaration::default_domain(13)], true)]
    #[case::defaults_to_version_one(&["Relu"], &[], true)]
    #[case::too_new_for_version_one(&["Where"], &[], false)]
    #[case::unknown_operator(&["Relu", "Frobnicate"], &[OpsetDeclaration::default_domain(13)], false)]
    #[case::not_implemented(&["Einsum"], &[OpsetDeclaration::default_domain(13)], false)]
    #[case::alias_domain(&["Gelu"], &[OpsetDeclaration::new("ai.onnx", 20)], true)]
    fn compatibility(
        #[case] ops: &[&str],
        #[case] opsets: &[OpsetDeclaration],
        #[case] expected: bool,
    ) {
        assert_eq!(is_compatible(&model(ops, opsets), &ConnxOpsetResolver), expected);
    }

    struct CountingResolver {
        calls: Cell<usize>,
    }

    impl OpsetResolver for CountingResolver {
        fn resolve(&self, _: &[OpsetDeclaration]) -> (OperatorSupportTable, i64) {
            self.calls.set(self.calls.get() + 1);
            let mut table = OperatorSupportTable::default();
            table.insert("A", OperatorSupport::Implemented { since_version: 1 });
            table.insert("B", OperatorSupport::NotImplemented);
            (table, 1)
        }
    }

    #[test]
    fn table_is_resolved_on_every_call() {
        let resolver = CountingResolver {
            calls: Cell::new(0),
        };
        let model = model(&["A", "A"], &[OpsetDeclaration::default_domain(1)]);

        assert!(is_compatible(&model, &resolver));
        assert!(is_compatible(&model, &resolver));
        assert_eq!(resolver.calls.get(), 2);
    }

    #[test]
    fn explicit_no_implementation_marker() {
        let resolver = CountingResolver {
            calls: Cell::new(0),
        };
        let model = model(&["A", "B", "A"], &[OpsetDeclaration::default_domain(1)]);
        assert!(!is_compatible(&model, &resolver));
    }
}
