use float_cmp::assert_approx_eq;

use super::*;
use crate::compiler::{BinaryOp, UnaryOp};
use crate::error::Error;
use crate::nodes::{BinaryOperationNode, ConstantNode, InputNode, SumNode, UnaryOperationNode};

fn real_elements(model: &Model, key: NodeKey) -> PortElements<f64> {
    model
        .node(key)
        .expect("node")
        .typed_output::<f64>("output")
        .expect("real output")
}

#[test]
fn test_nodes_get_unique_ids() {
    let mut model = Model::new();
    let a = model.add_node(ConstantNode::new(vec![1.0f64, 2.0])).unwrap();
    let b = model.add_node(ConstantNode::new(vec![3.0f64])).unwrap();

    let id_a = model.node(a).unwrap().id().clone();
    let id_b = model.node(b).unwrap().id().clone();
    assert_ne!(id_a, id_b);
    assert_eq!(model.node_key(&id_a), Some(a));
    assert_eq!(model.len(), 2);

    let explicit = NodeId::new("weights").unwrap();
    model
        .add_node_with_id(explicit.clone(), ConstantNode::scalar(0.5f64))
        .unwrap();
    let duplicate = model.add_node_with_id(explicit.clone(), ConstantNode::scalar(1.0f64));
    assert!(matches!(duplicate, Err(Error::InvalidArgument(_))));
    assert!(model.get_node(&explicit).is_some());
    assert!(model.get_node(&NodeId::new("missing").unwrap()).is_none());
}

#[test]
fn test_node_ids_reject_delimiters() {
    assert!(NodeId::new("a.b").is_err());
    assert!(NodeId::new("with space").is_err());
    assert!(NodeId::new("").is_err());
    assert!(NodeId::new("node_1").is_ok());
}

#[test]
fn test_unknown_output_port_is_a_null_reference() {
    let mut model = Model::new();
    let key = model.add_node(ConstantNode::scalar(1i32)).unwrap();
    let node = model.node(key).unwrap();
    assert!(matches!(node.output_port("missing"), Err(Error::NullReference(_))));
    assert!(matches!(node.typed_output::<f64>("output"), Err(Error::TypeMismatch { .. })));
}

#[test]
fn test_removed_nodes_leave_stale_references() {
    let mut model = Model::new();
    let source = model.add_node(ConstantNode::new(vec![1.0f64, 2.0])).unwrap();
    let elements = real_elements(&model, source);
    assert!(model.remove_node(source).is_some());
    assert!(model.remove_node(source).is_none());

    let result = model.resolve_elements(elements.as_base());
    assert!(matches!(result, Err(Error::NullReference(_))));
    let dependent = model.add_node(SumNode::new(elements).unwrap());
    assert!(matches!(dependent, Err(Error::NullReference(_))));
}

#[test]
fn test_deferred_ports_are_sized_once() {
    let mut model = Model::new();
    let input = model.add_node(InputNode::<f64>::deferred()).unwrap();
    let port = PortRef::new(input, 0);
    assert!(!model.port(port).unwrap().is_sized());
    assert!(model.add_node(SumNode::new(real_elements(&model, input)).unwrap()).is_err());

    model.set_output_size(port, 4).unwrap();
    assert_eq!(model.port(port).unwrap().size(), Some(4));
    assert!(matches!(
        model.set_output_size(port, 8),
        Err(Error::NotImplemented(_))
    ));

    let elements = real_elements(&model, input);
    assert_eq!(model.resolve_elements(elements.as_base()).unwrap().size(), 4);
}

#[test]
fn test_deferred_full_ranges_survive_consolidation() {
    let mut model = Model::new();
    let input = model.add_node(InputNode::<f64>::deferred()).unwrap();
    let port = PortRef::new(input, 0);
    let full = PortRange::full(model.port(port).unwrap());
    let mut consolidated = PortElementsBase::from_ranges(vec![full, full]).unwrap();
    let unconsolidated = consolidated.clone();
    consolidated.consolidate();
    assert_eq!(consolidated.num_ranges(), 2);

    model.set_output_size(port, 10).unwrap();
    let merged = model.resolve_elements(&consolidated).unwrap();
    let separate = model.resolve_elements(&unconsolidated).unwrap();
    assert_eq!(separate.size(), 20);
    assert_eq!(merged.size(), separate.size());
    assert_eq!(merged.get_element(15).unwrap().index(), 5);
}

#[test]
fn test_dependency_order_covers_only_what_outputs_need() {
    let mut model = Model::new();
    let input = model.add_node(InputNode::<f64>::new(3)).unwrap();
    let weights = model.add_node(ConstantNode::new(vec![2.0f64, 3.0, 4.0])).unwrap();
    let unused = model.add_node(ConstantNode::scalar(9.0f64)).unwrap();
    let product = model
        .add_node(
            BinaryOperationNode::new(
                real_elements(&model, input),
                real_elements(&model, weights),
                BinaryOp::Multiply,
            )
            .unwrap(),
        )
        .unwrap();
    let total = model
        .add_node(SumNode::new(real_elements(&model, product)).unwrap())
        .unwrap();

    let output = real_elements(&model, total).into_base();
    let order = model.dependency_order(&[output]).unwrap();
    assert_eq!(order.len(), 4);
    assert!(!order.contains(&unused));
    let position = |key| order.iter().position(|k| *k == key).unwrap();
    assert!(position(input) < position(product));
    assert!(position(weights) < position(product));
    assert!(position(product) < position(total));
    model.validate().unwrap();
}

#[test]
fn test_map_interprets_dot_product() {
    let mut model = Model::new();
    let input = model.add_node(InputNode::<f64>::new(3)).unwrap();
    let weights = model.add_node(ConstantNode::new(vec![0.5f64, -1.0, 2.0])).unwrap();
    let product = model
        .add_node(
            BinaryOperationNode::new(
                real_elements(&model, input),
                real_elements(&model, weights),
                BinaryOp::Multiply,
            )
            .unwrap(),
        )
        .unwrap();
    let total = model
        .add_node(SumNode::new(real_elements(&model, product)).unwrap())
        .unwrap();
    let output = real_elements(&model, total).into_base();

    let mut map = Map::new(
        model,
        vec![("input".to_string(), input)],
        vec![("output".to_string(), output)],
    )
    .unwrap();
    assert_eq!(map.input_type().unwrap(), PortType::Real);
    assert_eq!(map.input_size().unwrap(), 3);
    assert_eq!(map.output_size(0).unwrap(), 1);

    let result: Vec<f64> = map.compute(&[2.0, 1.0, 0.25]).unwrap();
    assert_approx_eq!(f64, result[0], 0.5, epsilon = 1e-12);
    assert!(matches!(
        map.compute::<f64, f64>(&[1.0]),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        map.compute::<i32, f64>(&[1, 2, 3]),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_map_requires_a_single_input_node() {
    let mut model = Model::new();
    let a = model.add_node(InputNode::<f64>::new(1)).unwrap();
    let b = model.add_node(InputNode::<f64>::new(1)).unwrap();
    let output = real_elements(&model, a).into_base();

    let both = Map::new(
        model,
        vec![("a".to_string(), a), ("b".to_string(), b)],
        vec![("output".to_string(), output.clone())],
    );
    assert!(matches!(both, Err(Error::NotImplemented(_))));

    let mut model = Model::new();
    let constant_only = model.add_node(ConstantNode::scalar(1.0f64)).unwrap();
    let not_input = Map::new(
        model,
        vec![("input".to_string(), constant_only)],
        vec![("output".to_string(), output)],
    );
    assert!(matches!(not_input, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_map_load_sizes_the_input_and_parses_outputs() {
    let mut model = Model::new();
    model
        .add_node_with_id(NodeId::new("in").unwrap(), InputNode::<f64>::deferred())
        .unwrap();
    let options = MapLoadOptions {
        model_inputs: "in".to_string(),
        model_outputs: "in.output[1:3]".to_string(),
        default_input_size: 4,
    };
    let mut map = Map::load(model, &options).unwrap();
    assert_eq!(map.input_size().unwrap(), 4);
    assert_eq!(map.output_size(0).unwrap(), 2);

    let result: Vec<f64> = map.compute(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(result, vec![2.0, 3.0]);

    let missing = MapLoadOptions {
        model_inputs: "nowhere".to_string(),
        ..MapLoadOptions::default()
    };
    assert!(matches!(
        Map::load(Model::new(), &missing),
        Err(Error::NullReference(_))
    ));
}

#[test]
fn test_interpreter_matches_integer_semantics() {
    let mut model = Model::new();
    let input = model.add_node(InputNode::<i32>::new(4)).unwrap();
    let divisor = model.add_node(ConstantNode::new(vec![2, 0, -1, 3])).unwrap();
    let elements = |model: &Model, key| {
        model
            .node(key)
            .unwrap()
            .typed_output::<i32>("output")
            .unwrap()
    };
    let quotient = model
        .add_node(
            BinaryOperationNode::new(
                elements(&model, input),
                elements(&model, divisor),
                BinaryOp::Divide,
            )
            .unwrap(),
        )
        .unwrap();
    let negated = model
        .add_node(UnaryOperationNode::new(elements(&model, quotient), UnaryOp::Negate).unwrap())
        .unwrap();
    let output = elements(&model, negated).into_base();

    let mut map = Map::new(
        model,
        vec![("input".to_string(), input)],
        vec![("output".to_string(), output)],
    )
    .unwrap();
    let result: Vec<i32> = map.compute(&[7, 5, i32::MIN, -9]).unwrap();
    assert_eq!(result, vec![-3, 0, i32::MIN, 3]);
}

#[test]
fn test_operations_check_element_types() {
    let mut model = Model::new();
    let flags = model.add_node(ConstantNode::new(vec![true, false])).unwrap();
    let reals = model.add_node(ConstantNode::new(vec![1.0f64, 4.0])).unwrap();
    let flag = model
        .node(flags)
        .unwrap()
        .typed_output::<bool>("output")
        .unwrap();

    let add_flags = BinaryOperationNode::new(flag.clone(), flag.clone(), BinaryOp::Add);
    assert!(matches!(add_flags, Err(Error::TypeMismatch { .. })));
    assert!(BinaryOperationNode::new(flag.clone(), flag, BinaryOp::LogicalXor).is_ok());

    let real = real_elements(&model, reals);
    let and_reals = BinaryOperationNode::new(real.clone(), real.clone(), BinaryOp::LogicalAnd);
    assert!(matches!(and_reals, Err(Error::TypeMismatch { .. })));
    assert!(UnaryOperationNode::new(real, UnaryOp::Sqrt).is_ok());
}

#[test]
fn test_parse_reports_positions_and_unknown_names() {
    let mut model = Model::new();
    model
        .add_node_with_id(NodeId::new("A").unwrap(), ConstantNode::new(vec![0.0f64; 10]))
        .unwrap();

    assert!(matches!(
        parse_port_elements(&model, "B.output"),
        Err(Error::NullReference(_))
    ));
    assert!(matches!(
        parse_port_elements(&model, "A.missing"),
        Err(Error::NullReference(_))
    ));
    assert!(matches!(
        parse_port_elements(&model, "A.output[2:"),
        Err(Error::Parse { .. })
    ));
    assert!(matches!(
        parse_port_elements(&model, "A.output A.output"),
        Err(Error::Parse { .. })
    ));
    assert!(matches!(
        parse_port_elements(&model, "A.output[5:2]"),
        Err(Error::IndexOutOfRange(_))
    ));
    assert!(matches!(
        parse_port_elements(&model, "A.output[12]"),
        Err(Error::IndexOutOfRange(_))
    ));
}

#[test]
fn test_formatted_elements_parse_back() {
    let mut model = Model::new();
    model
        .add_node_with_id(NodeId::new("A").unwrap(), ConstantNode::new(vec![0.0f64; 10]))
        .unwrap();
    model
        .add_node_with_id(NodeId::new("B").unwrap(), ConstantNode::new(vec![1.0f64; 3]))
        .unwrap();

    let texts = [
        "A.output",
        "A.output[4]",
        "A.output[2:5]",
        "{A.output[0:2],B.output,A.output[9]}",
    ];
    for text in texts {
        let elements = parse_port_elements(&model, text).unwrap();
        let formatted = format_port_elements(&model, &elements).unwrap();
        assert_eq!(formatted, text);
        assert_eq!(parse_port_elements(&model, &formatted).unwrap(), elements);
    }
}

#[test]
fn test_index_value_iteration_follows_ranges() {
    let mut model = Model::new();
    let a = model
        .add_node_with_id(
            NodeId::new("A").unwrap(),
            ConstantNode::new(vec![10.0f64, 11.0, 12.0]),
        )
        .unwrap();
    let outputs = [real_elements(&model, a).into_base()];
    let order = model.dependency_order(&outputs).unwrap();
    model.compute(&order).unwrap();

    let elements = parse_port_elements(&model, "{A.output[2],A.output[0:2]}").unwrap();
    let values: Vec<(usize, f64)> = elements
        .iter_values(&model)
        .unwrap()
        .map(|iv| (iv.index, iv.value))
        .collect();
    assert_eq!(values, vec![(0, 12.0), (1, 10.0), (2, 11.0)]);
}
