use flowc::model::{
    parse_port_elements, Model, NodeId, PortElements, PortElementsBase, PortRange, PortRef,
};
use flowc::{ConstantNode, Error};

fn model_with_ports() -> Model {
    let mut model = Model::new();
    model
        .add_node_with_id(NodeId::new("A").unwrap(), ConstantNode::new(vec![0.0f64; 10]))
        .unwrap();
    model
        .add_node_with_id(NodeId::new("B").unwrap(), ConstantNode::new(vec![1.0f64; 4]))
        .unwrap();
    model
        .add_node_with_id(NodeId::new("C").unwrap(), ConstantNode::new(vec![1i32, 2, 3]))
        .unwrap();
    model
}

fn port_of(model: &Model, id: &str) -> PortRef {
    let key = model.node_key(&NodeId::new(id).unwrap()).unwrap();
    PortRef::new(key, 0)
}

#[test]
fn test_range_size_and_fullness() {
    let model = model_with_ports();
    let port = model.port(port_of(&model, "A")).unwrap();

    let partial = PortRange::new(port, 2, 3).unwrap();
    assert_eq!(partial.size(), 3);
    assert!(!partial.is_full_port_range());

    let whole = PortRange::new(port, 0, 10).unwrap();
    assert_eq!(whole.size(), 10);
    assert!(whole.is_full_port_range());

    assert!(matches!(PortRange::new(port, 8, 3), Err(Error::IndexOutOfRange(_))));
}

#[test]
fn test_adjacent_ranges_append() {
    let model = model_with_ports();
    let port = model.port(port_of(&model, "A")).unwrap();

    let mut first = PortRange::new(port, 0, 4).unwrap();
    let second = PortRange::new(port, 4, 3).unwrap();
    assert!(first.is_adjacent(&second));
    first.append(&second).unwrap();
    assert_eq!(first.size(), 7);
    assert_eq!(first.start_index(), 0);

    let gap = PortRange::new(port, 8, 1).unwrap();
    assert!(!first.is_adjacent(&gap));
    assert!(first.append(&gap).is_err());
}

#[test]
fn test_consolidate_is_idempotent() {
    let model = model_with_ports();
    let elements = parse_port_elements(
        &model,
        "{A.output[0:2], A.output[2:5], B.output, A.output[5], A.output[9]}",
    )
    .unwrap();
    let before: Vec<_> = elements.elements().collect();

    let mut once = elements.clone();
    once.consolidate();
    assert_eq!(once.num_ranges(), 4);
    assert_eq!(once.size(), elements.size());
    assert_eq!(once.elements().collect::<Vec<_>>(), before);

    let mut twice = once.clone();
    twice.consolidate();
    assert_eq!(twice, once);
}

#[test]
fn test_appending_mismatched_types_changes_nothing() {
    let model = model_with_ports();
    let integers = PortElementsBase::from_port(model.port(port_of(&model, "C")).unwrap());
    let reals = PortElementsBase::from_port(model.port(port_of(&model, "A")).unwrap());

    let mut target = integers.clone();
    let result = target.append(&reals);
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    assert_eq!(target, integers);
    assert_eq!(reals.size(), 10);

    assert!(PortElements::<i32>::try_from(reals).is_err());
}

#[test]
fn test_parses_a_colon_range() {
    let model = model_with_ports();
    let elements = parse_port_elements(&model, "A.output[2:5]").unwrap();
    assert_eq!(elements.size(), 3);
    let indices: Vec<usize> = elements.elements().map(|e| e.index()).collect();
    assert_eq!(indices, vec![2, 3, 4]);
}

#[test]
fn test_parses_a_brace_list_in_order() {
    let model = model_with_ports();
    let elements = parse_port_elements(&model, "{A.output[0:2],B.output}").unwrap();
    assert_eq!(elements.num_ranges(), 2);
    assert_eq!(elements.size(), 2 + 4);
    assert_eq!(elements.ranges()[0].port(), port_of(&model, "A"));
    assert_eq!(elements.ranges()[1].port(), port_of(&model, "B"));
    assert!(elements.ranges()[1].is_full_port_range());
}

#[test]
fn test_whitespace_between_tokens_is_ignored() {
    let model = model_with_ports();
    let spaced = parse_port_elements(&model, " { A . output [ 1 ] , B.output } ").unwrap();
    let compact = parse_port_elements(&model, "{A.output[1],B.output}").unwrap();
    assert_eq!(spaced, compact);
}

#[test]
fn test_mixed_types_in_a_list_are_rejected() {
    let model = model_with_ports();
    let result = parse_port_elements(&model, "{A.output,C.output}");
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));
}
