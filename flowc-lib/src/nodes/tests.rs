use float_cmp::approx_eq;

use super::*;
use crate::compiler::{BinaryOp, CompareOp, CompilerParameters, MapCompiler, UnaryOp};
use crate::model::{Map, Model, NodeKey, PortElements, PortElementsBase, PortValue};

fn all_parameters() -> Vec<CompilerParameters> {
    let mut parameters = Vec::new();
    for unroll in [false, true] {
        for inline in [true, false] {
            parameters.push(
                CompilerParameters::default()
                    .with_unroll_loops(unroll)
                    .with_inline_operators(inline),
            );
        }
    }
    parameters
}

fn output<T: PortValue>(model: &Model, key: NodeKey) -> PortElements<T> {
    model
        .node(key)
        .unwrap()
        .typed_output::<T>(OUTPUT)
        .unwrap()
}

fn map(model: Model, input: NodeKey, output: PortElementsBase) -> Map {
    Map::new(
        model,
        vec![("input".to_string(), input)],
        vec![("output".to_string(), output)],
    )
    .unwrap()
}

/// Runs `map` through the interpreter and through every compiler
/// configuration, returning the interpreted result after checking that the
/// compiled ones agree with it.
fn check_agreement<I: PortValue, O: PortValue>(map: &mut Map, input: &[I]) -> Vec<O> {
    let expected: Vec<O> = map.compute(input).unwrap();
    for parameters in all_parameters() {
        let mut compiled = MapCompiler::new(parameters.clone()).compile(map).unwrap();
        let actual = compiled.compute::<I, O>(input).unwrap();
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(&expected) {
            let (a, e) = (a.to_f64(), e.to_f64());
            assert!(
                (a.is_nan() && e.is_nan()) || approx_eq!(f64, a, e, ulps = 2),
                "{:?}: compiled {} but interpreted {}",
                parameters,
                a,
                e
            );
        }
    }
    expected
}

#[test]
fn test_binary_operations_agree() {
    let operations = [
        BinaryOp::Add,
        BinaryOp::Subtract,
        BinaryOp::Multiply,
        BinaryOp::Divide,
        BinaryOp::Min,
        BinaryOp::Max,
    ];
    for operation in operations {
        let mut model = Model::new();
        let input = model.add_node(InputNode::<f64>::new(4)).unwrap();
        let other = model
            .add_node(ConstantNode::new(vec![2.0f64, -0.5, f64::NAN, 0.0]))
            .unwrap();
        let node = BinaryOperationNode::new(
            output::<f64>(&model, input),
            output(&model, other),
            operation,
        );
        let result = model.add_node(node.unwrap()).unwrap();
        let out = output::<f64>(&model, result).into_base();
        check_agreement::<f64, f64>(&mut map(model, input, out), &[1.0, 3.0, 2.0, -4.0]);
    }

    for operation in [BinaryOp::Add, BinaryOp::Divide, BinaryOp::Min, BinaryOp::Max] {
        let mut model = Model::new();
        let input = model.add_node(InputNode::<i32>::new(4)).unwrap();
        let other = model.add_node(ConstantNode::new(vec![2, 0, -1, 7])).unwrap();
        let node = BinaryOperationNode::new(
            output::<i32>(&model, input),
            output(&model, other),
            operation,
        );
        let result = model.add_node(node.unwrap()).unwrap();
        let out = output::<i32>(&model, result).into_base();
        check_agreement::<i32, i32>(&mut map(model, input, out), &[9, 4, i32::MIN, -3]);
    }
}

#[test]
fn test_logical_operations_agree() {
    for operation in [BinaryOp::LogicalAnd, BinaryOp::LogicalOr, BinaryOp::LogicalXor] {
        let mut model = Model::new();
        let input = model.add_node(InputNode::<bool>::new(4)).unwrap();
        let other = model
            .add_node(ConstantNode::new(vec![true, true, false, false]))
            .unwrap();
        let node = BinaryOperationNode::new(
            output::<bool>(&model, input),
            output(&model, other),
            operation,
        );
        let result = model.add_node(node.unwrap()).unwrap();
        let out = output::<bool>(&model, result).into_base();
        check_agreement::<bool, bool>(&mut map(model, input, out), &[true, false, true, false]);
    }
}

#[test]
fn test_unary_operations_agree() {
    for operation in [UnaryOp::Negate, UnaryOp::Abs, UnaryOp::Sqrt] {
        let mut model = Model::new();
        let input = model.add_node(InputNode::<f64>::new(3)).unwrap();
        let node = UnaryOperationNode::new(output::<f64>(&model, input), operation).unwrap();
        let result = model.add_node(node).unwrap();
        let out = output::<f64>(&model, result).into_base();
        check_agreement::<f64, f64>(&mut map(model, input, out), &[4.0, -2.25, 0.0]);
    }

    let mut model = Model::new();
    let input = model.add_node(InputNode::<i32>::new(3)).unwrap();
    let node = UnaryOperationNode::new(output::<i32>(&model, input), UnaryOp::Abs).unwrap();
    let result = model.add_node(node).unwrap();
    let out = output::<i32>(&model, result).into_base();
    let values = check_agreement::<i32, i32>(&mut map(model, input, out), &[-5, 3, i32::MIN]);
    assert_eq!(values, vec![5, 3, i32::MIN]);

    let mut model = Model::new();
    let input = model.add_node(InputNode::<bool>::new(2)).unwrap();
    let node =
        UnaryOperationNode::new(output::<bool>(&model, input), UnaryOp::LogicalNot).unwrap();
    let result = model.add_node(node).unwrap();
    let out = output::<bool>(&model, result).into_base();
    let values = check_agreement::<bool, bool>(&mut map(model, input, out), &[true, false]);
    assert_eq!(values, vec![false, true]);
}

#[test]
fn test_sum_reduces_non_contiguous_elements() {
    let mut model = Model::new();
    let input = model.add_node(InputNode::<f64>::new(5)).unwrap();
    let elements = PortElements::<f64>::concat(&[
        output::<f64>(&model, input).slice(3, 2).unwrap(),
        output::<f64>(&model, input).slice(0, 2).unwrap(),
    ]);
    let total = model.add_node(SumNode::new(elements).unwrap()).unwrap();
    let out = output::<f64>(&model, total).into_base();
    let input_values = [1.0, 2.0, 100.0, 3.0, 4.0];
    let values = check_agreement::<f64, f64>(&mut map(model, input, out), &input_values);
    assert_eq!(values, vec![10.0]);

    assert!(SumNode::new(PortElements::<bool>::concat(&[])).is_err());
}

#[test]
fn test_predicates_agree() {
    let predicates = [
        CompareOp::Equal,
        CompareOp::NotEqual,
        CompareOp::Less,
        CompareOp::LessOrEqual,
        CompareOp::Greater,
        CompareOp::GreaterOrEqual,
    ];
    for predicate in predicates {
        let mut model = Model::new();
        let input = model.add_node(InputNode::<f64>::new(4)).unwrap();
        let threshold = model
            .add_node(ConstantNode::new(vec![1.0f64, 1.0, 1.0, 1.0]))
            .unwrap();
        let node = BinaryPredicateNode::new(
            output::<f64>(&model, input),
            output(&model, threshold),
            predicate,
        );
        let result = model.add_node(node.unwrap()).unwrap();
        let out = output::<bool>(&model, result).into_base();
        check_agreement::<f64, bool>(&mut map(model, input, out), &[0.5, 1.0, 2.0, f64::NAN]);
    }
}

#[test]
fn test_casts_agree() {
    let mut model = Model::new();
    let input = model.add_node(InputNode::<f64>::new(5)).unwrap();
    let to_int = model
        .add_node(TypeCastNode::<f64, i32>::new(output(&model, input)))
        .unwrap();
    let out = output::<i32>(&model, to_int).into_base();
    let values = check_agreement::<f64, i32>(
        &mut map(model, input, out),
        &[2.7, -2.7, 1e12, f64::NAN, -0.0],
    );
    assert_eq!(values, vec![2, -2, i32::MAX, 0, 0]);

    let mut model = Model::new();
    let input = model.add_node(InputNode::<i32>::new(3)).unwrap();
    let to_bool = model
        .add_node(TypeCastNode::<i32, bool>::new(output(&model, input)))
        .unwrap();
    let to_real = model
        .add_node(TypeCastNode::<bool, f64>::new(output(&model, to_bool)))
        .unwrap();
    let out = output::<f64>(&model, to_real).into_base();
    let values = check_agreement::<i32, f64>(&mut map(model, input, out), &[0, -4, 9]);
    assert_eq!(values, vec![0.0, 1.0, 1.0]);
}

#[test]
fn test_constants_compile_to_module_data() {
    let mut model = Model::new();
    let input = model.add_node(InputNode::<i32>::new(2)).unwrap();
    let constant = model.add_node(ConstantNode::new(vec![5, 6, 7])).unwrap();
    let out = output::<i32>(&model, constant).into_base();
    let values = check_agreement::<i32, i32>(&mut map(model, input, out), &[0, 0]);
    assert_eq!(values, vec![5, 6, 7]);
}

#[test]
fn test_mismatched_sizes_are_rejected() {
    let mut model = Model::new();
    let a = model.add_node(ConstantNode::new(vec![1.0f64, 2.0])).unwrap();
    let b = model.add_node(ConstantNode::new(vec![1.0f64])).unwrap();
    let (a, b) = (output::<f64>(&model, a), output::<f64>(&model, b));
    assert!(BinaryOperationNode::new(a.clone(), b.clone(), BinaryOp::Add).is_err());
    assert!(BinaryPredicateNode::new(a, b, CompareOp::Less).is_err());
}
