use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowc::compiler::BinaryOp;
use flowc::model::NodeKey;
use flowc::{
    BinaryOperationNode, CompilerParameters, ConstantNode, InputNode, Map, MapCompiler, Model,
    SumNode,
};

/// `sum(input * weights) + bias` over `size` elements.
fn linear_map(size: usize) -> Map {
    let mut model = Model::new();
    let input = model.add_node(InputNode::<f64>::new(size)).unwrap();
    let weights: Vec<f64> = (0..size).map(|i| 1.0 / (i + 1) as f64).collect();
    let weights = model.add_node(ConstantNode::new(weights)).unwrap();

    let output = |model: &Model, key: NodeKey| {
        model
            .node(key)
            .unwrap()
            .typed_output::<f64>("output")
            .unwrap()
    };

    let product = BinaryOperationNode::new(
        output(&model, input),
        output(&model, weights),
        BinaryOp::Multiply,
    )
    .unwrap();
    let product = model.add_node(product).unwrap();
    let sum = model
        .add_node(SumNode::new(output(&model, product)).unwrap())
        .unwrap();
    let bias = model.add_node(ConstantNode::scalar(0.5f64)).unwrap();
    let result =
        BinaryOperationNode::new(output(&model, sum), output(&model, bias), BinaryOp::Add)
            .unwrap();
    let result = model.add_node(result).unwrap();

    let elements = output(&model, result).into_base();
    Map::new(
        model,
        vec![("input".to_string(), input)],
        vec![("output".to_string(), elements)],
    )
    .unwrap()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for size in [4, 64, 1024].iter() {
        let map = linear_map(*size);
        group.bench_with_input(BenchmarkId::new("looped", size), &map, |b, map| {
            let compiler = MapCompiler::default();
            b.iter(|| black_box(compiler.compile(map).unwrap()));
        });
    }

    let map = linear_map(64);
    group.bench_function("unrolled_64", |b| {
        let compiler = MapCompiler::new(CompilerParameters::default().with_unroll_loops(true));
        b.iter(|| black_box(compiler.compile(&map).unwrap()));
    });

    group.finish();
}

fn bench_compute(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute");

    for size in [4, 64, 1024].iter() {
        let input: Vec<f64> = (0..*size).map(|i| i as f64).collect();

        group.bench_with_input(BenchmarkId::new("compiled", size), size, |b, &size| {
            let mut compiled = MapCompiler::default().compile(&linear_map(size)).unwrap();
            b.iter(|| {
                black_box(compiled.compute::<f64, f64>(&input).unwrap()[0]);
            });
        });

        group.bench_with_input(BenchmarkId::new("interpreted", size), size, |b, &size| {
            let mut map = linear_map(size);
            b.iter(|| {
                black_box(map.compute::<f64, f64>(&input).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_compute);
criterion_main!(benches);
