use console_runtime::Interpreter;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

const EXPRESSIONS: [(&str, &str); 4] = [
    ("arithmetic", "1 + 2 * 3 - 4 / 5 % 6"),
    ("nested", "((((1 + 2) * 3) - 4) * (5 + (6 - 7)))"),
    ("logic", "x > 3 && x < 10 || !(x == 7)"),
    ("strings", "\"frame \" + x + \": \" + \"ready\".ToUpper()"),
];

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let mut console = Interpreter::new();
    console.register_variable("x", 5);

    for (name, expression) in EXPRESSIONS {
        group.bench_with_input(BenchmarkId::new("expression", name), &expression, |b, expr| {
            b.iter(|| console.evaluate(expr))
        });
    }

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");

    for statements in [1usize, 8, 32] {
        let line = (0..statements)
            .map(|i| format!("v{i} = {i} * 2 + 1"))
            .collect::<Vec<_>>()
            .join("; ");
        group.bench_with_input(BenchmarkId::new("statements", statements), &line, |b, line| {
            b.iter_batched(
                Interpreter::new,
                |mut console| console.execute(line),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(eval_benches, bench_evaluate, bench_execute);
criterion_main!(eval_benches);
