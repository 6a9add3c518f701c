use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mdcompare_common::{Record, RecordKind};
use mdcompare_core::{diff_lines, ReconcileEngine};
use serde_json::json;

// Helper to create Apex class records, every `change_every`-th body edited
fn create_records(count: usize, change_every: usize, edited: bool) -> Vec<Record> {
    (0..count)
        .map(|i| {
            let mut body: String = (0..50).map(|line| format!("    line {line} of class {i};\n")).collect();
            if edited && change_every > 0 && i % change_every == 0 {
                body.push_str("    // edited\n");
            }
            Record::new(json!({
                "Id": format!("01p{i:012}"),
                "Name": format!("Class{i}"),
                "Body": body,
            }))
        })
        .collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let engine = ReconcileEngine::new();

    for size in [100, 1_000, 5_000] {
        let source = create_records(size, 10, false);
        let target = create_records(size, 10, true);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let result = engine.reconcile(
                    black_box(source.clone()),
                    black_box(target.clone()),
                    &RecordKind::ApexClass,
                );
                black_box(result);
            });
        });
    }

    group.finish();
}

fn bench_diff_lines(c: &mut Criterion) {
    let source: String = (0..2_000).map(|i| format!("line {i}\n")).collect();
    let target: String = (0..2_000)
        .map(|i| if i % 100 == 0 { format!("LINE {i}\n") } else { format!("line {i}\n") })
        .collect();

    c.bench_function("diff_lines_2000", |b| {
        b.iter(|| black_box(diff_lines(black_box(&source), black_box(&target))));
    });
}

criterion_group!(benches, bench_reconcile, bench_diff_lines);
criterion_main!(benches);
