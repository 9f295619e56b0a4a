use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use embedding_compare::model::{Figure, Trace};
use embedding_compare::panel::{lasso_select, point_in_polygon};

// deterministic scatter, points spread over [0, 100) x [0, 100)
fn scatter(series: usize, points: usize) -> Figure {
    let data = (0..series)
        .map(|s| {
            let x = (0..points).map(|i| ((i * 7919 + s * 31) % 10_000) as f64 / 100.0).collect();
            let y = (0..points).map(|i| ((i * 104_729 + s * 17) % 10_000) as f64 / 100.0).collect();
            let ids = (0..points).map(|i| format!("segment/3/{}", s * points + i)).collect();
            Trace { x, y, ids, ..Trace::default() }
        })
        .collect();
    Figure { data, ..Figure::default() }
}

// rough circle of 64 vertices, the shape a hand-drawn lasso ends up as
fn lasso(center: [f64; 2], radius: f64) -> Vec<[f64; 2]> {
    (0..64)
        .map(|i| {
            let a = f64::from(i) / 64.0 * std::f64::consts::TAU;
            [center[0] + radius * a.cos(), center[1] + radius * a.sin()]
        })
        .collect()
}

fn bench_lasso(c: &mut Criterion) {
    let polygon = lasso([50.0, 50.0], 20.0);
    let mut group = c.benchmark_group("lasso_select");
    for points in [1_000usize, 10_000, 50_000] {
        let figure = scatter(4, points / 4);
        group.bench_with_input(BenchmarkId::from_parameter(points), &figure, |b, figure| {
            b.iter(|| lasso_select(black_box(figure), black_box(&polygon)));
        });
    }
    group.finish();

    c.bench_function("point_in_polygon", |b| {
        b.iter(|| point_in_polygon(black_box([51.0, 49.0]), black_box(&polygon)));
    });
}

criterion_group!(benches, bench_lasso);
criterion_main!(benches);
