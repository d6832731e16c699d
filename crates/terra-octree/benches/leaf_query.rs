use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use glam::DVec3;
use terra_octree::Octree;

fn streaming_tree(radius: f64) -> Octree<()> {
    let mut tree = Octree::new(16, 128, 0).expect("valid root");
    tree.expand_to_contain(DVec3::ZERO, radius + 64.0, 24)
        .expect("root expansion");
    tree
}

fn bench_leaves_within_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("leaves_within_distance");
    for render_distance in [4_u32, 8, 16] {
        let radius = f64::from(render_distance) * 16.0;
        let tree = streaming_tree(radius);
        group.bench_with_input(
            BenchmarkId::from_parameter(render_distance),
            &radius,
            |b, &radius| {
                b.iter(|| {
                    let center = black_box(DVec3::new(40.0, 0.0, -72.0));
                    black_box(tree.leaves_within_distance(center, radius).len())
                })
            },
        );
    }
    group.finish();
}

fn bench_find_leaf(c: &mut Criterion) {
    let tree = streaming_tree(256.0);
    c.bench_function("find_leaf", |b| {
        b.iter(|| tree.find_leaf(black_box(glam::IVec3::new(-131, 77, 203))).is_some())
    });
}

fn bench_skeleton(c: &mut Criterion) {
    let tree = streaming_tree(128.0);
    c.bench_function("skeleton", |b| b.iter(|| black_box(tree.skeleton().leaf_count())));
}

criterion_group!(
    benches,
    bench_leaves_within_distance,
    bench_find_leaf,
    bench_skeleton
);
criterion_main!(benches);
