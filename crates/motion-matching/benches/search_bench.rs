use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use motion_matching::{
    Database, DirectPoseSource, FeatureLayout, InputCommand, InputState, MotionMatchingConfig,
    MotionMatchingInstance, SearchParams, search, search_brute_force, synthetic,
};

fn database(clips: usize) -> Database {
    let mut db = synthetic::locomotion_database(clips, 600).unwrap();
    db.build_features(&FeatureLayout::default()).unwrap();
    db
}

/// Every 97th frame's features as queries, slightly offset
fn queries(db: &Database) -> Vec<Vec<f32>> {
    (0..db.frame_count())
        .step_by(97)
        .map(|i| db.features().row(i).iter().map(|f| f + 0.05).collect())
        .collect()
}

fn search_benchmark(c: &mut Criterion) {
    let params = SearchParams::default();
    let mut group = c.benchmark_group("search");

    for clips in [8, 32] {
        let db = database(clips);
        let queries = queries(&db);

        group.bench_with_input(BenchmarkId::new("pruned", clips), &db, |b, db| {
            b.iter(|| {
                for query in &queries {
                    black_box(search(db, black_box(query), None, &params));
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("brute_force", clips), &db, |b, db| {
            b.iter(|| {
                for query in &queries {
                    black_box(search_brute_force(db, black_box(query), None, &params));
                }
            })
        });
    }

    group.finish();
}

fn feature_build_benchmark(c: &mut Criterion) {
    let db = synthetic::locomotion_database(8, 600).unwrap();
    let layout = FeatureLayout::default();

    c.bench_function("build_features", |b| {
        b.iter(|| {
            let mut db = db.clone();
            db.build_features(black_box(&layout)).unwrap();
            black_box(db.feature_count());
        })
    });
}

fn step_benchmark(c: &mut Criterion) {
    let db = Arc::new(database(8));
    let input = InputState::new(InputCommand::FORWARD | InputCommand::LEFT);

    c.bench_function("instance_step", |b| {
        let mut instance = MotionMatchingInstance::new(
            db.clone(),
            Box::new(DirectPoseSource),
            MotionMatchingConfig::default(),
        )
        .unwrap();
        b.iter(|| {
            instance.step(black_box(&input));
        })
    });
}

criterion_group!(
    benches,
    search_benchmark,
    feature_build_benchmark,
    step_benchmark
);
criterion_main!(benches);
