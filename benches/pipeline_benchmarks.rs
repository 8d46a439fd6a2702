use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use chunksim::fingerprint::{reduce, Fingerprint};
use chunksim::pipeline::{Mode, Pipeline, PipelineConfig};
use chunksim::similarity::compare;
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tempfile::TempDir;

// Files of varying length whose chunks partly agree
fn setup_files(count: usize, len: usize) -> (TempDir, Vec<PathBuf>) {
    let temp_dir = TempDir::new().unwrap();
    let paths = (0..count)
        .map(|i| {
            let path = temp_dir.path().join(format!("file_{i}.bin"));
            let content: Vec<u8> = (0..len + i * 97).map(|b| ((b / 512 + i % 3) % 256) as u8).collect();
            fs::write(&path, content).expect("Failed to write file");
            path
        })
        .collect();
    (temp_dir, paths)
}

// 1. Chunk reduction
fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");

    for size_kb in [1usize, 1024, 10240] {
        let data = vec![0xABu8; size_kb * 1024];
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(format!("{size_kb}KB")), &data, |b, data| {
            b.iter(|| black_box(reduce(data, NonZeroUsize::new(1024).unwrap())));
        });
    }
    group.finish();
}

// 2. Fingerprint comparison
fn bench_compare(c: &mut Criterion) {
    let a = Fingerprint::new((0..100_000u64).collect());
    let b = Fingerprint::new((0..100_000u64).map(|x| x % 7).collect());

    c.bench_function("compare_100k_chunks", |bench| {
        bench.iter(|| black_box(compare(black_box(&a), black_box(&b))));
    });
}

// 3. Whole pipeline, both wiring modes
fn bench_pipeline(c: &mut Criterion) {
    let (_dir, paths) = setup_files(100, 64 * 1024);
    let mut group = c.benchmark_group("pipeline_100_files");
    group.sample_size(10);

    for mode in [Mode::Barrier, Mode::Streaming] {
        let pipeline = Pipeline::new(PipelineConfig::default().with_mode(mode));
        group.bench_function(BenchmarkId::from_parameter(mode), |b| {
            b.iter(|| black_box(pipeline.run(&paths).unwrap().results.len()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reduce, bench_compare, bench_pipeline);
criterion_main!(benches);
