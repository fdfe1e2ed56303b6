use async_trait::async_trait;
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use webshot::{
    format_bytes, format_duration, render_thumbnail, CacheMetrics, Producer, SizedLru,
    ThumbnailCache, ThumbnailError, ThumbnailKey, TransformParams,
};

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

struct Constant(Bytes);

#[async_trait]
impl Producer for Constant {
    async fn produce(&self, _key: &str) -> Result<Bytes, ThumbnailError> {
        Ok(self.0.clone())
    }
}

fn benchmark_lru_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("sized_lru");
    configure_fast_group(&mut group);

    // Every insert past the first few evicts at least one entry.
    for artifact_len in [1_024usize, 16 * 1_024] {
        let artifact = Bytes::from(vec![0u8; artifact_len]);
        group.bench_with_input(
            BenchmarkId::new("insert_with_eviction", format_bytes(artifact_len)),
            &artifact,
            |b, artifact| {
                let mut lru = SizedLru::new(64 * artifact_len);
                let mut n = 0u64;
                b.iter(|| {
                    n += 1;
                    let evicted = lru.insert(format!("r{n}@v1"), artifact.clone());
                    black_box(evicted);
                });
            },
        );
    }

    group.bench_function("get_hit", |b| {
        let mut lru = SizedLru::new(1 << 20);
        for i in 0..256 {
            lru.insert(format!("r{i}@v1"), Bytes::from_static(b"thumbnail"));
        }
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % 256;
            black_box(lru.get(&format!("r{i}@v1")));
        });
    });

    group.finish();
}

fn benchmark_cache_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("thumbnail_cache");
    configure_fast_group(&mut group);

    let rt = Runtime::new().unwrap();
    let cache = ThumbnailCache::new(
        1 << 20,
        Arc::new(Constant(Bytes::from(vec![7u8; 4_096]))),
        CacheMetrics::noop(),
    );
    rt.block_on(cache.get("abc123@v1")).unwrap();

    group.bench_function("hit", |b| {
        b.iter(|| {
            let thumbnail = rt.block_on(cache.get(black_box("abc123@v1")));
            black_box(thumbnail).unwrap();
        });
    });

    group.finish();
}

fn benchmark_key_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("key");
    configure_fast_group(&mut group);

    group.bench_function("new", |b| {
        b.iter(|| black_box(ThumbnailKey::new(black_box("abc123XYZ"), black_box("v42"))));
    });

    group.finish();
}

fn benchmark_render_thumbnail(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    configure_fast_group(&mut group);

    let source = image::RgbaImage::from_pixel(1024, 768, image::Rgba([40, 90, 200, 255]));
    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(source)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageOutputFormat::Png)
        .unwrap();
    let params = TransformParams::default();

    group.bench_function("render_1024x768", |b| {
        b.iter(|| black_box(render_thumbnail(&png, &params)));
    });

    group.finish();
}

fn benchmark_format_utilities(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_utilities");
    configure_fast_group(&mut group);

    group.bench_function("duration", |b| {
        b.iter(|| black_box(format_duration(black_box(Duration::from_millis(2_345)))));
    });

    group.bench_function("bytes", |b| {
        b.iter(|| black_box(format_bytes(black_box(256 * 1024 * 1024))));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_lru_insert,
    benchmark_cache_hit,
    benchmark_key_building,
    benchmark_render_thumbnail,
    benchmark_format_utilities
);
criterion_main!(benches);
