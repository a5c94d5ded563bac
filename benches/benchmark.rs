use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;
use webcapture::{ArtifactStore, CaptureMode, Config, DeviceProfileTable, RequestValidator};

#[cfg(feature = "integration_benchmarks")]
use tokio::runtime::Runtime;
#[cfg(feature = "integration_benchmarks")]
use webcapture::CaptureEngine;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

// === UNIT BENCHMARKS ===

fn benchmark_config_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    configure_fast_group(&mut group);

    group.bench_function("creation", |b| {
        b.iter(|| {
            let config = Config::default();
            black_box(config);
        });
    });

    group.finish();
}

fn benchmark_request_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_validation");
    configure_fast_group(&mut group);

    let validator = RequestValidator::new(Arc::new(DeviceProfileTable::builtin()));
    let test_inputs = vec![
        (Some("https://example.com"), Some("phone")),
        (Some("http://example.com/path"), None),
        (Some("http://127.0.0.1"), None),
        (Some("invalid-url"), None),
    ];

    group.bench_function("validate", |b| {
        b.iter(|| {
            for (url, device) in &test_inputs {
                let result = validator.validate(*url, *device, CaptureMode::Screenshot, None);
                let _ = black_box(result);
            }
        });
    });

    group.finish();
}

fn benchmark_device_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("device_resolution");
    configure_fast_group(&mut group);

    let table = DeviceProfileTable::builtin();
    let names = vec!["phone", "tablet", "laptop", "desktop", "full", "watch"];

    group.bench_function("resolve", |b| {
        b.iter(|| {
            for name in &names {
                let profile = table.resolve(name);
                let _ = black_box(profile);
            }
        });
    });

    group.finish();
}

fn benchmark_artifact_naming(c: &mut Criterion) {
    let mut group = c.benchmark_group("artifact_naming");
    configure_fast_group(&mut group);

    group.bench_function("unique_name", |b| {
        b.iter(|| {
            let name = ArtifactStore::unique_name("png");
            black_box(name);
        });
    });

    group.finish();
}

fn benchmark_format_utilities(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_utilities");
    configure_fast_group(&mut group);

    let test_durations = vec![Duration::from_millis(100), Duration::from_secs(5)];
    let test_byte_sizes = vec![1024, 1048576];

    group.bench_function("format_duration", |b| {
        b.iter(|| {
            for duration in &test_durations {
                let formatted = webcapture::format_duration(*duration);
                black_box(formatted);
            }
        });
    });

    group.bench_function("format_bytes", |b| {
        b.iter(|| {
            for size in &test_byte_sizes {
                let formatted = webcapture::format_bytes(*size);
                black_box(formatted);
            }
        });
    });

    group.finish();
}

// === INTEGRATION BENCHMARKS (require Chromium) ===

#[cfg(feature = "integration_benchmarks")]
fn benchmark_engine_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.sample_size(10);

    let rt = Runtime::new().unwrap();

    group.bench_function("create_and_shutdown", |b| {
        b.iter(|| {
            rt.block_on(async {
                let config = Config {
                    browser_pool_size: 1,
                    ..Default::default()
                };
                if let Ok(engine) = CaptureEngine::new(config).await {
                    engine.shutdown().await;
                }
            });
        });
    });

    group.finish();
}

#[cfg(not(feature = "integration_benchmarks"))]
criterion_group!(
    benches,
    benchmark_config_creation,
    benchmark_request_validation,
    benchmark_device_resolution,
    benchmark_artifact_naming,
    benchmark_format_utilities,
);

#[cfg(feature = "integration_benchmarks")]
criterion_group!(
    benches,
    benchmark_config_creation,
    benchmark_request_validation,
    benchmark_device_resolution,
    benchmark_artifact_naming,
    benchmark_format_utilities,
    benchmark_engine_creation,
);

criterion_main!(benches);
