use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use futures::future::join_all;
use mock_cluster::circuit_breaker::{Admission, BreakerConfig, CircuitBreaker, Thresholds};
use mock_cluster::config::ClusterConfig;
use mock_cluster::target::{CallDescriptor, MockTarget, ServiceEndpoint, StaticResolver};
use mock_cluster::invoker::FallbackInvoker;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn thresholds() -> Thresholds {
    Thresholds {
        error_rate: 50.0,
        concurrency: 10,
    }
}

fn benchmark_breaker_admission(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("com.example.DemoService", BreakerConfig::default(), None);

    c.bench_function("breaker_admit_success", |b| {
        b.to_async(&rt).iter(|| async {
            match breaker.before(black_box(thresholds())).await {
                Admission::Admitted(permit) => permit.record_success(),
                Admission::Rejected => {}
            }
        })
    });
}

fn benchmark_breaker_contention(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let breaker = CircuitBreaker::new("com.example.DemoService", BreakerConfig::default(), None);

    let mut group = c.benchmark_group("breaker_contention");
    for concurrent in [1usize, 8, 64].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrent),
            concurrent,
            |b, &concurrent| {
                b.to_async(&rt).iter(|| {
                    join_all((0..concurrent).map(|_| async {
                        match breaker.before(thresholds()).await {
                            Admission::Admitted(permit) => permit.record_failure(),
                            Admission::Rejected => {}
                        }
                    }))
                })
            },
        );
    }
    group.finish();
}

fn benchmark_forced_fallback(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let endpoint = ServiceEndpoint::parse("http://localhost:8080/com.example.DemoService")
        .unwrap()
        .with_parameters([("mock", "force:return {\"name\": \"cached\"}")]);
    let target = Arc::new(MockTarget::new(endpoint.clone()));
    let resolver = Arc::new(StaticResolver::new(endpoint));
    let breaker = CircuitBreaker::new("com.example.DemoService", BreakerConfig::default(), None);
    let invoker = FallbackInvoker::new(resolver, target, breaker);

    c.bench_function("forced_fallback", |b| {
        b.to_async(&rt).iter(|| async {
            let call = CallDescriptor::new("sayHello", vec![]);
            black_box(invoker.invoke(&call).await)
        })
    });
}

fn benchmark_config_parsing(c: &mut Criterion) {
    let yaml = r#"
coordination:
  endpoints: ["redis://127.0.0.1:6379"]

services:
  - endpoint: "http://localhost:8080/com.example.DemoService?mock=fail:return+null"
    parameters:
      sayHello.error_rate_threshold: "50"
"#;

    c.bench_function("config_parsing", |b| {
        b.iter(|| black_box(ClusterConfig::from_yaml(yaml)))
    });
}

criterion_group!(
    benches,
    benchmark_breaker_admission,
    benchmark_breaker_contention,
    benchmark_forced_fallback,
    benchmark_config_parsing
);
criterion_main!(benches);
