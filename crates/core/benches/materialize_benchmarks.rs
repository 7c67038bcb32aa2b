use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use serde::{Deserialize, Serialize};
use serde_json::json;
use taskroute_core::{BodyParam, CallArgs, HttpMethod, Param, ParameterSchema, RequestMaterializer};

#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    message: String,
    tags: Vec<String>,
}

fn schema() -> ParameterSchema {
    ParameterSchema::builder("update_item", HttpMethod::Post, "/orgs/{org}/items/{id:int}")
        .param(Param::path("org"))
        .param(Param::path("id"))
        .param(Param::query("expand"))
        .param(Param::header("x_request_source"))
        .param(Param::cookie("session"))
        .body(BodyParam::required::<Payload>("payload"))
        .build()
        .expect("valid schema")
}

fn bench_materialize_latency(c: &mut Criterion) {
    let schema = schema();
    let materializer = RequestMaterializer::new("https://listener.example.com/_taskroute?v=1")
        .expect("valid base url");

    let mut group = c.benchmark_group("materialize_latency");
    group.throughput(Throughput::Elements(1));

    for tag_count in [0usize, 10, 100].iter() {
        let args = CallArgs::new()
            .with("org", "acme")
            .with("id", 42)
            .with("expand", json!(["owner", "history"]))
            .with("x_request_source", "bench")
            .with("session", "abc")
            .with(
                "payload",
                json!({
                    "message": "hello",
                    "tags": (0..*tag_count).map(|i| format!("tag-{i}")).collect::<Vec<_>>(),
                }),
            );

        group.bench_with_input(BenchmarkId::new("tags", tag_count), &args, |b, args| {
            b.iter(|| {
                let req = materializer
                    .materialize(black_box(&schema), black_box(args))
                    .expect("materializes");
                black_box(req);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_materialize_latency);
criterion_main!(benches);
