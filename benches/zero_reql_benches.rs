use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;

use zero_reql::protocol::backtrace::{self, Backtrace};
use zero_reql::protocol::{frame, response};

fn bench_write_frame(c: &mut Criterion) {
    let payload = serde_json::to_vec(&json!([1, [15, [[14, ["tv_shows"]]]], {}])).unwrap();
    let mut out = Vec::new();
    c.bench_function("write_frame", |b| {
        b.iter(|| {
            frame::write_frame(&mut out, black_box(7), black_box(&payload));
            out.len()
        })
    });
}

fn bench_classify_partial(c: &mut Criterion) {
    let payload = json!({"t": 3, "r": [1, 2, 3, 4, 5, 6, 7, 8]});
    c.bench_function("classify_partial", |b| {
        b.iter(|| response::classify(black_box(payload.clone()), None))
    });
}

fn bench_annotate_backtrace(c: &mut Criterion) {
    let term = json!([24, [[10, [[11, [1, 2]], 3]], 4], {}]);
    let bt = Backtrace::parse(Some(&json!([0, 0, 1])));
    c.bench_function("annotate_backtrace", |b| {
        b.iter(|| backtrace::annotate(black_box(&term), bt.frames()))
    });
}

criterion_group!(
    benches,
    bench_write_frame,
    bench_classify_partial,
    bench_annotate_backtrace
);
criterion_main!(benches);
