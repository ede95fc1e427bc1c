use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    codec::bench_serialize_publish,
    codec::bench_deserialize_publish,
    codec::bench_topic_matching,
    codec::bench_tokenize,
    client::bench_publish_and_yield_qos0,
    client::bench_publish_and_yield_qos1,
    client::bench_update_document
);
criterion_main!(benches);
