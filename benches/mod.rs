use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use libmqtt::codec::{self, QoS};
use libmqtt::packet::{self, MessageIdAllocator};
use libmqtt::queue::OutboundQueue;
use rand::RngCore;

const PAYLOAD_LEN: usize = 256;

fn random_payload() -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

pub fn bench_encode_publish(c: &mut Criterion) {
    let payload = random_payload();
    let mut buf = [0u8; 1024];
    let mut ids = MessageIdAllocator::new();

    let mut group = c.benchmark_group("encode_publish");
    group.throughput(Throughput::Bytes(PAYLOAD_LEN as u64));
    group.bench_function("qos1", |b| {
        b.iter(|| {
            packet::publish(
                &mut buf,
                "bench/topic",
                &payload,
                QoS::AtLeastOnce,
                false,
                &mut ids,
            )
            .expect("Failed to encode")
            .1
        })
    });
    group.finish();
}

pub fn bench_parse_publish(c: &mut Criterion) {
    let payload = random_payload();
    let mut buf = [0u8; 1024];
    let mut ids = MessageIdAllocator::new();
    let frame = packet::publish(
        &mut buf,
        "bench/topic",
        &payload,
        QoS::AtLeastOnce,
        false,
        &mut ids,
    )
    .expect("Failed to encode")
    .0
    .to_vec();

    let mut group = c.benchmark_group("parse_publish");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("topic_payload_id", |b| {
        b.iter(|| {
            let topic = codec::publish_topic(&frame).expect("no topic");
            let body = codec::publish_payload(&frame).expect("no payload");
            let id = codec::packet_id(&frame).expect("no id");
            (topic.len(), body.len(), id)
        })
    });
    group.finish();
}

pub fn bench_remaining_length(c: &mut Criterion) {
    let headers: [&[u8]; 3] = [&[0x30, 0x05], &[0x30, 0x80, 0x01], &[0x30, 0xFF, 0x7F]];

    let mut group = c.benchmark_group("remaining_length");
    group.bench_function("decode", |b| {
        b.iter(|| {
            headers
                .iter()
                .map(|h| codec::remaining_length(h).expect("bad varint").0)
                .sum::<usize>()
        })
    });
    group.finish();
}

pub fn bench_queue_cycle(c: &mut Criterion) {
    let payload = random_payload();
    let mut queue: OutboundQueue<2048, 16> = OutboundQueue::new();
    let mut out = [0u8; 1024];

    let mut group = c.benchmark_group("queue_cycle");
    group.throughput(Throughput::Bytes(PAYLOAD_LEN as u64));
    group.bench_function("push_pop", |b| {
        b.iter(|| {
            queue.push(&payload).expect("Failed to push");
            let (n, done) = queue.pop_chunk(&mut out).expect("Failed to pop");
            assert!(done);
            n
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_encode_publish,
    bench_parse_publish,
    bench_remaining_length,
    bench_queue_cycle
);
criterion_main!(benches);
