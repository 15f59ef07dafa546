//! Performance benchmarks for the radar engine

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use radar::{
    discovery::LivenessProber,
    expand_ports,
    network::{packet::TcpPacketBuilder, protocol::tcp_service_hint},
    utils::{
        address_exclusions::ExcludedAddressSet, shuffle::IndexPermutation,
        target_parser::AddressSpace,
    },
    Dispatch, EndpointTransfer, Task, TaskOption,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

struct Discard;

#[async_trait]
impl Dispatch for Discard {
    async fn callback(&self, tx: EndpointTransfer) {
        black_box(tx);
    }

    async fn end(&self) {}
}

struct AllDead;

#[async_trait]
impl LivenessProber for AllDead {
    async fn is_live(&self, _ip: IpAddr, _timeout: Duration) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "all-dead"
    }
}

fn bench_packet_crafting(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_crafting");
    let src = Ipv4Addr::new(192, 168, 1, 1);
    let dst = Ipv4Addr::new(192, 168, 1, 100);

    group.bench_function("tcp_syn_segment", |b| {
        b.iter(|| {
            let segment = TcpPacketBuilder::new(black_box(src), black_box(dst), 40000, black_box(80))
                .syn()
                .seq_num(0x1234_5678)
                .build_segment();
            black_box(segment)
        })
    });

    group.bench_function("tcp_syn_batch_1000", |b| {
        b.iter(|| {
            for port in black_box(1..=1000u16) {
                black_box(TcpPacketBuilder::new(src, dst, 40000, port).syn().build_segment());
            }
        })
    });

    group.finish();
}

fn bench_port_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("port_expansion");

    for spec in ["top200", "top1000", "top5000", "top1000,1-65535"] {
        group.bench_with_input(BenchmarkId::from_parameter(spec), &spec, |b, spec| {
            b.iter(|| black_box(expand_ports(spec)))
        });
    }

    group.bench_function("service_hint_top1000", |b| {
        let ports = expand_ports("top1000").unwrap_or_default();
        b.iter(|| ports.iter().filter_map(|&p| tcp_service_hint(p)).count())
    });

    group.finish();
}

fn bench_address_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_enumeration");

    group.bench_function("parse_mixed_targets", |b| {
        b.iter(|| {
            black_box(AddressSpace::parse(black_box(
                "10.0.0.0/16,192.168.1.10-192.168.1.200,172.16.5.4,fd00::/120",
            )))
        })
    });

    for prefix in [24u8, 16] {
        group.bench_with_input(
            BenchmarkId::new("permute_block", prefix),
            &prefix,
            |b, &prefix| {
                let space = AddressSpace::parse(&format!("10.0.0.0/{}", prefix)).unwrap();
                b.iter(|| {
                    let block = &space.blocks()[0];
                    let order = IndexPermutation::new(block.len());
                    order.iter().filter_map(|i| block.nth(i)).count()
                })
            },
        );
    }

    group.bench_function("exclusion_lookup_65536", |b| {
        let excluded = ExcludedAddressSet::parse("10.0.0.0/16,192.168.0.0/24").unwrap();
        b.iter(|| {
            (0..65536u32)
                .map(|i| IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + i * 7)))
                .filter(|ip| excluded.is_excluded(*ip))
                .count()
        })
    });

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    // liveness filter rejects every host, so this measures enumeration and pool overhead
    for prefix in [24u8, 20] {
        group.bench_with_input(
            BenchmarkId::new("dead_hosts_top1000", prefix),
            &prefix,
            |b, &prefix| {
                b.iter(|| {
                    rt.block_on(async {
                        let option = TaskOption::new(format!("192.0.2.0/{}", prefix))
                            .with_ports("top1000")
                            .with_ping(true)
                            .with_pool(200, 10, 10);
                        let task = Task::new(option);
                        black_box(task.run(Arc::new(Discard), Arc::new(AllDead)).await)
                    })
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_packet_crafting,
    bench_port_expansion,
    bench_address_enumeration,
    bench_pipeline
);
criterion_main!(benches);
