//! Write and read throughput.
//!
//! Run with: cargo bench --bench roundtrip_benchmark

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mdf_engine::{
    CanMessage, Channel, DataGroupId, DataType, FlushPolicy, MdfReader, MdfWriter, WriterConfig,
};
use std::{hint::black_box, path::Path};

const START: u64 = 1_700_000_000_000_000_000;

fn write_file(path: &Path, channels: usize, records: u64, compress: bool) -> mdf_engine::Result<()> {
    let config = WriterConfig {
        compress,
        flush_policy: FlushPolicy::EveryNRecords(10_000),
        ..Default::default()
    };
    let mut writer = MdfWriter::init(path, config)?;
    let dg = writer.create_data_group("bench")?;
    let cg = writer.create_channel_group(dg, "Bench")?;
    writer.create_channel(cg, Channel::master_time("t"))?;
    let ids = (0..channels)
        .map(|i| writer.create_channel(cg, Channel::new(&format!("ch{i}"), DataType::FloatLE, 64)))
        .collect::<mdf_engine::Result<Vec<_>>>()?;
    writer.init_measurement()?;
    writer.start_measurement(START)?;
    for r in 0..records {
        for (i, id) in ids.iter().enumerate() {
            writer.set_channel_value(*id, (r as f64) * 0.1 + i as f64)?;
        }
        writer.save_sample(cg, START + r * 1_000_000)?;
    }
    writer.stop_measurement(START + records * 1_000_000)?;
    writer.finalize_measurement()
}

fn bench_write(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("write");
    for records in [1_000u64, 10_000] {
        group.throughput(Throughput::Elements(records));
        for compress in [false, true] {
            let name = if compress { "dz" } else { "dt" };
            group.bench_with_input(BenchmarkId::new(name, records), &records, |b, &records| {
                let path = dir.path().join(format!("write_{name}_{records}.mf4"));
                b.iter(|| write_file(&path, 8, records, compress).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("read.mf4");
    write_file(&path, 8, 10_000, false).unwrap();

    c.bench_function("read/10000x8", |b| {
        b.iter(|| {
            let mut reader = MdfReader::new(&path).unwrap();
            reader.try_read_everything_but_data().unwrap();
            reader.try_read_data(DataGroupId(0)).unwrap();
            let id = reader.find_channel("ch3").unwrap();
            let values = reader.create_channel_observer(id).unwrap().values().unwrap();
            black_box(values.len())
        })
    });
}

fn bench_can(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("can.mf4");
    let message = CanMessage::new(0x123, &[1, 2, 3, 4, 5, 6, 7, 8]);

    let mut group = c.benchmark_group("can");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("save_can_message", |b| {
        b.iter(|| {
            let mut writer = MdfWriter::init(&path, WriterConfig::default()).unwrap();
            let groups = writer.create_bus_log_configuration().unwrap();
            writer.init_measurement().unwrap();
            writer.start_measurement(START).unwrap();
            for i in 0..10_000u64 {
                writer
                    .save_can_message(groups.data_frame, START + i * 100_000, &message)
                    .unwrap();
            }
            writer.stop_measurement(START + 1_000_000_000).unwrap();
            writer.finalize_measurement().unwrap();
        })
    });
    group.finish();
}

criterion_group!(benches, bench_write, bench_read, bench_can);
criterion_main!(benches);
