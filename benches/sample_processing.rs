//! Benchmarks for sample conversion and buffer demultiplexing
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iio_core::attr::codec::{decode_named, BlockEncoder};
use iio_core::backend::{
    ChannelDescription, ContextDescription, DeviceDescription, SignalPattern, SimulatedBackend,
};
use iio_core::{convert, convert_inverse, ChannelKey, Context, DataFormat, Direction, Sample};

fn formats() -> Vec<(&'static str, DataFormat)> {
    vec![
        ("le_u8", DataFormat::new(8, 8)),
        ("le_s12_shift4", DataFormat::new(16, 12).with_shift(4).signed()),
        ("be_s24_in_32", DataFormat::new(32, 24).with_shift(8).signed().big_endian()),
        ("le_s16_scaled", DataFormat::new(16, 16).signed().with_scale(0.25)),
    ]
}

fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert");
    group.throughput(Throughput::Elements(1));

    for (name, format) in formats() {
        let raw = vec![0xA5u8; format.storage_bytes()];
        group.bench_with_input(BenchmarkId::new("forward", name), &format, |b, format| {
            b.iter(|| convert(black_box(format), black_box(&raw)));
        });

        let sample = convert(&format, &raw);
        group.bench_with_input(BenchmarkId::new("inverse", name), &format, |b, format| {
            b.iter(|| convert_inverse(black_box(format), black_box(sample)));
        });
    }

    group.finish();
}

/// Four-channel ADC generating sine waves, every channel enabled
fn adc_context() -> Context {
    let mut dev = DeviceDescription::new("adc");
    let mut keys = Vec::new();
    for i in 0..4u32 {
        let id = format!("voltage{}", i);
        dev = dev.with_channel(ChannelDescription::input(&id).scan_element(i, "le:s12/16>>4"));
        keys.push(ChannelKey::new("adc", id, Direction::Input));
    }

    let mut backend = SimulatedBackend::new(ContextDescription::new("bench").with_device(dev));
    for key in keys {
        backend = backend.with_pattern(
            key,
            SignalPattern::Sine {
                frequency: 0.01,
                amplitude: 1000.0,
                offset: 0.0,
            },
        );
    }

    let mut ctx = Context::new(backend).expect("bench context");
    if let Some(dev) = ctx.device_mut(0) {
        for i in 0..dev.channels_count() {
            if let Some(chn) = dev.channel_mut(i) {
                chn.enable();
            }
        }
    }
    ctx
}

fn bench_demux(c: &mut Criterion) {
    let mut group = c.benchmark_group("demux");

    for samples in [256usize, 4096, 65_536] {
        let ctx = adc_context();
        let dev = ctx.device(0).expect("bench device");
        let chn = dev.channel(2).expect("bench channel");
        let mut buf = ctx.create_buffer(dev, samples, false).expect("bench buffer");
        buf.refill().expect("bench refill");

        group.throughput(Throughput::Elements(samples as u64));
        group.bench_with_input(BenchmarkId::new("samples", samples), &samples, |b, _| {
            b.iter(|| buf.samples(chn).map(|s| s.as_f64()).sum::<f64>());
        });

        let mut dst = vec![0u8; samples * 2];
        group.bench_with_input(BenchmarkId::new("read", samples), &samples, |b, _| {
            b.iter(|| buf.read(chn, black_box(&mut dst)));
        });
        group.bench_with_input(BenchmarkId::new("read_raw", samples), &samples, |b, _| {
            b.iter(|| buf.read_raw(chn, black_box(&mut dst)));
        });
        group.bench_with_input(BenchmarkId::new("iter_samples", samples), &samples, |b, _| {
            b.iter(|| buf.iter_samples().map(|(_, payload)| payload.len()).sum::<usize>());
        });
        drop(buf);
    }

    group.finish();
}

fn bench_mux(c: &mut Criterion) {
    let mut group = c.benchmark_group("mux");
    let desc = ContextDescription::new("bench").with_device(
        DeviceDescription::new("dac")
            .with_channel(ChannelDescription::output("voltage0").scan_element(0, "le:s16/16>>0"))
            .with_channel(ChannelDescription::output("voltage1").scan_element(1, "le:s16/16>>0")),
    );
    let mut ctx = Context::new(SimulatedBackend::new(desc)).expect("bench context");
    if let Some(dev) = ctx.device_mut(0) {
        for i in 0..2 {
            if let Some(chn) = dev.channel_mut(i) {
                chn.enable();
            }
        }
    }

    let samples = 4096;
    let dev = ctx.device(0).expect("bench device");
    let chn = dev.channel(0).expect("bench channel");
    let mut buf = ctx.create_buffer(dev, samples, false).expect("bench buffer");

    group.throughput(Throughput::Elements(samples as u64));
    group.bench_function("write_samples", |b| {
        b.iter(|| buf.write_samples(chn, (0..samples).map(|i| Sample::I16(i as i16))));
    });
    group.finish();
}

fn bench_attr_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("attr_batch");

    for count in [8usize, 64, 512] {
        let names: Vec<String> = (0..count).map(|i| format!("attr{}", i)).collect();
        let mut enc = BlockEncoder::new();
        for (i, name) in names.iter().enumerate() {
            if i % 7 == 0 {
                enc.push_error(5);
            } else {
                enc.push_data(name.as_bytes()).expect("bench block");
            }
        }
        let data = enc.finish();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("decode", count), &data, |b, data| {
            b.iter(|| {
                decode_named(names.iter().map(String::as_str), black_box(data))
                    .filter(|(_, v)| v.is_ok())
                    .count()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_convert, bench_demux, bench_mux, bench_attr_batch);
criterion_main!(benches);
