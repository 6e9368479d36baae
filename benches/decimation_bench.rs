use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use telemetry_feed::api::{ChannelMeta, ChartPipeline, RenderProfile};
use telemetry_feed::core::{ChannelId, Sample, StreamBuffer, decimate};

fn noisy_series(count: usize) -> Vec<Sample> {
    let channel = ChannelId::new("bench").expect("valid channel");
    (0..count)
        .map(|i| {
            let t = i as f64 * 0.01;
            let value = (t * 3.0).sin() * 50.0 + ((i * 7919) % 13) as f64;
            Sample::new(channel.clone(), t, value).expect("valid generated sample")
        })
        .collect()
}

fn bench_decimate_10k_to_2k(c: &mut Criterion) {
    let samples = noisy_series(10_000);

    c.bench_function("decimate_10k_to_2k", |b| {
        b.iter(|| {
            let _ = decimate(black_box(&samples), black_box(2_000)).expect("decimation");
        })
    });
}

fn bench_decimate_100k_to_1k(c: &mut Criterion) {
    let samples = noisy_series(100_000);

    c.bench_function("decimate_100k_to_1k", |b| {
        b.iter(|| {
            let _ = decimate(black_box(&samples), black_box(1_000)).expect("decimation");
        })
    });
}

fn bench_full_buffer_frame(c: &mut Criterion) {
    let channel = ChannelId::new("bench").expect("valid channel");
    let mut buffer = StreamBuffer::new(channel.clone(), 10_000).expect("buffer");
    for sample in noisy_series(25_000) {
        buffer.append(sample).expect("append");
    }
    let pipeline = ChartPipeline::new(&RenderProfile::normal())
        .with_display_points(1_500)
        .expect("display points");
    let meta = ChannelMeta::default();

    c.bench_function("frame_from_full_normal_buffer", |b| {
        b.iter(|| {
            let _ = pipeline
                .build_frame(black_box(&channel), black_box(&buffer), &meta)
                .expect("frame");
        })
    });
}

fn bench_embedded_frame_append_and_build(c: &mut Criterion) {
    let profile = RenderProfile::embedded();
    let pipeline = ChartPipeline::new(&profile);
    let channel = ChannelId::new("bench").expect("valid channel");
    let incoming = noisy_series(profile.max_points * 2);
    let meta = ChannelMeta::default();

    c.bench_function("embedded_append_then_frame", |b| {
        b.iter(|| {
            let mut buffer =
                StreamBuffer::new(channel.clone(), profile.max_points).expect("buffer");
            for sample in &incoming {
                buffer.append(sample.clone()).expect("append");
            }
            let _ = pipeline
                .build_frame(&channel, &buffer, &meta)
                .expect("frame");
        })
    });
}

criterion_group!(
    benches,
    bench_decimate_10k_to_2k,
    bench_decimate_100k_to_1k,
    bench_full_buffer_frame,
    bench_embedded_frame_append_and_build
);
criterion_main!(benches);
