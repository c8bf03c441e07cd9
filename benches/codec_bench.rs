use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tracecodec::transform::{DeltaLevel, ElementWidth, Pipeline, TransformStage};
use tracecodec::{ChannelId, Chromatogram, EncodeOptions, TraceFormat};

fn bench_trace() -> Chromatogram {
    let samples = 16_000;
    let bases = 800;
    let channel = |phase: usize| -> Vec<u16> {
        (0..samples)
            .map(|i| {
                let x = (i + phase) % 40;
                (if x < 20 { x * 60 } else { (40 - x) * 60 }) as u16
            })
            .collect()
    };
    let calls: String = (0..bases).map(|i| ['A', 'C', 'G', 'T'][i % 4]).collect();
    Chromatogram::builder()
        .basecalls(calls)
        .peaks((0..bases as u32).map(|i| 10 + i * 20).collect())
        .qualities((0..bases).map(|i| (i % 60) as u8).collect())
        .samples(ChannelId::A, channel(0))
        .samples(ChannelId::C, channel(10))
        .samples(ChannelId::G, channel(20))
        .samples(ChannelId::T, channel(30))
        .comment("NAME", "bench")
        .build()
        .unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let trace = bench_trace();
    let opts = EncodeOptions::default();
    for format in TraceFormat::ALL {
        c.bench_function(&format!("encode_{format}"), |b| {
            b.iter(|| tracecodec::encode(black_box(&trace), format, &opts).unwrap())
        });
    }
}

fn bench_decode(c: &mut Criterion) {
    let trace = bench_trace();
    let opts = EncodeOptions::default();
    for format in TraceFormat::ALL {
        let bytes = tracecodec::encode(&trace, format, &opts).unwrap();
        c.bench_function(&format!("decode_{format}"), |b| {
            b.iter(|| tracecodec::decode(black_box(&bytes)).unwrap())
        });
    }
}

fn bench_sample_pipeline(c: &mut Criterion) {
    let trace = bench_trace();
    let raw: Vec<u8> = trace
        .channels()
        .iter()
        .flat_map(|(_, ch)| ch.samples.iter().flat_map(|s| s.to_be_bytes()))
        .collect();
    let pipeline = Pipeline::new(vec![
        TransformStage::delta(ElementWidth::Bits16, DeltaLevel::Level3),
        TransformStage::shrink_to_8(ElementWidth::Bits16),
        TransformStage::deflate(),
    ]);
    let encoded = pipeline.apply(&raw).unwrap();

    c.bench_function("samples_pipeline_apply", |b| b.iter(|| pipeline.apply(black_box(&raw)).unwrap()));
    c.bench_function("samples_pipeline_invert", |b| b.iter(|| pipeline.invert(black_box(&encoded)).unwrap()));
}

criterion_group!(benches, bench_encode, bench_decode, bench_sample_pipeline);
criterion_main!(benches);
