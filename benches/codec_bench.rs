//! yinliu 解码性能基准测试.
//!
//! 覆盖逆 MDCT 内核、内层循环策略以及完整音频包解码.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use yinliu::codec::{
    DirectImdct, DspKernels, FftImdct, ImdctKernel, KernelKind, MemoryPacketSource,
    OutputLayout, TransformKind, VorbisDecoder, VorbisDecoderOptions,
};

#[path = "../tests/common/mod.rs"]
mod common;

fn spectrum(n: usize) -> Vec<f32> {
    (0..n).map(|i| ((i * 7919) % 257) as f32 / 257.0 - 0.5).collect()
}

fn bench_imdct(c: &mut Criterion) {
    let mut group = c.benchmark_group("imdct");
    for n in [128usize, 1024] {
        let input = spectrum(n);
        let mut fft = FftImdct::new(n);
        group.bench_with_input(BenchmarkId::new("fft", n), &input, |b, input| {
            let mut buf = input.clone();
            b.iter(|| {
                buf.copy_from_slice(input);
                fft.transform(black_box(&mut buf));
            });
        });
        let mut direct = DirectImdct::new(n);
        group.bench_with_input(BenchmarkId::new("direct", n), &input, |b, input| {
            let mut buf = input.clone();
            b.iter(|| {
                buf.copy_from_slice(input);
                direct.transform(black_box(&mut buf));
            });
        });
    }
    group.finish();
}

fn bench_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlap_add_1024");
    let window: Vec<f32> = (0..1024).map(|i| i as f32 / 1024.0).collect();
    for kernels in [&DspKernels::SCALAR, &DspKernels::ZIPPED] {
        let mut cur = spectrum(1024);
        let mut prev = spectrum(512);
        group.bench_function(kernels.name, |b| {
            b.iter(|| (kernels.overlap_add)(black_box(&mut cur), black_box(&mut prev), &window));
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let blocks: Vec<bool> = (0..64).map(|i| i % 8 != 3).collect();
    let packets = common::stream_packets(2, &blocks);
    let mut group = c.benchmark_group("decode_64_packets");
    for (name, transform, kernels) in [
        ("fft_auto", TransformKind::Fft, KernelKind::Auto),
        ("fft_scalar", TransformKind::Fft, KernelKind::Scalar),
        ("direct_auto", TransformKind::Direct, KernelKind::Auto),
    ] {
        let options = VorbisDecoderOptions { transform, kernels };
        group.bench_function(name, |b| {
            let mut pcm = vec![0i16; 4096];
            b.iter(|| {
                let source = MemoryPacketSource::new(packets.clone());
                let mut decoder = VorbisDecoder::with_options(source, options);
                decoder.parse_headers().expect("头包解析失败");
                let mut frames = 0usize;
                while decoder.decode_audio_packet().expect("解码失败") {
                    while decoder.samples_remaining() > 0 {
                        frames += decoder.read_samples(OutputLayout::Native, &mut pcm);
                    }
                }
                black_box(frames)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_imdct, bench_kernels, bench_decode);
criterion_main!(benches);
