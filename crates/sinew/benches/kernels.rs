//! Convolution and max-pooling kernel benchmarks
//!
//! Forward and backward timings for a few CIFAR-sized layer shapes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sinew::prelude::*;

/// Deterministic 4D tensor (batch, channels, height, width)
fn wave_tensor(batch: usize, channels: usize, height: usize, width: usize) -> Tensor<f32> {
    let size = batch * channels * height * width;
    let data: Vec<f32> = (0..size).map(|i| (i as f32 * 0.01).sin()).collect();
    Tensor::from_vec(data, (batch, channels, height, width)).expect("benchmark tensor")
}

fn bench_conv(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv");

    // (name, batch, in_ch, filters, h, w, kernel, stride, pad)
    let scenarios = [
        ("cifar_3x3", 16, 3, 32, 32, 32, 3, 1, 1),
        ("mid_3x3", 8, 32, 64, 16, 16, 3, 1, 1),
        ("strided_5x5", 8, 16, 32, 33, 33, 5, 2, 1),
    ];

    for (name, batch, in_ch, filters, h, w, k, stride, pad) in scenarios {
        let x = wave_tensor(batch, in_ch, h, w);
        let wt = wave_tensor(filters, in_ch, k, k);
        let b = Tensor::<f32>::zeros(filters);
        let cfg = ConvConfig::new(stride, pad).expect("valid config");

        group.bench_with_input(BenchmarkId::new("forward", name), &x, |bench, x| {
            bench.iter(|| conv_forward(black_box(x), &wt, &b, &cfg).expect("conv forward"))
        });

        let (out, cache) = conv_forward(&x, &wt, &b, &cfg).expect("conv forward");
        let dout = Tensor::<f32>::ones(out.shape());
        group.bench_with_input(BenchmarkId::new("backward", name), &dout, |bench, dout| {
            bench.iter(|| conv_backward(black_box(dout), &cache).expect("conv backward"))
        });
    }

    group.finish();
}

fn bench_max_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("max_pool");

    for (name, batch, channels, size) in [("small", 16, 32, 16), ("large", 16, 64, 32)] {
        let x = wave_tensor(batch, channels, size, size);
        let cfg = PoolConfig::default();

        group.bench_with_input(BenchmarkId::new("forward", name), &x, |bench, x| {
            bench.iter(|| max_pool_forward(black_box(x), &cfg).expect("pool forward"))
        });

        let (out, cache) = max_pool_forward(&x, &cfg).expect("pool forward");
        let dout = Tensor::<f32>::ones(out.shape());
        group.bench_with_input(BenchmarkId::new("backward", name), &dout, |bench, dout| {
            bench.iter(|| max_pool_backward(black_box(dout), &cache).expect("pool backward"))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_conv, bench_max_pool);
criterion_main!(benches);
