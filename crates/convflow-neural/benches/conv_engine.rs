use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use convflow_core::Tensor;
use convflow_neural::layers::{ConvEngine, Convolution, ConvolutionConfig, Deconvolution, Layer};
use std::time::Duration;

fn engines() -> [(&'static str, ConvEngine); 2] {
    [
        ("per_image", ConvEngine::PerImage),
        ("batch_tiled", ConvEngine::batch_tiled()),
    ]
}

/// Forward pass of a 3x3 convolution over growing batches
fn bench_conv_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv_forward");
    group.measurement_time(Duration::from_secs(5));

    for batch in [1, 4, 16, 32] {
        let input = Tensor::<f32>::ones(&[batch, 16, 28, 28]);
        group.throughput(Throughput::Elements(input.numel() as u64));

        for (name, engine) in engines() {
            let config = ConvolutionConfig::new(32)
                .with_kernel_size(3)
                .with_pad(&[1])
                .with_engine(engine)
                .with_seed(0);
            let mut conv = Convolution::<f32>::new(config);
            let mut top = vec![Tensor::zeros(&[0])];
            conv.setup(&[&input]).unwrap();

            group.bench_with_input(BenchmarkId::new(name, batch), &batch, |b, _| {
                b.iter(|| {
                    conv.forward(&[&input], &mut top).unwrap();
                    black_box(&top);
                });
            });
        }
    }
    group.finish();
}

/// Full backward pass (data and parameter gradients)
fn bench_conv_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv_backward");

    for batch in [4, 16] {
        let input = Tensor::<f32>::ones(&[batch, 16, 28, 28]);
        for (name, engine) in engines() {
            let config = ConvolutionConfig::new(32)
                .with_kernel_size(3)
                .with_pad(&[1])
                .with_engine(engine)
                .with_seed(0);
            let mut conv = Convolution::<f32>::new(config);
            let mut top = vec![Tensor::zeros(&[0])];
            conv.setup(&[&input]).unwrap();
            conv.forward(&[&input], &mut top).unwrap();
            let top_diff = Tensor::ones(top[0].dims());
            let mut bottom_diff = vec![Tensor::zeros(&[0])];

            group.bench_with_input(BenchmarkId::new(name, batch), &batch, |b, _| {
                b.iter(|| {
                    conv.backward(&[&top_diff], &[true], &[&input], &mut bottom_diff)
                        .unwrap();
                    black_box(&bottom_diff);
                });
            });
        }
    }
    group.finish();
}

/// 1x1 convolutions skip im2col entirely
fn bench_pointwise(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv_1x1_forward");
    let input = Tensor::<f32>::ones(&[16, 64, 14, 14]);

    for (name, engine) in engines() {
        let config = ConvolutionConfig::new(64).with_kernel_size(1).with_engine(engine);
        let mut conv = Convolution::<f32>::new(config);
        let mut top = vec![Tensor::zeros(&[0])];
        conv.setup(&[&input]).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                conv.forward(&[&input], &mut top).unwrap();
                black_box(&top);
            });
        });
    }
    group.finish();
}

fn bench_deconv_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("deconv_forward");
    let input = Tensor::<f32>::ones(&[16, 32, 14, 14]);

    for (name, engine) in engines() {
        let config = ConvolutionConfig::new(16)
            .with_kernel_size(4)
            .with_stride(&[2])
            .with_pad(&[1])
            .with_engine(engine);
        let mut deconv = Deconvolution::<f32>::new(config);
        let mut top = vec![Tensor::zeros(&[0])];
        deconv.setup(&[&input]).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                deconv.forward(&[&input], &mut top).unwrap();
                black_box(&top);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_conv_forward,
    bench_conv_backward,
    bench_pointwise,
    bench_deconv_forward
);
criterion_main!(benches);
