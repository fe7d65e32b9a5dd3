use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use neural_style as ns;
use ns::burn::tensor::{Distribution, Tensor};
use ns::image::{DynamicImage, Rgb, RgbImage};
use ns::FeatureExtractor;
use std::time::{Duration, Instant};

type Backend = ns::DefaultBackend;

fn network() -> ns::VggConfig {
    ns::VggConfig::new(vec![
        ns::VggBlock::Conv(16),
        ns::VggBlock::MaxPool,
        ns::VggBlock::Conv(32),
        ns::VggBlock::MaxPool,
        ns::VggBlock::Conv(64),
    ])
}

fn layers() -> ns::LayerSelection {
    ns::LayerSelection::new()
        .with_content_layer("conv3_1")
        .with_equal_style_layers(&["conv1_1", "conv2_1"])
}

fn stripes(dim: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(dim, dim, |x, y| {
        Rgb([(x * 7) as u8, (y * 13) as u8, ((x + y) * 3) as u8])
    }))
}

fn gram(c: &mut Criterion) {
    let mut group = c.benchmark_group("gram");

    for dim in [32usize, 64, 128].iter() {
        let features = Tensor::<ns::burn::backend::NdArray<f32>, 4>::random(
            [1, 64, *dim, *dim],
            Distribution::Default,
            &Default::default(),
        );

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |b, _| {
            b.iter(|| black_box(ns::gram_matrix(features.clone()).into_data()));
        });
    }
    group.finish();
}

fn extract(c: &mut Criterion) {
    let device = Default::default();
    let config = network();
    let extractor =
        ns::VggExtractor::<Backend>::new(config.init(&device), &config, &layers()).unwrap();

    let mut group = c.benchmark_group("extract");
    group.sample_size(10);

    for dim in [32usize, 64, 128].iter() {
        let image = Tensor::<Backend, 4>::random([1, 3, *dim, *dim], Distribution::Default, &device);

        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |b, _| {
            b.iter(|| black_box(extractor.extract(image.clone()).unwrap()));
        });
    }
    group.finish();
}

fn session(c: &mut Criterion) {
    static DIM: u32 = 32;
    static ITERATIONS: usize = 10;

    let content = stripes(4 * DIM);
    let style = stripes(DIM);

    let mut group = c.benchmark_group("session");
    group.sample_size(10);

    for dim in [DIM, 2 * DIM, 4 * DIM].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(dim), dim, |b, &dim| {
            b.iter_custom(|iters| {
                let mut total_elapsed = Duration::new(0, 0);
                for _i in 0..iters {
                    // Building loads the network, which isn't what we're measuring
                    let sess = ns::SessionBuilder::new()
                        .network(network())
                        .layers(layers())
                        .content(content.clone())
                        .style(style.clone())
                        .max_size(dim)
                        .iterations(ITERATIONS)
                        .build::<Backend>(&Default::default())
                        .unwrap();

                    let start = Instant::now();
                    black_box(sess.run(None).unwrap());
                    total_elapsed += start.elapsed();
                }

                total_elapsed
            });
        });
    }
    group.finish();
}

criterion_group!(benches, gram, extract, session);
criterion_main!(benches);
