//! Drives the optimization loop without a `Session`, checkpointing the best
//! canvas of every round of iterations.

use neural_style as ns;

fn main() -> Result<(), ns::Error> {
    let device = Default::default();
    let norm = ns::Normalization::IMAGENET;

    let content = ns::ImageTensor::load("imgs/tom.jpg".into(), 256, norm)?;
    let style = ns::ImageTensor::load("imgs/starry_night.jpg".into(), 256, norm)?;

    let config = ns::VggConfig::vgg19();
    let layers = ns::LayerSelection::vgg19();
    let network = config
        .init::<ns::DefaultBackend>(&device)
        .load_pytorch(&config, "vgg19.pth", &device)?;

    let extractor = ns::VggExtractor::new(network, &config, &layers)?;
    let composer = ns::LossComposer::new(1.0, 1e6, &layers);

    let params = ns::TransferParams {
        iterations: 100,
        learning_rate: 0.003,
        divergence: ns::DivergencePolicy::Abort,
    };

    let transfer = ns::Transfer::from_images(
        &extractor,
        &composer,
        content.to_tensor(&device),
        style.to_tensor(&device),
        params,
    )?;

    // Every round restarts the optimizer from the previous best canvas
    let mut canvas = content.to_tensor::<ns::DefaultBackend>(&device);
    for round in 0..5 {
        let best = transfer.run(canvas, None)?;
        println!("round {}: best loss {}", round, best.loss);

        let image = ns::ImageTensor::from_tensor(best.canvas, norm)?;
        image.save(format!("out/03_round_{}.png", round))?;

        canvas = image.to_tensor(&device);
    }

    Ok(())
}
