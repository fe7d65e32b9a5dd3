use neural_style as ns;

fn main() -> Result<(), ns::Error> {
    // Shallower layers keep finer textures, and matching conv3_1 for content
    // lets the style repaint more of the image
    let layers = ns::LayerSelection::new()
        .with_content_layer("conv3_1")
        .with_style_layer("conv1_1", 0.5)
        .with_style_layer("conv2_1", 0.3)
        .with_style_layer("conv2_2", 0.2);

    let session = ns::SessionBuilder::new()
        .weights("vgg19.pth")
        .content("imgs/tom.jpg")
        .style("imgs/starry_night.jpg")
        .layers(layers)
        .max_size(256)
        .iterations(300)
        .learning_rate(0.01)
        .build::<ns::DefaultBackend>(&Default::default())?;

    let progress = Box::new(|update: ns::ProgressUpdate| {
        if update.iteration % 50 == 0 {
            println!(
                "{}/{}: loss {} (best {})",
                update.iteration, update.total, update.loss, update.best_loss
            );
        }
    });

    let stylized = session.run(Some(progress))?;
    println!(
        "kept iteration {:?} with a loss of {}",
        stylized.best_iteration(),
        stylized.best_loss()
    );

    stylized.save("out/02.png")
}
