use neural_style as ns;

fn main() -> Result<(), ns::Error> {
    let session = ns::SessionBuilder::new()
        // pretrained torchvision weights, without them the network is random
        .weights("vgg19.pth")
        // the content is the starting point of the optimization
        .content("imgs/tom.jpg")
        // style images can also be fetched from the web
        .style("https://upload.wikimedia.org/wikipedia/commons/e/ea/Van_Gogh_-_Starry_Night_-_Google_Art_Project.jpg")
        .iterations(500)
        .build::<ns::DefaultBackend>(&Default::default())?;

    // optimize the pixels of the canvas
    let stylized = session.run(None)?;

    // save the result to the disk
    stylized.save("out/01.png")
}
