use crate::*;
use burn::tensor::backend::AutodiffBackend;
use std::path::{Path, PathBuf};

/// Style transfer session.
///
/// Calling `run()` optimizes a canvas initialized from the content image and
/// returns the lowest loss canvas, consuming the session in the process. You
/// can provide a `TransferProgress` implementation to get an update after
/// every iteration.
///
/// # Example
/// ```no_run
/// use neural_style::{DefaultBackend, SessionBuilder};
///
/// let session = SessionBuilder::new()
///     .content("imgs/tom.jpg")
///     .style("imgs/starry_night.jpg")
///     .iterations(500)
///     .build::<DefaultBackend>(&Default::default())
///     .expect("failed to build session");
///
/// let stylized = session.run(None).expect("optimization failed");
/// stylized.save("out/tom.png").expect("failed to save image");
/// ```
pub struct Session<B: AutodiffBackend> {
    content: ImageTensor,
    style: ImageTensor,
    extractor: VggExtractor<B>,
    composer: LossComposer,
    params: Parameters,
    device: B::Device,
}

impl<B: AutodiffBackend> Session<B> {
    /// The normalized content image, which also sets the output size
    pub fn content(&self) -> &ImageTensor {
        &self.content
    }

    /// The normalized style image
    pub fn style(&self) -> &ImageTensor {
        &self.style
    }

    /// Runs the optimization and outputs the best image it found.
    pub fn run(
        self,
        mut progress: Option<Box<dyn TransferProgress>>,
    ) -> Result<StylizedImage, Error> {
        let progress: Option<&mut dyn TransferProgress> = match progress {
            Some(ref mut progress) => Some(progress.as_mut()),
            None => None,
        };

        let content = self.content.to_tensor::<B>(&self.device);
        let style = self.style.to_tensor::<B>(&self.device);

        log::info!(
            "content {}x{}, style {}x{}, {} iterations",
            self.content.dims().width,
            self.content.dims().height,
            self.style.dims().width,
            self.style.dims().height,
            self.params.iterations
        );

        let transfer = Transfer::from_images(
            &self.extractor,
            &self.composer,
            content.clone(),
            style,
            self.params.to_transfer_params(),
        )?;

        let best = transfer.run(content, progress)?;

        match best.iteration {
            Some(iteration) => log::info!("best loss {} at iteration {}", best.loss, iteration),
            None => log::info!("no iterations were run, returning the content image"),
        }

        let image = ImageTensor::from_tensor(best.canvas, self.params.normalization)?;

        Ok(StylizedImage {
            image: image.to_image(),
            loss: best.loss,
            iteration: best.iteration,
        })
    }
}

/// Builds a session by setting parameters and adding the input images,
/// calling `build` checks all of the provided inputs and loads the network
#[derive(Default)]
pub struct SessionBuilder<'a> {
    content: Option<ImageSource<'a>>,
    style: Option<ImageSource<'a>>,
    weights: Option<PathBuf>,
    network: VggConfig,
    layers: LayerSelection,
    params: Parameters,
}

impl<'a> SessionBuilder<'a> {
    /// Creates a new `SessionBuilder` with default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// The image whose structure is preserved. The canvas starts out as this
    /// image, and the output has its dimensions.
    pub fn content<I: Into<ImageSource<'a>>>(mut self, content: I) -> Self {
        self.content = Some(content.into());
        self
    }

    /// The image whose textures and colors are transferred.
    pub fn style<I: Into<ImageSource<'a>>>(mut self, style: I) -> Self {
        self.style = Some(style.into());
        self
    }

    /// A PyTorch file with pretrained VGG weights, see `Vgg::load_pytorch`.
    ///
    /// Without one the network is randomly initialized, which still produces
    /// textures, though not very pleasing ones.
    pub fn weights<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.weights = Some(path.into());
        self
    }

    /// Replaces the network layout.
    ///
    /// Default: VGG-19
    pub fn network(mut self, config: VggConfig) -> Self {
        self.network = config;
        self
    }

    /// Selects the content and style layers.
    ///
    /// Default: `LayerSelection::vgg19()`
    pub fn layers(mut self, layers: LayerSelection) -> Self {
        self.layers = layers;
        self
    }

    /// The number of optimization steps, no early exit is taken.
    ///
    /// Default: 2000
    pub fn iterations(mut self, count: usize) -> Self {
        self.params.iterations = count;
        self
    }

    /// Weight of the content loss, alpha.
    ///
    /// Default: 1.0
    pub fn content_weight(mut self, value: f32) -> Self {
        self.params.content_weight = value;
        self
    }

    /// Weight of the style loss, beta. The style loss is a sum of small size
    /// normalized terms, so this is usually several orders of magnitude
    /// larger than the content weight.
    ///
    /// Default: 1e6
    pub fn style_weight(mut self, value: f32) -> Self {
        self.params.style_weight = value;
        self
    }

    /// Step size of the Adam optimizer.
    ///
    /// Default: 0.003
    pub fn learning_rate(mut self, value: f64) -> Self {
        self.params.learning_rate = value;
        self
    }

    /// Input images are downscaled so their longer side is at most this many
    /// pixels.
    ///
    /// Default: 512
    pub fn max_size(mut self, size: u32) -> Self {
        self.params.max_size = size;
        self
    }

    /// Default: `ContentLayerPolicy::LastLayer`
    pub fn content_policy(mut self, policy: ContentLayerPolicy) -> Self {
        self.params.content_policy = policy;
        self
    }

    /// Default: `DivergencePolicy::Abort`
    pub fn divergence_policy(mut self, policy: DivergencePolicy) -> Self {
        self.params.divergence = policy;
        self
    }

    /// The per channel statistics the network was trained with.
    ///
    /// Default: `Normalization::IMAGENET`
    pub fn normalization(mut self, normalization: Normalization) -> Self {
        self.params.normalization = normalization;
        self
    }

    /// Creates a `Session`, or returns an error if invalid parameters or input
    /// images were specified.
    pub fn build<B: AutodiffBackend>(self, device: &B::Device) -> Result<Session<B>, Error> {
        self.check_parameters_validity()?;

        // Catch bad layer names before spending time on loading anything
        self.layers.resolve(&self.network)?;

        let content_src = self.content.ok_or(Error::MissingInput("content"))?;
        let style_src = self.style.ok_or(Error::MissingInput("style"))?;

        let content = ImageTensor::load(content_src, self.params.max_size, self.params.normalization)?;
        let style = ImageTensor::load(style_src, self.params.max_size, self.params.normalization)?;

        let network = self.network.init::<B>(device);
        let network = match self.weights {
            Some(ref path) => {
                log::info!("loading network weights from {}", path.display());
                network.load_pytorch(&self.network, path, device)?
            }
            None => {
                log::warn!("no network weights were provided, using random weights");
                network
            }
        };

        let extractor = VggExtractor::new(network, &self.network, &self.layers)?;
        let composer = LossComposer::new(
            self.params.content_weight,
            self.params.style_weight,
            &self.layers,
        )
        .with_policy(self.params.content_policy);

        Ok(Session {
            content,
            style,
            extractor,
            composer,
            params: self.params,
            device: device.clone(),
        })
    }

    fn check_parameters_validity(&self) -> Result<(), Error> {
        let non_negative = |value: f64, name: &'static str| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(Error::InvalidRange(errors::InvalidRange {
                    min: 0.0,
                    max: f64::INFINITY,
                    value,
                    name,
                }))
            }
        };

        non_negative(self.params.learning_rate, "learning-rate")?;
        non_negative(f64::from(self.params.content_weight), "alpha")?;
        non_negative(f64::from(self.params.style_weight), "beta")?;

        if self.params.max_size == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: f64::from(u32::MAX),
                value: 0.0,
                name: "max-size",
            }));
        }

        Ok(())
    }
}

/// The lowest loss image found by a `Session`
pub struct StylizedImage {
    image: image::RgbImage,
    loss: f32,
    iteration: Option<usize>,
}

impl StylizedImage {
    /// Saves the image to the specified path, creating any missing parent
    /// directories. The format is inferred from the extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        codec::save_image(&self.image, path.as_ref())
    }

    /// Writes the image to a stream in the specified format
    pub fn write<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        fmt: image::ImageOutputFormat,
    ) -> Result<(), Error> {
        let dyn_img = image::DynamicImage::ImageRgb8(self.image.clone());
        Ok(dyn_img.write_to(writer, fmt)?)
    }

    /// The loss of the returned image, `f32::INFINITY` if no iteration ran
    pub fn best_loss(&self) -> f32 {
        self.loss
    }

    /// The iteration that produced the returned image, `None` if it is the
    /// unmodified content image
    pub fn best_iteration(&self) -> Option<usize> {
        self.iteration
    }

    pub fn into_image(self) -> image::RgbImage {
        self.image
    }
}

impl AsRef<image::RgbImage> for StylizedImage {
    fn as_ref(&self) -> &image::RgbImage {
        &self.image
    }
}
