//! The optimization loop: gradient descent on the pixels of a canvas, with
//! the lowest loss canvas kept as the result.

use crate::{
    features::FeatureExtractor,
    loss::{LossComposer, Targets},
    Error,
};
use burn::{
    module::{Module, Param},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};

/// The image being optimized, the only parameter that receives gradients
#[derive(Module, Debug)]
pub struct Canvas<B: Backend> {
    pixels: Param<Tensor<B, 4>>,
}

impl<B: Backend> Canvas<B> {
    pub fn new(initial: Tensor<B, 4>) -> Self {
        Self {
            pixels: Param::from_tensor(initial.require_grad()),
        }
    }

    pub fn pixels(&self) -> Tensor<B, 4> {
        self.pixels.val()
    }
}

/// What to do when the loss becomes NaN or infinite
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum DivergencePolicy {
    /// Stop with `Error::Diverged`
    #[default]
    Abort,
    /// Log a warning and keep iterating without updating the canvas, the
    /// iteration never becomes the best result
    Skip,
}

/// The state of the loop after one iteration
#[derive(Copy, Clone, Debug)]
pub struct ProgressUpdate {
    /// Zero based index of the iteration that just completed
    pub iteration: usize,
    /// The iteration budget
    pub total: usize,
    /// The loss evaluated in this iteration
    pub loss: f32,
    /// The lowest loss seen so far
    pub best_loss: f32,
}

/// Allows the loop to update external callers after every iteration
pub trait TransferProgress {
    fn update(&mut self, info: ProgressUpdate);
}

impl<G> TransferProgress for G
where
    G: FnMut(ProgressUpdate) + Send,
{
    fn update(&mut self, info: ProgressUpdate) {
        self(info)
    }
}

/// Logs a progress line every `interval(total)` iterations, and forwards
/// every iteration to the optional callback
struct Reporter<'a> {
    every: usize,
    callback: Option<&'a mut dyn TransferProgress>,
}

impl<'a> Reporter<'a> {
    fn new(total: usize, callback: Option<&'a mut dyn TransferProgress>) -> Self {
        Self {
            every: report_interval(total),
            callback,
        }
    }

    fn report(&mut self, update: ProgressUpdate) {
        if update.iteration % self.every == 0 {
            log::info!(
                "Epoch {}/{} || Loss: {}",
                update.iteration,
                update.total,
                update.best_loss
            );
        }

        if let Some(callback) = self.callback.as_mut() {
            callback.update(update);
        }
    }
}

/// Number of iterations between two progress lines
pub fn report_interval(total: usize) -> usize {
    total.div_ceil(10) + 1
}

#[derive(Copy, Clone, Debug)]
pub struct TransferParams {
    pub iterations: usize,
    pub learning_rate: f64,
    pub divergence: DivergencePolicy,
}

/// The lowest loss canvas observed, detached from the autodiff graph
#[derive(Clone, Debug)]
pub struct BestResult<B: Backend> {
    /// `f32::INFINITY` if no iteration ran
    pub loss: f32,
    /// `None` if no iteration ran, in which case `canvas` is the initial image
    pub iteration: Option<usize>,
    pub canvas: Tensor<B, 4>,
}

/// Optimizes a canvas initialized from the content image until the iteration
/// budget is spent.
pub struct Transfer<'a, B: AutodiffBackend, E> {
    extractor: &'a E,
    composer: &'a LossComposer,
    targets: Targets<B>,
    params: TransferParams,
}

impl<'a, B, E> Transfer<'a, B, E>
where
    B: AutodiffBackend,
    E: FeatureExtractor<B>,
{
    pub fn new(
        extractor: &'a E,
        composer: &'a LossComposer,
        targets: Targets<B>,
        params: TransferParams,
    ) -> Self {
        Self {
            extractor,
            composer,
            targets,
            params,
        }
    }

    /// Computes the targets from the content and style images with `extractor`
    pub fn from_images(
        extractor: &'a E,
        composer: &'a LossComposer,
        content: Tensor<B, 4>,
        style: Tensor<B, 4>,
        params: TransferParams,
    ) -> Result<Self, Error> {
        let targets = Targets::new(extractor.extract(content)?, extractor.extract(style)?);
        Ok(Self::new(extractor, composer, targets, params))
    }

    pub fn run(
        &self,
        content: Tensor<B, 4>,
        progress: Option<&mut dyn TransferProgress>,
    ) -> Result<BestResult<B::InnerBackend>, Error> {
        let TransferParams {
            iterations,
            learning_rate,
            divergence,
        } = self.params;

        let mut best = BestResult {
            loss: f32::INFINITY,
            iteration: None,
            canvas: content.clone().inner(),
        };

        let mut canvas = Canvas::new(content);
        let mut optim = AdamConfig::new()
            .with_epsilon(1e-8)
            .init::<B, Canvas<B>>();
        let mut reporter = Reporter::new(iterations, progress);

        for iteration in 0..iterations {
            let features = self.extractor.extract(canvas.pixels())?;
            let terms = self.composer.compose(&features, &self.targets)?;

            let loss: f32 = terms.total.clone().into_scalar().elem();
            log::debug!(
                "iteration {}: content {} style {} total {}",
                iteration,
                terms.content.into_scalar().elem::<f32>(),
                terms.style.into_scalar().elem::<f32>(),
                loss
            );

            if loss.is_finite() {
                let grads = GradientsParams::from_grads(terms.total.backward(), &canvas);
                canvas = optim.step(learning_rate, canvas, grads);

                if loss < best.loss {
                    best = BestResult {
                        loss,
                        iteration: Some(iteration),
                        canvas: canvas.pixels().inner(),
                    };
                }
            } else {
                match divergence {
                    DivergencePolicy::Abort => return Err(Error::Diverged { iteration, loss }),
                    // Neither the canvas nor the optimizer moments see the
                    // non-finite gradient
                    DivergencePolicy::Skip => {
                        log::warn!(
                            "iteration {} produced a non-finite loss ({}), skipping its update",
                            iteration,
                            loss
                        );
                    }
                }
            }

            reporter.report(ProgressUpdate {
                iteration,
                total: iterations,
                loss,
                best_loss: best.loss,
            });
        }

        Ok(best)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        features::{Features, VggExtractor},
        vgg::{VggBlock, VggConfig},
        LayerSelection,
    };
    use std::cell::Cell;
    use burn::{
        backend::{Autodiff, NdArray},
        tensor::{Distribution, Tolerance},
    };

    type TestBackend = Autodiff<NdArray<f32>>;

    fn setup() -> (VggExtractor<TestBackend>, LossComposer) {
        let device = Default::default();
        let config = VggConfig::new(vec![
            VggBlock::Conv(4),
            VggBlock::MaxPool,
            VggBlock::Conv(8),
        ]);
        let selection = LayerSelection::new()
            .with_content_layer("conv2_1")
            .with_equal_style_layers(&["conv1_1", "pool1"]);

        let extractor =
            VggExtractor::new(config.init(&device), &config, &selection).unwrap();
        let composer = LossComposer::new(1.0, 1e3, &selection);

        (extractor, composer)
    }

    fn image(seed: f64) -> Tensor<TestBackend, 4> {
        Tensor::random(
            [1, 3, 12, 12],
            Distribution::Uniform(-seed, seed),
            &Default::default(),
        )
    }

    fn params(iterations: usize, learning_rate: f64) -> TransferParams {
        TransferParams {
            iterations,
            learning_rate,
            divergence: DivergencePolicy::Abort,
        }
    }

    #[test]
    fn interval() {
        assert_eq!(report_interval(2000), 201);
        assert_eq!(report_interval(50), 6);
        assert_eq!(report_interval(55), 7);
        assert_eq!(report_interval(0), 1);
    }

    #[test]
    fn no_iterations_returns_the_content() {
        let (extractor, composer) = setup();
        let content = image(1.0);

        let transfer =
            Transfer::from_images(&extractor, &composer, content.clone(), image(2.0), params(0, 0.003))
                .unwrap();
        let best = transfer.run(content.clone(), None).unwrap();

        assert_eq!(best.iteration, None);
        assert!(best.loss.is_infinite());
        best.canvas
            .into_data()
            .assert_approx_eq::<f32>(&content.inner().into_data(), Tolerance::default());
    }

    #[test]
    fn zero_learning_rate_keeps_the_canvas() {
        let (extractor, composer) = setup();
        let content = image(1.0);

        let transfer =
            Transfer::from_images(&extractor, &composer, content.clone(), image(2.0), params(1, 0.0))
                .unwrap();
        let best = transfer.run(content.clone(), None).unwrap();

        assert_eq!(best.iteration, Some(0));
        best.canvas
            .into_data()
            .assert_approx_eq::<f32>(&content.inner().into_data(), Tolerance::default());
    }

    #[test]
    fn best_loss_never_increases() {
        let (extractor, composer) = setup();
        let content = image(1.0);

        let transfer =
            Transfer::from_images(&extractor, &composer, content.clone(), image(2.0), params(30, 0.05))
                .unwrap();

        let mut seen = Vec::new();
        let mut record = |update: ProgressUpdate| seen.push(update);
        let best = transfer.run(content, Some(&mut record)).unwrap();

        assert_eq!(seen.len(), 30);
        for pair in seen.windows(2) {
            assert!(pair[1].best_loss <= pair[0].best_loss);
        }

        let lowest = seen.iter().map(|u| u.loss).fold(f32::INFINITY, f32::min);
        assert_eq!(best.loss, lowest);
        assert_eq!(seen.last().unwrap().best_loss, lowest);
    }

    #[test]
    fn optimization_lowers_the_loss() {
        let (extractor, composer) = setup();
        let content = image(1.0);

        let transfer =
            Transfer::from_images(&extractor, &composer, content.clone(), image(2.0), params(40, 0.05))
                .unwrap();

        let mut first = None;
        let mut record = |update: ProgressUpdate| {
            first.get_or_insert(update.loss);
        };
        let best = transfer.run(content, Some(&mut record)).unwrap();

        assert!(best.loss < first.unwrap());
    }

    #[test]
    fn divergence() {
        let (extractor, composer) = setup();
        let content = image(1.0);
        let nan = content.clone().mul_scalar(f32::NAN);

        let transfer =
            Transfer::from_images(&extractor, &composer, content, image(2.0), params(3, 0.003)).unwrap();
        assert!(matches!(
            transfer.run(nan.clone(), None),
            Err(Error::Diverged { iteration: 0, .. })
        ));

        let transfer = Transfer {
            params: TransferParams {
                divergence: DivergencePolicy::Skip,
                ..transfer.params
            },
            ..transfer
        };
        let best = transfer.run(nan, None).unwrap();
        assert_eq!(best.iteration, None);
    }

    /// Returns NaN activations for one call, and defers to a real extractor
    /// otherwise
    struct NanOnCall<'a> {
        inner: &'a VggExtractor<TestBackend>,
        calls: Cell<usize>,
        poisoned: usize,
    }

    impl FeatureExtractor<TestBackend> for NanOnCall<'_> {
        fn extract(&self, image: Tensor<TestBackend, 4>) -> Result<Features<TestBackend>, Error> {
            let call = self.calls.get();
            self.calls.set(call + 1);

            if call == self.poisoned {
                self.inner.extract(image.mul_scalar(f32::NAN))
            } else {
                self.inner.extract(image)
            }
        }
    }

    #[test]
    fn skipped_iteration_does_not_poison_the_canvas() {
        let (extractor, composer) = setup();
        let content = image(1.0);

        // calls 0 and 1 compute the targets, call 2 is iteration 0
        let flaky = NanOnCall {
            inner: &extractor,
            calls: Cell::new(0),
            poisoned: 2,
        };

        let params = TransferParams {
            divergence: DivergencePolicy::Skip,
            ..params(5, 0.05)
        };
        let transfer =
            Transfer::from_images(&flaky, &composer, content.clone(), image(2.0), params).unwrap();

        let mut seen = Vec::new();
        let mut record = |update: ProgressUpdate| seen.push(update);
        let best = transfer.run(content, Some(&mut record)).unwrap();

        assert!(!seen[0].loss.is_finite());
        assert!(seen[1..].iter().all(|u| u.loss.is_finite()));

        assert!(best.loss.is_finite());
        assert!(matches!(best.iteration, Some(i) if i >= 1));

        let data = best.canvas.into_data();
        assert!(data.iter::<f32>().all(f32::is_finite));
    }
}
