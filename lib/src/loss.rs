use crate::{features::Features, gram::gram_matrix, Error, LayerSelection};
use burn::tensor::{backend::Backend, Tensor};

/// How the losses of several content layers are combined.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ContentLayerPolicy {
    /// Only the last selected content layer contributes. With the usual
    /// single content layer this is the same as `Sum`.
    #[default]
    LastLayer,
    /// Every selected content layer contributes equally.
    Sum,
}

/// The fixed representations the canvas is compared against, computed once
/// before optimization starts.
#[derive(Clone, Debug)]
pub struct Targets<B: Backend> {
    pub content: Vec<(String, Tensor<B, 4>)>,
    pub grams: Vec<(String, Tensor<B, 3>)>,
}

impl<B: Backend> Targets<B> {
    /// Keeps the content activations of the content image, and reduces the
    /// style activations of the style image to Gram matrices
    pub fn new(content_image: Features<B>, style_image: Features<B>) -> Self {
        let grams = style_image
            .style
            .into_iter()
            .map(|(name, features)| (name, gram_matrix(features)))
            .collect();

        Self {
            content: content_image.content,
            grams,
        }
    }
}

/// The individual terms of an evaluation, each of shape `[1]`
#[derive(Clone, Debug)]
pub struct LossTerms<B: Backend> {
    /// The unweighted content loss
    pub content: Tensor<B, 1>,
    /// The sum of the weighted, size normalized style layer losses, without
    /// the global style weight applied
    pub style: Tensor<B, 1>,
    /// `content_weight * content + style_weight * style`
    pub total: Tensor<B, 1>,
}

/// Combines content and style distances into a single objective
#[derive(Clone, Debug)]
pub struct LossComposer {
    content_weight: f32,
    style_weight: f32,
    style_layers: Vec<(String, f32)>,
    policy: ContentLayerPolicy,
}

impl LossComposer {
    pub fn new(content_weight: f32, style_weight: f32, selection: &LayerSelection) -> Self {
        Self {
            content_weight,
            style_weight,
            style_layers: selection.style_layers().to_vec(),
            policy: ContentLayerPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ContentLayerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Mean squared difference between two activations
    pub fn content_loss<B: Backend>(canvas: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        canvas.sub(target).powi_scalar(2).mean()
    }

    /// Mean squared difference between the Gram matrix of `canvas` and
    /// `target_gram`, scaled by `weight` and divided by the size of the
    /// activation so that large layers don't dominate
    pub fn style_layer_loss<B: Backend>(
        weight: f32,
        canvas: Tensor<B, 4>,
        target_gram: Tensor<B, 3>,
    ) -> Tensor<B, 1> {
        let [_, channels, height, width] = canvas.dims();
        let gram = gram_matrix(canvas);

        gram.sub(target_gram)
            .powi_scalar(2)
            .mean()
            .mul_scalar(weight)
            .div_scalar((channels * height * width) as f32)
    }

    pub fn compose<B: Backend>(
        &self,
        canvas: &Features<B>,
        targets: &Targets<B>,
    ) -> Result<LossTerms<B>, Error> {
        let mut content: Option<Tensor<B, 1>> = None;
        for (name, target) in &targets.content {
            let features = canvas.content(name).ok_or_else(|| missing(name))?;
            let loss = Self::content_loss(features.clone(), target.clone());

            content = Some(match (self.policy, content) {
                (ContentLayerPolicy::Sum, Some(sum)) => sum.add(loss),
                _ => loss,
            });
        }

        let mut style: Option<Tensor<B, 1>> = None;
        for (name, weight) in &self.style_layers {
            let features = canvas.style(name).ok_or_else(|| missing(name))?;
            let target = targets
                .grams
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, gram)| gram.clone())
                .ok_or_else(|| missing(name))?;

            let loss = Self::style_layer_loss(*weight, features.clone(), target);
            style = Some(match style {
                Some(sum) => sum.add(loss),
                None => loss,
            });
        }

        let (content, style) = match (content, style) {
            (Some(content), Some(style)) => (content, style),
            _ => {
                return Err(Error::InvalidLayers(
                    "both content and style layers are required".to_owned(),
                ))
            }
        };

        let total = content
            .clone()
            .mul_scalar(self.content_weight)
            .add(style.clone().mul_scalar(self.style_weight));

        Ok(LossTerms {
            content,
            style,
            total,
        })
    }
}

fn missing(name: &str) -> Error {
    Error::InvalidLayers(format!("no activations were captured for layer '{}'", name))
}

#[cfg(test)]
mod test {
    use super::*;
    use burn::{
        backend::NdArray,
        tensor::{Distribution, ElementConversion},
    };

    type TestBackend = NdArray<f32>;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem()
    }

    fn random(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(shape, Distribution::Default, &Default::default())
    }

    fn features(
        content: Vec<(&str, Tensor<TestBackend, 4>)>,
        style: Vec<(&str, Tensor<TestBackend, 4>)>,
    ) -> Features<TestBackend> {
        let own = |v: Vec<(&str, Tensor<TestBackend, 4>)>| {
            v.into_iter().map(|(n, t)| (n.to_owned(), t)).collect()
        };

        Features {
            content: own(content),
            style: own(style),
        }
    }

    fn selection() -> LayerSelection {
        LayerSelection::new()
            .with_content_layer("c")
            .with_style_layer("s1", 0.25)
            .with_style_layer("s2", 0.75)
    }

    #[test]
    fn identical_features_have_zero_loss() {
        let c = random([1, 4, 6, 6]);
        let s1 = random([1, 3, 6, 6]);
        let s2 = random([1, 5, 3, 3]);

        let image = features(vec![("c", c)], vec![("s1", s1), ("s2", s2)]);
        let targets = Targets::new(image.clone(), image.clone());

        let terms = LossComposer::new(1.0, 1e6, &selection())
            .compose(&image, &targets)
            .unwrap();

        assert!(scalar(terms.content).abs() < 1e-6);
        assert!(scalar(terms.style).abs() < 1e-6);
        assert!(scalar(terms.total).abs() < 1e-3);
    }

    #[test]
    fn content_loss_is_mean_squared_error() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 2.0], [3.0, 4.0]]]], &device);
        let b = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 0.0], [3.0, 0.0]]]], &device);

        // (0 + 4 + 0 + 16) / 4
        assert!((scalar(LossComposer::content_loss(a, b)) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn style_loss_is_normalized_by_layer_size() {
        let device = Default::default();
        // 1 channel, 1x2: gram = [[5]]
        let canvas = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 2.0]]]], &device);
        let target = Tensor::<TestBackend, 3>::from_floats([[[1.0]]], &device);

        // 0.5 * (5 - 1)^2 / (1 * 1 * 2)
        let loss = LossComposer::style_layer_loss(0.5, canvas, target);
        assert!((scalar(loss) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn weights_combine_terms() {
        let canvas = features(
            vec![("c", random([1, 2, 4, 4]))],
            vec![("s1", random([1, 2, 4, 4])), ("s2", random([1, 2, 2, 2]))],
        );
        let target = features(
            vec![("c", random([1, 2, 4, 4]))],
            vec![("s1", random([1, 2, 4, 4])), ("s2", random([1, 2, 2, 2]))],
        );
        let targets = Targets::new(target.clone(), target);

        let terms = LossComposer::new(2.0, 3.0, &selection())
            .compose(&canvas, &targets)
            .unwrap();

        let expected = 2.0 * scalar(terms.content.clone()) + 3.0 * scalar(terms.style.clone());
        let total = scalar(terms.total);
        assert!((total - expected).abs() <= 1e-4 * expected.abs().max(1.0));
    }

    #[test]
    fn content_policy() {
        let device = Default::default();
        let zeros = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device);
        let ones = Tensor::<TestBackend, 4>::ones([1, 1, 2, 2], &device);
        let twos = ones.clone().mul_scalar(2.0);

        let selection = LayerSelection::new()
            .with_content_layer("a")
            .with_content_layer("b")
            .with_style_layer("s", 1.0);

        let canvas = features(
            vec![("a", zeros.clone()), ("b", zeros.clone())],
            vec![("s", zeros.clone())],
        );
        let target = features(vec![("a", ones), ("b", twos)], vec![("s", zeros)]);
        let targets = Targets::new(target.clone(), target);

        let last = LossComposer::new(1.0, 1.0, &selection)
            .compose(&canvas, &targets)
            .unwrap();
        assert!((scalar(last.content) - 4.0).abs() < 1e-6);

        let sum = LossComposer::new(1.0, 1.0, &selection)
            .with_policy(ContentLayerPolicy::Sum)
            .compose(&canvas, &targets)
            .unwrap();
        assert!((scalar(sum.content) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn missing_layer_is_an_error() {
        let image = features(vec![("c", random([1, 1, 2, 2]))], vec![("s1", random([1, 1, 2, 2]))]);
        let targets = Targets::new(image.clone(), image.clone());

        assert!(matches!(
            LossComposer::new(1.0, 1.0, &selection()).compose(&image, &targets),
            Err(Error::InvalidLayers(_))
        ));
    }
}
