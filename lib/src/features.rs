//! Named intermediate activations of a frozen network.

use crate::{
    vgg::{Vgg, VggConfig, VggLayer},
    Error,
};
use burn::{
    module::Module,
    nn::pool::{MaxPool2d, MaxPool2dConfig},
    tensor::{backend::Backend, Tensor},
};

/// Which layers provide the content and style representations, and how much
/// each style layer contributes to the style loss.
///
/// Layers are named the conventional VGG way, eg `conv4_2`, see
/// [`VggConfig::layer_names`]. Convolutions are captured after their ReLU, so
/// `conv1_1` and `relu1_1` name the same activation and can't both be selected.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSelection {
    content: Vec<String>,
    style: Vec<(String, f32)>,
}

impl LayerSelection {
    /// An empty selection, at least one content and one style layer must be
    /// added before it can be used
    pub fn new() -> Self {
        Self {
            content: Vec::new(),
            style: Vec::new(),
        }
    }

    /// The layers of Gatys et al: `conv4_2` for content, and the first
    /// convolution of every stage for style, weighted equally.
    pub fn vgg19() -> Self {
        Self::new()
            .with_content_layer("conv4_2")
            .with_equal_style_layers(&["conv1_1", "conv2_1", "conv3_1", "conv4_1", "conv5_1"])
    }

    pub fn with_content_layer(mut self, name: &str) -> Self {
        self.content.push(name.to_owned());
        self
    }

    pub fn with_style_layer(mut self, name: &str, weight: f32) -> Self {
        self.style.push((name.to_owned(), weight));
        self
    }

    /// Adds style layers whose weights sum to 1
    pub fn with_equal_style_layers(mut self, names: &[&str]) -> Self {
        let weight = 1.0 / names.len() as f32;
        self.style
            .extend(names.iter().map(|name| ((*name).to_owned(), weight)));
        self
    }

    pub fn content_layers(&self) -> &[String] {
        &self.content
    }

    pub fn style_layers(&self) -> &[(String, f32)] {
        &self.style
    }

    pub fn style_weight(&self, name: &str) -> Option<f32> {
        self.style
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, weight)| *weight)
    }

    /// Checks the selection against a network and resolves every name to its
    /// layer index
    pub(crate) fn resolve(&self, config: &VggConfig) -> Result<ResolvedLayers, Error> {
        if self.content.is_empty() {
            return Err(Error::InvalidLayers(
                "at least 1 content layer is required".to_owned(),
            ));
        }

        if self.style.is_empty() {
            return Err(Error::InvalidLayers(
                "at least 1 style layer is required".to_owned(),
            ));
        }

        let names = config.layer_names();
        let layers = config.layers();

        // A convolution's output is read after the ReLU that follows it, the
        // same tensor an in-place activation would leave behind
        let index_of = |name: &str| -> Result<usize, Error> {
            let index = names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| Error::InvalidLayers(format!("the network has no layer '{}'", name)))?;

            Ok(match (layers.get(index), layers.get(index + 1)) {
                (Some(VggLayer::Conv(_)), Some(VggLayer::Relu)) => index + 1,
                _ => index,
            })
        };

        let mut content = Vec::with_capacity(self.content.len());
        for name in &self.content {
            content.push((index_of(name)?, name.clone()));
        }

        let mut style = Vec::with_capacity(self.style.len());
        for (name, weight) in &self.style {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::InvalidLayers(format!(
                    "style layer '{}' has an invalid weight of {}",
                    name, weight
                )));
            }

            style.push((index_of(name)?, name.clone()));
        }

        let all = content.iter().chain(style.iter());
        for (i, (index, name)) in all.clone().enumerate() {
            if all.clone().skip(i + 1).any(|(other, _)| other == index) {
                return Err(Error::InvalidLayers(format!(
                    "layer '{}' is selected more than once",
                    name
                )));
            }
        }

        Ok(ResolvedLayers { content, style })
    }
}

impl Default for LayerSelection {
    fn default() -> Self {
        Self::vgg19()
    }
}

/// The index each selected layer is captured at, paired with its name, in
/// the order they were selected
#[derive(Clone, Debug)]
pub(crate) struct ResolvedLayers {
    content: Vec<(usize, String)>,
    style: Vec<(usize, String)>,
}

impl ResolvedLayers {
    /// The number of layers that have to be evaluated to capture every
    /// selected output
    fn depth(&self) -> usize {
        self.content
            .iter()
            .chain(self.style.iter())
            .map(|(index, _)| index + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Activations captured for one input, keyed by layer name in selection order
#[derive(Clone, Debug)]
pub struct Features<B: Backend> {
    pub content: Vec<(String, Tensor<B, 4>)>,
    pub style: Vec<(String, Tensor<B, 4>)>,
}

impl<B: Backend> Features<B> {
    pub fn content(&self, name: &str) -> Option<&Tensor<B, 4>> {
        self.content.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn style(&self, name: &str) -> Option<&Tensor<B, 4>> {
        self.style.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

/// Evaluates images through a frozen network.
///
/// Implementations never modify their own parameters, gradients only flow
/// back into the input image.
pub trait FeatureExtractor<B: Backend> {
    /// Computes the content and style activations of a `[batch, 3, height, width]`
    /// image in a single pass
    fn extract(&self, image: Tensor<B, 4>) -> Result<Features<B>, Error>;
}

/// [`FeatureExtractor`] over a VGG trunk
#[derive(Debug)]
pub struct VggExtractor<B: Backend> {
    network: Vgg<B>,
    layers: Vec<VggLayer>,
    selection: ResolvedLayers,
    pool: MaxPool2d,
}

impl<B: Backend> VggExtractor<B> {
    /// Freezes `network` and prepares it to capture the layers in `selection`
    pub fn new(
        network: Vgg<B>,
        config: &VggConfig,
        selection: &LayerSelection,
    ) -> Result<Self, Error> {
        let selection = selection.resolve(config)?;
        let mut layers = config.layers();
        layers.truncate(selection.depth());

        Ok(Self {
            network: network.no_grad(),
            layers,
            selection,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        })
    }
}

impl<B: Backend> FeatureExtractor<B> for VggExtractor<B> {
    fn extract(&self, image: Tensor<B, 4>) -> Result<Features<B>, Error> {
        let dims = image.dims();
        if dims[1] != 3 {
            return Err(Error::InvalidShape {
                expected: 3,
                actual: dims.to_vec(),
            });
        }

        let mut content = vec![None; self.selection.content.len()];
        let mut style = vec![None; self.selection.style.len()];

        let mut x = image;
        for (index, layer) in self.layers.iter().enumerate() {
            x = match layer {
                VggLayer::MaxPool => self.pool.forward(x),
                layer => self.network.apply(*layer, x),
            };

            for (slot, (at, _)) in content.iter_mut().zip(&self.selection.content) {
                if *at == index {
                    *slot = Some(x.clone());
                }
            }

            for (slot, (at, _)) in style.iter_mut().zip(&self.selection.style) {
                if *at == index {
                    *slot = Some(x.clone());
                }
            }
        }

        let collect = |slots: Vec<Option<Tensor<B, 4>>>, names: &[(usize, String)]| {
            slots
                .into_iter()
                .zip(names)
                .filter_map(|(t, (_, name))| t.map(|t| (name.clone(), t)))
                .collect()
        };

        Ok(Features {
            content: collect(content, &self.selection.content),
            style: collect(style, &self.selection.style),
        })
    }
}
