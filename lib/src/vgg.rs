//! The convolutional trunk of a VGG network, laid out the same way as the
//! `features` sequence of torchvision's VGG models so pretrained weights and
//! layer indices carry over unchanged.

use crate::Error;
use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    record::{FullPrecisionSettings, Recorder},
    tensor::{activation::relu, backend::Backend, Tensor},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::Path;

/// A block of the network description, in the style of torchvision's `cfgs`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VggBlock {
    /// A 3x3 convolution with the given number of output channels, followed
    /// by a ReLU
    Conv(usize),
    /// A 2x2 max pool with stride 2
    MaxPool,
}

/// A single layer of the expanded network. Every layer occupies one index,
/// so a `Conv` block expands to a `Conv` and a `Relu` layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VggLayer {
    /// Index into `Vgg::convs`
    Conv(usize),
    Relu,
    MaxPool,
}

#[derive(Clone, Debug)]
pub struct VggConfig {
    pub in_channels: usize,
    pub blocks: Vec<VggBlock>,
}

impl VggConfig {
    pub fn new(blocks: Vec<VggBlock>) -> Self {
        Self {
            in_channels: 3,
            blocks,
        }
    }

    /// Configuration "E" of the VGG paper, ie VGG-19
    pub fn vgg19() -> Self {
        use VggBlock::{Conv, MaxPool};

        Self::new(vec![
            Conv(64),
            Conv(64),
            MaxPool,
            Conv(128),
            Conv(128),
            MaxPool,
            Conv(256),
            Conv(256),
            Conv(256),
            Conv(256),
            MaxPool,
            Conv(512),
            Conv(512),
            Conv(512),
            Conv(512),
            MaxPool,
            Conv(512),
            Conv(512),
            Conv(512),
            Conv(512),
            MaxPool,
        ])
    }

    /// Expands the blocks into indexed layers
    pub fn layers(&self) -> Vec<VggLayer> {
        let mut layers = Vec::with_capacity(self.blocks.len() * 2);
        let mut convs = 0;

        for block in &self.blocks {
            match block {
                VggBlock::Conv(_) => {
                    layers.push(VggLayer::Conv(convs));
                    layers.push(VggLayer::Relu);
                    convs += 1;
                }
                VggBlock::MaxPool => layers.push(VggLayer::MaxPool),
            }
        }

        layers
    }

    /// Conventional names of every layer, eg `conv1_1`, `relu1_1`, `pool1`,
    /// where the first number counts the pooling stages.
    pub fn layer_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.blocks.len() * 2);
        let (mut stage, mut conv) = (1, 1);

        for block in &self.blocks {
            match block {
                VggBlock::Conv(_) => {
                    names.push(format!("conv{}_{}", stage, conv));
                    names.push(format!("relu{}_{}", stage, conv));
                    conv += 1;
                }
                VggBlock::MaxPool => {
                    names.push(format!("pool{}", stage));
                    stage += 1;
                    conv = 1;
                }
            }
        }

        names
    }

    /// Looks up the index of a layer by its conventional name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.layer_names().iter().position(|n| n == name)
    }

    /// Key remapping rules from torchvision's state dict to this module, for
    /// use with `LoadArgs::with_key_remap`.
    ///
    /// Both the full model (`features.0.weight`) and a saved `features`
    /// sequence (`0.weight`) are accepted.
    pub fn key_remaps(&self) -> Vec<(String, String)> {
        self.layers()
            .iter()
            .enumerate()
            .filter_map(|(index, layer)| match layer {
                VggLayer::Conv(ordinal) => Some((
                    format!("^(?:features\\.)?{}\\.(weight|bias)$", index),
                    format!("convs.{}.$1", ordinal),
                )),
                _ => None,
            })
            .collect()
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg<B> {
        let mut convs = Vec::new();
        let mut channels = self.in_channels;

        for block in &self.blocks {
            if let VggBlock::Conv(out) = *block {
                convs.push(
                    Conv2dConfig::new([channels, out], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                );
                channels = out;
            }
        }

        Vgg { convs }
    }
}

impl Default for VggConfig {
    fn default() -> Self {
        Self::vgg19()
    }
}

/// The learnable part of the network. Pooling and activations carry no
/// parameters and are applied by the caller according to `VggConfig::layers`.
#[derive(Module, Debug)]
pub struct Vgg<B: Backend> {
    convs: Vec<Conv2d<B>>,
}

impl<B: Backend> Vgg<B> {
    /// Loads pretrained weights from a PyTorch file, eg one written with
    /// `torch.save(torchvision.models.vgg19(weights="DEFAULT").state_dict(), path)`
    pub fn load_pytorch<P: AsRef<Path>>(
        self,
        config: &VggConfig,
        path: P,
        device: &B::Device,
    ) -> Result<Self, Error> {
        let mut args = LoadArgs::new(path.as_ref().to_path_buf());
        for (pattern, replacement) in config.key_remaps() {
            args = args.with_key_remap(&pattern, &replacement);
        }

        let record: VggRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(args, device)
            .map_err(|err| Error::Weights(format!("'{}': {:?}", path.as_ref().display(), err)))?;

        Ok(self.load_record(record))
    }

    /// Applies a parameterized layer, `MaxPool` is left to the caller
    pub(crate) fn apply(&self, layer: VggLayer, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match layer {
            VggLayer::Conv(ordinal) => self.convs[ordinal].forward(x),
            VggLayer::Relu => relu(x),
            VggLayer::MaxPool => x,
        }
    }
}
