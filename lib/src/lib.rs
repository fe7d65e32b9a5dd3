// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `neural-style` transfers the artistic style of one image onto the content
//! of another, by optimizing the pixels of a canvas against the activations of
//! a pretrained convolutional network.
//!
//! First, you build a `Session` via a `SessionBuilder`, which follows the
//! builder pattern. Calling `build` on the `SessionBuilder` checks the
//! parameters, loads both input images and prepares the network.
//!
//! `Session` has a `run()` method that optimizes a canvas, initialized from
//! the content image, until the iteration budget is spent. The lowest loss
//! canvas is returned as a `StylizedImage`, which you can save, stream, or
//! inspect.
//!
//! The pieces the session is built from are public as well, so you can bring
//! your own network through `FeatureExtractor`, or drive `Transfer` directly.
//!
//! ## Usage
//!
//! ```no_run
//! use neural_style::{DefaultBackend, SessionBuilder};
//!
//! // Create a new session with default parameters
//! let session = SessionBuilder::new()
//!     // Pretrained torchvision VGG-19 weights
//!     .weights("vgg19.pth")
//!     .content("imgs/tom.jpg")
//!     .style("imgs/starry_night.jpg")
//!     // Set some parameters
//!     .iterations(500)
//!     .style_weight(1e5)
//!     // Build the session
//!     .build::<DefaultBackend>(&Default::default())
//!     .expect("failed to build session");
//!
//! // Optimize, printing the loss every iteration
//! let progress = Box::new(|update: neural_style::ProgressUpdate| {
//!     println!("{}: {}", update.iteration, update.loss);
//! });
//! let stylized = session.run(Some(progress)).expect("optimization diverged");
//!
//! // Save the stylized image to disk
//! stylized.save("tom_starry.png").expect("failed to save stylized image");
//! ```
mod codec;
mod errors;
mod features;
mod gram;
mod loss;
pub mod session;
mod transfer;
mod vgg;

pub use burn;
pub use image;

pub use codec::{load_dynamic_image, prepare_output, ImageSource, ImageTensor, Normalization};
pub use errors::{Error, InvalidRange};
pub use features::{FeatureExtractor, Features, LayerSelection, VggExtractor};
pub use gram::gram_matrix;
pub use loss::{ContentLayerPolicy, LossComposer, LossTerms, Targets};
pub use session::{Session, SessionBuilder, StylizedImage};
pub use transfer::{
    report_interval, BestResult, Canvas, DivergencePolicy, ProgressUpdate, Transfer,
    TransferParams, TransferProgress,
};
pub use vgg::{Vgg, VggBlock, VggConfig, VggLayer};

/// The backend used when none is picked, a CPU backend that records gradients
pub type DefaultBackend = burn::backend::Autodiff<burn::backend::NdArray<f32>>;

/// Simple dimensions struct
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
        }
    }
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

struct Parameters {
    iterations: usize,
    content_weight: f32,
    style_weight: f32,
    learning_rate: f64,
    max_size: u32,
    content_policy: ContentLayerPolicy,
    divergence: DivergencePolicy,
    normalization: Normalization,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            iterations: 2000,
            content_weight: 1.0,
            style_weight: 1e6,
            learning_rate: 0.003,
            max_size: 512,
            content_policy: ContentLayerPolicy::LastLayer,
            divergence: DivergencePolicy::Abort,
            normalization: Normalization::IMAGENET,
        }
    }
}

impl Parameters {
    fn to_transfer_params(&self) -> TransferParams {
        TransferParams {
            iterations: self.iterations,
            learning_rate: self.learning_rate,
            divergence: self.divergence,
        }
    }
}
