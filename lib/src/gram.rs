use burn::tensor::{backend::Backend, Tensor};

/// Channel correlations of a feature map.
///
/// The spatial dimensions of `[batch, channels, height, width]` are flattened
/// and the result is multiplied by its own transpose, giving one symmetric
/// `[channels, channels]` matrix per batch entry.
pub fn gram_matrix<B: Backend>(features: Tensor<B, 4>) -> Tensor<B, 3> {
    let [batch, channels, height, width] = features.dims();
    let flat = features.reshape([batch, channels, height * width]);

    flat.clone().matmul(flat.swap_dims(1, 2))
}
