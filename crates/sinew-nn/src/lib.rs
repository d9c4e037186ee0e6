//! # sinew-nn
//!
//! Forward/backward kernels for the classic feed-forward and convolutional
//! layers. Every kernel is a pair of free functions:
//!
//! 1. **forward**: takes inputs, parameters and a config, returns the output
//!    plus a cache of whatever the backward pass needs
//! 2. **backward**: takes the upstream gradient and that cache, returns
//!    gradients for the inputs and parameters
//!
//! There are no layer objects and no hidden state. Train/test behavior is an
//! explicit [`Mode`], batch-norm running statistics are a caller-owned
//! [`RunningStats`] passed by `&mut`, and dropout randomness comes from a
//! seed or a caller-supplied generator.
//!
//! | Kernel | Forward | Backward |
//! |--------|---------|----------|
//! | affine | [`affine_forward`] | [`affine_backward`] |
//! | relu | [`relu_forward`] | [`relu_backward`] |
//! | batch norm | [`batchnorm_forward`] | [`batchnorm_backward`], [`batchnorm_backward_alt`] |
//! | dropout | [`dropout_forward`], [`dropout_forward_with_rng`] | [`dropout_backward`] |
//! | convolution | [`conv_forward`] | [`conv_backward`] |
//! | max pooling | [`max_pool_forward`] | [`max_pool_backward`] |
//! | spatial batch norm | [`spatial_batchnorm_forward`] | [`spatial_batchnorm_backward`] |
//! | losses | [`margin_loss`], [`softmax_loss`] | (gradient returned with the loss) |

pub mod activation;
pub mod affine;
pub mod batchnorm;
pub mod conv;
pub mod dropout;
pub mod loss;
pub mod mode;
pub mod pool;
pub mod spatial_batchnorm;
mod window;

pub use activation::{relu_backward, relu_forward, ReluCache};
pub use affine::{affine_backward, affine_forward, AffineCache, AffineGrads};
pub use batchnorm::{
    batchnorm_backward, batchnorm_backward_alt, batchnorm_forward, BatchNormCache,
    BatchNormConfig, BatchNormGrads, RunningStats,
};
pub use conv::{conv_backward, conv_forward, ConvCache, ConvConfig, ConvGrads};
pub use dropout::{
    dropout_backward, dropout_forward, dropout_forward_with_rng, DropoutCache, DropoutConfig,
};
pub use loss::{margin_loss, softmax_loss};
pub use mode::Mode;
pub use pool::{max_pool_backward, max_pool_forward, max_pool_output_shape, PoolCache, PoolConfig};
pub use spatial_batchnorm::{
    spatial_batchnorm_backward, spatial_batchnorm_forward, SpatialBatchNormCache,
};
