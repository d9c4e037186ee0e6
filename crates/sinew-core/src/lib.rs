//! # sinew-core
//!
//! Core value types shared by the sinew layer kernels.
//!
//! This crate provides:
//! - [`Tensor`]: dense, owned, row-major n-dimensional array of `f32`/`f64`
//! - [`Shape`]: dimension sizes and contiguous strides
//! - [`DType`] / [`WithDType`]: the element types kernels are generic over
//! - [`Error`] / [`Result`]: the single error type every kernel returns
//! - [`ops`]: GEMM helpers (accumulating, rayon-parallel over rows)

pub mod dtype;
pub mod error;
pub mod ops;
pub mod shape;
pub mod tensor;

pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use shape::Shape;
pub use tensor::Tensor;
