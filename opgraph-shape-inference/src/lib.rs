//! Shape and type inference for opgraph operators.
//!
//! # About shape inference
//!
//! Models imported from other formats describe the shapes of their inputs
//! and the attributes of each operator, but not necessarily the shapes of
//! the intermediate values flowing between operators. Shape inference walks
//! the graph and, for each operator, computes the shape, element type and
//! memory layout of its outputs from those of its inputs. Along the way it
//! validates that the inputs are compatible with each other and with the
//! operator's attributes, so that errors in a model are reported when it is
//! converted rather than when it is executed.
//!
//! # Crate overview
//!
//! The main export of this crate is the [`InferShapes`] trait, plus types
//! which implement it in [`ops`]. Each implementation takes a slice of
//! [`TensorDesc`] inputs and the number of outputs the caller has declared,
//! and returns one descriptor per output or an [`InferShapesError`].
//!
//! Implementations are pure functions of their inputs and attributes. They
//! hold no state between calls, so callers are free to run inference for
//! independent operators concurrently.

mod infer_shapes;
pub mod ops;
mod tensor_desc;

pub use infer_shapes::{
    AxisOutOfRange, InferShapes, InferShapesError, ReductionOp, UnaryOp, check_output_count,
    resolve_axis,
};
pub use tensor_desc::{DataType, Layout, TensorDesc};
