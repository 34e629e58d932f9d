//! Shape inference rules for individual operators.
//!
//! Operators whose output is a copy of their single input (most activations)
//! share [`UnaryOp`](crate::UnaryOp) and reductions share
//! [`ReductionOp`](crate::ReductionOp). The operators here have their own
//! rules.

mod activations;
mod layout;
mod loss;
mod rnn;

pub use activations::PRelu;
pub use layout::{Tile, Unstack};
pub use loss::SigmoidCrossEntropyWithLogits;
pub use rnn::Lstm;
