//! opgraph converts models from other formats into a graph IR, infers the
//! shapes of all values in the graph and serializes the result.
//!
//! # Workflow
//!
//! 1. Import a model using one of the importers in [`import`]. This produces
//!    a [`Graph`] whose input tensors have descriptors (shape, data type and
//!    layout) and whose nodes hold operator attribute records from [`ops`].
//! 2. Infer the descriptors of all other tensors using
//!    [`Graph::infer_shapes`] and an [`InferRegistry`]. This also validates
//!    that each operator's inputs are compatible with each other and with its
//!    attributes.
//! 3. Serialize the graph using [`export_graph`].
//!
//! ```
//! use opgraph::import::caffe::{import_net, BlobShape, LayerParameter, NetParameter};
//! use opgraph::{export_graph, InferRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let net = NetParameter {
//!     input: vec!["data".into()],
//!     input_shape: vec![BlobShape { dim: vec![1, 3, 8, 8] }],
//!     layer: vec![LayerParameter {
//!         name: "relu".into(),
//!         type_: "ReLU".into(),
//!         bottom: vec!["data".into()],
//!         top: vec!["relu".into()],
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! let mut graph = import_net(&net)?;
//! graph.infer_shapes(&InferRegistry::with_all_ops())?;
//! let ir = export_graph(&graph, "example")?;
//! # assert!(!ir.is_empty());
//! # Ok(()) }
//! ```
//!
//! # Threading
//!
//! Shape inference of nodes that don't depend on each other runs concurrently
//! on the Rayon global thread pool. See [`InferOptions`].
//!
//! # Crate features
//!
//! - `caffe_format` enables [`import::caffe`]
//! - `tflite_format` enables [`import::tflite`]
//!
//! # Environment variables
//!
//! - `OPGRAPH_PARALLEL_INFER` - Set to `0` to infer nodes sequentially.
//! - `OPGRAPH_KEEP_GOING` - Set to `1` to continue inference after a node
//!   fails. This applies to [`InferOptions::from_env`].

mod env;
mod graph;
mod infer_registry;
mod model_builder;

pub mod import;
pub mod ops;

pub use graph::{
    ErrorKind, Graph, GraphError, InferError, InferOptions, NodeId, NodeInfo, OperatorNode,
    TensorId, TensorInfo,
};
pub use infer_registry::{InferFailure, InferOp, InferRegistry};
pub use model_builder::{ExportError, ModelBuilder, export_graph, schema};

// Re-export the descriptor types used throughout the public API.
pub use opgraph_shape_inference::{DataType, InferShapesError, Layout, TensorDesc};
