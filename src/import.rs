//! Conversion of models from other formats into a [`Graph`].
//!
//! Each format has an importer which holds a table mapping the format's
//! operator identifiers to functions that read the operator's attributes.
//! Importers bind tensors and construct attribute records. They don't infer
//! shapes; call [`Graph::infer_shapes`] on the result for that.

use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::graph::{Graph, GraphError, NodeId, TensorId};
use crate::ops::OpKind;

#[cfg(feature = "caffe_format")]
pub mod caffe;
#[cfg(feature = "tflite_format")]
pub mod tflite;

/// Errors that occur when importing a model.
#[derive(Clone, Debug, PartialEq)]
pub enum ImportError {
    /// The options for this operator are not set or have the wrong type.
    AttrsMissing,

    /// An attribute has an unsupported or invalid value.
    AttrError {
        /// Name of the attribute.
        attr: String,
        /// Description of the attribute error.
        error: String,
    },

    /// The operator is not supported by the importer.
    OperatorUnavailable {
        /// Name of the operator in the source format.
        name: String,
    },

    /// An operator refers to a tensor index that doesn't exist.
    InvalidTensorIndex(i32),

    /// An operator refers to a tensor name that has not been defined.
    UnknownTensor(String),

    /// A tensor has a dimension which is not a non-negative integer.
    InvalidShape {
        /// Name of the tensor.
        name: String,
    },

    /// A constant buffer is missing or has the wrong size for its contents.
    InvalidBuffer {
        /// Index of the buffer in the model.
        index: u32,
        error: String,
    },

    /// The imported nodes could not be added to the graph.
    Graph(GraphError),
}

impl ImportError {
    pub(crate) fn attr_error(attr: impl AsRef<str>, error: impl AsRef<str>) -> Self {
        Self::AttrError {
            attr: attr.as_ref().to_string(),
            error: error.as_ref().to_string(),
        }
    }
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttrsMissing => write!(f, "attributes are missing"),
            Self::AttrError { attr, error } => {
                write!(f, "error in attribute \"{}\": {}", attr, error)
            }
            Self::OperatorUnavailable { name } => write!(f, "{} operator not supported", name),
            Self::InvalidTensorIndex(index) => write!(f, "tensor index {} is invalid", index),
            Self::UnknownTensor(name) => write!(f, "tensor \"{}\" is not defined", name),
            Self::InvalidShape { name } => write!(f, "tensor \"{}\" has an invalid shape", name),
            Self::InvalidBuffer { index, error } => write!(f, "buffer {} is invalid: {}", index, error),
            Self::Graph(err) => write!(f, "graph error: {}", err),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Graph(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GraphError> for ImportError {
    fn from(err: GraphError) -> Self {
        Self::Graph(err)
    }
}

/// An operator translated from another format, with its tensor bindings.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportedNode {
    pub name: String,
    pub op: OpKind,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
}

impl ImportedNode {
    /// Add this node to `graph`.
    pub fn add_to(self, graph: &mut Graph) -> Result<NodeId, GraphError> {
        graph.add_node(&self.name, self.op, &self.inputs, &self.outputs)
    }
}
