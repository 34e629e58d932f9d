use std::error::Error;
use std::fmt::{Display, Formatter};

use opgraph_shape_inference::InferShapesError;

use super::{NodeId, TensorId};
use crate::ops::OpType;

/// Identifies the node that an [`InferError`] relates to.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub op_type: OpType,
}

impl Display for NodeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} node \"{}\" ({})", self.op_type, self.name, self.id)
    }
}

/// Errors that occur when inferring the shapes of values in a graph.
#[derive(Clone, Debug, PartialEq)]
pub enum InferError {
    /// The operator's inputs or attributes failed validation.
    Shape {
        node: NodeInfo,
        error: InferShapesError,
    },

    /// No shape inference rule is registered for the operator.
    UnsupportedOperator { node: NodeInfo },

    /// An input of the node is neither a graph input or constant with a
    /// known descriptor, nor produced by another node. This also happens
    /// for nodes which are part of a cycle.
    UnresolvedInput { node: NodeInfo, tensor: TensorId },
}

/// The category of an inference error. See [`InferError::kind`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Wrong number of inputs or outputs.
    Arity,
    /// Input shapes are incompatible with each other.
    ShapeMismatch,
    /// An attribute is invalid or inconsistent with the inputs.
    Attribute,
    /// The operator has no inference rule.
    UnsupportedOperator,
    /// An input could not be resolved.
    UnresolvedInput,
}

impl InferError {
    /// Return the node this error relates to.
    pub fn node(&self) -> &NodeInfo {
        match self {
            Self::Shape { node, .. }
            | Self::UnsupportedOperator { node }
            | Self::UnresolvedInput { node, .. } => node,
        }
    }

    /// Return the general category of error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Shape { error, .. } => match error {
                InferShapesError::IncorrectInputCount { .. }
                | InferShapesError::IncorrectOutputCount { .. } => ErrorKind::Arity,
                InferShapesError::IncompatibleShapes(_) => ErrorKind::ShapeMismatch,
                InferShapesError::InvalidAttr { .. } => ErrorKind::Attribute,
            },
            Self::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            Self::UnresolvedInput { .. } => ErrorKind::UnresolvedInput,
        }
    }
}

impl Display for InferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shape { node, error } => write!(f, "{}: {}", node, error),
            Self::UnsupportedOperator { node } => {
                write!(f, "{}: operator has no shape inference rule", node)
            }
            Self::UnresolvedInput { node, tensor } => {
                write!(f, "{}: input tensor {} is never produced", node, tensor)
            }
        }
    }
}

impl Error for InferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Shape { error, .. } => Some(error),
            _ => None,
        }
    }
}
