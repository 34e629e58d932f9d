//! Traits for shape inference and common implementations.

use std::error::Error;
use std::fmt;

use smallvec::SmallVec;

use crate::tensor_desc::TensorDesc;

#[derive(Clone, Debug, PartialEq)]
pub enum InferShapesError {
    /// Too many or too few inputs were provided for this operator.
    IncorrectInputCount { expected: usize, actual: usize },

    /// The caller provided a different number of output slots than the
    /// operator produces.
    IncorrectOutputCount { expected: usize, actual: usize },

    /// The input shapes are incompatible.
    ///
    /// Operator execution will fail if given inputs with these shapes.
    IncompatibleShapes(String),

    /// An attribute is missing or has a value outside its valid range, or is
    /// inconsistent with the input shapes.
    InvalidAttr {
        /// Name of the attribute.
        attr: &'static str,
        /// Description of the problem.
        error: String,
    },
}

impl InferShapesError {
    pub(crate) fn input_count(expected: usize, actual: usize) -> Self {
        Self::IncorrectInputCount { expected, actual }
    }

    pub(crate) fn invalid_attr(attr: &'static str, error: impl Into<String>) -> Self {
        Self::InvalidAttr {
            attr,
            error: error.into(),
        }
    }

    /// Return true if this error is caused by a wrong number of inputs or
    /// outputs.
    pub fn is_arity_error(&self) -> bool {
        matches!(
            self,
            Self::IncorrectInputCount { .. } | Self::IncorrectOutputCount { .. }
        )
    }
}

impl fmt::Display for InferShapesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncorrectInputCount { expected, actual } => {
                write!(f, "expected {} inputs but got {}", expected, actual)
            }
            Self::IncorrectOutputCount { expected, actual } => {
                write!(f, "expected {} outputs but got {}", expected, actual)
            }
            Self::IncompatibleShapes(reason) => write!(f, "incompatible shapes: {}", reason),
            Self::InvalidAttr { attr, error } => {
                write!(f, "invalid attribute \"{}\": {}", attr, error)
            }
        }
    }
}

impl Error for InferShapesError {}

/// Infer the shapes, types and layouts of an operator's outputs given its
/// inputs.
pub trait InferShapes {
    /// Compute descriptors for an operator's outputs.
    ///
    /// `num_outputs` is the number of output slots the caller has declared
    /// for the operator. Implementations must fail with
    /// [`InferShapesError::IncorrectOutputCount`] if it doesn't match the
    /// number of outputs the operator produces.
    ///
    /// On success the returned `Vec` has exactly `num_outputs` entries. On
    /// failure no descriptors are produced.
    fn infer_shapes(
        &self,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferShapesError>;
}

/// Fail with [`InferShapesError::IncorrectOutputCount`] unless `actual` is
/// `expected`.
pub fn check_output_count(expected: usize, actual: usize) -> Result<(), InferShapesError> {
    if expected != actual {
        return Err(InferShapesError::IncorrectOutputCount { expected, actual });
    }
    Ok(())
}

/// Shape inference for unary operators.
///
/// These operators take one input and return a single output with the same
/// shape, element type and layout. Activation functions use this.
pub struct UnaryOp;

impl InferShapes for UnaryOp {
    fn infer_shapes(
        &self,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferShapesError> {
        let [data] = inputs else {
            return Err(InferShapesError::input_count(1, inputs.len()));
        };
        check_output_count(1, num_outputs)?;
        Ok([data.clone()].into())
    }
}

/// Shape inference for reduction operators.
#[derive(Clone, Debug, PartialEq)]
pub struct ReductionOp<'a> {
    /// Axes over which the reduction is applied. If `None`, all axes are
    /// reduced.
    pub axes: Option<&'a [i32]>,

    /// True if the reduced dimension is retained as a 1-sized dimension in the
    /// output.
    pub keep_dims: bool,
}

impl InferShapes for ReductionOp<'_> {
    fn infer_shapes(
        &self,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferShapesError> {
        let [data] = inputs else {
            return Err(InferShapesError::input_count(1, inputs.len()));
        };
        check_output_count(1, num_outputs)?;

        let ndim = data.ndim();
        let mut axes: SmallVec<[usize; 4]> = if let Some(axes) = self.axes {
            resolve_axes(ndim, axes.iter())
                .map_err(|_| InferShapesError::invalid_attr("axes", "axis out of range"))?
        } else {
            (0..ndim).collect()
        };
        axes.sort();
        axes.dedup();

        let mut out_shape: SmallVec<[usize; 4]> = SmallVec::with_capacity(ndim);
        for (i, &dim) in data.shape().iter().enumerate() {
            if !axes.contains(&i) {
                out_shape.push(dim);
            } else if self.keep_dims {
                out_shape.push(1);
            }
        }

        Ok([data.with_shape(&out_shape)].into())
    }
}

/// Resolve an index given as a value in `[-len, len-1]` to a positive index in
/// `[0, len)`, or return None if the index is out of bounds.
fn resolve_index(len: usize, index: i32) -> Option<usize> {
    let len = len.min(i32::MAX as usize) as i32;
    if index < -len || index >= len {
        return None;
    }

    if index >= 0 {
        Some(index as usize)
    } else {
        Some((len + index) as usize)
    }
}

/// Error returned by [`resolve_axis`] when an axis is out of range.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisOutOfRange {
    pub axis: i32,
    pub ndim: usize,
}

impl fmt::Display for AxisOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "axis {} is out of range for a tensor with {} dims",
            self.axis, self.ndim
        )
    }
}

/// Resolve an axis given as a value in `[-ndim, ndim-1]` to the zero-based
/// dimension of a tensor with `ndim` dimensions.
///
/// Negative axis values count backwards from the last dimension.
pub fn resolve_axis(ndim: usize, axis: i32) -> Result<usize, AxisOutOfRange> {
    resolve_index(ndim, axis).ok_or(AxisOutOfRange { axis, ndim })
}

/// Resolve a sequence of axes values in `[-ndim, ndim-1]` to zero-based dimension
/// indexes in a tensor with `ndim` dimensions.
fn resolve_axes<'a, I: ExactSizeIterator<Item = &'a i32>>(
    ndim: usize,
    axes: I,
) -> Result<SmallVec<[usize; 4]>, AxisOutOfRange> {
    let mut resolved_axes = SmallVec::with_capacity(axes.len());
    for axis in axes {
        let resolved = resolve_axis(ndim, *axis)?;
        resolved_axes.push(resolved);
    }
    Ok(resolved_axes)
}

#[cfg(test)]
mod tests {
    use opgraph_testing::TestCases;

    use super::{InferShapes, InferShapesError, ReductionOp, UnaryOp, resolve_axis};
    use crate::tensor_desc::{DataType, Layout, TensorDesc};

    fn desc(shape: &[usize]) -> TensorDesc {
        TensorDesc::new(shape, DataType::Float32, Layout::Nhwc)
    }

    #[test]
    fn test_unary_op() {
        let input = TensorDesc::new(&[1, 16, 16, 3], DataType::Float16, Layout::Nhwc);
        let shapes = UnaryOp.infer_shapes(&[input.clone()], 1).unwrap();
        assert_eq!(shapes, [input.clone()]);

        let err = UnaryOp.infer_shapes(&[], 1).err().unwrap();
        assert_eq!(
            err,
            InferShapesError::IncorrectInputCount {
                expected: 1,
                actual: 0
            }
        );
        assert!(err.is_arity_error());

        let err = UnaryOp.infer_shapes(&[input], 2).err().unwrap();
        assert_eq!(
            err,
            InferShapesError::IncorrectOutputCount {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_reduction_op() {
        #[derive(Clone, Debug)]
        struct Case<'a> {
            input: Vec<usize>,
            op: ReductionOp<'a>,
            expected: Vec<usize>,
        }

        let default_op = ReductionOp {
            axes: None,
            keep_dims: false,
        };

        let cases = [
            // Reduce single axis
            Case {
                input: vec![2, 4, 5],
                op: ReductionOp {
                    axes: Some(&[1]),
                    ..default_op
                },
                expected: vec![2, 5],
            },
            // Negative axis with `keep_dims=true`
            Case {
                input: vec![2, 4, 5],
                op: ReductionOp {
                    axes: Some(&[-1]),
                    keep_dims: true,
                },
                expected: vec![2, 4, 1],
            },
            // Duplicate axes are reduced once
            Case {
                input: vec![2, 4, 5],
                op: ReductionOp {
                    axes: Some(&[0, -3]),
                    ..default_op
                },
                expected: vec![4, 5],
            },
            // Reduce all axes
            Case {
                input: vec![3, 4, 5],
                op: default_op.clone(),
                expected: Vec::new(),
            },
        ];

        cases.test_each_clone(|case| {
            let shapes = case.op.infer_shapes(&[desc(&case.input)], 1).unwrap();
            assert_eq!(shapes.len(), 1);
            assert_eq!(shapes[0], desc(&case.expected));
        });
    }

    #[test]
    fn test_reduction_op_invalid_axis() {
        let op = ReductionOp {
            axes: Some(&[3]),
            keep_dims: false,
        };
        let err = op.infer_shapes(&[desc(&[2, 3, 4])], 1).err().unwrap();
        assert!(matches!(err, InferShapesError::InvalidAttr { attr: "axes", .. }));
    }

    #[test]
    fn test_resolve_axis() {
        assert_eq!(resolve_axis(3, 0), Ok(0));
        assert_eq!(resolve_axis(3, -1), Ok(2));
        assert!(resolve_axis(3, 3).is_err());
        assert!(resolve_axis(3, -4).is_err());
        assert!(resolve_axis(0, 0).is_err());
    }
}
