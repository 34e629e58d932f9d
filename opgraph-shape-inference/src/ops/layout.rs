use smallvec::SmallVec;

use crate::infer_shapes::{InferShapes, InferShapesError, check_output_count, resolve_axis};
use crate::tensor_desc::TensorDesc;

/// Tile operator.
///
/// Repeats the input along one or more axes. `dims[i]` is an axis of the
/// input and `multiples[i]` is the number of times it is repeated.
pub struct Tile<'a> {
    pub dims: &'a [i32],
    pub multiples: &'a [i32],
}

impl InferShapes for Tile<'_> {
    fn infer_shapes(
        &self,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferShapesError> {
        let [data] = inputs else {
            return Err(InferShapesError::input_count(1, inputs.len()));
        };
        check_output_count(1, num_outputs)?;

        if self.dims.len() != self.multiples.len() {
            return Err(InferShapesError::invalid_attr(
                "multiples",
                format!(
                    "{} multiples given for {} dims",
                    self.multiples.len(),
                    self.dims.len()
                ),
            ));
        }

        let mut out_shape: SmallVec<[usize; 4]> = SmallVec::from_slice(data.shape());
        let mut seen: SmallVec<[usize; 4]> = SmallVec::new();

        for (&dim, &multiple) in self.dims.iter().zip(self.multiples) {
            let axis = resolve_axis(data.ndim(), dim)
                .map_err(|err| InferShapesError::invalid_attr("dims", err.to_string()))?;
            if seen.contains(&axis) {
                return Err(InferShapesError::invalid_attr(
                    "dims",
                    format!("axis {} is tiled more than once", axis),
                ));
            }
            seen.push(axis);

            if multiple < 1 {
                return Err(InferShapesError::invalid_attr(
                    "multiples",
                    format!("repeat count must be positive, got {}", multiple),
                ));
            }
            let size = data.shape()[axis];
            out_shape[axis] = size.checked_mul(multiple as usize).ok_or_else(|| {
                InferShapesError::invalid_attr(
                    "multiples",
                    format!(
                        "repeating axis {} of size {} {} times overflows",
                        axis, size, multiple
                    ),
                )
            })?;
        }

        Ok([data.with_shape(&out_shape)].into())
    }
}

/// Unstack operator.
///
/// Splits the input along `axis` into `num` outputs, each of which has the
/// `axis` dimension removed.
pub struct Unstack {
    pub axis: i32,
    pub num: i32,
}

impl InferShapes for Unstack {
    fn infer_shapes(
        &self,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferShapesError> {
        let [data] = inputs else {
            return Err(InferShapesError::input_count(1, inputs.len()));
        };

        let axis = resolve_axis(data.ndim(), self.axis)
            .map_err(|err| InferShapesError::invalid_attr("axis", err.to_string()))?;

        // The number of outputs is determined by `num`, so check that it is
        // consistent with the input before checking the output count.
        let extent = data.shape()[axis];
        if self.num < 0 || self.num as usize != extent {
            return Err(InferShapesError::invalid_attr(
                "num",
                format!(
                    "expected {} to match size {} of axis {}",
                    self.num, extent, axis
                ),
            ));
        }
        check_output_count(extent, num_outputs)?;

        let out_shape: SmallVec<[usize; 4]> = data
            .shape()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != axis)
            .map(|(_, size)| *size)
            .collect();
        let output = data.with_shape(&out_shape);

        Ok(vec![output; extent])
    }
}

#[cfg(test)]
mod tests {
    use opgraph_testing::TestCases;

    use super::{Tile, Unstack};
    use crate::infer_shapes::{InferShapes, InferShapesError};
    use crate::tensor_desc::{DataType, Layout, TensorDesc};

    fn desc(shape: &[usize]) -> TensorDesc {
        TensorDesc::new(shape, DataType::Float32, Layout::Nchw)
    }

    #[test]
    fn test_tile() {
        #[derive(Debug)]
        struct Case {
            input: &'static [usize],
            dims: &'static [i32],
            multiples: &'static [i32],
            expected: &'static [usize],
        }

        let cases = [
            // Repeat count of 1 is a no-op.
            Case {
                input: &[2, 3, 4],
                dims: &[1],
                multiples: &[1],
                expected: &[2, 3, 4],
            },
            Case {
                input: &[2, 3, 4],
                dims: &[1],
                multiples: &[3],
                expected: &[2, 9, 4],
            },
            Case {
                input: &[2, 3, 4],
                dims: &[0, -1],
                multiples: &[2, 5],
                expected: &[4, 3, 20],
            },
            Case {
                input: &[2, 3],
                dims: &[],
                multiples: &[],
                expected: &[2, 3],
            },
        ];

        cases.test_each(|case| {
            let op = Tile {
                dims: case.dims,
                multiples: case.multiples,
            };
            let shapes = op.infer_shapes(&[desc(case.input)], 1).unwrap();
            assert_eq!(shapes, [desc(case.expected)]);
        });
    }

    #[test]
    fn test_tile_invalid() {
        #[derive(Debug)]
        struct Case {
            dims: &'static [i32],
            multiples: &'static [i32],
            attr: &'static str,
        }

        let cases = [
            Case {
                dims: &[3],
                multiples: &[2],
                attr: "dims",
            },
            Case {
                dims: &[0, 0],
                multiples: &[2, 2],
                attr: "dims",
            },
            Case {
                dims: &[0],
                multiples: &[0],
                attr: "multiples",
            },
            Case {
                dims: &[0, 1],
                multiples: &[2],
                attr: "multiples",
            },
        ];

        cases.test_each(|case| {
            let op = Tile {
                dims: case.dims,
                multiples: case.multiples,
            };
            let err = op.infer_shapes(&[desc(&[2, 3, 4])], 1).err().unwrap();
            match err {
                InferShapesError::InvalidAttr { attr, .. } => assert_eq!(attr, case.attr),
                other => panic!("unexpected error {:?}", other),
            }
        });
    }

    #[test]
    fn test_tile_overflow() {
        let op = Tile {
            dims: &[0],
            multiples: &[4],
        };
        let err = op
            .infer_shapes(&[desc(&[usize::MAX / 2, 3])], 1)
            .err()
            .unwrap();
        match err {
            InferShapesError::InvalidAttr { attr, .. } => assert_eq!(attr, "multiples"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unstack() {
        let op = Unstack { axis: 1, num: 4 };
        let shapes = op.infer_shapes(&[desc(&[8, 4, 16])], 4).unwrap();
        assert_eq!(shapes.len(), 4);
        for shape in shapes {
            assert_eq!(shape, desc(&[8, 16]));
        }

        let op = Unstack { axis: -1, num: 2 };
        let shapes = op.infer_shapes(&[desc(&[3, 2])], 2).unwrap();
        assert_eq!(shapes, [desc(&[3]), desc(&[3])]);
    }

    #[test]
    fn test_unstack_invalid() {
        #[derive(Debug)]
        struct Case {
            input: &'static [usize],
            axis: i32,
            num: i32,
            num_outputs: usize,
            expected: InferShapesError,
        }

        let cases = [
            // `num` doesn't match the axis extent.
            Case {
                input: &[8, 4, 16],
                axis: 1,
                num: 3,
                num_outputs: 3,
                expected: InferShapesError::InvalidAttr {
                    attr: "num",
                    error: "expected 3 to match size 4 of axis 1".into(),
                },
            },
            // Axis out of range.
            Case {
                input: &[8, 4, 16],
                axis: 3,
                num: 4,
                num_outputs: 4,
                expected: InferShapesError::InvalidAttr {
                    attr: "axis",
                    error: "axis 3 is out of range for a tensor with 3 dims".into(),
                },
            },
            // Scalars can't be unstacked.
            Case {
                input: &[],
                axis: 0,
                num: 1,
                num_outputs: 1,
                expected: InferShapesError::InvalidAttr {
                    attr: "axis",
                    error: "axis 0 is out of range for a tensor with 0 dims".into(),
                },
            },
            // Wrong number of output slots.
            Case {
                input: &[8, 4, 16],
                axis: 1,
                num: 4,
                num_outputs: 3,
                expected: InferShapesError::IncorrectOutputCount {
                    expected: 4,
                    actual: 3,
                },
            },
        ];

        cases.test_each(|case| {
            let op = Unstack {
                axis: case.axis,
                num: case.num,
            };
            let err = op
                .infer_shapes(&[desc(case.input)], case.num_outputs)
                .err()
                .unwrap();
            assert_eq!(err, case.expected);
        });
    }
}
