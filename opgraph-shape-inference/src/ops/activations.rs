use crate::infer_shapes::{InferShapes, InferShapesError, UnaryOp};
use crate::tensor_desc::TensorDesc;

/// PRelu operator.
///
/// The output is a copy of the input descriptor. The slope is either shared
/// across all channels (`slope_len == 1`) or given per channel.
pub struct PRelu {
    pub slope_len: usize,
}

impl InferShapes for PRelu {
    fn infer_shapes(
        &self,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferShapesError> {
        let outputs = UnaryOp.infer_shapes(inputs, num_outputs)?;

        let channels = inputs[0].channels();
        match (self.slope_len, channels) {
            (1, _) => {}
            (len, Some(channels)) if len == channels => {}
            (len, channels) => {
                return Err(InferShapesError::invalid_attr(
                    "slope",
                    format!(
                        "{} slope values given for input with {} channels",
                        len,
                        channels.map(|c| c.to_string()).unwrap_or("no".into())
                    ),
                ));
            }
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use opgraph_testing::TestCases;

    use super::PRelu;
    use crate::infer_shapes::{InferShapes, InferShapesError};
    use crate::tensor_desc::{DataType, Layout, TensorDesc};

    #[test]
    fn test_prelu() {
        #[derive(Debug)]
        struct Case {
            shape: &'static [usize],
            layout: Layout,
            slope_len: usize,
            valid: bool,
        }

        let cases = [
            Case {
                shape: &[1, 8, 8, 3],
                layout: Layout::Nhwc,
                slope_len: 1,
                valid: true,
            },
            Case {
                shape: &[1, 8, 8, 3],
                layout: Layout::Nhwc,
                slope_len: 3,
                valid: true,
            },
            Case {
                shape: &[1, 3, 8, 8],
                layout: Layout::Nchw,
                slope_len: 3,
                valid: true,
            },
            Case {
                shape: &[1, 3, 8, 8],
                layout: Layout::Nchw,
                slope_len: 8,
                valid: false,
            },
            Case {
                shape: &[],
                layout: Layout::Unspecified,
                slope_len: 2,
                valid: false,
            },
            Case {
                shape: &[4],
                layout: Layout::Unspecified,
                slope_len: 0,
                valid: false,
            },
        ];

        cases.test_each(|case| {
            let input = TensorDesc::new(case.shape, DataType::Float32, case.layout);
            let op = PRelu {
                slope_len: case.slope_len,
            };
            let result = op.infer_shapes(&[input.clone()], 1);
            if case.valid {
                assert_eq!(result, Ok(vec![input.clone()]));
            } else {
                assert!(matches!(
                    result,
                    Err(InferShapesError::InvalidAttr { attr: "slope", .. })
                ));
            }
        });
    }
}
