use crate::infer_shapes::{InferShapes, InferShapesError, check_output_count};
use crate::tensor_desc::TensorDesc;

/// SigmoidCrossEntropyWithLogits operator.
///
/// Takes logits and labels and produces an elementwise loss. The two inputs
/// must have the same number of elements, but may differ in shape. The output
/// takes its shape, type and layout from the logits.
pub struct SigmoidCrossEntropyWithLogits;

impl InferShapes for SigmoidCrossEntropyWithLogits {
    fn infer_shapes(
        &self,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferShapesError> {
        let [logits, labels] = inputs else {
            return Err(InferShapesError::input_count(2, inputs.len()));
        };
        check_output_count(1, num_outputs)?;

        let (Some(logits_len), Some(labels_len)) = (logits.len(), labels.len()) else {
            return Err(InferShapesError::IncompatibleShapes(format!(
                "element count of logits {:?} or labels {:?} is too large",
                logits.shape(),
                labels.shape()
            )));
        };
        if logits_len != labels_len {
            return Err(InferShapesError::IncompatibleShapes(format!(
                "logits {:?} and labels {:?} have different element counts",
                logits.shape(),
                labels.shape()
            )));
        }

        Ok([logits.clone()].into())
    }
}

#[cfg(test)]
mod tests {
    use opgraph_testing::TestCases;

    use super::SigmoidCrossEntropyWithLogits;
    use crate::infer_shapes::{InferShapes, InferShapesError};
    use crate::tensor_desc::{DataType, Layout, TensorDesc};

    #[test]
    fn test_sigmoid_cross_entropy() {
        #[derive(Debug)]
        struct Case {
            logits: &'static [usize],
            labels: &'static [usize],
        }

        let cases = [
            Case {
                logits: &[4, 10],
                labels: &[4, 10],
            },
            // Element counts match but shapes differ.
            Case {
                logits: &[4, 10],
                labels: &[40],
            },
            Case {
                logits: &[],
                labels: &[1, 1],
            },
        ];

        cases.test_each(|case| {
            let logits = TensorDesc::new(case.logits, DataType::Float32, Layout::Nhwc);
            let labels = TensorDesc::new(case.labels, DataType::Float16, Layout::Unspecified);
            let shapes = SigmoidCrossEntropyWithLogits
                .infer_shapes(&[logits.clone(), labels], 1)
                .unwrap();
            assert_eq!(shapes, [logits]);
        });
    }

    #[test]
    fn test_sigmoid_cross_entropy_invalid() {
        let logits = TensorDesc::new(&[4, 10], DataType::Float32, Layout::Nhwc);
        let labels = TensorDesc::new(&[4, 9], DataType::Float32, Layout::Nhwc);

        let err = SigmoidCrossEntropyWithLogits
            .infer_shapes(&[logits.clone(), labels], 1)
            .err()
            .unwrap();
        assert!(matches!(err, InferShapesError::IncompatibleShapes(_)));

        // Element counts that overflow must not wrap around to match.
        let logits = TensorDesc::new(&[1 << 32, 1 << 32], DataType::Float32, Layout::Nhwc);
        let labels = TensorDesc::new(&[0], DataType::Float32, Layout::Nhwc);
        let err = SigmoidCrossEntropyWithLogits
            .infer_shapes(&[logits.clone(), labels], 1)
            .err()
            .unwrap();
        assert!(matches!(err, InferShapesError::IncompatibleShapes(_)));

        let labels = TensorDesc::new(&[1 << 32, 1 << 32], DataType::Float32, Layout::Nhwc);
        let err = SigmoidCrossEntropyWithLogits
            .infer_shapes(&[logits.clone(), labels], 1)
            .err()
            .unwrap();
        assert!(matches!(err, InferShapesError::IncompatibleShapes(_)));

        let err = SigmoidCrossEntropyWithLogits
            .infer_shapes(&[logits.clone()], 1)
            .err()
            .unwrap();
        assert_eq!(
            err,
            InferShapesError::IncorrectInputCount {
                expected: 2,
                actual: 1
            }
        );

        let err = SigmoidCrossEntropyWithLogits
            .infer_shapes(&[logits.clone(), logits], 0)
            .err()
            .unwrap();
        assert!(err.is_arity_error());
    }
}
