//! Dispatch table mapping operator types to shape inference rules.

use std::error::Error;
use std::fmt::{Display, Formatter};

use opgraph_shape_inference as si;
use opgraph_shape_inference::{InferShapes, InferShapesError, ReductionOp, TensorDesc, UnaryOp};
use rustc_hash::FxHashMap;

use crate::ops::{self, OpKind, OpType};

/// Error returned by [`InferRegistry::infer`].
#[derive(Clone, Debug, PartialEq)]
pub enum InferFailure {
    /// No inference rule is registered for this operator type.
    UnsupportedOperator(OpType),

    /// The operator's inputs or attributes are invalid.
    Shape(InferShapesError),
}

impl Display for InferFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedOperator(op_type) => {
                write!(f, "no shape inference rule for {} operator", op_type)
            }
            Self::Shape(err) => err.fmt(f),
        }
    }
}

impl Error for InferFailure {}

impl From<InferShapesError> for InferFailure {
    fn from(err: InferShapesError) -> Self {
        Self::Shape(err)
    }
}

/// Trait for attribute records which have a shape inference rule.
pub trait InferOp: Sized {
    /// Return the type tag for this operator.
    fn op_type() -> OpType;

    /// Extract this operator from an [`OpKind`], if it has the matching
    /// variant.
    fn from_kind(op: &OpKind) -> Option<&Self>;

    /// Compute the output descriptors for this operator.
    fn infer(
        &self,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferShapesError>;
}

type InferFunction = dyn Fn(&OpKind, &[TensorDesc], usize) -> Result<Vec<TensorDesc>, InferFailure>
    + Send
    + Sync;

/// Registry of shape inference rules, keyed by operator type.
///
/// New registries have no operators registered. Use
/// [`with_all_ops`](InferRegistry::with_all_ops) to create a registry with
/// all built-in rules, or create an empty registry and register the required
/// operators with [`register_op`](InferRegistry::register_op).
///
/// The registry is passed explicitly to
/// [`Graph::infer_shapes`](crate::Graph::infer_shapes). There is no global
/// registration.
#[derive(Default)]
pub struct InferRegistry {
    ops: FxHashMap<OpType, Box<InferFunction>>,
}

impl InferRegistry {
    /// Create a new empty registry.
    pub fn new() -> InferRegistry {
        InferRegistry {
            ops: FxHashMap::default(),
        }
    }

    /// Register the built-in shape inference rule for an operator.
    pub fn register_op<Op: InferOp + 'static>(&mut self) {
        self.ops.insert(
            Op::op_type(),
            Box::new(
                |op: &OpKind,
                 inputs: &[TensorDesc],
                 num_outputs: usize|
                 -> Result<Vec<TensorDesc>, InferFailure> {
                    let op = Op::from_kind(op)
                        .ok_or_else(|| InferFailure::UnsupportedOperator(op.op_type()))?;
                    Ok(op.infer(inputs, num_outputs)?)
                },
            ),
        );
    }

    /// Return true if a rule is registered for `op_type`.
    pub fn contains(&self, op_type: OpType) -> bool {
        self.ops.contains_key(&op_type)
    }

    /// Infer the output descriptors for an operator.
    pub fn infer(
        &self,
        op: &OpKind,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferFailure> {
        let infer_fn = self
            .ops
            .get(&op.op_type())
            .ok_or(InferFailure::UnsupportedOperator(op.op_type()))?;
        infer_fn(op, inputs, num_outputs)
    }

    /// Create a new registry with all built-in rules registered.
    pub fn with_all_ops() -> InferRegistry {
        let mut reg = InferRegistry::new();

        macro_rules! register_op {
            ($op:ident) => {
                reg.register_op::<ops::$op>()
            };
        }

        register_op!(Activation);
        register_op!(LeakyRelu);
        register_op!(Lstm);
        register_op!(PRelu);
        register_op!(Reduce);
        register_op!(SigmoidCrossEntropyWithLogits);
        register_op!(Tile);
        register_op!(Unstack);

        reg
    }
}

/// Implement [`InferOp`] for an attribute record.
///
/// The syntax is `impl_infer_op!(Op, op, rule)` where `rule` is an expression
/// which uses `op: &ops::Op` to construct a value implementing
/// [`InferShapes`].
macro_rules! impl_infer_op {
    ($op:ident, $var:ident, $rule:expr) => {
        impl InferOp for ops::$op {
            fn op_type() -> OpType {
                OpType::$op
            }

            fn from_kind(op: &OpKind) -> Option<&Self> {
                match op {
                    OpKind::$op(op) => Some(op),
                    _ => None,
                }
            }

            fn infer(
                &self,
                inputs: &[TensorDesc],
                num_outputs: usize,
            ) -> Result<Vec<TensorDesc>, InferShapesError> {
                let $var = self;
                let rule = $rule;
                rule.infer_shapes(inputs, num_outputs)
            }
        }
    };
}

impl_infer_op!(Activation, _op, UnaryOp);
impl_infer_op!(LeakyRelu, _op, UnaryOp);
impl_infer_op!(
    Lstm,
    op,
    si::ops::Lstm {
        input_size: op.input_size,
        hidden_size: op.hidden_size,
        num_layers: op.num_layers,
        num_directions: op.num_directions(),
        dropout: op.dropout,
    }
);
impl_infer_op!(
    PRelu,
    op,
    si::ops::PRelu {
        slope_len: op.slope.len()
    }
);
impl_infer_op!(
    Reduce,
    op,
    ReductionOp {
        axes: op.axes.as_deref(),
        keep_dims: op.keep_dims,
    }
);
impl_infer_op!(
    SigmoidCrossEntropyWithLogits,
    _op,
    si::ops::SigmoidCrossEntropyWithLogits
);
impl_infer_op!(
    Tile,
    op,
    si::ops::Tile {
        dims: &op.dims,
        multiples: &op.multiples,
    }
);
impl_infer_op!(
    Unstack,
    op,
    si::ops::Unstack {
        axis: op.axis,
        num: op.num,
    }
);

#[cfg(test)]
mod tests {
    use opgraph_shape_inference::{DataType, InferShapesError, Layout, TensorDesc};
    use opgraph_testing::TestCases;

    use super::{InferFailure, InferRegistry};
    use crate::ops::{
        Activation, ActivationKind, LeakyRelu, Lstm, OpKind, OpType, PRelu, Partial, Reduce,
        ReduceMode, SigmoidCrossEntropyWithLogits, Tile, Unstack,
    };

    fn desc(shape: &[usize]) -> TensorDesc {
        TensorDesc::new(shape, DataType::Float32, Layout::Nhwc)
    }

    #[test]
    fn test_activations_copy_input() {
        #[derive(Debug)]
        struct Case {
            op: OpKind,
        }

        let cases = [
            ActivationKind::Relu,
            ActivationKind::Relu6,
            ActivationKind::Tanh,
            ActivationKind::Sigmoid,
            ActivationKind::HardSwish,
        ]
        .map(|kind| Case {
            op: Activation::new(kind).into(),
        })
        .into_iter()
        .chain([
            Case {
                op: LeakyRelu {
                    negative_slope: 0.1,
                }
                .into(),
            },
            Case {
                op: PRelu {
                    slope: vec![0.25; 3],
                }
                .into(),
            },
        ]);

        cases.test_each(|case| {
            let registry = InferRegistry::with_all_ops();
            let input = TensorDesc::new(&[1, 16, 16, 3], DataType::Float16, Layout::Nhwc);
            let outputs = registry.infer(&case.op, &[input.clone()], 1).unwrap();
            assert_eq!(outputs, [input.clone()]);
        })
    }

    #[test]
    fn test_infer_dispatch() {
        let registry = InferRegistry::with_all_ops();

        let outputs = registry
            .infer(&Tile::default().into(), &[desc(&[2, 3, 4])], 1)
            .unwrap();
        assert_eq!(outputs, [desc(&[2, 3, 4])]);

        let outputs = registry
            .infer(&Unstack { axis: 1, num: 4 }.into(), &[desc(&[8, 4, 16])], 4)
            .unwrap();
        assert_eq!(outputs, vec![desc(&[8, 16]); 4]);

        let reduce = Reduce {
            mode: ReduceMode::Sum,
            axes: Some(vec![1, 2]),
            keep_dims: true,
        };
        let outputs = registry
            .infer(&reduce.into(), &[desc(&[1, 8, 8, 3])], 1)
            .unwrap();
        assert_eq!(outputs, [desc(&[1, 1, 1, 3])]);

        let lstm = Lstm {
            input_size: 4,
            hidden_size: 8,
            num_layers: 1,
            bidirectional: true,
            ..Default::default()
        };
        let x = desc(&[5, 2, 4]);
        let state = desc(&[2, 2, 8]);
        let outputs = registry
            .infer(
                &lstm.into(),
                &[x, state.clone(), state.clone(), desc(&[1])],
                3,
            )
            .unwrap();
        assert_eq!(outputs, [desc(&[5, 2, 16]), state.clone(), state]);
    }

    #[test]
    fn test_infer_errors() {
        let registry = InferRegistry::with_all_ops();

        let loss: OpKind = SigmoidCrossEntropyWithLogits {}.into();
        let err = registry
            .infer(&loss, &[desc(&[4, 10]), desc(&[4, 9])], 1)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            InferFailure::Shape(InferShapesError::IncompatibleShapes(_))
        ));

        let err = registry.infer(&loss, &[desc(&[4, 10])], 1).err().unwrap();
        assert_eq!(
            err,
            InferFailure::Shape(InferShapesError::IncorrectInputCount {
                expected: 2,
                actual: 1
            })
        );

        let partial: OpKind = Partial { subgraph_index: 1 }.into();
        let err = registry.infer(&partial, &[desc(&[1])], 1).err().unwrap();
        assert_eq!(err, InferFailure::UnsupportedOperator(OpType::Partial));
        assert_eq!(
            err.to_string(),
            "no shape inference rule for Partial operator"
        );
    }

    #[test]
    fn test_missing_input_is_arity_error() {
        #[derive(Debug)]
        struct Case {
            op: OpKind,
            num_inputs: usize,
            num_outputs: usize,
        }

        let lstm = Lstm {
            input_size: 4,
            hidden_size: 8,
            ..Default::default()
        };
        let reduce = Reduce {
            mode: ReduceMode::Mean,
            axes: None,
            keep_dims: false,
        };

        let cases = [
            Case {
                op: Activation::new(ActivationKind::Relu).into(),
                num_inputs: 1,
                num_outputs: 1,
            },
            Case {
                op: LeakyRelu {
                    negative_slope: 0.1,
                }
                .into(),
                num_inputs: 1,
                num_outputs: 1,
            },
            Case {
                op: PRelu { slope: vec![0.25] }.into(),
                num_inputs: 1,
                num_outputs: 1,
            },
            Case {
                op: Tile::default().into(),
                num_inputs: 1,
                num_outputs: 1,
            },
            Case {
                op: Unstack { axis: 0, num: 2 }.into(),
                num_inputs: 1,
                num_outputs: 2,
            },
            Case {
                op: reduce.into(),
                num_inputs: 1,
                num_outputs: 1,
            },
            Case {
                op: SigmoidCrossEntropyWithLogits {}.into(),
                num_inputs: 2,
                num_outputs: 1,
            },
            Case {
                op: lstm.into(),
                num_inputs: 4,
                num_outputs: 3,
            },
        ];

        cases.test_each(|case| {
            let registry = InferRegistry::with_all_ops();
            assert!(registry.contains(case.op.op_type()));

            let inputs = vec![desc(&[2, 2, 4]); case.num_inputs - 1];
            let err = registry
                .infer(&case.op, &inputs, case.num_outputs)
                .err()
                .unwrap();
            match err {
                InferFailure::Shape(err) => assert!(err.is_arity_error(), "{:?}", err),
                other => panic!("unexpected error {:?}", other),
            }
        })
    }

    #[test]
    fn test_selective_registration() {
        let mut registry = InferRegistry::new();
        assert!(!registry.contains(OpType::Tile));

        registry.register_op::<Tile>();
        assert!(registry.contains(OpType::Tile));
        assert!(registry.infer(&Tile::default().into(), &[desc(&[2, 2])], 1).is_ok());

        let relu: OpKind = Activation::new(ActivationKind::Relu).into();
        let err = registry.infer(&relu, &[desc(&[2, 2])], 1).err().unwrap();
        assert_eq!(err, InferFailure::UnsupportedOperator(OpType::Activation));
    }

    #[test]
    fn test_infer_is_idempotent() {
        let registry = InferRegistry::with_all_ops();
        let op: OpKind = Unstack { axis: -1, num: 2 }.into();
        let inputs = [desc(&[3, 5, 2])];

        let first = registry.infer(&op, &inputs, 2).unwrap();
        let second = registry.infer(&op, &inputs, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(inputs, [desc(&[3, 5, 2])]);
    }
}
