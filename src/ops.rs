//! Attribute records for the operators supported by opgraph.
//!
//! Each operator kind has a struct holding its static parameters. These are
//! created by the format importers when a node is added to a
//! [`Graph`](crate::Graph) and are owned by that node afterwards. The
//! [`OpKind`] enum is the sum type over all operator kinds and [`OpType`] is
//! the matching fieldless tag used to key dispatch tables.

use std::fmt;

mod activations;
mod control_flow;
mod layout;
mod loss;
mod reduce;
mod rnn;

pub use activations::{Activation, ActivationKind, LeakyRelu, PRelu, normalized_token};
pub use control_flow::Partial;
pub use layout::{Tile, Unstack};
pub use loss::SigmoidCrossEntropyWithLogits;
pub use reduce::{Reduce, ReduceMode};
pub use rnn::Lstm;

macro_rules! define_op_kinds {
    ($($op:ident),* $(,)?) => {
        /// An operator and its attributes.
        #[derive(Clone, Debug, PartialEq)]
        pub enum OpKind {
            $($op($op),)*
        }

        /// Type tag identifying the kind of an [`OpKind`].
        #[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
        pub enum OpType {
            $($op,)*
        }

        impl OpKind {
            /// Return the type tag for this operator.
            pub fn op_type(&self) -> OpType {
                match self {
                    $(OpKind::$op(_) => OpType::$op,)*
                }
            }
        }

        impl OpType {
            /// Return the name of this operator type.
            pub fn name(self) -> &'static str {
                match self {
                    $(OpType::$op => stringify!($op),)*
                }
            }
        }

        $(
            impl From<$op> for OpKind {
                fn from(op: $op) -> OpKind {
                    OpKind::$op(op)
                }
            }
        )*
    };
}

define_op_kinds!(
    Activation,
    LeakyRelu,
    Lstm,
    Partial,
    PRelu,
    Reduce,
    SigmoidCrossEntropyWithLogits,
    Tile,
    Unstack,
);

impl OpKind {
    /// Return the name of this operator's type.
    pub fn name(&self) -> &'static str {
        self.op_type().name()
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
