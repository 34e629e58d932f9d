use std::num::NonZero;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(NonZero<u32>);

        impl $name {
            /// Return the underlying u32 value of the ID.
            pub fn as_u32(self) -> u32 {
                self.0.get() - 1
            }

            /// Return the underlying ID value as a usize, for slice indexing.
            pub fn as_usize(self) -> usize {
                self.as_u32() as usize
            }

            /// Construct an ID from a u32 value.
            ///
            /// Panics if the value is `u32::MAX`.
            pub fn from_u32(value: u32) -> $name {
                // IDs are stored offset by one so that `Option<Id>` is the
                // same size as `Id`.
                let value = value.checked_add(1).and_then(NonZero::new);
                match value {
                    Some(value) => $name(value),
                    None => panic!("{} out of range", stringify!($name)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.as_u32().fmt(f)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.as_u32())
            }
        }
    };
}

define_id!(
    /// ID of an operator node in a [`Graph`](crate::Graph).
    NodeId
);

define_id!(
    /// ID of a tensor in a [`Graph`](crate::Graph).
    ///
    /// Tensors are the edges of the graph. Each tensor is either a graph
    /// input or constant, or the output of exactly one node.
    TensorId
);

#[cfg(test)]
mod tests {
    use super::{NodeId, TensorId};

    #[test]
    fn test_id_conversions() {
        let id = NodeId::from_u32(5);
        assert_eq!(id.as_u32(), 5);
        assert_eq!(id.as_usize(), 5);
        assert_eq!(id.to_string(), "5");
        assert_eq!(format!("{:?}", id), "NodeId(5)");
        assert_eq!(format!("{:?}", TensorId::from_u32(0)), "TensorId(0)");
        assert_eq!(
            std::mem::size_of::<Option<TensorId>>(),
            std::mem::size_of::<TensorId>()
        );
    }

    #[test]
    #[should_panic(expected = "TensorId out of range")]
    fn test_id_out_of_range() {
        TensorId::from_u32(u32::MAX);
    }
}
