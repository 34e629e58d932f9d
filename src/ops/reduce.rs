/// The function used to combine elements in a [`Reduce`] operation.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ReduceMode {
    Sum,
    Mean,
    Max,
    Min,
    Prod,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reduce {
    pub mode: ReduceMode,

    /// Axes to reduce over. If `None`, all axes are reduced.
    pub axes: Option<Vec<i32>>,
    pub keep_dims: bool,
}
