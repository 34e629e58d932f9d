/// Call to another subgraph of the model.
///
/// The shapes of the outputs depend on the called subgraph, so this operator
/// has no shape inference rule of its own.
#[derive(Clone, Debug, PartialEq)]
pub struct Partial {
    pub subgraph_index: u32,
}
