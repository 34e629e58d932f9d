#[derive(Clone, Debug, PartialEq)]
pub struct SigmoidCrossEntropyWithLogits {}
