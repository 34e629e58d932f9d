/// Long short-term memory recurrent layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Lstm {
    pub input_size: usize,
    pub hidden_size: usize,

    /// Number of stacked layers. Must be at least 1.
    pub num_layers: usize,
    pub has_bias: bool,

    /// Dropout probability applied between layers, in `[0, 1]`.
    pub dropout: f32,
    pub bidirectional: bool,
}

impl Lstm {
    /// Return the number of directions the sequence is processed in.
    pub fn num_directions(&self) -> usize {
        if self.bidirectional { 2 } else { 1 }
    }
}

impl Default for Lstm {
    fn default() -> Lstm {
        Lstm {
            input_size: 0,
            hidden_size: 0,
            num_layers: 1,
            has_bias: true,
            dropout: 0.,
            bidirectional: false,
        }
    }
}
