use crate::infer_shapes::{InferShapes, InferShapesError, check_output_count};
use crate::tensor_desc::TensorDesc;

/// LSTM operator.
///
/// Inputs are `[x, h0, c0, weights]`:
///
/// - `x` has shape `[seq_len, batch, input_size]`
/// - `h0` and `c0` have shape `[num_layers * num_directions, batch, hidden_size]`
///
/// Outputs are `[y, hy, cy]` where `y` has shape `[seq_len, batch, hidden_size
/// * num_directions]` and `hy`, `cy` match `h0` and `c0`. The weights input
/// is packed in a backend-specific format and its shape is not checked.
#[derive(Clone, Debug)]
pub struct Lstm {
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub num_directions: usize,
    pub dropout: f32,
}

impl Lstm {
    fn check_attrs(&self) -> Result<(), InferShapesError> {
        if self.num_layers < 1 {
            return Err(InferShapesError::invalid_attr(
                "num_layers",
                "must be at least 1",
            ));
        }
        if self.hidden_size < 1 {
            return Err(InferShapesError::invalid_attr(
                "hidden_size",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(InferShapesError::invalid_attr(
                "dropout",
                format!("{} is outside [0, 1]", self.dropout),
            ));
        }
        Ok(())
    }
}

fn check_rank(name: &str, desc: &TensorDesc, ndim: usize) -> Result<(), InferShapesError> {
    if desc.ndim() != ndim {
        return Err(InferShapesError::IncompatibleShapes(format!(
            "{} should have {} dims but has shape {:?}",
            name,
            ndim,
            desc.shape()
        )));
    }
    Ok(())
}

impl InferShapes for Lstm {
    fn infer_shapes(
        &self,
        inputs: &[TensorDesc],
        num_outputs: usize,
    ) -> Result<Vec<TensorDesc>, InferShapesError> {
        let [x, h0, c0, _weights] = inputs else {
            return Err(InferShapesError::input_count(4, inputs.len()));
        };
        check_output_count(3, num_outputs)?;
        self.check_attrs()?;

        check_rank("x", x, 3)?;
        check_rank("h0", h0, 3)?;
        check_rank("c0", c0, 3)?;

        let (seq_len, batch, input_size) = (x.shape()[0], x.shape()[1], x.shape()[2]);
        if input_size != self.input_size {
            return Err(InferShapesError::invalid_attr(
                "input_size",
                format!(
                    "expected {} to match input feature size {}",
                    self.input_size, input_size
                ),
            ));
        }

        if h0.shape() != c0.shape() {
            return Err(InferShapesError::IncompatibleShapes(format!(
                "h0 {:?} and c0 {:?} have different shapes",
                h0.shape(),
                c0.shape()
            )));
        }

        let num_states = self
            .num_layers
            .checked_mul(self.num_directions)
            .ok_or_else(|| InferShapesError::invalid_attr("num_layers", "too many layers"))?;
        let y_size = self
            .hidden_size
            .checked_mul(self.num_directions)
            .ok_or_else(|| InferShapesError::invalid_attr("hidden_size", "too large"))?;

        let state_shape = [num_states, batch, self.hidden_size];
        if h0.shape() != state_shape.as_slice() {
            return Err(InferShapesError::IncompatibleShapes(format!(
                "expected initial state shape {:?} but got {:?}",
                state_shape,
                h0.shape()
            )));
        }

        let y = x.with_shape(&[seq_len, batch, y_size]);
        Ok([y, h0.clone(), c0.clone()].into())
    }
}
