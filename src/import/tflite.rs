//! Import of TensorFlow Lite models.
//!
//! The types here follow the "object API" of the TFLite FlatBuffers schema,
//! restricted to the fields used by the supported operators. Operators
//! refer to their builtin operator directly rather than through the model's
//! operator code table. Reading the FlatBuffers encoding is left to the
//! caller.
//!
//! TFLite tensors are bound with NHWC layout.

use log::{debug, warn};
use opgraph_shape_inference::{DataType, Layout, TensorDesc};
use rustc_hash::FxHashMap;

use super::{ImportError, ImportedNode};
use crate::graph::{Graph, TensorId};
use crate::ops::{
    Activation, ActivationKind, LeakyRelu, OpKind, PRelu, Partial, Reduce, ReduceMode, Unstack,
};

#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum TensorType {
    #[default]
    Float32,
    Float16,
    Int32,
    Int64,
    Int8,
    UInt8,
    Bool,
}

impl TensorType {
    fn data_type(self) -> DataType {
        match self {
            TensorType::Float32 => DataType::Float32,
            TensorType::Float16 => DataType::Float16,
            TensorType::Int32 => DataType::Int32,
            TensorType::Int64 => DataType::Int64,
            TensorType::Int8 => DataType::Int8,
            TensorType::UInt8 => DataType::UInt8,
            TensorType::Bool => DataType::Bool,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum BuiltinOperator {
    Add,
    Call,
    HardSwish,
    LeakyRelu,
    Logistic,
    Mean,
    Prelu,
    ReduceMax,
    ReduceMin,
    ReduceProd,
    Relu,
    Relu6,
    Sum,
    Tanh,
    Unpack,
}

impl BuiltinOperator {
    pub fn name(self) -> &'static str {
        match self {
            BuiltinOperator::Add => "Add",
            BuiltinOperator::Call => "Call",
            BuiltinOperator::HardSwish => "HardSwish",
            BuiltinOperator::LeakyRelu => "LeakyRelu",
            BuiltinOperator::Logistic => "Logistic",
            BuiltinOperator::Mean => "Mean",
            BuiltinOperator::Prelu => "Prelu",
            BuiltinOperator::ReduceMax => "ReduceMax",
            BuiltinOperator::ReduceMin => "ReduceMin",
            BuiltinOperator::ReduceProd => "ReduceProd",
            BuiltinOperator::Relu => "Relu",
            BuiltinOperator::Relu6 => "Relu6",
            BuiltinOperator::Sum => "Sum",
            BuiltinOperator::Tanh => "Tanh",
            BuiltinOperator::Unpack => "Unpack",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallOptions {
    pub subgraph: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeakyReluOptions {
    pub alpha: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReducerOptions {
    pub keep_dims: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnpackOptions {
    pub num: i32,
    pub axis: i32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum BuiltinOptions {
    #[default]
    None,
    CallOptions(CallOptions),
    LeakyReluOptions(LeakyReluOptions),
    ReducerOptions(ReducerOptions),
    UnpackOptions(UnpackOptions),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Buffer {
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tensor {
    pub name: String,
    pub shape: Vec<i32>,
    pub type_: TensorType,

    /// Index into [`Model::buffers`]. Buffer 0 is always empty, so tensors
    /// without data use index 0.
    pub buffer: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Operator {
    pub opcode: BuiltinOperator,
    pub inputs: Vec<i32>,
    pub outputs: Vec<i32>,
    pub builtin_options: BuiltinOptions,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubGraph {
    pub name: String,
    pub tensors: Vec<Tensor>,
    pub inputs: Vec<i32>,
    pub outputs: Vec<i32>,
    pub operators: Vec<Operator>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub buffers: Vec<Buffer>,
    pub subgraphs: Vec<SubGraph>,
}

/// Context passed to operator import functions.
///
/// This provides access to the tensors and constant data of the subgraph
/// being imported.
pub struct OpContext<'a> {
    model: &'a Model,
    subgraph: &'a SubGraph,
}

impl<'a> OpContext<'a> {
    pub fn model(&self) -> &'a Model {
        self.model
    }

    /// Look up a tensor by its index in the subgraph.
    pub fn tensor(&self, index: i32) -> Result<&'a Tensor, ImportError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.subgraph.tensors.get(i))
            .ok_or(ImportError::InvalidTensorIndex(index))
    }

    /// Read the constant data of a float32 tensor.
    pub fn f32_data(&self, index: i32) -> Result<Vec<f32>, ImportError> {
        let (buffer, data) = self.buffer_data(index)?;
        decode_le(buffer, data, f32::from_le_bytes)
    }

    /// Read the constant data of an int32 tensor.
    pub fn i32_data(&self, index: i32) -> Result<Vec<i32>, ImportError> {
        let (buffer, data) = self.buffer_data(index)?;
        decode_le(buffer, data, i32::from_le_bytes)
    }

    fn buffer_data(&self, index: i32) -> Result<(u32, &'a [u8]), ImportError> {
        let tensor = self.tensor(index)?;
        let buffer = self
            .model
            .buffers
            .get(tensor.buffer as usize)
            .ok_or_else(|| ImportError::InvalidBuffer {
                index: tensor.buffer,
                error: "buffer does not exist".into(),
            })?;
        if buffer.data.is_empty() {
            return Err(ImportError::InvalidBuffer {
                index: tensor.buffer,
                error: format!("tensor \"{}\" has no constant data", tensor.name),
            });
        }
        Ok((tensor.buffer, &buffer.data))
    }
}

/// Decode a buffer of little-endian values.
fn decode_le<T, const N: usize>(
    index: u32,
    data: &[u8],
    from_le_bytes: fn([u8; N]) -> T,
) -> Result<Vec<T>, ImportError> {
    if data.len() % N != 0 {
        return Err(ImportError::InvalidBuffer {
            index,
            error: format!("length {} is not a multiple of {}", data.len(), N),
        });
    }
    let values = data
        .chunks_exact(N)
        .map(|chunk| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(chunk);
            from_le_bytes(bytes)
        })
        .collect();
    Ok(values)
}

/// Function which converts an operator into an attribute record.
pub type ImportOpFn = fn(&Operator, &OpContext) -> Result<OpKind, ImportError>;

struct OpImporter {
    import: ImportOpFn,

    /// Number of leading inputs which are bound as node inputs. The rest are
    /// constants which are folded into the attribute record.
    bound_inputs: Option<usize>,
}

/// Importer for TensorFlow Lite models.
///
/// Operators are dispatched on their [`BuiltinOperator`].
#[derive(Default)]
pub struct TfliteImporter {
    ops: FxHashMap<BuiltinOperator, OpImporter>,
}

impl TfliteImporter {
    /// Create a new importer with no operators registered.
    pub fn new() -> TfliteImporter {
        TfliteImporter {
            ops: FxHashMap::default(),
        }
    }

    /// Register the function used to import an operator. All of the
    /// operator's inputs are bound as node inputs.
    pub fn register_op(&mut self, opcode: BuiltinOperator, import: ImportOpFn) {
        self.ops.insert(
            opcode,
            OpImporter {
                import,
                bound_inputs: None,
            },
        );
    }

    /// Register the function used to import an operator whose inputs after
    /// the first `bound_inputs` are read as constants by `import`.
    pub fn register_op_with_inputs(
        &mut self,
        opcode: BuiltinOperator,
        bound_inputs: usize,
        import: ImportOpFn,
    ) {
        self.ops.insert(
            opcode,
            OpImporter {
                import,
                bound_inputs: Some(bound_inputs),
            },
        );
    }

    /// Create an importer with all supported operators registered.
    pub fn with_all_ops() -> TfliteImporter {
        let mut importer = TfliteImporter::new();

        importer.register_op(BuiltinOperator::HardSwish, read_activation);
        importer.register_op(BuiltinOperator::Logistic, read_activation);
        importer.register_op(BuiltinOperator::Relu, read_activation);
        importer.register_op(BuiltinOperator::Relu6, read_activation);
        importer.register_op(BuiltinOperator::Tanh, read_activation);

        importer.register_op(BuiltinOperator::Call, read_call);
        importer.register_op(BuiltinOperator::LeakyRelu, read_leaky_relu);
        importer.register_op_with_inputs(BuiltinOperator::Prelu, 1, read_prelu);
        importer.register_op(BuiltinOperator::Unpack, read_unpack);

        importer.register_op_with_inputs(BuiltinOperator::Mean, 1, read_reduce);
        importer.register_op_with_inputs(BuiltinOperator::ReduceMax, 1, read_reduce);
        importer.register_op_with_inputs(BuiltinOperator::ReduceMin, 1, read_reduce);
        importer.register_op_with_inputs(BuiltinOperator::ReduceProd, 1, read_reduce);
        importer.register_op_with_inputs(BuiltinOperator::Sum, 1, read_reduce);

        importer
    }

    /// Import the main subgraph of a model.
    pub fn import_model(&self, model: &Model) -> Result<Graph, ImportError> {
        let subgraph = model
            .subgraphs
            .first()
            .ok_or_else(|| ImportError::attr_error("subgraphs", "model has no subgraphs"))?;
        self.import_subgraph(model, subgraph)
    }

    /// Import a subgraph of a model.
    pub fn import_subgraph(
        &self,
        model: &Model,
        subgraph: &SubGraph,
    ) -> Result<Graph, ImportError> {
        let ctx = OpContext { model, subgraph };
        let mut binder = TensorBinder::new(subgraph);
        let mut graph = Graph::new();

        let inputs = subgraph
            .inputs
            .iter()
            .map(|&index| binder.bind(&ctx, &mut graph, index))
            .collect::<Result<Vec<_>, _>>()?;
        graph.set_inputs(&inputs)?;

        for (index, op) in subgraph.operators.iter().enumerate() {
            self.import_operator(index, op, &ctx, &mut binder, &mut graph)?
                .add_to(&mut graph)?;
        }

        let outputs = subgraph
            .outputs
            .iter()
            .map(|&index| binder.bind(&ctx, &mut graph, index))
            .collect::<Result<Vec<_>, _>>()?;
        graph.set_outputs(&outputs)?;

        Ok(graph)
    }

    fn import_operator(
        &self,
        index: usize,
        op: &Operator,
        ctx: &OpContext,
        binder: &mut TensorBinder,
        graph: &mut Graph,
    ) -> Result<ImportedNode, ImportError> {
        let importer = self
            .ops
            .get(&op.opcode)
            .ok_or_else(|| ImportError::OperatorUnavailable {
                name: op.opcode.name().to_string(),
            })?;

        let name = format!("{}-{}", op.opcode.name(), index);
        debug!("Importing TFLite operator {} as {}", op.opcode.name(), name);
        let kind = (importer.import)(op, ctx)?;

        let bound = importer.bound_inputs.unwrap_or(op.inputs.len());
        let inputs = op
            .inputs
            .iter()
            .take(bound)
            .map(|&index| binder.bind(ctx, graph, index))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = op
            .outputs
            .iter()
            .map(|&index| binder.bind(ctx, graph, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ImportedNode {
            name,
            op: kind,
            inputs,
            outputs,
        })
    }
}

/// Import the main subgraph of a model using all supported operators.
pub fn import_model(model: &Model) -> Result<Graph, ImportError> {
    TfliteImporter::with_all_ops().import_model(model)
}

/// Maps subgraph tensor indices to graph tensors, adding each tensor to the
/// graph the first time it is used.
struct TensorBinder {
    ids: Vec<Option<TensorId>>,

    /// Whether each tensor is written by an operator.
    produced: Vec<bool>,
}

impl TensorBinder {
    fn new(subgraph: &SubGraph) -> TensorBinder {
        let mut produced = vec![false; subgraph.tensors.len()];
        for op in &subgraph.operators {
            for &index in &op.outputs {
                if let Some(p) = usize::try_from(index).ok().and_then(|i| produced.get_mut(i)) {
                    *p = true;
                }
            }
        }
        TensorBinder {
            ids: vec![None; subgraph.tensors.len()],
            produced,
        }
    }

    /// Return the graph tensor for a subgraph tensor index.
    ///
    /// Tensors written by an operator are added without a descriptor. Other
    /// tensors are inputs or constants and get a descriptor from the model.
    fn bind(
        &mut self,
        ctx: &OpContext,
        graph: &mut Graph,
        index: i32,
    ) -> Result<TensorId, ImportError> {
        let tensor = ctx.tensor(index)?;
        let slot = index as usize;
        if let Some(id) = self.ids[slot] {
            return Ok(id);
        }

        let id = if self.produced[slot] {
            graph.add_tensor(&tensor.name, None)
        } else {
            let shape = tensor
                .shape
                .iter()
                .map(|&d| usize::try_from(d))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ImportError::InvalidShape {
                    name: tensor.name.clone(),
                })?;
            let desc = TensorDesc::new(&shape, tensor.type_.data_type(), Layout::Nhwc);
            graph.add_value(&tensor.name, desc)
        };
        self.ids[slot] = Some(id);

        Ok(id)
    }
}

fn read_activation(op: &Operator, _ctx: &OpContext) -> Result<OpKind, ImportError> {
    let kind = match op.opcode {
        BuiltinOperator::HardSwish => ActivationKind::HardSwish,
        BuiltinOperator::Logistic => ActivationKind::Sigmoid,
        BuiltinOperator::Relu => ActivationKind::Relu,
        BuiltinOperator::Relu6 => ActivationKind::Relu6,
        BuiltinOperator::Tanh => ActivationKind::Tanh,
        other => {
            return Err(ImportError::OperatorUnavailable {
                name: other.name().to_string(),
            });
        }
    };
    Ok(Activation::new(kind).into())
}

fn read_call(op: &Operator, ctx: &OpContext) -> Result<OpKind, ImportError> {
    let BuiltinOptions::CallOptions(opts) = &op.builtin_options else {
        return Err(ImportError::AttrsMissing);
    };
    if opts.subgraph as usize >= ctx.model().subgraphs.len() {
        return Err(ImportError::attr_error(
            "subgraph",
            format!("subgraph {} does not exist", opts.subgraph),
        ));
    }
    warn!(
        "Call to subgraph {} imported as Partial. Its output shapes will not be inferred.",
        opts.subgraph
    );
    Ok(Partial {
        subgraph_index: opts.subgraph,
    }
    .into())
}

fn read_leaky_relu(op: &Operator, _ctx: &OpContext) -> Result<OpKind, ImportError> {
    let BuiltinOptions::LeakyReluOptions(opts) = &op.builtin_options else {
        return Err(ImportError::AttrsMissing);
    };
    Ok(LeakyRelu {
        negative_slope: opts.alpha,
    }
    .into())
}

fn read_prelu(op: &Operator, ctx: &OpContext) -> Result<OpKind, ImportError> {
    let &slope_index = op
        .inputs
        .get(1)
        .ok_or_else(|| ImportError::attr_error("slope", "slope input is missing"))?;
    let slope = ctx.f32_data(slope_index)?;
    Ok(PRelu { slope }.into())
}

fn read_unpack(op: &Operator, _ctx: &OpContext) -> Result<OpKind, ImportError> {
    let BuiltinOptions::UnpackOptions(opts) = &op.builtin_options else {
        return Err(ImportError::AttrsMissing);
    };
    Ok(Unstack {
        axis: opts.axis,
        num: opts.num,
    }
    .into())
}

fn read_reduce(op: &Operator, ctx: &OpContext) -> Result<OpKind, ImportError> {
    let BuiltinOptions::ReducerOptions(opts) = &op.builtin_options else {
        return Err(ImportError::AttrsMissing);
    };
    let mode = match op.opcode {
        BuiltinOperator::Mean => ReduceMode::Mean,
        BuiltinOperator::ReduceMax => ReduceMode::Max,
        BuiltinOperator::ReduceMin => ReduceMode::Min,
        BuiltinOperator::ReduceProd => ReduceMode::Prod,
        BuiltinOperator::Sum => ReduceMode::Sum,
        other => {
            return Err(ImportError::OperatorUnavailable {
                name: other.name().to_string(),
            });
        }
    };
    let axes = match op.inputs.get(1) {
        Some(&index) if index >= 0 => Some(ctx.i32_data(index)?),
        _ => None,
    };
    Ok(Reduce {
        mode,
        axes,
        keep_dims: opts.keep_dims,
    }
    .into())
}
