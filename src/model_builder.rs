//! Serialization of graphs to the FlatBuffers-based IR.
//!
//! The IR has the following schema:
//!
//! ```text
//! table Attr {
//!   name: string;
//!   ints: [int];
//!   floats: [float];
//! }
//!
//! table TensorInfo {
//!   name: string;
//!   shape: [uint];
//!   dtype: ubyte;   // See `schema::dtype_code`
//!   layout: ubyte;  // See `schema::layout_code`
//! }
//!
//! table OperatorNode {
//!   name: string;
//!   op_type: string;
//!   inputs: [uint];   // Indices into `MetaGraph.tensors`
//!   outputs: [uint];
//!   attrs: [Attr];
//! }
//!
//! table MetaGraph {
//!   name: string;
//!   tensors: [TensorInfo];
//!   nodes: [OperatorNode];
//!   inputs: [uint];
//!   outputs: [uint];
//! }
//!
//! root_type MetaGraph;
//! ```

use std::error::Error;
use std::fmt::{Display, Formatter};

use flatbuffers::{FlatBufferBuilder, TableFinishedWIPOffset, Vector, WIPOffset};
use log::debug;

use crate::graph::{Graph, OperatorNode, TensorId, TensorInfo};
use crate::ops::{ActivationKind, OpKind, ReduceMode};

/// Field offsets and enum encodings of the IR tables.
pub mod schema {
    use flatbuffers::VOffsetT;
    use opgraph_shape_inference::{DataType, Layout};

    pub mod attr {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const INTS: VOffsetT = 6;
        pub const FLOATS: VOffsetT = 8;
    }

    pub mod tensor {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const SHAPE: VOffsetT = 6;
        pub const DTYPE: VOffsetT = 8;
        pub const LAYOUT: VOffsetT = 10;
    }

    pub mod node {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const OP_TYPE: VOffsetT = 6;
        pub const INPUTS: VOffsetT = 8;
        pub const OUTPUTS: VOffsetT = 10;
        pub const ATTRS: VOffsetT = 12;
    }

    pub mod graph {
        use super::VOffsetT;
        pub const NAME: VOffsetT = 4;
        pub const TENSORS: VOffsetT = 6;
        pub const NODES: VOffsetT = 8;
        pub const INPUTS: VOffsetT = 10;
        pub const OUTPUTS: VOffsetT = 12;
    }

    pub fn dtype_code(dtype: DataType) -> u8 {
        match dtype {
            DataType::Float32 => 1,
            DataType::Float16 => 2,
            DataType::Int32 => 3,
            DataType::Int64 => 4,
            DataType::Int8 => 5,
            DataType::UInt8 => 6,
            DataType::Bool => 7,
        }
    }

    pub fn layout_code(layout: Layout) -> u8 {
        match layout {
            Layout::Unspecified => 0,
            Layout::Nhwc => 1,
            Layout::Nchw => 2,
        }
    }
}

/// Errors that occur when serializing a graph.
#[derive(Clone, Debug, PartialEq)]
pub enum ExportError {
    /// A tensor has no descriptor, because shape inference has not run or
    /// failed for the node which produces it.
    MissingDescriptor { tensor: TensorId, name: String },

    /// A dimension or attribute does not fit in the integer type used to
    /// serialize it. `name` is the tensor or node it belongs to.
    ValueOutOfRange {
        name: String,
        field: &'static str,
        value: u64,
    },
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDescriptor { tensor, name } => {
                write!(f, "tensor {} (\"{}\") has no descriptor", tensor, name)
            }
            Self::ValueOutOfRange { name, field, value } => write!(
                f,
                "{} value {} of \"{}\" is too large to serialize",
                field, value, name
            ),
        }
    }
}

impl Error for ExportError {}

enum AttrValue {
    Ints(Vec<i32>),
    Floats(Vec<f32>),
}

fn int(value: impl Into<i32>) -> AttrValue {
    AttrValue::Ints(vec![value.into()])
}

/// Convert an unsigned size or index to the serialized `i32` form.
fn size(name: &str, field: &'static str, value: usize) -> Result<AttrValue, ExportError> {
    let value = i32::try_from(value).map_err(|_| ExportError::ValueOutOfRange {
        name: name.to_string(),
        field,
        value: value as u64,
    })?;
    Ok(int(value))
}

fn float(value: f32) -> AttrValue {
    AttrValue::Floats(vec![value])
}

/// Return the attributes of node `name` in the form they are serialized.
fn op_attrs(name: &str, op: &OpKind) -> Result<Vec<(&'static str, AttrValue)>, ExportError> {
    let attrs = match op {
        OpKind::Activation(op) => {
            let kind = match op.kind {
                ActivationKind::Relu => 0,
                ActivationKind::Relu6 => 1,
                ActivationKind::Tanh => 2,
                ActivationKind::Sigmoid => 3,
                ActivationKind::HardSwish => 4,
            };
            vec![("kind", int(kind)), ("alpha", float(op.alpha))]
        }
        OpKind::LeakyRelu(op) => vec![("negative_slope", float(op.negative_slope))],
        OpKind::Lstm(op) => vec![
            ("input_size", size(name, "input_size", op.input_size)?),
            ("hidden_size", size(name, "hidden_size", op.hidden_size)?),
            ("num_layers", size(name, "num_layers", op.num_layers)?),
            ("has_bias", int(op.has_bias)),
            ("dropout", float(op.dropout)),
            ("bidirectional", int(op.bidirectional)),
        ],
        OpKind::Partial(op) => vec![(
            "subgraph_index",
            size(name, "subgraph_index", op.subgraph_index as usize)?,
        )],
        OpKind::PRelu(op) => vec![("slope", AttrValue::Floats(op.slope.clone()))],
        OpKind::Reduce(op) => {
            let mode = match op.mode {
                ReduceMode::Sum => 0,
                ReduceMode::Mean => 1,
                ReduceMode::Max => 2,
                ReduceMode::Min => 3,
                ReduceMode::Prod => 4,
            };
            let mut attrs = vec![("mode", int(mode)), ("keep_dims", int(op.keep_dims))];
            if let Some(axes) = &op.axes {
                attrs.push(("axes", AttrValue::Ints(axes.clone())));
            }
            attrs
        }
        OpKind::SigmoidCrossEntropyWithLogits(_) => Vec::new(),
        OpKind::Tile(op) => vec![
            ("dims", AttrValue::Ints(op.dims.clone())),
            ("multiples", AttrValue::Ints(op.multiples.clone())),
        ],
        OpKind::Unstack(op) => vec![("axis", int(op.axis)), ("num", int(op.num))],
    };
    Ok(attrs)
}

/// Serializes a [`Graph`] into a FlatBuffers IR buffer.
pub struct ModelBuilder<'a> {
    builder: FlatBufferBuilder<'a>,
    name: String,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(name: &str) -> Self {
        ModelBuilder {
            builder: FlatBufferBuilder::with_capacity(1024),
            name: name.to_string(),
        }
    }

    fn add_tensor(
        &mut self,
        id: TensorId,
        info: &TensorInfo,
    ) -> Result<WIPOffset<TableFinishedWIPOffset>, ExportError> {
        let desc = info.desc().ok_or_else(|| ExportError::MissingDescriptor {
            tensor: id,
            name: info.name().to_string(),
        })?;

        let name = self.builder.create_string(info.name());
        let shape = desc
            .shape()
            .iter()
            .map(|&d| {
                u32::try_from(d).map_err(|_| ExportError::ValueOutOfRange {
                    name: info.name().to_string(),
                    field: "shape",
                    value: d as u64,
                })
            })
            .collect::<Result<Vec<u32>, _>>()?;
        let shape = self.builder.create_vector(&shape);

        let start = self.builder.start_table();
        self.builder.push_slot_always(schema::tensor::NAME, name);
        self.builder.push_slot_always(schema::tensor::SHAPE, shape);
        self.builder
            .push_slot_always(schema::tensor::DTYPE, schema::dtype_code(desc.dtype()));
        self.builder
            .push_slot_always(schema::tensor::LAYOUT, schema::layout_code(desc.layout()));
        Ok(self.builder.end_table(start))
    }

    fn add_attr(&mut self, name: &str, value: &AttrValue) -> WIPOffset<TableFinishedWIPOffset> {
        let name = self.builder.create_string(name);
        match value {
            AttrValue::Ints(ints) => {
                let ints = self.builder.create_vector(ints);
                let start = self.builder.start_table();
                self.builder.push_slot_always(schema::attr::NAME, name);
                self.builder.push_slot_always(schema::attr::INTS, ints);
                self.builder.end_table(start)
            }
            AttrValue::Floats(floats) => {
                let floats = self.builder.create_vector(floats);
                let start = self.builder.start_table();
                self.builder.push_slot_always(schema::attr::NAME, name);
                self.builder.push_slot_always(schema::attr::FLOATS, floats);
                self.builder.end_table(start)
            }
        }
    }

    fn add_node(
        &mut self,
        node: &OperatorNode,
    ) -> Result<WIPOffset<TableFinishedWIPOffset>, ExportError> {
        let attrs: Vec<_> = op_attrs(node.name(), node.op())?
            .iter()
            .map(|(name, value)| self.add_attr(name, value))
            .collect();
        let attrs = self.builder.create_vector(&attrs);

        let name = self.builder.create_string(node.name());
        let op_type = self.builder.create_string(node.op().name());
        let inputs = self.create_id_vec(node.inputs());
        let outputs = self.create_id_vec(node.outputs());

        let start = self.builder.start_table();
        self.builder.push_slot_always(schema::node::NAME, name);
        self.builder.push_slot_always(schema::node::OP_TYPE, op_type);
        self.builder.push_slot_always(schema::node::INPUTS, inputs);
        self.builder.push_slot_always(schema::node::OUTPUTS, outputs);
        self.builder.push_slot_always(schema::node::ATTRS, attrs);
        Ok(self.builder.end_table(start))
    }

    fn create_id_vec(&mut self, ids: &[TensorId]) -> WIPOffset<Vector<'a, u32>> {
        let ids: Vec<u32> = ids.iter().map(|id| id.as_u32()).collect();
        self.builder.create_vector(&ids)
    }

    /// Serialize `graph` and return the finished buffer.
    ///
    /// Every tensor in the graph must have a descriptor.
    pub fn finish(mut self, graph: &Graph) -> Result<Vec<u8>, ExportError> {
        let tensors = graph
            .tensors()
            .map(|(id, info)| self.add_tensor(id, info))
            .collect::<Result<Vec<_>, _>>()?;
        let tensors = self.builder.create_vector(&tensors);

        let nodes = graph
            .nodes()
            .map(|(_, node)| self.add_node(node))
            .collect::<Result<Vec<_>, _>>()?;
        let nodes = self.builder.create_vector(&nodes);

        let inputs = self.create_id_vec(graph.inputs());
        let outputs = self.create_id_vec(graph.outputs());
        let name = self.builder.create_string(&self.name);

        let start = self.builder.start_table();
        self.builder.push_slot_always(schema::graph::NAME, name);
        self.builder.push_slot_always(schema::graph::TENSORS, tensors);
        self.builder.push_slot_always(schema::graph::NODES, nodes);
        self.builder.push_slot_always(schema::graph::INPUTS, inputs);
        self.builder.push_slot_always(schema::graph::OUTPUTS, outputs);
        let root = self.builder.end_table(start);

        self.builder.finish(root, None);
        let data = self.builder.finished_data().to_vec();
        debug!(
            "Serialized graph \"{}\" with {} tensors and {} nodes into {} bytes",
            self.name,
            graph.tensors().len(),
            graph.nodes().len(),
            data.len()
        );

        Ok(data)
    }
}

/// Serialize a graph whose shapes have been inferred.
pub fn export_graph(graph: &Graph, name: &str) -> Result<Vec<u8>, ExportError> {
    ModelBuilder::new(name).finish(graph)
}
