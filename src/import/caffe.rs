//! Import of Caffe network definitions.
//!
//! The types here mirror the messages of the `caffe.proto` schema which are
//! needed for the supported layers. Parsing the prototxt or binary protobuf
//! encoding is left to the caller.
//!
//! Caffe blobs are float32 in NCHW order.

use log::debug;
use opgraph_shape_inference::{DataType, Layout, TensorDesc};
use rustc_hash::FxHashMap;

use super::{ImportError, ImportedNode};
use crate::graph::{Graph, TensorId};
use crate::ops::{Activation, ActivationKind, LeakyRelu, OpKind, Tile, normalized_token};

/// Shape of a blob.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlobShape {
    pub dim: Vec<i64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileParameter {
    /// Axis to tile. Defaults to 1.
    pub axis: Option<i32>,

    /// Number of copies. Defaults to 1.
    pub tiles: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReLUParameter {
    /// Slope for negative inputs. Defaults to 0.
    pub negative_slope: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerParameter {
    pub name: String,
    pub type_: String,
    pub bottom: Vec<String>,
    pub top: Vec<String>,
    pub tile_param: Option<TileParameter>,
    pub relu_param: Option<ReLUParameter>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetParameter {
    pub name: String,

    /// Names of the network's input blobs.
    pub input: Vec<String>,

    /// Shapes of the input blobs, in the same order as `input`.
    pub input_shape: Vec<BlobShape>,
    pub layer: Vec<LayerParameter>,
}

/// Function which converts a layer into an attribute record.
pub type ImportLayerFn = fn(&LayerParameter) -> Result<OpKind, ImportError>;

/// Importer for Caffe networks.
///
/// Layers are dispatched on their exact type name.
#[derive(Default)]
pub struct CaffeImporter {
    layers: FxHashMap<&'static str, ImportLayerFn>,
}

impl CaffeImporter {
    /// Create a new importer with no layer types registered.
    pub fn new() -> CaffeImporter {
        CaffeImporter {
            layers: FxHashMap::default(),
        }
    }

    /// Register the function used to import layers of a given type.
    pub fn register_layer(&mut self, layer_type: &'static str, import: ImportLayerFn) {
        self.layers.insert(layer_type, import);
    }

    /// Create an importer with all supported layer types registered.
    pub fn with_all_layers() -> CaffeImporter {
        let mut importer = CaffeImporter::new();
        importer.register_layer("Tile", read_tile);
        importer.register_layer("ReLU", read_relu);
        importer.register_layer("ReLU6", read_activation);
        importer.register_layer("TanH", read_activation);
        importer.register_layer("Sigmoid", read_activation);
        importer
    }

    /// Translate a layer into a node reading from and writing to `graph`.
    ///
    /// Bottoms are resolved to the most recent tensor with each name. A new
    /// tensor is created for each top, so layers which compute in place get
    /// a fresh output that shadows their input.
    pub fn import_layer(
        &self,
        layer: &LayerParameter,
        graph: &mut Graph,
    ) -> Result<ImportedNode, ImportError> {
        let import =
            self.layers
                .get(layer.type_.as_str())
                .ok_or_else(|| ImportError::OperatorUnavailable {
                    name: layer.type_.clone(),
                })?;
        let op = import(layer)?;

        let inputs = layer
            .bottom
            .iter()
            .map(|name| {
                graph
                    .find_tensor(name)
                    .ok_or_else(|| ImportError::UnknownTensor(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = layer
            .top
            .iter()
            .map(|name| graph.add_tensor(name, None))
            .collect();

        debug!(
            "Importing Caffe layer \"{}\" ({}) as {}",
            layer.name,
            layer.type_,
            op.name()
        );

        Ok(ImportedNode {
            name: layer.name.clone(),
            op,
            inputs,
            outputs,
        })
    }

    /// Import a network.
    ///
    /// The graph's outputs are the layer outputs which are not consumed by
    /// any layer.
    pub fn import_net(&self, net: &NetParameter) -> Result<Graph, ImportError> {
        if net.input.len() != net.input_shape.len() {
            return Err(ImportError::attr_error(
                "input_shape",
                format!(
                    "{} shapes given for {} inputs",
                    net.input_shape.len(),
                    net.input.len()
                ),
            ));
        }

        let mut graph = Graph::new();
        let mut inputs = Vec::with_capacity(net.input.len());
        for (name, shape) in net.input.iter().zip(&net.input_shape) {
            let dims = shape
                .dim
                .iter()
                .map(|&d| usize::try_from(d))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ImportError::InvalidShape { name: name.clone() })?;
            let desc = TensorDesc::new(&dims, DataType::Float32, Layout::Nchw);
            inputs.push(graph.add_value(name, desc));
        }
        graph.set_inputs(&inputs)?;

        for layer in &net.layer {
            self.import_layer(layer, &mut graph)?.add_to(&mut graph)?;
        }

        let outputs = unconsumed_outputs(&graph);
        graph.set_outputs(&outputs)?;

        Ok(graph)
    }
}

/// Import a network using all supported layer types.
pub fn import_net(net: &NetParameter) -> Result<Graph, ImportError> {
    CaffeImporter::with_all_layers().import_net(net)
}

/// Return the node outputs which no node reads.
fn unconsumed_outputs(graph: &Graph) -> Vec<TensorId> {
    let mut consumed = vec![false; graph.tensors().len()];
    for (_, node) in graph.nodes() {
        for id in node.inputs() {
            consumed[id.as_usize()] = true;
        }
    }
    graph
        .tensors()
        .filter(|(id, info)| info.producer().is_some() && !consumed[id.as_usize()])
        .map(|(id, _)| id)
        .collect()
}

fn read_tile(layer: &LayerParameter) -> Result<OpKind, ImportError> {
    let param = layer.tile_param.clone().unwrap_or_default();
    let tile = Tile::with_axis(param.axis.unwrap_or(1), param.tiles.unwrap_or(1));
    Ok(tile.into())
}

fn read_relu(layer: &LayerParameter) -> Result<OpKind, ImportError> {
    let negative_slope = layer
        .relu_param
        .as_ref()
        .and_then(|p| p.negative_slope)
        .unwrap_or(0.);
    let op = if negative_slope != 0. {
        LeakyRelu { negative_slope }.into()
    } else {
        Activation::new(ActivationKind::Relu).into()
    };
    Ok(op)
}

fn read_activation(layer: &LayerParameter) -> Result<OpKind, ImportError> {
    let kind = ActivationKind::from_name(normalized_token(&layer.type_)).ok_or_else(|| {
        ImportError::OperatorUnavailable {
            name: layer.type_.clone(),
        }
    })?;
    Ok(Activation::new(kind).into())
}
