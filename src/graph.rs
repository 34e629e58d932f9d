//! Operator graph and the shape inference driver.

use std::error::Error;
use std::fmt::{Display, Formatter};

use log::debug;
use opgraph_shape_inference::{InferShapesError, TensorDesc};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::env::env_flag;
use crate::infer_registry::{InferFailure, InferRegistry};
use crate::ops::OpKind;

mod infer_error;
mod node_id;

pub use infer_error::{ErrorKind, InferError, NodeInfo};
pub use node_id::{NodeId, TensorId};


/// A tensor in the graph.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorInfo {
    name: String,
    desc: Option<TensorDesc>,
    producer: Option<NodeId>,
}

impl TensorInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the descriptor for this tensor.
    ///
    /// This is `None` for node outputs until shape inference has run.
    pub fn desc(&self) -> Option<&TensorDesc> {
        self.desc.as_ref()
    }

    /// Return the node which produces this tensor, or `None` if it is a
    /// graph input or constant.
    pub fn producer(&self) -> Option<NodeId> {
        self.producer
    }
}

/// An operator in the graph, with its attributes and the tensors it reads
/// and writes.
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorNode {
    name: String,
    op: OpKind,
    inputs: SmallVec<[TensorId; 4]>,
    outputs: SmallVec<[TensorId; 4]>,
}

impl OperatorNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &OpKind {
        &self.op
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }
}

/// Errors that occur when constructing a graph.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphError {
    /// A tensor ID does not refer to a tensor in this graph.
    InvalidTensorId(TensorId),

    /// A node lists as an output a tensor that is already produced by
    /// another node, or lists the same output twice.
    OutputAlreadyProduced { tensor: TensorId, producer: NodeId },
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTensorId(id) => write!(f, "tensor ID {} is invalid", id),
            Self::OutputAlreadyProduced { tensor, producer } => {
                write!(f, "tensor {} is already produced by node {}", tensor, producer)
            }
        }
    }
}

impl Error for GraphError {}

/// Options that control shape inference.
#[derive(Clone, Debug, PartialEq)]
pub struct InferOptions {
    /// Infer independent nodes concurrently.
    pub parallel: bool,

    /// Continue inferring nodes that don't depend on a failed node, and
    /// report all failures at the end.
    pub keep_going: bool,
}

impl InferOptions {
    /// Create options from the `OPGRAPH_PARALLEL_INFER` and
    /// `OPGRAPH_KEEP_GOING` environment variables, falling back to the
    /// defaults for unset variables.
    pub fn from_env() -> InferOptions {
        let defaults = InferOptions::default();
        InferOptions {
            parallel: env_flag("OPGRAPH_PARALLEL_INFER", defaults.parallel),
            keep_going: env_flag("OPGRAPH_KEEP_GOING", defaults.keep_going),
        }
    }
}

impl Default for InferOptions {
    fn default() -> InferOptions {
        InferOptions {
            parallel: true,
            keep_going: false,
        }
    }
}

/// Graph of operator nodes connected by tensors.
///
/// Graphs are built by the format importers. Input and constant tensors are
/// added with descriptors, and the descriptors of node outputs are filled in
/// by [`infer_shapes`](Graph::infer_shapes).
#[derive(Clone, Debug, Default)]
pub struct Graph {
    tensors: Vec<TensorInfo>,
    nodes: Vec<OperatorNode>,
    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,

    /// Map of name to the most recently added tensor with that name.
    names: FxHashMap<String, TensorId>,
}

/// How far along a node is during shape inference.
enum Readiness {
    /// All inputs have descriptors.
    Ready,
    /// At least one input is produced by a node that failed.
    Poisoned,
    /// At least one input has not been produced yet.
    Blocked,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Add a tensor to the graph.
    ///
    /// If a tensor with the same name already exists, the new tensor
    /// shadows it in [`find_tensor`](Graph::find_tensor).
    pub fn add_tensor(&mut self, name: &str, desc: Option<TensorDesc>) -> TensorId {
        let id = TensorId::from_u32(self.tensors.len() as u32);
        self.tensors.push(TensorInfo {
            name: name.to_string(),
            desc,
            producer: None,
        });
        self.names.insert(name.to_string(), id);
        id
    }

    /// Add a tensor with a known descriptor, such as a graph input.
    pub fn add_value(&mut self, name: &str, desc: TensorDesc) -> TensorId {
        self.add_tensor(name, Some(desc))
    }

    /// Add an operator node which reads `inputs` and writes `outputs`.
    ///
    /// Each output must not already be produced by another node.
    pub fn add_node(
        &mut self,
        name: &str,
        op: impl Into<OpKind>,
        inputs: &[TensorId],
        outputs: &[TensorId],
    ) -> Result<NodeId, GraphError> {
        let node_id = NodeId::from_u32(self.nodes.len() as u32);

        for &id in inputs.iter().chain(outputs) {
            self.check_tensor_id(id)?;
        }
        for (i, &id) in outputs.iter().enumerate() {
            if let Some(producer) = self.tensors[id.as_usize()].producer {
                return Err(GraphError::OutputAlreadyProduced {
                    tensor: id,
                    producer,
                });
            }
            if outputs[..i].contains(&id) {
                return Err(GraphError::OutputAlreadyProduced {
                    tensor: id,
                    producer: node_id,
                });
            }
        }

        for &id in outputs {
            self.tensors[id.as_usize()].producer = Some(node_id);
        }
        self.nodes.push(OperatorNode {
            name: name.to_string(),
            op: op.into(),
            inputs: SmallVec::from_slice(inputs),
            outputs: SmallVec::from_slice(outputs),
        });

        Ok(node_id)
    }

    /// Set the tensors which are inputs to the graph.
    pub fn set_inputs(&mut self, inputs: &[TensorId]) -> Result<(), GraphError> {
        for &id in inputs {
            self.check_tensor_id(id)?;
        }
        self.inputs = inputs.to_vec();
        Ok(())
    }

    /// Set the tensors which are outputs of the graph.
    pub fn set_outputs(&mut self, outputs: &[TensorId]) -> Result<(), GraphError> {
        for &id in outputs {
            self.check_tensor_id(id)?;
        }
        self.outputs = outputs.to_vec();
        Ok(())
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn tensor(&self, id: TensorId) -> Option<&TensorInfo> {
        self.tensors.get(id.as_usize())
    }

    /// Return the descriptor of a tensor, if known.
    pub fn tensor_desc(&self, id: TensorId) -> Option<&TensorDesc> {
        self.tensor(id).and_then(|t| t.desc())
    }

    /// Find the most recently added tensor with a given name.
    pub fn find_tensor(&self, name: &str) -> Option<TensorId> {
        self.names.get(name).copied()
    }

    /// Iterate over tensors in the order they were added.
    pub fn tensors(&self) -> impl ExactSizeIterator<Item = (TensorId, &TensorInfo)> {
        self.tensors
            .iter()
            .enumerate()
            .map(|(i, t)| (TensorId::from_u32(i as u32), t))
    }

    pub fn node(&self, id: NodeId) -> Option<&OperatorNode> {
        self.nodes.get(id.as_usize())
    }

    /// Iterate over nodes in the order they were added.
    pub fn nodes(&self) -> impl ExactSizeIterator<Item = (NodeId, &OperatorNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::from_u32(i as u32), n))
    }

    /// Infer the descriptors of all node outputs, stopping at the first
    /// failure.
    ///
    /// Whether independent nodes are inferred concurrently is controlled by
    /// the `OPGRAPH_PARALLEL_INFER` environment variable.
    pub fn infer_shapes(&mut self, registry: &InferRegistry) -> Result<(), InferError> {
        let opts = InferOptions {
            keep_going: false,
            ..InferOptions::from_env()
        };
        match self.run_inference(registry, &opts).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Infer the descriptors of all node outputs.
    ///
    /// Nodes are processed in waves. Each wave contains the nodes whose
    /// inputs all have descriptors, and nodes in a wave are inferred
    /// concurrently if `opts.parallel` is set. The outputs of a node are
    /// updated only if inference for that node succeeds.
    ///
    /// If `opts.keep_going` is set, a failure only prevents inference of the
    /// nodes which depend on the failed node, and all failures are returned.
    /// Otherwise the first failure is returned.
    ///
    /// Running inference again on the same graph produces the same
    /// descriptors.
    pub fn infer_shapes_with_options(
        &mut self,
        registry: &InferRegistry,
        opts: &InferOptions,
    ) -> Result<(), Vec<InferError>> {
        let errors = self.run_inference(registry, opts);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn run_inference(&mut self, registry: &InferRegistry, opts: &InferOptions) -> Vec<InferError> {
        // Tensors whose descriptors are final for this pass.
        let mut available: Vec<bool> = self
            .tensors
            .iter()
            .map(|t| t.producer.is_none() && t.desc.is_some())
            .collect();

        // Tensors which will not be produced because a node upstream failed.
        let mut poisoned = vec![false; self.tensors.len()];

        let mut pending: Vec<NodeId> = self.nodes().map(|(id, _)| id).collect();
        let mut errors = Vec::new();

        while !pending.is_empty() {
            let mut ready = Vec::new();
            let mut blocked = Vec::new();
            let mut skipped = false;

            for node_id in pending {
                match self.readiness(node_id, &available, &poisoned) {
                    Readiness::Ready => ready.push(node_id),
                    Readiness::Blocked => blocked.push(node_id),
                    Readiness::Poisoned => {
                        debug!(
                            "Skipping {} because an upstream node failed",
                            self.node_info(node_id)
                        );
                        self.poison_outputs(node_id, &mut poisoned);
                        skipped = true;
                    }
                }
            }

            if ready.is_empty() {
                if skipped {
                    pending = blocked;
                    continue;
                }
                self.report_blocked(&mut blocked, &available, &mut poisoned, &mut errors);
                if !opts.keep_going && !errors.is_empty() {
                    errors.truncate(1);
                    return errors;
                }
                pending = blocked;
                continue;
            }

            let results: Vec<(NodeId, Result<Vec<TensorDesc>, InferError>)> =
                if opts.parallel && ready.len() > 1 {
                    ready
                        .par_iter()
                        .map(|&id| (id, self.infer_node(registry, id)))
                        .collect()
                } else {
                    ready
                        .iter()
                        .map(|&id| (id, self.infer_node(registry, id)))
                        .collect()
                };

            for (node_id, result) in results {
                match result {
                    Ok(descs) => {
                        let node = &self.nodes[node_id.as_usize()];
                        debug!(
                            "Inferred {} outputs [{}]",
                            node.name,
                            descs
                                .iter()
                                .map(|d| d.to_string())
                                .collect::<Vec<_>>()
                                .join(", ")
                        );
                        for (&id, desc) in node.outputs.iter().zip(descs) {
                            self.tensors[id.as_usize()].desc = Some(desc);
                            available[id.as_usize()] = true;
                        }
                    }
                    Err(err) => {
                        debug!("Inference failed: {}", err);
                        errors.push(err);
                        if !opts.keep_going {
                            return errors;
                        }
                        self.poison_outputs(node_id, &mut poisoned);
                    }
                }
            }

            pending = blocked;
        }

        errors
    }

    /// Report errors for nodes that can never become ready, and remove them
    /// from `blocked`.
    ///
    /// Nodes with an input that has neither a descriptor nor a producer are
    /// reported first. If there are none, the remaining nodes form or
    /// depend on a cycle and are all reported.
    fn report_blocked(
        &self,
        blocked: &mut Vec<NodeId>,
        available: &[bool],
        poisoned: &mut [bool],
        errors: &mut Vec<InferError>,
    ) {
        let mut failed = Vec::new();
        for &node_id in blocked.iter() {
            let missing = self.nodes[node_id.as_usize()]
                .inputs
                .iter()
                .copied()
                .find(|t| !available[t.as_usize()] && self.tensors[t.as_usize()].producer.is_none());
            if let Some(tensor) = missing {
                errors.push(InferError::UnresolvedInput {
                    node: self.node_info(node_id),
                    tensor,
                });
                failed.push(node_id);
            }
        }

        if failed.is_empty() {
            for &node_id in blocked.iter() {
                let missing = self.nodes[node_id.as_usize()]
                    .inputs
                    .iter()
                    .copied()
                    .find(|t| !available[t.as_usize()]);
                if let Some(tensor) = missing {
                    errors.push(InferError::UnresolvedInput {
                        node: self.node_info(node_id),
                        tensor,
                    });
                }
            }
            failed = std::mem::take(blocked);
        }

        for &node_id in &failed {
            self.poison_outputs(node_id, poisoned);
        }
        blocked.retain(|id| !failed.contains(id));
    }

    fn readiness(&self, node_id: NodeId, available: &[bool], poisoned: &[bool]) -> Readiness {
        let inputs = &self.nodes[node_id.as_usize()].inputs;
        if inputs.iter().any(|t| poisoned[t.as_usize()]) {
            Readiness::Poisoned
        } else if inputs.iter().all(|t| available[t.as_usize()]) {
            Readiness::Ready
        } else {
            Readiness::Blocked
        }
    }

    fn poison_outputs(&self, node_id: NodeId, poisoned: &mut [bool]) {
        for id in &self.nodes[node_id.as_usize()].outputs {
            poisoned[id.as_usize()] = true;
        }
    }

    /// Run the inference rule for a single node whose inputs are available.
    fn infer_node(
        &self,
        registry: &InferRegistry,
        node_id: NodeId,
    ) -> Result<Vec<TensorDesc>, InferError> {
        let node = &self.nodes[node_id.as_usize()];

        let mut inputs = Vec::with_capacity(node.inputs.len());
        for &tensor in &node.inputs {
            let Some(desc) = self.tensor_desc(tensor) else {
                return Err(InferError::UnresolvedInput {
                    node: self.node_info(node_id),
                    tensor,
                });
            };
            inputs.push(desc.clone());
        }

        let outputs = registry
            .infer(&node.op, &inputs, node.outputs.len())
            .map_err(|failure| match failure {
                InferFailure::UnsupportedOperator(_) => InferError::UnsupportedOperator {
                    node: self.node_info(node_id),
                },
                InferFailure::Shape(error) => InferError::Shape {
                    node: self.node_info(node_id),
                    error,
                },
            })?;

        if outputs.len() != node.outputs.len() {
            return Err(InferError::Shape {
                node: self.node_info(node_id),
                error: InferShapesError::IncorrectOutputCount {
                    expected: outputs.len(),
                    actual: node.outputs.len(),
                },
            });
        }

        Ok(outputs)
    }

    fn node_info(&self, node_id: NodeId) -> NodeInfo {
        let node = &self.nodes[node_id.as_usize()];
        NodeInfo {
            id: node_id,
            name: node.name.clone(),
            op_type: node.op.op_type(),
        }
    }

    fn check_tensor_id(&self, id: TensorId) -> Result<(), GraphError> {
        if id.as_usize() < self.tensors.len() {
            Ok(())
        } else {
            Err(GraphError::InvalidTensorId(id))
        }
    }
}
