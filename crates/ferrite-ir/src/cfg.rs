//! The interprocedural control-flow graph.
//!
//! Vertices are code blocks and proxy blocks, identified by UUID; edges
//! carry an optional label describing the control transfer. The graph is
//! storage only; no analyses live here.

use crate::node::Node;
use crate::{CodeBlock, ProxyBlock};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use rustc_hash::FxHashMap;
use uuid::Uuid;

/// A vertex of the CFG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CfgNode {
    /// A [`CodeBlock`].
    Code(CodeBlock),
    /// A [`ProxyBlock`].
    Proxy(ProxyBlock),
}

impl CfgNode {
    /// The vertex's UUID.
    pub fn uuid(self) -> Uuid {
        match self {
            CfgNode::Code(b) => b.uuid(),
            CfgNode::Proxy(b) => b.uuid(),
        }
    }

    /// View a generic node as a CFG vertex, when its kind allows.
    pub fn from_node(node: Node) -> Option<CfgNode> {
        match node {
            Node::CodeBlock(b) => Some(CfgNode::Code(b)),
            Node::ProxyBlock(b) => Some(CfgNode::Proxy(b)),
            _ => None,
        }
    }
}

/// The kind of control transfer an edge represents.
///
/// Wire codes are stable: new kinds may be appended but existing codes are
/// never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EdgeType {
    /// A jump.
    Branch = 0,
    /// A call.
    Call = 1,
    /// Sequential flow into the next block.
    Fallthrough = 2,
    /// A return from a call.
    Return = 3,
    /// A system call.
    Syscall = 4,
    /// A return from a system call.
    Sysret = 5,
}

impl EdgeType {
    /// The stable wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Decode a stable wire code.
    pub fn from_code(code: u8) -> Option<EdgeType> {
        Some(match code {
            0 => EdgeType::Branch,
            1 => EdgeType::Call,
            2 => EdgeType::Fallthrough,
            3 => EdgeType::Return,
            4 => EdgeType::Syscall,
            5 => EdgeType::Sysret,
            _ => return None,
        })
    }
}

/// Properties of a CFG edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeLabel {
    /// Whether the transfer is taken only under a condition.
    pub conditional: bool,
    /// Whether the target is direct (encoded in the instruction) rather
    /// than computed.
    pub direct: bool,
    /// The kind of control transfer.
    pub kind: EdgeType,
}

/// A labeled edge between two CFG vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// The transfer's origin.
    pub source: CfgNode,
    /// The transfer's destination.
    pub target: CfgNode,
    /// The transfer's properties, when known.
    pub label: Option<EdgeLabel>,
}

/// A directed multigraph over code and proxy blocks.
#[derive(Debug, Default)]
pub struct Cfg {
    graph: StableDiGraph<CfgNode, Option<EdgeLabel>>,
    vertices: FxHashMap<Uuid, NodeIndex>,
}

impl Cfg {
    /// Create an empty graph.
    pub fn new() -> Self {
        Cfg::default()
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Add a vertex. Returns whether it was new.
    pub fn add_vertex(&mut self, node: CfgNode) -> bool {
        if self.vertices.contains_key(&node.uuid()) {
            return false;
        }
        let index = self.graph.add_node(node);
        self.vertices.insert(node.uuid(), index);
        true
    }

    /// Whether the graph contains `node`.
    pub fn contains_vertex(&self, node: CfgNode) -> bool {
        self.vertices.contains_key(&node.uuid())
    }

    /// Remove a vertex and every edge incident to it. Returns whether it
    /// was present.
    pub fn remove_vertex(&mut self, node: CfgNode) -> bool {
        match self.vertices.remove(&node.uuid()) {
            Some(index) => {
                self.graph.remove_node(index);
                true
            }
            None => false,
        }
    }

    /// Add an edge, creating missing vertices. Parallel edges with distinct
    /// labels are kept; an exact duplicate is not re-added and returns
    /// `false`.
    pub fn add_edge(&mut self, source: CfgNode, target: CfgNode, label: Option<EdgeLabel>) -> bool {
        self.add_vertex(source);
        self.add_vertex(target);
        let from = self.vertices[&source.uuid()];
        let to = self.vertices[&target.uuid()];
        let duplicate = self
            .graph
            .edges_connecting(from, to)
            .any(|edge| *edge.weight() == label);
        if duplicate {
            return false;
        }
        self.graph.add_edge(from, to, label);
        true
    }

    /// Remove the edge matching (`source`, `target`, `label`) exactly.
    /// Returns whether one was removed.
    pub fn remove_edge(
        &mut self,
        source: CfgNode,
        target: CfgNode,
        label: Option<EdgeLabel>,
    ) -> bool {
        let (Some(&from), Some(&to)) = (
            self.vertices.get(&source.uuid()),
            self.vertices.get(&target.uuid()),
        ) else {
            return false;
        };
        let found = self
            .graph
            .edges_connecting(from, to)
            .find(|edge| *edge.weight() == label)
            .map(|edge| edge.id());
        match found {
            Some(id) => {
                self.graph.remove_edge(id);
                true
            }
            None => false,
        }
    }

    /// Iterate vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = CfgNode> + '_ {
        self.graph.node_weights().copied()
    }

    /// Iterate edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.graph.edge_references().map(|edge| Edge {
            source: self.graph[edge.source()],
            target: self.graph[edge.target()],
            label: *edge.weight(),
        })
    }

    /// Edges leaving `node`.
    pub fn out_edges(&self, node: CfgNode) -> Vec<Edge> {
        self.directed_edges(node, Direction::Outgoing)
    }

    /// Edges entering `node`.
    pub fn in_edges(&self, node: CfgNode) -> Vec<Edge> {
        self.directed_edges(node, Direction::Incoming)
    }

    fn directed_edges(&self, node: CfgNode, direction: Direction) -> Vec<Edge> {
        let Some(&index) = self.vertices.get(&node.uuid()) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(index, direction)
            .map(|edge| Edge {
                source: self.graph[edge.source()],
                target: self.graph[edge.target()],
                label: *edge.weight(),
            })
            .collect()
    }
}
