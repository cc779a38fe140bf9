use chaincore::ChainNode;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

/// Static mapping from a producer's name to the nodes that must receive
/// every envelope it emits.
///
/// Built once before the run starts and never mutated afterwards. The same
/// node may be registered under several producers; node instances are
/// deduplicated by name for task startup.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: HashMap<String, Vec<Arc<dyn ChainNode>>>,
    nodes: Vec<Arc<dyn ChainNode>>,
    index: HashMap<String, usize>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register nodes as consumers of `producer`'s output. Repeated calls
    /// with the same producer accumulate subscribers in insertion order.
    pub fn subscribe(
        &mut self,
        producer: impl Into<String>,
        nodes: impl IntoIterator<Item = Arc<dyn ChainNode>>,
    ) {
        let producer = producer.into();
        let entry = self.subscriptions.entry(producer.clone()).or_default();
        for node in nodes {
            let name = node.name().to_string();
            tracing::debug!(producer = %producer, subscriber = %name, "subscription added");
            if !self.index.contains_key(&name) {
                self.index.insert(name, self.nodes.len());
                self.nodes.push(Arc::clone(&node));
            }
            entry.push(node);
        }
    }

    /// Subscribers of `producer`, in registration order.
    pub fn subscribers(&self, producer: &str) -> &[Arc<dyn ChainNode>] {
        self.subscriptions
            .get(producer)
            .map(|nodes| nodes.as_slice())
            .unwrap_or(&[])
    }

    /// Every registered node, deduplicated by name.
    pub fn nodes(&self) -> &[Arc<dyn ChainNode>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reject cyclic topologies before the run starts: termination is only
    /// defined for acyclic graphs. Self-subscription edges are ignored
    /// because the dispatcher never redelivers a node's output to itself.
    ///
    /// Returns the name of one node on a cycle, if any.
    pub(crate) fn find_cycle(&self) -> Option<String> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut indices: HashMap<String, NodeIndex> = HashMap::new();

        for (producer, subscribers) in &self.subscriptions {
            for subscriber in subscribers {
                if subscriber.name() == producer.as_str() {
                    continue;
                }
                let from = index_of(&mut graph, &mut indices, producer);
                let to = index_of(&mut graph, &mut indices, subscriber.name());
                graph.update_edge(from, to, ());
            }
        }

        toposort(&graph, None)
            .err()
            .map(|cycle| graph[cycle.node_id()].clone())
    }
}

fn index_of(
    graph: &mut DiGraph<String, ()>,
    indices: &mut HashMap<String, NodeIndex>,
    name: &str,
) -> NodeIndex {
    if let Some(idx) = indices.get(name) {
        return *idx;
    }
    let idx = graph.add_node(name.to_string());
    indices.insert(name.to_string(), idx);
    idx
}
