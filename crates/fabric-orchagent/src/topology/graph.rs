//! Switch/link graph with shortest-path queries.
//!
//! The graph keeps two views of the reported links:
//!
//! - a directed view holding every link id once, and
//! - an undirected routing view holding one edge per physical connection
//!   (keyed by [`EdgeKey`]), over which shortest paths are computed.
//!
//! Links are reported once per direction, so the first report of a
//! connection becomes the routing edge and the reverse report only lands in
//! the directed view. Paths therefore contain links in whatever orientation
//! they were first reported; the forwarding writer re-orients every hop.

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use super::types::{EdgeKey, Link, LinkId, NodeId};

/// Breadth-first tree rooted at one switch: each reached node maps to the
/// routing edge it was reached through.
#[derive(Debug, Default)]
struct BfsTree {
    parents: HashMap<NodeId, EdgeKey>,
}

#[derive(Debug, Default)]
struct GraphState {
    initialized: bool,
    directed: BTreeMap<LinkId, Link>,
    undirected: BTreeMap<EdgeKey, Link>,
    adjacency: BTreeMap<NodeId, BTreeSet<EdgeKey>>,
    /// Shortest-path index, filled lazily per source node and dropped on
    /// every mutation.
    path_index: Mutex<HashMap<NodeId, Arc<BfsTree>>>,
}

impl GraphState {
    fn add_links(&mut self, links: &[Link]) -> usize {
        self.initialized = true;
        let mut added = 0;

        for link in links {
            if link.is_host_link() {
                debug!("TopologyGraph: Skipping host link {}", link.id);
                continue;
            }

            if !self.directed.contains_key(&link.id) {
                self.directed.insert(link.id.clone(), link.clone());
                added += 1;
            }

            let key = link.edge_key();
            if !self.undirected.contains_key(&key) {
                debug!(
                    "TopologyGraph: Adding link between {} and {}",
                    link.source.node, link.destination.node
                );
                for node in [&link.source.node, &link.destination.node] {
                    self.adjacency
                        .entry(node.clone())
                        .or_default()
                        .insert(key.clone());
                }
                self.undirected.insert(key, link.clone());
            }
        }

        self.path_index.get_mut().clear();
        added
    }

    fn remove_links(&mut self, links: &[Link]) -> usize {
        let mut removed = 0;

        for link in links {
            if self.directed.remove(&link.id).is_some() {
                removed += 1;
            }

            let key = link.edge_key();
            if let Some(edge) = self.undirected.remove(&key) {
                for node in [&edge.source.node, &edge.destination.node] {
                    if let Some(edges) = self.adjacency.get_mut(node) {
                        edges.remove(&key);
                    }
                }
            }
        }

        self.path_index.get_mut().clear();
        removed
    }

    fn clear(&mut self) {
        self.initialized = false;
        self.directed.clear();
        self.undirected.clear();
        self.adjacency.clear();
        self.path_index.get_mut().clear();
    }

    fn bfs(&self, root: &NodeId) -> BfsTree {
        let mut tree = BfsTree::default();
        let mut queue = VecDeque::from([root.clone()]);

        while let Some(node) = queue.pop_front() {
            let Some(edges) = self.adjacency.get(&node) else {
                continue;
            };
            for key in edges {
                let Some(next) = self.undirected.get(key).and_then(|l| l.far_end(&node)) else {
                    continue;
                };
                if &next.node == root || tree.parents.contains_key(&next.node) {
                    continue;
                }
                tree.parents.insert(next.node.clone(), key.clone());
                queue.push_back(next.node.clone());
            }
        }

        tree
    }

    fn tree_for(&self, root: &NodeId) -> Arc<BfsTree> {
        let mut index = self.path_index.lock();
        Arc::clone(
            index
                .entry(root.clone())
                .or_insert_with(|| Arc::new(self.bfs(root))),
        )
    }

    fn shortest_path(&self, src: &NodeId, dst: &NodeId) -> Option<Vec<Link>> {
        if !self.adjacency.contains_key(src) || !self.adjacency.contains_key(dst) {
            debug!("TopologyGraph: {} or {} not in graph", src, dst);
            return None;
        }
        if src == dst {
            return Some(Vec::new());
        }

        let tree = self.tree_for(src);
        let mut path = Vec::new();
        let mut current = dst.clone();

        while &current != src {
            let key = tree.parents.get(&current)?;
            let link = self.undirected.get(key)?;
            current = link.far_end(&current)?.node.clone();
            path.push(link.clone());
        }

        path.reverse();
        Some(path)
    }
}

/// Live switch/link graph.
///
/// A single read-write lock guards every view and the path index, so a
/// path query always sees one consistent snapshot and never interleaves
/// with a mutation.
#[derive(Debug, Default)]
pub struct TopologyGraph {
    state: RwLock<GraphState>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds links, skipping link ids and physical connections already
    /// present. Returns the number of new directed links.
    pub fn add_links(&self, links: &[Link]) -> usize {
        if links.is_empty() {
            info!("TopologyGraph: No link added as links is empty");
            return 0;
        }
        self.state.write().add_links(links)
    }

    /// Removes links from both views. Returns the number of directed links
    /// removed; a graph that was never populated is left untouched.
    pub fn remove_links(&self, links: &[Link]) -> usize {
        let mut state = self.state.write();
        if !state.initialized {
            warn!("TopologyGraph: Graph is not initialized, add links first");
            return 0;
        }
        state.remove_links(links)
    }

    /// Minimum hop-count path from `src` to `dst`.
    ///
    /// Returns `None` if either switch is not in the graph or no path
    /// exists, and an empty path when `src == dst`. Ties between equal
    /// length paths are broken by edge key order, so repeated queries over
    /// the same graph return the same path.
    pub fn shortest_path(&self, src: &NodeId, dst: &NodeId) -> Option<Vec<Link>> {
        self.state.read().shortest_path(src, dst)
    }

    /// Drops all links, nodes, dedup state and the path index.
    pub fn clear(&self) {
        self.state.write().clear();
    }

    /// Replaces the graph contents with `links` under a single write lock.
    pub fn rebuild(&self, links: &[Link]) -> usize {
        let mut state = self.state.write();
        state.clear();
        if links.is_empty() {
            return 0;
        }
        state.add_links(links)
    }

    pub fn has_node(&self, node: &NodeId) -> bool {
        self.state.read().adjacency.contains_key(node)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Routing-graph edges, one per physical connection.
    pub fn links(&self) -> Vec<Link> {
        self.state.read().undirected.values().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.state.read().adjacency.len()
    }

    /// Returns `(directed, undirected)` edge counts.
    pub fn edge_counts(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.directed.len(), state.undirected.len())
    }

    /// Logs every node with its incident routing edges.
    pub fn dump(&self) {
        let state = self.state.read();
        if !state.initialized {
            warn!("TopologyGraph: Graph is empty");
            return;
        }
        info!("TopologyGraph: {} nodes", state.adjacency.len());
        for (node, edges) in &state.adjacency {
            info!("Node {} links:", node);
            for key in edges {
                if let Some(link) = state.undirected.get(key) {
                    info!("  {}", link);
                }
            }
        }
    }
}
