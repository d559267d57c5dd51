//! The build graph, a graph between nodes (artifacts) and the commands that
//! produce them.

use crate::command::Command;
use crate::fs::{FileInfo, FileSystem};
use anyhow::bail;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A named build artifact.  Virtual nodes have no filesystem backing and are
/// used to order commands or name groups of them.
#[derive(Debug, PartialEq, Eq)]
pub struct Node {
    name: String,
    is_virtual: bool,
}

impl Node {
    /// A node whose virtual-ness follows the naming convention: names wrapped
    /// in angle brackets, like `<all>`, are virtual.
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_virtual = name.len() > 2 && name.starts_with('<') && name.ends_with('>');
        Node { name, is_virtual }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Current identity of the node on disk; virtual nodes are never present.
    pub fn file_info(&self, fs: &dyn FileSystem) -> FileInfo {
        if self.is_virtual {
            return FileInfo::Missing;
        }
        fs.file_info(&self.name)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct NodeId(usize);
impl NodeId {
    fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CommandId(usize);
impl CommandId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Default)]
pub struct Graph {
    nodes: Vec<Arc<Node>>,
    /// The command producing each node, indexed by NodeId.
    producers: Vec<Option<CommandId>>,
    commands: Vec<Arc<Command>>,
    node_to_id: FxHashMap<String, NodeId>,
    /// Prior results are keyed by command name, so names must be unique.
    command_to_id: FxHashMap<String, CommandId>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Look up a node by name, creating it if it doesn't exist yet.
    pub fn node(&mut self, name: &str) -> Arc<Node> {
        if let Some(id) = self.node_to_id.get(name) {
            return self.nodes[id.index()].clone();
        }
        let id = NodeId(self.nodes.len());
        let node = Arc::new(Node::from_name(name));
        self.nodes.push(node.clone());
        self.producers.push(None);
        self.node_to_id.insert(name.to_owned(), id);
        node
    }

    /// Look up a list of nodes by name, creating any that don't exist yet.
    pub fn nodes(&mut self, names: &[&str]) -> Vec<Arc<Node>> {
        names.iter().map(|name| self.node(name)).collect()
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_to_id.get(name).copied()
    }

    /// Register a command.  Command names are unique and each node may be
    /// produced by only one command.
    pub fn add_command(&mut self, command: Command) -> anyhow::Result<CommandId> {
        if self.command_to_id.contains_key(command.name()) {
            bail!("duplicate command {:?}", command.name());
        }
        let id = CommandId(self.commands.len());
        let mut out_ids = Vec::with_capacity(command.outputs().len());
        for out in command.outputs() {
            let out_id = match self.node_id(out.name()) {
                Some(out_id) => out_id,
                None => bail!("output {:?} of {:?} is not a graph node", out.name(), command.name()),
            };
            if let Some(other) = self.producers[out_id.index()] {
                bail!(
                    "multiple commands produce {:?}: {:?} and {:?}",
                    out.name(),
                    self.commands[other.index()].name(),
                    command.name()
                );
            }
            out_ids.push(out_id);
        }
        for out_id in out_ids {
            self.producers[out_id.index()] = Some(id);
        }
        self.command_to_id.insert(command.name().to_owned(), id);
        self.commands.push(Arc::new(command));
        Ok(id)
    }

    pub fn command(&self, id: CommandId) -> &Arc<Command> {
        &self.commands[id.index()]
    }

    /// The command that produces a node, if any.
    pub fn producer(&self, node: &Node) -> Option<CommandId> {
        self.node_id(node.name())
            .and_then(|id| self.node_producer(id))
    }

    pub fn node_producer(&self, id: NodeId) -> Option<CommandId> {
        self.producers[id.index()]
    }
}
