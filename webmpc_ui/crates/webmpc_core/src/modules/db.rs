use crate::connection::{Connection, Reopened};
use crate::store::{Store, StoreBackend};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::debug;
use webmpc_protocol::ClientCommand;

/// Store key holding the set of expanded folders.
pub const EXPANDED_KEY: &str = "db.active";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Dir,
    File,
}

/// One entry of the library tree. Directories are keyed by their path
/// prefix, files by their full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub key: String,
    pub label: String,
    pub kind: NodeKind,
    pub expanded: bool,
    pub children: Vec<Node>,
}

impl Node {
    fn dir(key: String, label: &str, expanded: bool) -> Self {
        Self {
            key,
            label: label.to_string(),
            kind: NodeKind::Dir,
            expanded,
            children: Vec::new(),
        }
    }

    fn file(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            kind: NodeKind::File,
            expanded: false,
            children: Vec::new(),
        }
    }

    fn collect_files(&self, out: &mut Vec<String>) {
        match self.kind {
            NodeKind::File => out.push(self.key.clone()),
            NodeKind::Dir => self.children.iter().for_each(|c| c.collect_files(out)),
        }
    }
}

/// Builds the folder tree from a flat, server-ordered path list.
///
/// A directory is only merged with the most recently added sibling, so the
/// listing is expected to be grouped by directory (MPD lists it that way).
pub fn build_tree(files: &[String], expanded: &BTreeMap<String, bool>) -> Vec<Node> {
    let mut root = Vec::new();

    for path in files {
        let mut parts: Vec<&str> = path.split('/').collect();
        let Some(label) = parts.pop() else { continue };

        let mut level = &mut root;
        for depth in 0..parts.len() {
            let key = parts[..=depth].join("/");
            let open = expanded.get(&key).copied().unwrap_or(false);
            level = descend(level, key, parts[depth], open);
        }
        level.push(Node::file(path, label));
    }
    root
}

fn descend<'a>(level: &'a mut Vec<Node>, key: String, label: &str, open: bool) -> &'a mut Vec<Node> {
    let reuse = level
        .last()
        .is_some_and(|n| n.kind == NodeKind::Dir && n.key == key);
    if !reuse {
        level.push(Node::dir(key, label, open));
    }
    let last = level.len() - 1;
    &mut level[last].children
}

/// True when `key` lies inside folder `dir`; `Rock` does not contain
/// `RockBand/1.mp3`.
fn is_under(key: &str, dir: &str) -> bool {
    key.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

fn find<'a>(nodes: &'a [Node], key: &str) -> Option<&'a Node> {
    nodes.iter().find_map(|n| {
        if n.key == key {
            Some(n)
        } else if is_under(key, &n.key) {
            find(&n.children, key)
        } else {
            None
        }
    })
}

fn find_dir_mut<'a>(nodes: &'a mut [Node], key: &str) -> Option<&'a mut Node> {
    for node in nodes.iter_mut() {
        if node.kind != NodeKind::Dir {
            continue;
        }
        if node.key == key {
            return Some(node);
        }
        if is_under(key, &node.key) {
            if let Some(found) = find_dir_mut(&mut node.children, key) {
                return Some(found);
            }
        }
    }
    None
}

fn collect_expanded(nodes: &[Node], out: &mut BTreeMap<String, bool>) {
    for node in nodes.iter().filter(|n| n.kind == NodeKind::Dir) {
        if node.expanded {
            out.insert(node.key.clone(), true);
        }
        collect_expanded(&node.children, out);
    }
}

/// Library browser state: the latest `Files` snapshot rendered as a tree,
/// with folder expansion persisted in the store.
pub struct DbView<B> {
    connection: Connection,
    updates: mpsc::UnboundedReceiver<Vec<String>>,
    reopened: Reopened,
    store: Store<B>,
    files: Vec<String>,
    tree: Vec<Node>,
}

impl<B: StoreBackend> DbView<B> {
    pub fn new(connection: &Connection, store: Store<B>) -> Self {
        let updates = connection.stream::<Vec<String>>();
        let reopened = connection.reopened();
        connection.send(ClientCommand::GetFiles);
        Self {
            connection: connection.clone(),
            updates,
            reopened,
            store,
            files: Vec::new(),
            tree: Vec::new(),
        }
    }

    /// Waits for the next listing and applies it, asking for a fresh one
    /// whenever the socket is reopened. Returns false once the connection
    /// is gone.
    pub async fn recv(&mut self) -> bool {
        loop {
            tokio::select! {
                files = self.updates.recv() => {
                    let Some(files) = files else { return false };
                    self.update(files);
                    return true;
                }
                Some(session) = self.reopened.next() => {
                    debug!(session, "socket reopened; refreshing library");
                    self.connection.send(ClientCommand::GetFiles);
                }
            }
        }
    }

    pub fn update(&mut self, files: Vec<String>) {
        let expanded = self.store.get(EXPANDED_KEY, BTreeMap::new());
        self.tree = build_tree(&files, &expanded);
        self.files = files;
        debug!(files = self.files.len(), "library rebuilt");
    }

    /// Flips a folder open or closed and persists every open folder.
    /// Returns the new state, or `None` if `key` is not a folder.
    pub fn toggle(&mut self, key: &str) -> Option<bool> {
        let node = find_dir_mut(&mut self.tree, key)?;
        node.expanded = !node.expanded;
        let now = node.expanded;

        let mut open = BTreeMap::new();
        collect_expanded(&self.tree, &mut open);
        self.store.set(EXPANDED_KEY, &open);
        Some(now)
    }

    /// Appends a single file to the play queue.
    pub fn activate(&self, key: &str) -> bool {
        match find(&self.tree, key) {
            Some(node) if node.kind == NodeKind::File => {
                self.connection.send(ClientCommand::Add {
                    uri: node.key.clone(),
                });
                true
            }
            _ => false,
        }
    }

    /// Every file at or below `key`, in listing order.
    pub fn uris_under(&self, key: &str) -> Vec<String> {
        let mut uris = Vec::new();
        if let Some(node) = find(&self.tree, key) {
            node.collect_files(&mut uris);
        }
        uris
    }

    /// Nodes a user would currently see, with their depth.
    pub fn visible(&self) -> Vec<(usize, &Node)> {
        fn walk<'a>(nodes: &'a [Node], depth: usize, out: &mut Vec<(usize, &'a Node)>) {
            for node in nodes {
                out.push((depth, node));
                if node.expanded {
                    walk(&node.children, depth + 1, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.tree, 0, &mut out);
        out
    }

    pub fn tree(&self) -> &[Node] {
        &self.tree
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn store(&self) -> &Store<B> {
        &self.store
    }
}
