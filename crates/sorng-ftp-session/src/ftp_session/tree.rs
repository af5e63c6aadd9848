//! Client-side mirror of the remote directory tree.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. The root
//! (`/`) is always [`ROOT`] and is its own parent. Ids of removed nodes are
//! recycled, so an id must not be kept across a removal of its node.

use crate::ftp_session::error::{SessionError, SessionResult};
use crate::ftp_session::paths;
use crate::ftp_session::types::RemoteEntry;

pub type NodeId = usize;

/// Id of the root node.
pub const ROOT: NodeId = 0;

/// One remote file or directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    name: String,
    is_dir: bool,
    needs_refresh: bool,
    data: Option<u64>,
    children: Vec<NodeId>,
    parent: NodeId,
}

impl FileNode {
    fn new(name: &str, is_dir: bool, parent: NodeId) -> Self {
        Self {
            name: name.to_string(),
            is_dir,
            needs_refresh: true,
            data: None,
            children: Vec::new(),
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// The directory has never been listed, or its listing is stale.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Opaque handle the UI attached to this node.
    pub fn data(&self) -> Option<u64> {
        self.data
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }
}

#[derive(Debug, Clone)]
pub struct FileTree {
    nodes: Vec<Option<FileNode>>,
    free: Vec<NodeId>,
}

impl Default for FileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTree {
    /// A tree holding only the root directory.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(FileNode::new("/", true, ROOT))],
            free: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn get(&self, id: NodeId) -> Option<&FileNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut FileNode> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }

    fn node(&self, id: NodeId) -> SessionResult<&FileNode> {
        self.get(id)
            .ok_or_else(|| SessionError::invalid_argument(format!("No tree node {}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> SessionResult<&mut FileNode> {
        self.get_mut(id)
            .ok_or_else(|| SessionError::invalid_argument(format!("No tree node {}", id)))
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.get(id).map_or(0, |n| n.children.len())
    }

    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.get(c).map_or(false, |n| n.name == name))
    }

    /// Absolute path of a node.
    pub fn path(&self, id: NodeId) -> Option<String> {
        let mut names = Vec::new();
        let mut cur = id;
        while cur != ROOT {
            let node = self.get(cur)?;
            names.push(node.name.as_str());
            cur = node.parent;
        }
        names.reverse();
        Some(format!("/{}", names.join("/")))
    }

    fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            if id == ROOT {
                return false;
            }
            match self.get(id) {
                Some(n) => id = n.parent,
                None => return false,
            }
        }
    }

    fn alloc(&mut self, node: FileNode) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// Add a child, or return the existing one with the same name.
    pub fn add_child(&mut self, parent: NodeId, name: &str, is_dir: bool) -> SessionResult<NodeId> {
        self.node(parent)?;
        if !is_segment(name) {
            return Err(SessionError::invalid_argument(format!(
                "Invalid node name '{}'",
                name
            )));
        }
        if let Some(existing) = self.child_by_name(parent, name) {
            self.node_mut(existing)?.is_dir = is_dir;
            return Ok(existing);
        }
        let id = self.alloc(FileNode::new(name, is_dir, parent));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Remove a node and its whole subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == ROOT {
            return false;
        }
        let parent = match self.get(id) {
            Some(n) => n.parent,
            None => return false,
        };
        if let Some(p) = self.get_mut(parent) {
            p.children.retain(|&c| c != id);
        }
        self.release(id);
        true
    }

    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(cur).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(cur);
            }
        }
    }

    /// Move a node under `new_parent` with `new_name`. A sibling already
    /// carrying that name is replaced.
    pub fn rename(&mut self, id: NodeId, new_parent: NodeId, new_name: &str) -> SessionResult<()> {
        if id == ROOT {
            return Err(SessionError::invalid_argument("The root cannot be renamed"));
        }
        if new_name.is_empty() || new_name.contains('/') {
            return Err(SessionError::invalid_argument(format!(
                "Invalid node name '{}'",
                new_name
            )));
        }
        self.node(new_parent)?;
        if self.is_ancestor(id, new_parent) {
            return Err(SessionError::invalid_argument(
                "Cannot move a directory into itself",
            ));
        }
        let old_parent = self.node(id)?.parent;
        if let Some(clash) = self.child_by_name(new_parent, new_name) {
            if clash != id {
                self.remove(clash);
            }
        }
        if old_parent != new_parent {
            self.node_mut(old_parent)?.children.retain(|&c| c != id);
            self.node_mut(new_parent)?.children.push(id);
        }
        let node = self.node_mut(id)?;
        node.parent = new_parent;
        node.name = new_name.to_string();
        Ok(())
    }

    pub fn set_refresh(&mut self, id: NodeId, needs_refresh: bool) {
        if let Some(n) = self.get_mut(id) {
            n.needs_refresh = needs_refresh;
        }
    }

    /// Attach (or clear) the UI handle of a node.
    pub fn set_data(&mut self, id: NodeId, data: Option<u64>) {
        if let Some(n) = self.get_mut(id) {
            n.data = data;
        }
    }

    pub fn data(&self, id: NodeId) -> Option<u64> {
        self.get(id).and_then(|n| n.data)
    }

    /// Resolve a path against the known tree. Fails as soon as a node on
    /// the way has no children or none of them matches.
    pub fn find_path(&self, path: &str) -> Option<NodeId> {
        let mut cur = ROOT;
        for seg in paths::segments(path) {
            if self.child_count(cur) == 0 {
                return None;
            }
            cur = self.child_by_name(cur, seg)?;
        }
        Some(cur)
    }

    /// Resolve a directory path, creating missing directories on the way.
    pub fn ensure_path(&mut self, path: &str) -> SessionResult<NodeId> {
        let mut cur = ROOT;
        for seg in paths::segments(path) {
            cur = match self.child_by_name(cur, seg) {
                Some(existing) => existing,
                None => self.add_child(cur, seg, true)?,
            };
        }
        Ok(cur)
    }

    /// Hang the chain of directories leading to `dir` under the root.
    ///
    /// Existing nodes are reused. The root and every ancestor are marked as
    /// listed; a newly created leaf still needs a refresh.
    pub fn graft_path(&mut self, dir: &str) -> SessionResult<NodeId> {
        self.set_refresh(ROOT, false);
        let segs: Vec<&str> = paths::segments(dir).collect();
        let mut cur = ROOT;
        for (i, seg) in segs.iter().enumerate() {
            let leaf = i + 1 == segs.len();
            cur = match self.child_by_name(cur, seg) {
                Some(existing) => existing,
                None => self.add_child(cur, seg, true)?,
            };
            if !leaf {
                self.set_refresh(cur, false);
            }
        }
        Ok(cur)
    }

    /// Directories that must be listed before `path` so that the tree can
    /// show it.
    ///
    /// Known children carrying UI data are descended without a fetch. A
    /// segment missing from a directory that already has children means
    /// the path does not exist. The returned list never contains `path`
    /// itself.
    pub fn prefetch_ancestors(&self, path: &str) -> SessionResult<Vec<String>> {
        let mut current = String::from("/");
        let mut node = Some(ROOT);
        let mut parents: Vec<String> = Vec::new();

        for seg in paths::segments(path) {
            if let Some(id) = node {
                let child_count = self.child_count(id);
                node = self.child_by_name(id, seg);
                match node {
                    Some(child) if self.data(child).is_some() => {
                        current = paths::join(&current, seg);
                        continue;
                    }
                    None if child_count > 0 => {
                        return Err(SessionError::path_not_found(&paths::normalize(path)));
                    }
                    _ => {}
                }
            }
            if parents.is_empty() {
                parents.push(current.clone());
            }
            current = paths::join(&current, seg);
            parents.push(current.clone());
        }

        parents.pop();
        Ok(parents)
    }

    /// Replace the children of `dir` with a fresh listing.
    ///
    /// Nodes whose names survive keep their id and UI data; vanished ones
    /// are removed with their subtree. Children follow listing order and
    /// the directory is marked as refreshed.
    pub fn merge_listing(&mut self, dir: NodeId, entries: &[RemoteEntry]) -> SessionResult<()> {
        let old = self.node(dir)?.children.clone();
        let mut kept: Vec<NodeId> = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            if !is_segment(&entry.name) {
                log::debug!("Skipping listing entry with invalid name '{}'", entry.name);
                continue;
            }
            let already = kept
                .iter()
                .any(|&k| self.get(k).map_or(false, |n| n.name == entry.name));
            if already {
                continue;
            }
            let existing = old
                .iter()
                .copied()
                .find(|&c| self.get(c).map_or(false, |n| n.name == entry.name));
            let id = match existing {
                Some(id) => {
                    self.node_mut(id)?.is_dir = entry.is_dir();
                    id
                }
                None => self.alloc(FileNode::new(&entry.name, entry.is_dir(), dir)),
            };
            kept.push(id);
        }

        for id in old {
            if !kept.contains(&id) {
                self.release(id);
            }
        }

        let node = self.node_mut(dir)?;
        node.children = kept;
        node.needs_refresh = false;
        Ok(())
    }
}

/// A node name is exactly one non-empty path segment.
fn is_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}
