//! A tree keyed by path segments. Used by the in-memory lock table and
//! the in-memory provider.
use std::collections::HashMap;

use crate::fs::{FsError, FsResult};

/// id of the root node of the tree.
pub(crate) const ROOT_ID: u64 = 1;

#[derive(Debug)]
/// A tree contains a bunch of nodes.
pub(crate) struct Tree<D> {
    nodes: HashMap<u64, Node<D>>,
    next_id: u64,
}

#[derive(Debug)]
struct Node<D> {
    data: D,
    parent_id: u64,
    children: HashMap<String, u64>,
}

impl<D> Tree<D> {
    /// Get new tree and initialize the root with 'data'.
    pub fn new(data: D) -> Tree<D> {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_ID,
            Node {
                data,
                parent_id: 0,
                children: HashMap::new(),
            },
        );
        Tree {
            nodes,
            next_id: ROOT_ID + 1,
        }
    }

    /// Add a child node to an existing node. With `overwrite`, an
    /// existing child of the same name (and its subtree) is replaced.
    pub fn add_child(&mut self, parent: u64, key: &str, data: D, overwrite: bool) -> FsResult<u64> {
        let existing = {
            let pnode = self.nodes.get(&parent).ok_or(FsError::NotFound)?;
            pnode.children.get(key).copied()
        };
        if let Some(old) = existing {
            if !overwrite {
                return Err(FsError::Exists);
            }
            self.delete_subtree(old)?;
        }
        Ok(self.insert_node(parent, key, data))
    }

    fn insert_node(&mut self, parent: u64, key: &str, data: D) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                data,
                parent_id: parent,
                children: HashMap::new(),
            },
        );
        if let Some(pnode) = self.nodes.get_mut(&parent) {
            pnode.children.insert(key.to_string(), id);
        }
        id
    }

    /// Get a child node by name.
    pub fn get_child(&self, parent: u64, key: &str) -> FsResult<u64> {
        let pnode = self.nodes.get(&parent).ok_or(FsError::NotFound)?;
        pnode.children.get(key).copied().ok_or(FsError::NotFound)
    }

    /// Get all children of this node, sorted by name.
    pub fn get_children(&self, parent: u64) -> FsResult<Vec<(String, u64)>> {
        let pnode = self.nodes.get(&parent).ok_or(FsError::NotFound)?;
        let mut v: Vec<(String, u64)> = pnode.children.iter().map(|(k, i)| (k.clone(), *i)).collect();
        v.sort();
        Ok(v)
    }

    /// Get reference to a node.
    pub fn get_node(&self, id: u64) -> FsResult<&D> {
        self.nodes.get(&id).map(|n| &n.data).ok_or(FsError::NotFound)
    }

    /// Get mutable reference to a node.
    pub fn get_node_mut(&mut self, id: u64) -> FsResult<&mut D> {
        self.nodes.get_mut(&id).map(|n| &mut n.data).ok_or(FsError::NotFound)
    }

    /// Parent of a node. The root has none.
    pub fn parent_of(&self, id: u64) -> Option<u64> {
        if id == ROOT_ID {
            return None;
        }
        self.nodes.get(&id).map(|n| n.parent_id)
    }

    /// Find the node for a list of segments.
    pub fn lookup(&self, segs: &[String]) -> FsResult<u64> {
        let mut node_id = ROOT_ID;
        for seg in segs {
            node_id = self.get_child(node_id, seg)?;
        }
        Ok(node_id)
    }

    /// Find the parent node for a list of segments.
    pub fn lookup_parent(&self, segs: &[String]) -> FsResult<u64> {
        match segs.split_last() {
            Some((_, rest)) => self.lookup(rest),
            None => Err(FsError::Forbidden),
        }
    }

    /// Walk from the root along `segs` for as long as nodes exist.
    /// Returns the ids visited, root first.
    pub fn walk(&self, segs: &[String]) -> Vec<u64> {
        let mut ids = vec![ROOT_ID];
        let mut node_id = ROOT_ID;
        for seg in segs {
            match self.get_child(node_id, seg) {
                Ok(id) => {
                    ids.push(id);
                    node_id = id;
                }
                Err(_) => break,
            }
        }
        ids
    }

    /// Find or create the node for `segs`.
    pub fn get_or_create(&mut self, segs: &[String], mk: impl Fn() -> D) -> u64 {
        let mut node_id = ROOT_ID;
        for seg in segs {
            node_id = match self.get_child(node_id, seg) {
                Ok(n) => n,
                Err(_) => self.insert_node(node_id, seg, mk()),
            };
        }
        node_id
    }

    /// This node and all nodes below it.
    pub fn subtree(&self, id: u64) -> Vec<u64> {
        let mut ids = Vec::new();
        let mut todo = vec![id];
        while let Some(id) = todo.pop() {
            if let Some(n) = self.nodes.get(&id) {
                ids.push(id);
                todo.extend(n.children.values().copied());
            }
        }
        ids
    }

    fn detach(&mut self, id: u64) -> FsResult<()> {
        let parent_id = self.parent_of(id).ok_or(FsError::Forbidden)?;
        let pnode = self.nodes.get_mut(&parent_id).ok_or(FsError::NotFound)?;
        pnode.children.retain(|_, v| *v != id);
        Ok(())
    }

    /// Delete a node. Fails if node has children. Returns its data.
    pub fn delete_node(&mut self, id: u64) -> FsResult<D> {
        let n = self.nodes.get(&id).ok_or(FsError::NotFound)?;
        if !n.children.is_empty() {
            return Err(FsError::Forbidden);
        }
        self.detach(id)?;
        self.nodes.remove(&id).map(|n| n.data).ok_or(FsError::NotFound)
    }

    /// Delete a node and everything below it.
    pub fn delete_subtree(&mut self, id: u64) -> FsResult<()> {
        self.detach(id)?;
        for id in self.subtree(id) {
            self.nodes.remove(&id);
        }
        Ok(())
    }

    /// Move a node to a new position and new name in the tree.
    /// If "overwrite" is true, an existing node (and its subtree)
    /// at the destination is replaced.
    pub fn move_node(&mut self, id: u64, new_parent: u64, new_name: &str, overwrite: bool) -> FsResult<()> {
        if self.subtree(id).contains(&new_parent) {
            return Err(FsError::Forbidden);
        }
        let dest = self.get_child(new_parent, new_name).ok();
        if let Some(dest) = dest {
            if dest == id {
                return Ok(());
            }
            if !overwrite {
                return Err(FsError::Exists);
            }
            if self.subtree(dest).contains(&id) {
                return Err(FsError::Forbidden);
            }
            self.delete_subtree(dest)?;
        }
        self.detach(id)?;
        if let Some(n) = self.nodes.get_mut(&id) {
            n.parent_id = new_parent;
        }
        let pnode = self.nodes.get_mut(&new_parent).ok_or(FsError::NotFound)?;
        pnode.children.insert(new_name.to_string(), id);
        Ok(())
    }
}
