//! Simple in-memory provider.
//!
//! This implementation has state, so if you create a
//! new instance for every request, it will be empty every time.
//!
//! Create the instance once, using `MemFs::new`, and hand a clone of it
//! to each mount that should share it. As a MemFs struct is just a
//! handle, cloning is cheap.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::future::FutureExt;
use http::StatusCode;
use parking_lot::Mutex;

use crate::davpath::DavPath;
use crate::fs::*;
use crate::tree::Tree;

/// Ephemeral in-memory provider.
#[derive(Debug, Clone)]
pub struct MemFs {
    tree: Arc<Mutex<Tree<MemFsNode>>>,
}

#[derive(Debug, Clone)]
enum MemFsNode {
    Dir(MemFsDirNode),
    File(MemFsFileNode),
}

#[derive(Debug, Clone)]
struct MemFsDirNode {
    props: HashMap<PropIdentity, String>,
    mtime: SystemTime,
    crtime: SystemTime,
}

#[derive(Debug, Clone)]
struct MemFsFileNode {
    props: HashMap<PropIdentity, String>,
    mtime: SystemTime,
    crtime: SystemTime,
    data: Bytes,
}

#[derive(Debug, Clone)]
struct MemFsDirEntry {
    mtime: SystemTime,
    crtime: SystemTime,
    is_dir: bool,
    name: String,
    size: u64,
}

impl MemFs {
    /// Create a new "memfs" provider.
    pub fn new() -> Box<MemFs> {
        let root = MemFsNode::new_dir();
        Box::new(MemFs {
            tree: Arc::new(Mutex::new(Tree::new(root))),
        })
    }
}

// pop the last segment off the path, do a lookup, then
// check if the result is a directory.
fn lookup_parent(tree: &Tree<MemFsNode>, path: &DavPath) -> FsResult<u64> {
    let node_id = tree.lookup_parent(path.segments())?;
    if !tree.get_node(node_id)?.is_dir() {
        return Err(FsError::Forbidden);
    }
    Ok(node_id)
}

fn touch(tree: &mut Tree<MemFsNode>, node_id: u64) -> FsResult<()> {
    tree.get_node_mut(node_id)?.update_mtime(SystemTime::now());
    Ok(())
}

impl DavProvider for MemFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        async move {
            let tree = self.tree.lock();
            let node_id = tree.lookup(path.segments())?;
            let meta = tree.get_node(node_id)?.as_dirent(path.name());
            Ok(Box::new(meta) as Box<dyn DavMetaData>)
        }
        .boxed()
    }

    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<Box<dyn DavDirEntry>>> {
        async move {
            let tree = self.tree.lock();
            let node_id = tree.lookup(path.segments())?;
            if !tree.get_node(node_id)?.is_dir() {
                return Err(FsError::Forbidden);
            }
            let mut v: Vec<Box<dyn DavDirEntry>> = Vec::new();
            for (name, dnode_id) in tree.get_children(node_id)? {
                if let Ok(node) = tree.get_node(dnode_id) {
                    v.push(Box::new(node.as_dirent(&name)));
                }
            }
            Ok(v)
        }
        .boxed()
    }

    fn read<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Bytes> {
        async move {
            let tree = self.tree.lock();
            let node_id = tree.lookup(path.segments())?;
            Ok(tree.get_node(node_id)?.as_file()?.data.clone())
        }
        .boxed()
    }

    fn write<'a>(&'a self, path: &'a DavPath, data: Bytes) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: write {} ({} bytes)", path, data.len());
            let mut tree = self.tree.lock();
            match tree.lookup(path.segments()) {
                Ok(node_id) => {
                    let file = tree.get_node_mut(node_id)?.as_file_mut()?;
                    file.data = data;
                    file.mtime = SystemTime::now();
                },
                Err(FsError::NotFound) => {
                    let parent_id = lookup_parent(&tree, path)?;
                    tree.add_child(parent_id, path.name(), MemFsNode::new_file(data), false)?;
                    touch(&mut tree, parent_id)?;
                },
                Err(e) => return Err(e),
            }
            Ok(())
        }
        .boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_dir {}", path);
            let mut tree = self.tree.lock();
            if tree.lookup(path.segments()).is_ok() {
                return Err(FsError::Exists);
            }
            let parent_id = lookup_parent(&tree, path)?;
            tree.add_child(parent_id, path.name(), MemFsNode::new_dir(), false)?;
            touch(&mut tree, parent_id)
        }
        .boxed()
    }

    fn remove<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove {}", path);
            let mut tree = self.tree.lock();
            let parent_id = lookup_parent(&tree, path)?;
            let node_id = tree.lookup(path.segments())?;
            tree.delete_subtree(node_id)?;
            touch(&mut tree, parent_id)
        }
        .boxed()
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: rename {} {}", from, to);
            let mut tree = self.tree.lock();
            let parent_id = lookup_parent(&tree, from)?;
            let node_id = tree.lookup(from.segments())?;
            let dst_id = lookup_parent(&tree, to)?;
            tree.move_node(node_id, dst_id, to.name(), true)?;
            touch(&mut tree, parent_id)?;
            touch(&mut tree, dst_id)
        }
        .boxed()
    }

    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: copy {} {}", from, to);
            let mut tree = self.tree.lock();

            // source must exist.
            let snode_id = tree.lookup(from.segments())?;
            let dst_id = lookup_parent(&tree, to)?;

            // a collection is copied without its members.
            let mut data = tree.get_node(snode_id)?.clone();
            match data {
                MemFsNode::Dir(ref mut d) => d.crtime = SystemTime::now(),
                MemFsNode::File(ref mut f) => f.crtime = SystemTime::now(),
            }
            tree.add_child(dst_id, to.name(), data, true)?;
            touch(&mut tree, dst_id)
        }
        .boxed()
    }

    fn get_props<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<DavProp>> {
        async move {
            let tree = self.tree.lock();
            let node_id = tree.lookup(path.segments())?;
            let mut res: Vec<DavProp> = tree
                .get_node(node_id)?
                .get_props()
                .iter()
                .map(|(id, value)| DavProp {
                    identity: id.clone(),
                    value: Some(value.clone()),
                })
                .collect();
            res.sort_by(|a, b| a.identity.cmp(&b.identity));
            Ok(res)
        }
        .boxed()
    }

    fn patch_props<'a>(
        &'a self,
        path: &'a DavPath,
        patch: Vec<(bool, DavProp)>,
    ) -> FsFuture<'a, Vec<(StatusCode, DavProp)>> {
        async move {
            let mut tree = self.tree.lock();
            let node_id = tree.lookup(path.segments())?;
            let props = tree.get_node_mut(node_id)?.get_props_mut();

            let mut res = Vec::new();
            for (set, p) in patch {
                // live properties are computed, never stored.
                if p.identity.is_dav() {
                    res.push((StatusCode::FORBIDDEN, p));
                    continue;
                }
                if set {
                    props.insert(p.identity.clone(), p.value.clone().unwrap_or_default());
                } else {
                    // removing a property that does not exist is not an error.
                    props.remove(&p.identity);
                }
                res.push((StatusCode::OK, p));
            }
            Ok(res)
        }
        .boxed()
    }
}

impl DavDirEntry for MemFsDirEntry {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn metadata(&self) -> FsResult<Box<dyn DavMetaData>> {
        Ok(Box::new(self.clone()))
    }

    fn is_dir(&self) -> FsResult<bool> {
        Ok(self.is_dir)
    }
}

impl DavMetaData for MemFsDirEntry {
    fn len(&self) -> u64 {
        self.size
    }

    fn created(&self) -> FsResult<SystemTime> {
        Ok(self.crtime)
    }

    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.mtime)
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

impl MemFsNode {
    fn new_dir() -> MemFsNode {
        MemFsNode::Dir(MemFsDirNode {
            crtime: SystemTime::now(),
            mtime: SystemTime::now(),
            props: HashMap::new(),
        })
    }

    fn new_file(data: Bytes) -> MemFsNode {
        MemFsNode::File(MemFsFileNode {
            crtime: SystemTime::now(),
            mtime: SystemTime::now(),
            props: HashMap::new(),
            data,
        })
    }

    // helper to create MemFsDirEntry from a node.
    fn as_dirent(&self, name: &str) -> MemFsDirEntry {
        let (is_dir, size, mtime, crtime) = match self {
            MemFsNode::File(file) => (false, file.data.len() as u64, file.mtime, file.crtime),
            MemFsNode::Dir(dir) => (true, 0, dir.mtime, dir.crtime),
        };
        MemFsDirEntry {
            name: name.to_string(),
            mtime,
            crtime,
            is_dir,
            size,
        }
    }

    fn update_mtime(&mut self, tm: SystemTime) {
        match self {
            MemFsNode::Dir(d) => d.mtime = tm,
            MemFsNode::File(f) => f.mtime = tm,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, MemFsNode::Dir(_))
    }

    fn as_file(&self) -> FsResult<&MemFsFileNode> {
        match self {
            MemFsNode::File(n) => Ok(n),
            _ => Err(FsError::Forbidden),
        }
    }

    fn as_file_mut(&mut self) -> FsResult<&mut MemFsFileNode> {
        match self {
            MemFsNode::File(n) => Ok(n),
            _ => Err(FsError::Forbidden),
        }
    }

    fn get_props(&self) -> &HashMap<PropIdentity, String> {
        match self {
            MemFsNode::File(n) => &n.props,
            MemFsNode::Dir(d) => &d.props,
        }
    }

    fn get_props_mut(&mut self) -> &mut HashMap<PropIdentity, String> {
        match self {
            MemFsNode::File(n) => &mut n.props,
            MemFsNode::Dir(d) => &mut d.props,
        }
    }
}
