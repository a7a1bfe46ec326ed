//! Simple in-memory locksystem.
//!
//! This implementation has state - if you create a
//! new instance in a handler(), it will be empty every time.
//!
//! This means you have to create the instance once, using `MemLs::new`, store
//! it in your handler struct, and clone() it every time you pass
//! it to the Distributor. As a MemLs struct is just a handle, cloning is cheap.
//!
//! Expired locks are dropped lazily, whenever a lookup passes them.
//! `MemLs::sweep` drops all of them at once.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::davpath::DavPath;
use crate::davtime::DavTime;
use crate::ls::*;
use crate::tree;
use crate::util::Depth;

type Tree = tree::Tree<Vec<DavLock>>;

/// Ephemeral in-memory LockSystem.
#[derive(Debug, Clone)]
pub struct MemLs(Arc<Mutex<MemLsInner>>);

#[derive(Debug)]
struct MemLsInner {
    tree: Tree,
    // token -> node id
    tokens: HashMap<String, u64>,
}

impl MemLs {
    /// Create a new "memls" locksystem.
    pub fn new() -> Box<MemLs> {
        let inner = MemLsInner {
            tree: Tree::new(Vec::new()),
            tokens: HashMap::new(),
        };
        Box::new(MemLs(Arc::new(Mutex::new(inner))))
    }

    /// Drop all expired locks. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let inner = &mut *self.0.lock();
        let now = DavTime::now();
        let mut count = 0;
        for node_id in inner.tree.subtree(tree::ROOT_ID) {
            count += inner.purge(node_id, now);
        }
        let nodes = inner.tree.subtree(tree::ROOT_ID);
        for node_id in nodes {
            inner.compact(node_id);
        }
        debug!("sweep: {} expired locks dropped", count);
        count
    }
}

impl MemLsInner {
    // Drop the expired locks of one node.
    fn purge(&mut self, node_id: u64, now: DavTime) -> usize {
        let Ok(locks) = self.tree.get_node_mut(node_id) else {
            return 0;
        };
        let mut expired = Vec::new();
        locks.retain(|l| {
            if l.is_expired(now) {
                expired.push(l.token.clone());
                false
            } else {
                true
            }
        });
        let emptied = locks.is_empty();
        for token in &expired {
            trace!("lock {} expired", token);
            self.tokens.remove(token);
        }
        if emptied && !expired.is_empty() {
            self.compact(node_id);
        }
        expired.len()
    }

    // Remove empty leaf nodes, from node_id up towards the root.
    fn compact(&mut self, mut node_id: u64) {
        while let Some(parent_id) = self.tree.parent_of(node_id) {
            let empty = self.tree.get_node(node_id).map(|l| l.is_empty()).unwrap_or(false);
            if !empty || self.tree.delete_node(node_id).is_err() {
                break;
            }
            node_id = parent_id;
        }
    }

    // Live locks on the nodes from the root down to `path`.
    fn locks_to_path(&mut self, path: &DavPath, now: DavTime) -> Vec<DavLock> {
        let ids = self.tree.walk(path.segments());
        let mut locks = Vec::new();
        for id in ids {
            self.purge(id, now);
            if let Ok(node) = self.tree.get_node(id) {
                locks.extend(node.iter().filter(|l| l.covers(path)).cloned());
            }
        }
        locks
    }

    // Live locks strictly below `path`, at most `depth` away.
    fn locks_from_path(&mut self, path: &DavPath, depth: Depth, now: DavTime) -> Vec<DavLock> {
        let node_id = match self.tree.lookup(path.segments()) {
            Ok(id) => id,
            Err(_) => return Vec::new(),
        };
        let mut locks = Vec::new();
        for id in self.tree.subtree(node_id) {
            if id == node_id {
                continue;
            }
            self.purge(id, now);
            if let Ok(node) = self.tree.get_node(id) {
                locks.extend(
                    node.iter()
                        .filter(|l| depth_covers(path, depth, &l.path))
                        .cloned(),
                );
            }
        }
        locks
    }

    // Find a live lock by token.
    fn lookup_lock(&mut self, token: &str, now: DavTime) -> Option<(u64, usize)> {
        let node_id = *self.tokens.get(token)?;
        self.purge(node_id, now);
        let idx = self.tree.get_node(node_id).ok()?.iter().position(|l| l.token == token);
        if idx.is_none() {
            trace!("lookup_lock: {} gone", token);
            self.compact(node_id);
        }
        Some((node_id, idx?))
    }
}

impl DavLockSystem for MemLs {
    fn acquire(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        owner: &str,
        timeout: Duration,
        scope: LockScope,
        depth: Depth,
    ) -> Result<DavLock, DavLock> {
        let inner = &mut *self.0.lock();
        let now = DavTime::now();

        // any locks at or above the path?
        let rc = inner
            .locks_to_path(path, now)
            .into_iter()
            .find(|l| !l.compatible_with(scope));
        trace!("acquire: locks_to_path: {:?}", rc);
        if let Some(conflict) = rc {
            return Err(conflict);
        }

        // if it's a deep lock we need to check if there are locks further along the path.
        if depth != Depth::Zero {
            let rc = inner
                .locks_from_path(path, depth, now)
                .into_iter()
                .find(|l| !l.compatible_with(scope));
            trace!("acquire: locks_from_path: {:?}", rc);
            if let Some(conflict) = rc {
                return Err(conflict);
            }
        }

        // create lock.
        let node_id = inner.tree.get_or_create(path.segments(), Vec::new);
        let lock = DavLock {
            token: format!("opaquelocktoken:{}", Uuid::new_v4().hyphenated()),
            path: path.clone(),
            principal: principal.map(|s| s.to_string()),
            owner: owner.to_string(),
            timeout_at: now.after(timeout),
            timeout,
            scope,
            depth,
        };
        debug!("lock {} created on {}", &lock.token, path);
        if let Ok(node) = inner.tree.get_node_mut(node_id) {
            node.push(lock.clone());
        }
        inner.tokens.insert(lock.token.clone(), node_id);
        Ok(lock)
    }

    fn refresh(&self, token: &str, timeout: Duration) -> Result<DavLock, ()> {
        trace!("refresh lock {}", token);
        let inner = &mut *self.0.lock();
        let now = DavTime::now();
        let (node_id, idx) = inner.lookup_lock(token, now).ok_or(())?;
        let node = inner.tree.get_node_mut(node_id).map_err(|_| ())?;
        let lock = &mut node[idx];
        lock.timeout = timeout;
        lock.timeout_at = now.after(timeout);
        Ok(lock.clone())
    }

    fn release(&self, token: &str) -> Result<(), ()> {
        let inner = &mut *self.0.lock();
        let now = DavTime::now();
        let (node_id, idx) = match inner.lookup_lock(token, now) {
            Some(n) => n,
            None => {
                trace!("release: {} not found", token);
                return Err(());
            }
        };
        if let Ok(node) = inner.tree.get_node_mut(node_id) {
            node.remove(idx);
        }
        inner.tokens.remove(token);
        inner.compact(node_id);
        debug!("lock {} released", token);
        Ok(())
    }

    fn check_write_allowed(&self, path: &DavPath, submitted_tokens: &[String], deep: bool) -> Result<(), DavLock> {
        let inner = &mut *self.0.lock();
        let now = DavTime::now();
        let held = |l: &DavLock| submitted_tokens.iter().any(|t| t == &l.token);

        let mut holds_lock = false;
        let mut first_shared: Option<DavLock> = None;
        for lock in inner.locks_to_path(path, now) {
            if held(&lock) {
                // fine, we hold this lock.
                holds_lock = true;
            } else if !lock.is_shared() {
                // exclusive locks are fatal.
                trace!("check: {} locked by {}", path, lock.token);
                return Err(lock);
            } else if first_shared.is_none() {
                first_shared = Some(lock);
            }
        }
        if !holds_lock {
            if let Some(lock) = first_shared {
                trace!("check: {} share-locked by {}", path, lock.token);
                return Err(lock);
            }
        }

        if deep {
            if let Some(lock) = inner
                .locks_from_path(path, Depth::Infinity, now)
                .into_iter()
                .find(|l| !held(l))
            {
                trace!("check: {} has locked member {}", path, lock.path);
                return Err(lock);
            }
        }
        Ok(())
    }

    fn discover(&self, path: &DavPath) -> Vec<DavLock> {
        let inner = &mut *self.0.lock();
        inner.locks_to_path(path, DavTime::now())
    }

    fn delete(&self, path: &DavPath) {
        let inner = &mut *self.0.lock();
        let node_id = match inner.tree.lookup(path.segments()) {
            Ok(id) => id,
            Err(_) => return,
        };
        for id in inner.tree.subtree(node_id) {
            if let Ok(node) = inner.tree.get_node_mut(id) {
                let tokens: Vec<String> = node.drain(..).map(|l| l.token).collect();
                for token in tokens {
                    inner.tokens.remove(&token);
                }
            }
        }
        if node_id == tree::ROOT_ID {
            if let Ok(children) = inner.tree.get_children(node_id) {
                for (_, id) in children {
                    inner.tree.delete_subtree(id).ok();
                }
            }
        } else {
            let parent_id = inner.tree.parent_of(node_id);
            inner.tree.delete_subtree(node_id).ok();
            if let Some(parent_id) = parent_id {
                inner.compact(parent_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn p(s: &str) -> DavPath {
        DavPath::new(s).unwrap()
    }

    fn lock(ls: &MemLs, path: &str, scope: LockScope, depth: Depth) -> Result<DavLock, DavLock> {
        ls.acquire(&p(path), Some("alice"), "alice", MINUTE, scope, depth)
    }

    #[test]
    fn test_exclusive_conflicts() {
        let ls = MemLs::new();
        let l = lock(&ls, "/a", LockScope::Exclusive, Depth::Zero).unwrap();
        assert!(l.token.starts_with("opaquelocktoken:"));
        let err = lock(&ls, "/a", LockScope::Shared, Depth::Zero).unwrap_err();
        assert_eq!(err.token, l.token);
        assert!(lock(&ls, "/a", LockScope::Exclusive, Depth::Zero).is_err());
        assert!(lock(&ls, "/b", LockScope::Exclusive, Depth::Zero).is_ok());
    }

    #[test]
    fn test_shared_compose() {
        let ls = MemLs::new();
        lock(&ls, "/a", LockScope::Shared, Depth::Zero).unwrap();
        lock(&ls, "/a", LockScope::Shared, Depth::Infinity).unwrap();
        assert!(lock(&ls, "/a", LockScope::Exclusive, Depth::Zero).is_err());
        assert_eq!(ls.discover(&p("/a")).len(), 2);
    }

    #[test]
    fn test_ancestor_depth() {
        let ls = MemLs::new();
        lock(&ls, "/a", LockScope::Exclusive, Depth::Zero).unwrap();
        // a depth 0 lock on the parent does not reach the child.
        assert!(lock(&ls, "/a/b", LockScope::Exclusive, Depth::Zero).is_ok());

        lock(&ls, "/x", LockScope::Exclusive, Depth::Infinity).unwrap();
        assert!(lock(&ls, "/x/y/z", LockScope::Shared, Depth::Zero).is_err());

        lock(&ls, "/s", LockScope::Shared, Depth::Infinity).unwrap();
        assert!(lock(&ls, "/s/t", LockScope::Shared, Depth::Zero).is_ok());
        assert!(lock(&ls, "/s/u", LockScope::Exclusive, Depth::Zero).is_err());
    }

    #[test]
    fn test_descendant_conflict() {
        let ls = MemLs::new();
        lock(&ls, "/a/b/c", LockScope::Exclusive, Depth::Zero).unwrap();
        assert!(lock(&ls, "/a", LockScope::Shared, Depth::Infinity).is_err());
        // depth one reaches /a/b, not /a/b/c.
        assert!(lock(&ls, "/a", LockScope::Shared, Depth::One).is_ok());
        assert!(lock(&ls, "/a/b", LockScope::Shared, Depth::One).is_err());
    }

    #[test]
    fn test_expired_does_not_block() {
        let ls = MemLs::new();
        let l = ls
            .acquire(&p("/a"), None, "", Duration::ZERO, LockScope::Exclusive, Depth::Infinity)
            .unwrap();
        assert!(lock(&ls, "/a", LockScope::Exclusive, Depth::Infinity).is_ok());
        assert_eq!(ls.refresh(&l.token, MINUTE), Err(()));
        assert_eq!(ls.release(&l.token), Err(()));
    }

    #[test]
    fn test_refresh_release() {
        let ls = MemLs::new();
        let l = lock(&ls, "/a", LockScope::Exclusive, Depth::Zero).unwrap();
        let r = ls.refresh(&l.token, Duration::from_secs(120)).unwrap();
        assert_eq!(r.timeout, Duration::from_secs(120));
        assert!(r.timeout_at > l.timeout_at);
        assert_eq!(ls.refresh("opaquelocktoken:nope", MINUTE), Err(()));

        assert_eq!(ls.release(&l.token), Ok(()));
        assert_eq!(ls.release(&l.token), Err(()));
        assert!(lock(&ls, "/a", LockScope::Exclusive, Depth::Zero).is_ok());
    }

    #[test]
    fn test_check_write_allowed() {
        let ls = MemLs::new();
        let l = lock(&ls, "/a/b", LockScope::Exclusive, Depth::Infinity).unwrap();
        assert!(ls.check_write_allowed(&p("/a/b/c"), &[], false).is_err());
        assert!(ls.check_write_allowed(&p("/a/b/c"), &[l.token.clone()], false).is_ok());
        assert!(ls.check_write_allowed(&p("/a/x"), &[], false).is_ok());
        // deleting /a would take /a/b with it.
        assert!(ls.check_write_allowed(&p("/a"), &[], true).is_err());
        assert!(ls.check_write_allowed(&p("/a"), &[l.token.clone()], true).is_ok());
    }

    #[test]
    fn test_check_shared() {
        let ls = MemLs::new();
        let s1 = lock(&ls, "/a", LockScope::Shared, Depth::Zero).unwrap();
        lock(&ls, "/a", LockScope::Shared, Depth::Zero).unwrap();
        assert!(ls.check_write_allowed(&p("/a"), &[], false).is_err());
        assert!(ls.check_write_allowed(&p("/a"), &[s1.token], false).is_ok());
    }

    #[test]
    fn test_delete() {
        let ls = MemLs::new();
        let l = lock(&ls, "/a/b", LockScope::Exclusive, Depth::Zero).unwrap();
        lock(&ls, "/a/b/c", LockScope::Exclusive, Depth::Zero).unwrap();
        lock(&ls, "/z", LockScope::Exclusive, Depth::Zero).unwrap();
        ls.delete(&p("/a"));
        assert!(ls.discover(&p("/a/b")).is_empty());
        assert_eq!(ls.release(&l.token), Err(()));
        assert_eq!(ls.discover(&p("/z")).len(), 1);
        ls.delete(&DavPath::root());
        assert!(ls.discover(&p("/z")).is_empty());
    }

    #[test]
    fn test_sweep() {
        let ls = MemLs::new();
        for path in ["/a", "/b/c", "/e"] {
            ls.acquire(&p(path), None, "", Duration::ZERO, LockScope::Shared, Depth::Zero)
                .unwrap();
        }
        lock(&ls, "/d", LockScope::Shared, Depth::Zero).unwrap();
        assert_eq!(ls.sweep(), 3);
        assert_eq!(ls.sweep(), 0);
        assert_eq!(ls.discover(&p("/d")).len(), 1);
    }

    #[test]
    fn test_expired_nodes_compacted() {
        let ls = MemLs::new();
        ls.acquire(&p("/a/b/c"), None, "x", Duration::ZERO, LockScope::Exclusive, Depth::Zero)
            .unwrap();
        assert!(ls.discover(&p("/a/b/c")).is_empty());
        assert_eq!(ls.0.lock().tree.subtree(tree::ROOT_ID).len(), 1);
    }

    #[test]
    fn test_tokens_unique() {
        let ls = MemLs::new();
        let mut tokens = std::collections::HashSet::new();
        for i in 0..100 {
            let l = lock(&ls, &format!("/f{}", i), LockScope::Exclusive, Depth::Zero).unwrap();
            assert!(tokens.insert(l.token));
        }
    }

    #[test]
    fn test_concurrent_exclusive() {
        let ls = MemLs::new();
        let results: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let ls = ls.clone();
                    s.spawn(move || lock(&ls, "/race", LockScope::Exclusive, Depth::Infinity).is_ok())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    }
}
