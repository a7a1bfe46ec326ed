//! Contains the structs and traits that define a `locksystem` backend.
//!
//! Note that the methods DO NOT return futures, they are synchronous.
//! A conflict check and the insert that follows it must happen as one
//! step, and the lock table never does I/O, so there is nothing to wait
//! for while holding it.
use std::fmt::Debug;
use std::time::Duration;

use dyn_clone::{DynClone, clone_trait_object};

use crate::davpath::DavPath;
use crate::davtime::DavTime;
use crate::util::Depth;

/// Exclusive or shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// Type of the locks returned by DavLockSystem methods.
#[derive(Debug, Clone, PartialEq)]
pub struct DavLock {
    /// Token.
    pub token: String,
    /// Path the lock is rooted at.
    pub path: DavPath,
    /// Principal (username) that created the lock.
    pub principal: Option<String>,
    /// Owner description as sent by the client.
    pub owner: String,
    /// When the lock turns stale (absolute).
    pub timeout_at: DavTime,
    /// When the lock turns stale (relative).
    pub timeout: Duration,
    pub scope: LockScope,
    pub depth: Depth,
}

impl DavLock {
    pub fn is_shared(&self) -> bool {
        self.scope == LockScope::Shared
    }

    pub fn is_expired(&self, now: DavTime) -> bool {
        self.timeout_at.has_passed(now)
    }

    /// Does this lock apply to `path`.
    pub fn covers(&self, path: &DavPath) -> bool {
        depth_covers(&self.path, self.depth, path)
    }

    /// Two locks can coexist only if both are shared.
    pub fn compatible_with(&self, scope: LockScope) -> bool {
        self.is_shared() && scope == LockScope::Shared
    }
}

/// Is `path` within `depth` of `root`. Depth one reaches the
/// immediate children.
pub fn depth_covers(root: &DavPath, depth: Depth, path: &DavPath) -> bool {
    if !root.is_ancestor_or_self(path) {
        return false;
    }
    let below = path.num_segments() - root.num_segments();
    match depth {
        Depth::Zero => below == 0,
        Depth::One => below <= 1,
        Depth::Infinity => true,
    }
}

/// The trait that defines a locksystem.
pub trait DavLockSystem: Debug + Send + Sync + DynClone {
    /// Lock a node. Returns `Ok(new_lock)` if succeeded,
    /// or `Err(conflicting_lock)` if failed.
    fn acquire(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        owner: &str,
        timeout: Duration,
        scope: LockScope,
        depth: Depth,
    ) -> Result<DavLock, DavLock>;

    /// Refresh lock. Returns updated lock if succeeded, `Err(())` if
    /// the token is unknown or expired.
    fn refresh(&self, token: &str, timeout: Duration) -> Result<DavLock, ()>;

    /// Unlock a node. Returns `Ok(())` if succeeded, `Err(())` if the
    /// token is unknown or expired.
    fn release(&self, token: &str) -> Result<(), ()>;

    /// Check if a write to `path` is allowed given the submitted tokens.
    /// With `deep` set, locks below `path` are checked as well.
    /// If not allowed, returns as Err one conflicting lock.
    fn check_write_allowed(&self, path: &DavPath, submitted_tokens: &[String], deep: bool) -> Result<(), DavLock>;

    /// Find and return all live locks that cover a given path.
    fn discover(&self, path: &DavPath) -> Vec<DavLock>;

    /// Delete all locks at this path and below (after MOVE or DELETE)
    fn delete(&self, path: &DavPath);
}

clone_trait_object! {DavLockSystem}
