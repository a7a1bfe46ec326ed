//! Accounts and path permissions.
//!
//! An account carries an ordered list of rules, each either `+<prefix>`
//! (allow) or `-<prefix>` (deny). A bare `+` or `-` applies to every path.
//!
//! To decide on a path, the most specific matching allow rule is compared
//! with the most specific matching deny rule, where specificity is the
//! number of segments of the prefix. A deny rule wins ties, and a path
//! that matches no rule at all is denied.
use std::collections::HashMap;
use std::fmt::Debug;

use dyn_clone::{DynClone, clone_trait_object};

use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::DavResult;

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Allowed,
    Denied,
}

/// A principal and its permission rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavAccount {
    username: String,
    allow: Vec<DavPath>,
    deny: Vec<DavPath>,
    admin: bool,
}

fn parse_rule(rule: &str) -> DavResult<(bool, DavPath)> {
    let mut chars = rule.chars();
    let allow = match chars.next() {
        Some('+') => true,
        Some('-') => false,
        _ => return Err(DavError::InvalidConfig(format!("bad permission rule {:?}", rule))),
    };
    let prefix = chars.as_str();
    let prefix = if prefix.is_empty() {
        DavPath::root()
    } else {
        DavPath::new(prefix)
            .map_err(|_| DavError::InvalidConfig(format!("bad permission prefix {:?}", rule)))?
    };
    Ok((allow, prefix))
}

// Segment count of the most specific prefix that covers the path.
fn longest_match(prefixes: &[DavPath], path: &DavPath) -> Option<usize> {
    prefixes
        .iter()
        .filter(|p| p.is_ancestor_or_self(path))
        .map(|p| p.num_segments())
        .max()
}

impl DavAccount {
    /// Build an account from its rules, e.g. `["+/", "-/private"]`.
    pub fn new<S: AsRef<str>>(username: impl Into<String>, rules: impl IntoIterator<Item = S>) -> DavResult<DavAccount> {
        let mut allow = Vec::new();
        let mut deny = Vec::new();
        for rule in rules {
            match parse_rule(rule.as_ref())? {
                (true, prefix) => allow.push(prefix),
                (false, prefix) => deny.push(prefix),
            }
        }
        Ok(DavAccount {
            username: username.into(),
            allow,
            deny,
            admin: false,
        })
    }

    /// Mark this account as an administrator.
    pub fn admin(self, admin: bool) -> Self {
        let mut this = self;
        this.admin = admin;
        this
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// May this account access `path`.
    ///
    /// `intends_write` is passed along for callers that keep separate
    /// rule sets for writing; the decision itself is the same.
    pub fn resolve(&self, path: &DavPath, intends_write: bool) -> Permission {
        let allow = longest_match(&self.allow, path);
        let deny = longest_match(&self.deny, path);
        let permission = match (allow, deny) {
            (Some(a), Some(d)) if a > d => Permission::Allowed,
            (Some(_), None) => Permission::Allowed,
            _ => Permission::Denied,
        };
        if permission == Permission::Denied {
            debug!(
                "permission denied: {} on {} (write: {}, allow: {:?}, deny: {:?})",
                self.username, path, intends_write, allow, deny
            );
        }
        permission
    }

    /// Is there a deny rule strictly below `path`. If not, whatever
    /// is decided for `path` holds for everything below it as well.
    pub fn restricts_below(&self, path: &DavPath) -> bool {
        self.deny
            .iter()
            .any(|d| d.num_segments() > path.num_segments() && path.is_ancestor_or_self(d))
    }
}

/// Where the distributor gets accounts from.
///
/// Authentication happens before this; a source only maps an
/// already verified username to its rules.
pub trait DavAccountSource: Debug + Send + Sync + DynClone {
    fn account(&self, username: &str) -> Option<DavAccount>;
}

clone_trait_object! {DavAccountSource}

/// Accounts held in memory, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct MemAccounts {
    accounts: HashMap<String, DavAccount>,
}

impl MemAccounts {
    pub fn new(accounts: impl IntoIterator<Item = DavAccount>) -> Box<MemAccounts> {
        let accounts = accounts
            .into_iter()
            .map(|a| (a.username.clone(), a))
            .collect();
        Box::new(MemAccounts { accounts })
    }
}

impl DavAccountSource for MemAccounts {
    fn account(&self, username: &str) -> Option<DavAccount> {
        self.accounts.get(username).cloned()
    }
}
