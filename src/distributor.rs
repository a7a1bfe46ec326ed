//
// This module contains the main entry point of the library,
// the Distributor.
//
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use crate::DavResult;
use crate::account::{DavAccount, DavAccountSource, Permission};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::*;
use crate::ls::*;
use crate::memls::MemLs;
use crate::request::{DavRequest, DavResponse};
use crate::util::{DavMethod, DavMethodSet};

/// Longest lock timeouts handed out.
pub(crate) const MAX_EXCLUSIVE_TIMEOUT: Duration = Duration::from_secs(600);
pub(crate) const MAX_SHARED_TIMEOUT: Duration = Duration::from_secs(86400);

/// A provider mounted at a prefix of the namespace.
#[derive(Debug, Clone)]
pub struct DavMount {
    raw_prefix: String,
    pub(crate) prefix: DavPath,
    pub(crate) uri: String,
    pub(crate) provider: Box<dyn DavProvider>,
    pub(crate) home_dir: bool,
    pub(crate) readonly: bool,
}

impl DavMount {
    /// Mount `provider` at `prefix`. The `uri` only identifies the
    /// backend (for logging and diagnostics).
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>, provider: Box<dyn DavProvider>) -> DavMount {
        DavMount {
            raw_prefix: prefix.into(),
            prefix: DavPath::root(),
            uri: uri.into(),
            provider,
            home_dir: false,
            readonly: false,
        }
    }

    /// Every account sees its own sub-tree below the prefix: `/~/foo`
    /// for `alice` is `/~/alice/foo`.
    pub fn home_dir(self, home_dir: bool) -> Self {
        let mut this = self;
        this.home_dir = home_dir;
        this
    }

    /// Refuse all methods that modify anything.
    pub fn readonly(self, readonly: bool) -> Self {
        let mut this = self;
        this.readonly = readonly;
        this
    }

    pub fn prefix(&self) -> &DavPath {
        &self.prefix
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_home_dir(&self) -> bool {
        self.home_dir
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }
}

/// Configuration of the distributor.
#[derive(Debug, Clone, Default)]
pub struct DavConfig {
    mounts: Vec<DavMount>,
    ls: Option<Box<dyn DavLockSystem>>,
    accounts: Option<Box<dyn DavAccountSource>>,
    default_account: Option<DavAccount>,
    allow: Option<DavMethodSet>,
    cross_provider: bool,
}

impl DavConfig {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mount.
    pub fn mount(self, mount: DavMount) -> Self {
        let mut this = self;
        this.mounts.push(mount);
        this
    }

    /// Set the locksystem to use (default is a fresh `MemLs`).
    pub fn locksystem(self, ls: Box<dyn DavLockSystem>) -> Self {
        let mut this = self;
        this.ls = Some(ls);
        this
    }

    /// Where to look up accounts by name.
    pub fn accounts(self, accounts: Box<dyn DavAccountSource>) -> Self {
        let mut this = self;
        this.accounts = Some(accounts);
        this
    }

    /// Account used for anonymous requests.
    pub fn default_account(self, account: DavAccount) -> Self {
        let mut this = self;
        this.default_account = Some(account);
        this
    }

    /// Which methods to allow (default is all methods).
    pub fn methods(self, allow: DavMethodSet) -> Self {
        let mut this = self;
        this.allow = Some(allow);
        this
    }

    /// Allow COPY and MOVE between different mounts.
    pub fn cross_provider(self, enable: bool) -> Self {
        let mut this = self;
        this.cross_provider = enable;
        this
    }

    /// Check the configuration and build a [`Distributor`] from it.
    pub fn build_handler(self) -> DavResult<Distributor> {
        let DavConfig {
            mut mounts,
            ls,
            accounts,
            default_account,
            allow,
            cross_provider,
        } = self;

        for m in mounts.iter_mut() {
            m.prefix = DavPath::new(&m.raw_prefix)
                .map_err(|_| DavError::InvalidConfig(format!("bad mount prefix {:?}", m.raw_prefix)))?;
        }
        // most specific first, so the first match is the longest.
        mounts.sort_by(|a, b| {
            b.prefix
                .num_segments()
                .cmp(&a.prefix.num_segments())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
        for w in mounts.windows(2) {
            if w[0].prefix == w[1].prefix {
                return Err(DavError::InvalidConfig(format!("duplicate mount prefix {}", w[0].prefix)));
            }
        }
        if !mounts.iter().any(|m| m.prefix.is_root()) {
            warn!("no mount at /, some paths will not resolve");
        }
        for m in &mounts {
            debug!(
                "mount {} -> {} (home_dir: {}, readonly: {})",
                m.prefix, m.uri, m.home_dir, m.readonly
            );
        }

        Ok(Distributor {
            inner: Arc::new(DistributorInner {
                mounts,
                ls: ls.unwrap_or_else(|| MemLs::new() as Box<dyn DavLockSystem>),
                accounts,
                default_account,
                allow: allow.unwrap_or_else(DavMethodSet::all),
                cross_provider,
            }),
        })
    }
}

#[derive(Debug)]
pub(crate) struct DistributorInner {
    pub mounts: Vec<DavMount>,
    pub ls: Box<dyn DavLockSystem>,
    pub accounts: Option<Box<dyn DavAccountSource>>,
    pub default_account: Option<DavAccount>,
    pub allow: DavMethodSet,
    pub cross_provider: bool,
}

/// Routes WebDAV requests to the mounted providers.
///
/// Built once with [`DavConfig`]; cloning is cheap, all clones share
/// the same mounts and lock table.
#[derive(Debug, Clone)]
pub struct Distributor {
    pub(crate) inner: Arc<DistributorInner>,
}

/// Where a path ended up.
#[derive(Debug, Clone)]
pub struct DavRoute<'a> {
    pub mount: &'a DavMount,
    /// Effective prefix: the mount prefix, plus the username for
    /// home directories.
    pub prefix: DavPath,
    /// Path as the client sees it.
    pub path: DavPath,
    /// Path as the provider sees it.
    pub rel_path: DavPath,
    /// Path the lock table knows this resource by.
    pub lock_path: DavPath,
}

impl DavRoute<'_> {
    pub(crate) fn provider(&self) -> &dyn DavProvider {
        &*self.mount.provider
    }

    // the route of a member of this collection.
    pub(crate) fn child(&self, name: &str) -> DavResult<Self> {
        Ok(DavRoute {
            mount: self.mount,
            prefix: self.prefix.clone(),
            path: self.path.add_child(name)?,
            rel_path: self.rel_path.add_child(name)?,
            lock_path: self.lock_path.add_child(name)?,
        })
    }

    pub(crate) fn same_mount(&self, other: &DavRoute<'_>) -> bool {
        std::ptr::eq(self.mount, other.mount)
    }

    /// The top of the mount, or of the account's home directory.
    pub fn is_mount_root(&self) -> bool {
        self.lock_path == self.prefix
    }
}

/// Per-request dispatch context.
#[derive(Debug, Clone)]
pub struct DavPassport<'a> {
    pub src: DavRoute<'a>,
    /// COPY/MOVE only.
    pub dst: Option<DavRoute<'a>>,
}

impl DavPassport<'_> {
    pub fn src_prefix(&self) -> &DavPath {
        &self.src.prefix
    }

    pub fn src_path(&self) -> &DavPath {
        &self.src.path
    }

    pub fn dst_path(&self) -> Option<&DavPath> {
        self.dst.as_ref().map(|d| &d.path)
    }
}

/// Requested timeout, limited to what we hand out for this scope.
pub(crate) fn clamp_timeout(scope: LockScope, requested: Option<Duration>) -> Duration {
    let max = match scope {
        LockScope::Exclusive => MAX_EXCLUSIVE_TIMEOUT,
        LockScope::Shared => MAX_SHARED_TIMEOUT,
    };
    requested.map(|t| t.min(max)).unwrap_or(max)
}

impl Distributor {
    /// Return a configuration builder.
    pub fn builder() -> DavConfig {
        DavConfig::new()
    }

    /// The mounts, most specific first.
    pub fn mounts(&self) -> &[DavMount] {
        &self.inner.mounts
    }

    /// The lock table.
    pub fn locksystem(&self) -> &dyn DavLockSystem {
        &*self.inner.ls
    }

    /// The (already authenticated) account for a request. Anonymous
    /// requests get the default account, if there is one.
    pub fn account(&self, username: Option<&str>) -> DavResult<DavAccount> {
        let acct = match username {
            Some(name) => self.inner.accounts.as_ref().and_then(|a| a.account(name)),
            None => self.inner.default_account.clone(),
        };
        acct.ok_or_else(|| {
            debug!("no account for {:?}", username);
            DavError::Denied
        })
    }

    /// Find the mount for `path`: the one with the longest prefix.
    pub fn resolve<'a>(&'a self, path: &DavPath, account: &DavAccount) -> DavResult<DavRoute<'a>> {
        let mount = match self.inner.mounts.iter().find(|m| m.prefix.is_ancestor_or_self(path)) {
            Some(m) => m,
            None => {
                debug!("no mount for {}", path);
                return Err(DavError::NoSuchMount);
            },
        };
        let route = if mount.home_dir {
            let lock_path = path.insert_after(&mount.prefix, account.username())?;
            DavRoute {
                mount,
                prefix: mount.prefix.add_child(account.username())?,
                path: path.clone(),
                rel_path: lock_path.child_relative_to(&mount.prefix)?,
                lock_path,
            }
        } else {
            DavRoute {
                mount,
                prefix: mount.prefix.clone(),
                path: path.clone(),
                rel_path: path.child_relative_to(&mount.prefix)?,
                lock_path: path.clone(),
            }
        };
        trace!("resolve {} -> {} {}", path, mount.uri, route.rel_path);
        Ok(route)
    }

    /// Build the passport for a request: source route, and for COPY and
    /// MOVE the destination route.
    pub fn passport<'a>(&'a self, req: &DavRequest, account: &DavAccount) -> DavResult<DavPassport<'a>> {
        let path = DavPath::from_uri_path(&req.path)?;
        let src = self.resolve(&path, account)?;
        let dst = match req.method {
            DavMethod::Copy | DavMethod::Move => {
                let dest = req
                    .destination
                    .as_deref()
                    .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;
                let dst = self.resolve(&DavPath::from_destination(dest)?, account)?;
                if !src.same_mount(&dst) && !self.inner.cross_provider {
                    debug!(
                        "{} {} -> {}: different mounts",
                        req.method, src.path, dst.path
                    );
                    return Err(DavError::CrossProviderUnsupported);
                }
                Some(dst)
            },
            _ => None,
        };
        Ok(DavPassport { src, dst })
    }

    // permission and readonly gates for one route.
    fn gate(&self, route: &DavRoute<'_>, account: &DavAccount, write: bool) -> DavResult<()> {
        if account.resolve(&route.path, write) == Permission::Denied {
            return Err(DavError::Denied);
        }
        if write && route.mount.readonly {
            debug!("{} is on a readonly mount", route.path);
            return Err(DavError::ReadOnly);
        }
        Ok(())
    }

    /// Check the lock table before modifying `route`.
    pub(crate) fn check_locks(&self, route: &DavRoute<'_>, tokens: &[String], deep: bool) -> DavResult<()> {
        self.inner
            .ls
            .check_write_allowed(&route.lock_path, tokens, deep)
            .map_err(|lock| {
                debug!("{} is locked by {}", route.path, lock.token);
                DavError::Locked(Box::new(lock))
            })
    }

    /// Check the locks on the parent collection before adding `route` to
    /// it or removing it. A lock of any depth on the parent protects its
    /// membership.
    pub(crate) fn check_parent_locks(&self, route: &DavRoute<'_>, tokens: &[String]) -> DavResult<()> {
        let Ok(parent) = route.lock_path.parent() else {
            return Ok(());
        };
        self.inner
            .ls
            .check_write_allowed(&parent, tokens, false)
            .map_err(|lock| {
                debug!("parent of {} is locked by {}", route.path, lock.token);
                DavError::Locked(Box::new(lock))
            })
    }

    /// Client paths of everything below `route`, relative to it.
    pub(crate) async fn members(&self, route: &DavRoute<'_>) -> DavResult<Vec<DavPath>> {
        let mut res = Vec::new();
        match route.provider().metadata(&route.rel_path).await {
            Ok(meta) if meta.is_dir() => {},
            Ok(_) | Err(FsError::NotFound) => return Ok(res),
            Err(e) => return Err(e.into()),
        }
        let mut todo = vec![route.clone()];
        while let Some(r) = todo.pop() {
            for dirent in r.provider().read_dir(&r.rel_path).await? {
                let child = r.child(&dirent.name())?;
                res.push(child.path.child_relative_to(&route.path)?);
                if dirent.is_dir().unwrap_or(false) {
                    todo.push(child);
                }
            }
        }
        Ok(res)
    }

    /// Refuse if `account` may not access every member below `route`.
    pub(crate) async fn check_members(&self, route: &DavRoute<'_>, account: &DavAccount, write: bool) -> DavResult<()> {
        if !account.restricts_below(&route.path) {
            return Ok(());
        }
        for rel in self.members(route).await? {
            if account.resolve(&route.path.join(&rel), write) == Permission::Denied {
                return Err(DavError::Denied);
            }
        }
        Ok(())
    }

    // helper.
    pub(crate) async fn has_parent(&self, route: &DavRoute<'_>) -> bool {
        let Ok(parent) = route.rel_path.parent() else {
            return false;
        };
        route
            .provider()
            .metadata(&parent)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Run a request whose passport has been built: permissions, then
    /// readonly mounts, then locks, then the method itself.
    pub async fn dispatch(
        &self,
        passport: &DavPassport<'_>,
        req: &DavRequest,
        account: &DavAccount,
    ) -> DavResult<DavResponse> {
        let method = req.method;
        let src = &passport.src;

        // COPY only reads the source.
        let src_write = method.is_write() && method != DavMethod::Copy;
        self.gate(src, account, src_write)?;
        if let Some(dst) = &passport.dst {
            self.gate(dst, account, true)?;
        }

        match method {
            DavMethod::Put | DavMethod::Patch | DavMethod::PropPatch => {
                self.check_locks(src, &req.lock_tokens, false)?
            },
            DavMethod::MkCol => {
                self.check_locks(src, &req.lock_tokens, false)?;
                self.check_parent_locks(src, &req.lock_tokens)?;
            },
            DavMethod::Delete => {
                self.check_locks(src, &req.lock_tokens, true)?;
                self.check_parent_locks(src, &req.lock_tokens)?;
            },
            _ => {},
        }

        match method {
            DavMethod::Options => self.handle_options(passport).await,
            DavMethod::Head | DavMethod::Get => {
                self.handle_get(passport, method == DavMethod::Head, account)
                    .await
            },
            DavMethod::Put | DavMethod::Patch => self.handle_put(passport, req).await,
            DavMethod::Delete => self.handle_delete(passport, req, account).await,
            DavMethod::MkCol => self.handle_mkcol(passport).await,
            DavMethod::PropFind => self.handle_propfind(passport, req, account).await,
            DavMethod::PropPatch => self.handle_proppatch(passport, req).await,
            DavMethod::Copy | DavMethod::Move => self.handle_copymove(passport, req, account).await,
            DavMethod::Lock => self.handle_lock(passport, req, account).await,
            DavMethod::Unlock => self.handle_unlock(passport, req, account),
        }
    }

    /// Handle a request on behalf of `account`.
    pub async fn handle(&self, req: &DavRequest, account: &DavAccount) -> DavResult<DavResponse> {
        debug!("== START REQUEST {} {} ({})", req.method, req.path, account.username());
        let res = self.handle2(req, account).await;
        match &res {
            Ok(resp) => debug!("== END REQUEST result {}", resp.status()),
            Err(err) => debug!("== END REQUEST result {} ({})", err.statuscode(), err),
        }
        res
    }

    async fn handle2(&self, req: &DavRequest, account: &DavAccount) -> DavResult<DavResponse> {
        // see if method is allowed.
        if !self.inner.allow.contains(req.method) {
            debug!("method {} not allowed on request {}", req.method, req.path);
            return Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED));
        }
        let passport = self.passport(req, account)?;
        self.dispatch(&passport, req, account).await
    }
}
