use bytes::Bytes;
use http::StatusCode as SC;

use crate::DavResult;
use crate::account::DavAccount;
use crate::distributor::{DavPassport, Distributor, clamp_timeout};
use crate::errors::DavError;
use crate::fs::FsError;
use crate::ls::DavLock;
use crate::request::{DavRequest, DavResponse};
use crate::util::Depth;

// Only the principal that created a lock, or an admin, may touch it.
fn may_manage(lock: &DavLock, account: &DavAccount) -> bool {
    match lock.principal {
        Some(ref p) => p == account.username() || account.is_admin(),
        None => true,
    }
}

impl Distributor {
    // the live lock with this token that covers the resource.
    fn covering_lock(&self, passport: &DavPassport<'_>, token: &str) -> Option<DavLock> {
        self.inner
            .ls
            .discover(&passport.src.lock_path)
            .into_iter()
            .find(|l| l.token == token)
    }

    pub(crate) async fn handle_lock(
        &self,
        passport: &DavPassport<'_>,
        req: &DavRequest,
        account: &DavAccount,
    ) -> DavResult<DavResponse> {
        let src = &passport.src;
        let locksystem = &self.inner.ls;

        // lock refresh?
        let Some(info) = req.lock_info.as_ref() else {
            if req.lock_tokens.len() != 1 {
                return Err(DavError::Status(SC::BAD_REQUEST));
            }
            let token = &req.lock_tokens[0];
            let lock = self
                .covering_lock(passport, token)
                .ok_or(DavError::Status(SC::PRECONDITION_FAILED))?;
            if !may_manage(&lock, account) {
                return Err(DavError::Denied);
            }
            let timeout = clamp_timeout(lock.scope, req.timeout);
            let lock = locksystem
                .refresh(token, timeout)
                .map_err(|_| DavError::Status(SC::PRECONDITION_FAILED))?;
            return Ok(DavResponse::LockRefreshed(lock));
        };

        let depth = req.depth.unwrap_or(Depth::Infinity);
        let exists = match src.provider().metadata(&src.rel_path).await {
            Ok(_) => true,
            Err(FsError::NotFound) => false,
            Err(e) => return Err(e.into()),
        };
        if !exists {
            self.check_parent_locks(src, &req.lock_tokens)?;
        }

        // create lock
        let timeout = clamp_timeout(info.scope, req.timeout);
        let lock = locksystem
            .acquire(
                &src.lock_path,
                Some(account.username()),
                &info.owner,
                timeout,
                info.scope,
                depth,
            )
            .map_err(|conflict| {
                debug!("lock on {} conflicts with {}", src.path, conflict.token);
                DavError::Conflict(Box::new(conflict))
            })?;

        // try to create file if it doesn't exist.
        if !exists {
            let created = if self.has_parent(src).await {
                src.provider()
                    .write(&src.rel_path, Bytes::new())
                    .await
                    .map_err(DavError::from)
            } else {
                Err(DavError::Status(SC::CONFLICT))
            };
            if let Err(e) = created {
                let _ = locksystem.release(&lock.token);
                return Err(e);
            }
        }

        Ok(DavResponse::LockGranted {
            lock,
            created: !exists,
        })
    }

    pub(crate) fn handle_unlock(
        &self,
        passport: &DavPassport<'_>,
        req: &DavRequest,
        account: &DavAccount,
    ) -> DavResult<DavResponse> {
        // Must have Lock-Token header
        let token = req.lock_token.as_ref().ok_or(DavError::Status(SC::BAD_REQUEST))?;

        let lock = self.covering_lock(passport, token).ok_or(DavError::NoSuchLock)?;
        if !may_manage(&lock, account) {
            return Err(DavError::Denied);
        }
        match self.inner.ls.release(token) {
            Ok(()) => Ok(DavResponse::Unlocked),
            Err(()) => Err(DavError::NoSuchLock),
        }
    }
}
