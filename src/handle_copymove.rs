use http::StatusCode as SC;

use crate::DavResult;
use crate::account::{DavAccount, Permission};
use crate::distributor::{DavPassport, DavRoute, Distributor};
use crate::errors::DavError;
use crate::fs::{DavProp, FsError};
use crate::request::{DavRequest, DavResponse};
use crate::util::{DavMethod, Depth};

impl Distributor {
    // copy the dead properties of one resource to another.
    async fn copy_props(&self, source: &DavRoute<'_>, dest: &DavRoute<'_>) -> DavResult<()> {
        let props = match source.provider().get_props(&source.rel_path).await {
            Ok(props) => props,
            Err(FsError::NotImplemented) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if props.is_empty() {
            return Ok(());
        }
        let patch: Vec<(bool, DavProp)> = props.into_iter().map(|p| (true, p)).collect();
        match dest.provider().patch_props(&dest.rel_path, patch).await {
            Ok(res) => {
                for (status, prop) in res.iter().filter(|(s, _)| !s.is_success()) {
                    debug!("copy_props: {} on {}: {}", prop.identity, dest.path, status);
                }
                Ok(())
            },
            Err(FsError::NotImplemented) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn copy_file(&self, source: &DavRoute<'_>, dest: &DavRoute<'_>) -> DavResult<()> {
        if source.same_mount(dest) {
            source.provider().copy(&source.rel_path, &dest.rel_path).await?;
            return Ok(());
        }
        // between providers, the data goes through us.
        let data = source.provider().read(&source.rel_path).await?;
        dest.provider().write(&dest.rel_path, data).await?;
        self.copy_props(source, dest).await
    }

    pub(crate) async fn do_copy(&self, source: &DavRoute<'_>, topdest: &DavRoute<'_>, depth: Depth) -> DavResult<()> {
        let mut todo = vec![(source.clone(), topdest.clone())];
        while let Some((source, dest)) = todo.pop() {
            debug!("do_copy {} {} depth {}", source.path, dest.path, depth);

            // when doing "COPY /a/b /a/b/c make sure we don't recursively
            // copy /a/b/c/ into /a/b/c.
            if source.same_mount(topdest) && source.rel_path == topdest.rel_path {
                continue;
            }

            // if it's a file we can overwrite it.
            let meta = source.provider().metadata(&source.rel_path).await?;
            if !meta.is_dir() {
                self.copy_file(&source, &dest).await?;
                continue;
            }

            match dest.provider().create_dir(&dest.rel_path).await {
                Ok(()) | Err(FsError::Exists) => {},
                Err(e) => return Err(e.into()),
            }
            self.copy_props(&source, &dest).await?;

            // only recurse when Depth > 0.
            if depth == Depth::Zero {
                continue;
            }
            for dirent in source.provider().read_dir(&source.rel_path).await? {
                let name = dirent.name();
                todo.push((source.child(&name)?, dest.child(&name)?));
            }
        }
        Ok(())
    }

    // every member that gets copied or moved must be readable (writable
    // for MOVE) at the source and writable at the destination.
    async fn check_copy_members(
        &self,
        src: &DavRoute<'_>,
        dst: &DavRoute<'_>,
        account: &DavAccount,
        depth: Depth,
        src_write: bool,
    ) -> DavResult<()> {
        if depth == Depth::Zero || !(account.restricts_below(&src.path) || account.restricts_below(&dst.path)) {
            return Ok(());
        }
        for rel in self.members(src).await? {
            let denied = account.resolve(&src.path.join(&rel), src_write) == Permission::Denied
                || account.resolve(&dst.path.join(&rel), true) == Permission::Denied;
            if denied {
                debug!("{} {}: member {} denied", src.path, dst.path, rel);
                return Err(DavError::Denied);
            }
        }
        Ok(())
    }

    pub(crate) async fn handle_copymove(
        &self,
        passport: &DavPassport<'_>,
        req: &DavRequest,
        account: &DavAccount,
    ) -> DavResult<DavResponse> {
        let method = req.method;
        let src = &passport.src;
        let dst = passport.dst.as_ref().ok_or(DavError::Status(SC::BAD_REQUEST))?;

        let depth = match req.depth {
            Some(Depth::Infinity) | None => Depth::Infinity,
            Some(Depth::Zero) if method == DavMethod::Copy => Depth::Zero,
            _ => return Err(DavError::Status(SC::BAD_REQUEST)),
        };

        let meta = src.provider().metadata(&src.rel_path).await?;
        if method == DavMethod::Move && src.is_mount_root() {
            return Err(DavError::Status(SC::FORBIDDEN));
        }

        // check if source == dest, and MOVE into itself.
        if src.same_mount(dst) {
            if src.rel_path == dst.rel_path {
                return Err(DavError::Status(SC::FORBIDDEN));
            }
            if method == DavMethod::Move && meta.is_dir() && src.rel_path.is_ancestor_or_self(&dst.rel_path) {
                return Err(DavError::Status(SC::CONFLICT));
            }
        }

        // parent of the destination must exist.
        if !self.has_parent(dst).await {
            return Err(DavError::Status(SC::CONFLICT));
        }

        // check if overwrite is "F"
        let exists = dst.provider().metadata(&dst.rel_path).await.is_ok();
        if !req.overwrite && exists {
            return Err(DavError::Status(SC::PRECONDITION_FAILED));
        }

        // permissions on all members, before anything is changed.
        self.check_copy_members(src, dst, account, depth, method == DavMethod::Move)
            .await?;
        if exists {
            self.check_members(dst, account, true).await?;
        }

        // check locks. for MOVE the source is removed, so check it too.
        if method == DavMethod::Move {
            self.check_locks(src, &req.lock_tokens, true)?;
            self.check_parent_locks(src, &req.lock_tokens)?;
        }
        self.check_locks(dst, &req.lock_tokens, true)?;
        self.check_parent_locks(dst, &req.lock_tokens)?;

        // see if we need to delete the destination first.
        if exists {
            debug!("handle_copymove: deleting destination {}", dst.path);
            dst.provider().remove(&dst.rel_path).await?;
            self.inner.ls.delete(&dst.lock_path);
        }

        if method == DavMethod::Copy {
            self.do_copy(src, dst, depth).await?;
        } else {
            if src.same_mount(dst) {
                src.provider().rename(&src.rel_path, &dst.rel_path).await?;
            } else {
                self.do_copy(src, dst, Depth::Infinity).await?;
                src.provider().remove(&src.rel_path).await?;
            }
            // move was successful, remove locks at old location.
            self.inner.ls.delete(&src.lock_path);
        }

        Ok(if exists {
            DavResponse::NoContent
        } else {
            DavResponse::Created
        })
    }
}
