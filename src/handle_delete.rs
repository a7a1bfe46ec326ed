use http::StatusCode as SC;

use crate::DavResult;
use crate::account::DavAccount;
use crate::distributor::{DavPassport, Distributor};
use crate::errors::DavError;
use crate::request::{DavRequest, DavResponse};
use crate::util::Depth;

impl Distributor {
    pub(crate) async fn handle_delete(
        &self,
        passport: &DavPassport<'_>,
        req: &DavRequest,
        account: &DavAccount,
    ) -> DavResult<DavResponse> {
        let src = &passport.src;
        let meta = src.provider().metadata(&src.rel_path).await?;

        // RFC4918 9.6.1 DELETE for Collections.
        if meta.is_dir() && !matches!(req.depth, None | Some(Depth::Infinity)) {
            return Err(DavError::Status(SC::BAD_REQUEST));
        }
        // the top of a mount stays.
        if src.is_mount_root() {
            return Err(DavError::Status(SC::FORBIDDEN));
        }
        // all or nothing: every member must be ours to delete.
        self.check_members(src, account, true).await?;

        debug!("handle_delete: {} ({})", src.path, src.rel_path);
        src.provider().remove(&src.rel_path).await?;
        self.inner.ls.delete(&src.lock_path);
        Ok(DavResponse::NoContent)
    }
}
