use bytes::{Bytes, BytesMut};
use http::StatusCode as SC;

use crate::DavResult;
use crate::distributor::{DavPassport, Distributor};
use crate::errors::DavError;
use crate::fs::FsError;
use crate::request::{DavRequest, DavResponse};
use crate::util::DavMethod;

impl Distributor {
    /// PUT replaces the content, PATCH appends to an existing resource.
    pub(crate) async fn handle_put(&self, passport: &DavPassport<'_>, req: &DavRequest) -> DavResult<DavResponse> {
        let src = &passport.src;
        let existed = match src.provider().metadata(&src.rel_path).await {
            Ok(meta) if meta.is_dir() => return Err(DavError::Status(SC::METHOD_NOT_ALLOWED)),
            Ok(_) => true,
            Err(FsError::NotFound) => false,
            Err(e) => return Err(e.into()),
        };

        let data = if req.method == DavMethod::Patch {
            if !existed {
                return Err(DavError::Status(SC::NOT_FOUND));
            }
            let old = src.provider().read(&src.rel_path).await?;
            let mut buf = BytesMut::with_capacity(old.len() + req.body.len());
            buf.extend_from_slice(&old);
            buf.extend_from_slice(&req.body);
            buf.freeze()
        } else {
            Bytes::clone(&req.body)
        };

        // parent collection must exist.
        if !existed {
            if !self.has_parent(src).await {
                return Err(DavError::Status(SC::CONFLICT));
            }
            // a new member changes the parent collection.
            self.check_parent_locks(src, &req.lock_tokens)?;
        }
        src.provider().write(&src.rel_path, data).await?;

        Ok(if existed {
            DavResponse::NoContent
        } else {
            DavResponse::Created
        })
    }
}
