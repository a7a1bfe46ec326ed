use http::StatusCode as SC;

use crate::DavResult;
use crate::distributor::{DavPassport, Distributor};
use crate::errors::DavError;
use crate::fs::FsError;
use crate::request::DavResponse;

impl Distributor {
    pub(crate) async fn handle_mkcol(&self, passport: &DavPassport<'_>) -> DavResult<DavResponse> {
        let src = &passport.src;
        match src.provider().create_dir(&src.rel_path).await {
            // RFC 4918 9.3.1 MKCOL Status Codes.
            Err(FsError::Exists) => Err(DavError::Status(SC::METHOD_NOT_ALLOWED)),
            Err(FsError::NotFound) => Err(DavError::Status(SC::CONFLICT)),
            Err(e) => Err(e.into()),
            Ok(()) => Ok(DavResponse::Created),
        }
    }
}
