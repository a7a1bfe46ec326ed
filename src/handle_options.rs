use crate::DavResult;
use crate::distributor::{DavPassport, Distributor};
use crate::request::DavResponse;
use crate::util::{DavMethod, DavMethodSet};

impl Distributor {
    pub(crate) async fn handle_options(&self, passport: &DavPassport<'_>) -> DavResult<DavResponse> {
        let src = &passport.src;
        let meta = src.provider().metadata(&src.rel_path).await;

        let mut v = DavMethodSet::none();
        match meta {
            Err(_) => {
                v.add(DavMethod::Options);
                v.add(DavMethod::MkCol);
                v.add(DavMethod::Put);
                v.add(DavMethod::Lock);
            },
            Ok(meta) => {
                if meta.is_file() {
                    v.add(DavMethod::Head);
                    v.add(DavMethod::Get);
                    v.add(DavMethod::Patch);
                    v.add(DavMethod::Put);
                } else {
                    v.add(DavMethod::Get);
                    v.add(DavMethod::Head);
                }
                v.add(DavMethod::Options);
                v.add(DavMethod::PropFind);
                v.add(DavMethod::PropPatch);
                v.add(DavMethod::Copy);
                // the top of a mount cannot go away.
                if !src.is_mount_root() {
                    v.add(DavMethod::Move);
                    v.add(DavMethod::Delete);
                }
                v.add(DavMethod::Lock);
                v.add(DavMethod::Unlock);
            },
        }

        let mut allowed = v.intersect(self.inner.allow);
        if src.mount.readonly {
            allowed = allowed.intersect(DavMethodSet::read_only());
        }
        Ok(DavResponse::Options(allowed))
    }
}
