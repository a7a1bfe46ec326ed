use crate::DavResult;
use crate::account::{DavAccount, Permission};
use crate::distributor::{DavPassport, Distributor};
use crate::handle_props::basic_property;
use crate::request::DavResponse;

impl Distributor {
    pub(crate) async fn handle_get(
        &self,
        passport: &DavPassport<'_>,
        head: bool,
        account: &DavAccount,
    ) -> DavResult<DavResponse> {
        let src = &passport.src;
        let meta = src.provider().metadata(&src.rel_path).await?;
        let props = basic_property(src, &*meta);

        // a collection gets a listing of its members.
        if meta.is_dir() {
            let mut members = Vec::new();
            for dirent in src.provider().read_dir(&src.rel_path).await? {
                let meta = match dirent.metadata() {
                    Ok(meta) => meta,
                    Err(e) => {
                        debug!("handle_get: skipping {}: {:?}", dirent.name(), e);
                        continue;
                    },
                };
                let child = src.child(&dirent.name())?;
                if account.resolve(&child.path, false) == Permission::Denied {
                    continue;
                }
                members.push(basic_property(&child, &*meta));
            }
            members.sort_by(|a, b| a.path.cmp(&b.path));
            return Ok(DavResponse::Listing { props, members });
        }

        let body = if head {
            None
        } else {
            Some(src.provider().read(&src.rel_path).await?)
        };
        Ok(DavResponse::Content { props, body })
    }
}
