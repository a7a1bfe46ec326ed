use std::collections::BTreeMap;

use http::StatusCode as SC;

use crate::DavResult;
use crate::account::{DavAccount, Permission};
use crate::distributor::{DavPassport, DavRoute, Distributor};
use crate::errors::DavError;
use crate::fs::DavMetaData;
use crate::props::{self, BasicValues, DavProperty};
use crate::request::{DavRequest, DavResponse};
use crate::util::Depth;

// Just the basic properties, no provider round trip.
pub(crate) fn basic_property(route: &DavRoute<'_>, meta: &dyn DavMetaData) -> DavProperty {
    DavProperty {
        path: route.path.clone(),
        is_collection: meta.is_dir(),
        basic_data: BasicValues::from_meta(route.path.name(), meta).0,
        extra_data: BTreeMap::new(),
        extra_not_found: Vec::new(),
    }
}

impl Distributor {
    pub(crate) async fn handle_propfind(
        &self,
        passport: &DavPassport<'_>,
        req: &DavRequest,
        account: &DavAccount,
    ) -> DavResult<DavResponse> {
        let src = &passport.src;
        let depth = req.depth.unwrap_or(Depth::Infinity);
        let meta = src.provider().metadata(&src.rel_path).await?;

        let mut res = Vec::new();
        let mut todo = vec![(src.clone(), meta, 0usize)];
        while let Some((route, meta, level)) = todo.pop() {
            let is_dir = meta.is_dir();
            let basic = BasicValues::from_meta(route.path.name(), &*meta);
            let prop = props::compose(
                &route.path,
                is_dir,
                basic,
                &req.propfind,
                route.provider(),
                &route.rel_path,
            )
            .await?;
            res.push(prop);

            let descend = match depth {
                Depth::Zero => false,
                Depth::One => level == 0,
                Depth::Infinity => true,
            };
            if !is_dir || !descend {
                continue;
            }
            for dirent in route.provider().read_dir(&route.rel_path).await? {
                let child = route.child(&dirent.name())?;
                // denied members are left out, and not descended into.
                if account.resolve(&child.path, false) == Permission::Denied {
                    continue;
                }
                match dirent.metadata() {
                    Ok(meta) => todo.push((child, meta, level + 1)),
                    Err(e) => debug!("propfind: skipping {}: {:?}", dirent.name(), e),
                }
            }
        }
        res.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(DavResponse::MultiStatus(res))
    }

    pub(crate) async fn handle_proppatch(&self, passport: &DavPassport<'_>, req: &DavRequest) -> DavResult<DavResponse> {
        let src = &passport.src;
        if req.patches.is_empty() {
            return Err(DavError::Status(SC::BAD_REQUEST));
        }
        // the resource must exist.
        src.provider().metadata(&src.rel_path).await?;
        let res = props::apply_patch(&src.rel_path, req.patches.clone(), src.provider()).await;
        if !res.is_success() {
            debug!("proppatch {}: {:?}", src.path, res.outcomes());
        }
        Ok(DavResponse::PropPatch(res))
    }
}
