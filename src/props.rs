//! Property aggregation.
//!
//! A resource's properties come from two places: the basic (live)
//! vocabulary, derived from provider metadata, and the extended (dead)
//! properties a provider stores on behalf of clients. [`compose`] merges
//! both for PROPFIND/GET, [`apply_patch`] forwards PROPPATCH operations
//! to the provider one at a time and collects a status per property.
use std::collections::BTreeMap;

use http::StatusCode;

use crate::DavResult;
use crate::davpath::DavPath;
use crate::davtime::DavTime;
use crate::errors::fserror_to_status;
use crate::fs::{DavMetaData, DavProp, DavProvider, FsError, PropIdentity};

/// Namespace of the WebDAV live properties.
pub const NS_DAV_URI: &str = "DAV:";

/// The fixed vocabulary of basic properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BasicProp {
    DisplayName,
    GetEtag,
    CreationDate,
    GetLastModified,
    GetContentType,
    GetContentLength,
    ResourceType,
    Encoding,
}

const BASIC_PROPS: [BasicProp; 8] = [
    BasicProp::DisplayName,
    BasicProp::GetEtag,
    BasicProp::CreationDate,
    BasicProp::GetLastModified,
    BasicProp::GetContentType,
    BasicProp::GetContentLength,
    BasicProp::ResourceType,
    BasicProp::Encoding,
];

impl BasicProp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasicProp::DisplayName => "displayname",
            BasicProp::GetEtag => "getetag",
            BasicProp::CreationDate => "creationdate",
            BasicProp::GetLastModified => "getlastmodified",
            BasicProp::GetContentType => "getcontenttype",
            BasicProp::GetContentLength => "getcontentlength",
            BasicProp::ResourceType => "resourcetype",
            BasicProp::Encoding => "encoding",
        }
    }

    pub fn from_name(name: &str) -> Option<BasicProp> {
        BASIC_PROPS.iter().copied().find(|p| p.as_str() == name)
    }

    /// Map a `DAV:` identity onto the vocabulary.
    pub fn from_identity(id: &PropIdentity) -> Option<BasicProp> {
        if id.is_dav() { BasicProp::from_name(&id.name) } else { None }
    }

    pub fn identity(&self) -> PropIdentity {
        PropIdentity::new(NS_DAV_URI, self.as_str())
    }
}

/// Basic property values, already formatted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicValues(pub BTreeMap<BasicProp, String>);

impl BasicValues {
    /// Derive the basic values from provider metadata.
    ///
    /// Timestamps are formatted per property: `creationdate` as RFC 3339,
    /// `getlastmodified` as an HTTP date.
    pub fn from_meta(name: &str, meta: &dyn DavMetaData) -> BasicValues {
        let mut v = BTreeMap::new();
        v.insert(BasicProp::DisplayName, name.to_string());
        if let Some(etag) = meta.etag() {
            v.insert(BasicProp::GetEtag, format!("\"{}\"", etag));
        }
        if let Ok(t) = meta.created() {
            v.insert(BasicProp::CreationDate, DavTime::from(t).to_rfc3339());
        }
        if let Ok(t) = meta.modified() {
            v.insert(BasicProp::GetLastModified, DavTime::from(t).to_httpdate());
        }
        if meta.is_dir() {
            v.insert(BasicProp::GetContentType, "httpd/unix-directory".to_string());
            v.insert(BasicProp::ResourceType, "collection".to_string());
        } else {
            let ct = meta
                .content_type()
                .unwrap_or_else(|| "application/octet-stream".to_string());
            v.insert(BasicProp::GetContentType, ct);
            v.insert(BasicProp::GetContentLength, meta.len().to_string());
            v.insert(BasicProp::ResourceType, String::new());
        }
        if let Some(enc) = meta.content_encoding() {
            v.insert(BasicProp::Encoding, enc);
        }
        BasicValues(v)
    }
}

/// What a PROPFIND asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PropRequest {
    /// All properties, with values.
    #[default]
    AllProp,
    /// All property names, values left empty.
    PropName,
    /// Just these.
    Prop(Vec<PropIdentity>),
}

/// The properties of one resource, ready to be rendered into a
/// multistatus response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavProperty {
    /// Client visible path.
    pub path: DavPath,
    pub is_collection: bool,
    pub basic_data: BTreeMap<BasicProp, String>,
    pub extra_data: BTreeMap<PropIdentity, String>,
    /// Requested but absent; each gets a 404 in the response.
    pub extra_not_found: Vec<PropIdentity>,
}

impl DavProperty {
    /// The href of this resource, percent-encoded, with a trailing
    /// slash for collections.
    pub fn href(&self) -> String {
        self.path.as_collection_url_string(self.is_collection)
    }
}

// Dead properties of a resource. A provider without property
// support simply has none.
async fn extra_props(provider: &dyn DavProvider, rel_path: &DavPath) -> DavResult<BTreeMap<PropIdentity, String>> {
    match provider.get_props(rel_path).await {
        Ok(props) => Ok(props
            .into_iter()
            .map(|p| (p.identity, p.value.unwrap_or_default()))
            .collect()),
        Err(FsError::NotImplemented) => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Merge basic values and the provider's extended properties.
///
/// `path` is what the client sees, `rel_path` is what the provider sees.
pub async fn compose(
    path: &DavPath,
    is_collection: bool,
    basic: BasicValues,
    request: &PropRequest,
    provider: &dyn DavProvider,
    rel_path: &DavPath,
) -> DavResult<DavProperty> {
    let mut prop = DavProperty {
        path: path.clone(),
        is_collection,
        basic_data: BTreeMap::new(),
        extra_data: BTreeMap::new(),
        extra_not_found: Vec::new(),
    };
    let BasicValues(mut basic) = basic;

    match request {
        PropRequest::AllProp => {
            prop.basic_data = basic;
            prop.extra_data = extra_props(provider, rel_path).await?;
        },
        PropRequest::PropName => {
            prop.basic_data = basic.into_keys().map(|k| (k, String::new())).collect();
            prop.extra_data = extra_props(provider, rel_path)
                .await?
                .into_keys()
                .map(|k| (k, String::new()))
                .collect();
        },
        PropRequest::Prop(wanted) => {
            let needs_extra = wanted.iter().any(|id| BasicProp::from_identity(id).is_none());
            let mut extra = if needs_extra {
                extra_props(provider, rel_path).await?
            } else {
                BTreeMap::new()
            };
            for id in wanted {
                if let Some(bp) = BasicProp::from_identity(id) {
                    if let Some(value) = basic.remove(&bp) {
                        prop.basic_data.insert(bp, value);
                        continue;
                    }
                    if prop.basic_data.contains_key(&bp) {
                        continue;
                    }
                } else if let Some(value) = extra.remove(id) {
                    prop.extra_data.insert(id.clone(), value);
                    continue;
                } else if prop.extra_data.contains_key(id) {
                    continue;
                }
                if !prop.extra_not_found.contains(id) {
                    prop.extra_not_found.push(id.clone());
                }
            }
        },
    }
    Ok(prop)
}

/// One PROPPATCH operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropPatch {
    pub identity: PropIdentity,
    /// New value for a set, ignored for a remove.
    pub value: String,
    /// `true` to set, `false` to remove.
    pub set: bool,
}

impl PropPatch {
    pub fn set(identity: PropIdentity, value: impl Into<String>) -> PropPatch {
        PropPatch {
            identity,
            value: value.into(),
            set: true,
        }
    }

    pub fn remove(identity: PropIdentity) -> PropPatch {
        PropPatch {
            identity,
            value: String::new(),
            set: false,
        }
    }
}

/// Outcome of a PROPPATCH, one status per operation in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropPatchResult {
    Applied(Vec<(PropIdentity, StatusCode)>),
    PartialFailure(Vec<(PropIdentity, StatusCode)>),
}

impl PropPatchResult {
    pub fn outcomes(&self) -> &[(PropIdentity, StatusCode)] {
        match self {
            PropPatchResult::Applied(v) | PropPatchResult::PartialFailure(v) => v,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PropPatchResult::Applied(_))
    }

    /// Status for one property.
    pub fn status_of(&self, id: &PropIdentity) -> Option<StatusCode> {
        self.outcomes().iter().find(|(i, _)| i == id).map(|(_, s)| *s)
    }
}

fn patch_status(e: FsError) -> StatusCode {
    match e {
        FsError::NotImplemented => StatusCode::FORBIDDEN,
        e => fserror_to_status(e),
    }
}

/// Apply patches one by one. A failing operation does not stop the
/// ones after it.
pub async fn apply_patch(rel_path: &DavPath, patches: Vec<PropPatch>, provider: &dyn DavProvider) -> PropPatchResult {
    let mut outcomes = Vec::with_capacity(patches.len());
    for patch in patches {
        let prop = DavProp {
            identity: patch.identity.clone(),
            value: if patch.set { Some(patch.value) } else { None },
        };
        let status = match provider.patch_props(rel_path, vec![(patch.set, prop)]).await {
            Ok(res) => res.first().map(|(s, _)| *s).unwrap_or(StatusCode::OK),
            Err(e) => patch_status(e),
        };
        trace!("proppatch {} {}: {}", rel_path, patch.identity, status);
        outcomes.push((patch.identity, status));
    }
    if outcomes.iter().all(|(_, s)| s.is_success()) {
        PropPatchResult::Applied(outcomes)
    } else {
        PropPatchResult::PartialFailure(outcomes)
    }
}
