//! Requests into, and responses out of, the distributor.
//!
//! These stand in for the HTTP layer: a `DavRequest` carries what the
//! distributor needs from the request line, the WebDAV headers and the
//! already decoded body, a `DavResponse` what it produced.
use std::time::Duration;

use bytes::Bytes;
use headers::HeaderMapExt;
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::DavResult;
use crate::davheaders::{self, DavTimeout};
use crate::errors::DavError;
use crate::ls::{DavLock, LockScope};
use crate::props::{BasicProp, DavProperty, PropPatch, PropPatchResult, PropRequest};
use crate::util::{DavMethod, DavMethodSet, Depth};

/// The `lockinfo` of a LOCK request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub scope: LockScope,
    pub owner: String,
}

/// One request, decoded.
#[derive(Debug, Clone)]
pub struct DavRequest {
    pub method: DavMethod,
    /// Request path as sent, still percent-encoded.
    pub path: String,
    /// `Destination:` (COPY/MOVE).
    pub destination: Option<String>,
    /// `Depth:`; each method has its own default.
    pub depth: Option<Depth>,
    /// `Overwrite:`, defaults to true.
    pub overwrite: bool,
    /// Tokens submitted in `If:`.
    pub lock_tokens: Vec<String>,
    /// `Lock-Token:` (UNLOCK).
    pub lock_token: Option<String>,
    /// `Timeout:`, `None` means as long as allowed.
    pub timeout: Option<Duration>,
    /// LOCK body; absent for a refresh.
    pub lock_info: Option<LockInfo>,
    /// PROPFIND body.
    pub propfind: PropRequest,
    /// PROPPATCH body.
    pub patches: Vec<PropPatch>,
    /// PUT body.
    pub body: Bytes,
}

impl DavRequest {
    pub fn new(method: DavMethod, path: impl Into<String>) -> DavRequest {
        DavRequest {
            method,
            path: path.into(),
            destination: None,
            depth: None,
            overwrite: true,
            lock_tokens: Vec::new(),
            lock_token: None,
            timeout: None,
            lock_info: None,
            propfind: PropRequest::AllProp,
            patches: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Build a request from an HTTP method, request path and headers.
    ///
    /// The XML bodies of PROPFIND, PROPPATCH and LOCK are not parsed
    /// here; set them with [`propfind`](Self::propfind),
    /// [`patch`](Self::patch) and [`lock_info`](Self::lock_info).
    pub fn from_http(method: &http::Method, path: &str, headers: &HeaderMap) -> DavResult<DavRequest> {
        let method = DavMethod::try_from(method)?;
        let mut req = DavRequest::new(method, path);

        let bad = |_| DavError::Status(StatusCode::BAD_REQUEST);
        req.depth = headers.typed_try_get::<Depth>().map_err(bad)?;
        req.destination = headers
            .typed_try_get::<davheaders::Destination>()
            .map_err(bad)?
            .map(|d| d.0);
        if let Some(o) = headers.typed_try_get::<davheaders::Overwrite>().map_err(bad)? {
            req.overwrite = o.0;
        }
        if let Some(t) = headers.typed_try_get::<davheaders::Timeout>().map_err(bad)? {
            req.timeout = match t.0.first() {
                Some(DavTimeout::Seconds(n)) => Some(Duration::from_secs(*n as u64)),
                _ => None,
            };
        }
        if let Some(t) = headers.typed_try_get::<davheaders::IfTokens>().map_err(bad)? {
            req.lock_tokens.extend(t.0);
        }
        req.lock_token = headers
            .typed_try_get::<davheaders::LockToken>()
            .map_err(bad)?
            .map(|t| t.0);
        Ok(req)
    }

    pub fn destination(mut self, dest: impl Into<String>) -> Self {
        self.destination = Some(dest.into());
        self
    }

    pub fn depth(mut self, depth: Depth) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Submit a lock token, as `If:` does.
    pub fn if_token(mut self, token: impl Into<String>) -> Self {
        self.lock_tokens.push(token.into());
        self
    }

    /// The token to UNLOCK.
    pub fn lock_token(mut self, token: impl Into<String>) -> Self {
        self.lock_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn lock_info(mut self, scope: LockScope, owner: impl Into<String>) -> Self {
        self.lock_info = Some(LockInfo {
            scope,
            owner: owner.into(),
        });
        self
    }

    pub fn propfind(mut self, request: PropRequest) -> Self {
        self.propfind = request;
        self
    }

    pub fn patch(mut self, patch: PropPatch) -> Self {
        self.patches.push(patch);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// What the distributor produced for a request.
#[derive(Debug, Clone)]
pub enum DavResponse {
    /// OPTIONS: the methods allowed here.
    Options(DavMethodSet),
    /// GET/HEAD on a resource. No body for HEAD.
    Content { props: DavProperty, body: Option<Bytes> },
    /// GET on a collection: the collection and its members, sorted.
    Listing { props: DavProperty, members: Vec<DavProperty> },
    /// PROPFIND.
    MultiStatus(Vec<DavProperty>),
    /// PROPPATCH.
    PropPatch(PropPatchResult),
    Created,
    NoContent,
    /// LOCK. `created` is set if the LOCK created the resource.
    LockGranted { lock: DavLock, created: bool },
    /// LOCK without lockinfo.
    LockRefreshed(DavLock),
    Unlocked,
}

impl DavResponse {
    /// The HTTP status that goes with this response.
    pub fn status(&self) -> StatusCode {
        match self {
            DavResponse::Options(_) => StatusCode::OK,
            DavResponse::Content { .. } => StatusCode::OK,
            DavResponse::Listing { .. } => StatusCode::OK,
            DavResponse::MultiStatus(_) => StatusCode::MULTI_STATUS,
            DavResponse::PropPatch(_) => StatusCode::MULTI_STATUS,
            DavResponse::Created => StatusCode::CREATED,
            DavResponse::NoContent => StatusCode::NO_CONTENT,
            DavResponse::LockGranted { created: true, .. } => StatusCode::CREATED,
            DavResponse::LockGranted { .. } => StatusCode::OK,
            DavResponse::LockRefreshed(_) => StatusCode::OK,
            DavResponse::Unlocked => StatusCode::NO_CONTENT,
        }
    }

    /// Response headers that follow from the response itself.
    pub fn headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        match self {
            DavResponse::Options(allowed) => {
                h.insert(davheaders::DAV.clone(), HeaderValue::from_static("1,2"));
                h.typed_insert(
                    allowed
                        .methods()
                        .iter()
                        .filter_map(|m| http::Method::from_bytes(m.as_str().as_bytes()).ok())
                        .collect::<headers::Allow>(),
                );
            },
            DavResponse::Content { props, body } => {
                let basic = &props.basic_data;
                let value = |bp: BasicProp| basic.get(&bp).and_then(|v| HeaderValue::from_str(v).ok());
                if let Some(v) = value(BasicProp::GetEtag) {
                    h.insert(http::header::ETAG, v);
                }
                if let Some(v) = value(BasicProp::GetLastModified) {
                    h.insert(http::header::LAST_MODIFIED, v);
                }
                if let Some(v) = value(BasicProp::GetContentType) {
                    h.insert(http::header::CONTENT_TYPE, v);
                }
                let len = match body {
                    Some(b) => Some(b.len() as u64),
                    None => basic
                        .get(&BasicProp::GetContentLength)
                        .and_then(|v| v.parse().ok()),
                };
                if let Some(len) = len {
                    h.typed_insert(headers::ContentLength(len));
                }
            },
            DavResponse::LockGranted { lock, .. } => {
                h.typed_insert(davheaders::LockToken(lock.token.clone()));
            },
            _ => {},
        }
        h
    }
}
