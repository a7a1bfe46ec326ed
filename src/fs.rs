//! Contains the structs and traits that define a storage `provider`.
//!
//! A provider serves one mounted sub-tree of the namespace. It only ever
//! sees paths relative to its mount point. The methods return futures, as
//! a provider will usually do I/O.
use std::fmt::Debug;
use std::time::SystemTime;

use bytes::Bytes;
use dyn_clone::{DynClone, clone_trait_object};
use futures_util::future::{self, BoxFuture, FutureExt};
use http::StatusCode;

use crate::davpath::DavPath;
use crate::davtime::DavTime;

macro_rules! notimplemented {
    ($method:expr) => {
        future::ready(Err(FsError::NotImplemented)).boxed()
    };
}

/// Errors generated by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotImplemented,
    GeneralFailure,
    Exists,
    NotFound,
    Forbidden,
    InsufficientStorage,
    TooLarge,
}

/// The Result type.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Future returned by almost all of the DavProvider methods.
pub type FsFuture<'a, T> = BoxFuture<'a, FsResult<T>>;

/// Identity of a dead (extended) property: namespace plus local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropIdentity {
    pub namespace: String,
    pub name: String,
}

impl PropIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> PropIdentity {
        PropIdentity {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Is this a property in the `DAV:` namespace.
    pub fn is_dav(&self) -> bool {
        self.namespace == crate::props::NS_DAV_URI
    }
}

impl std::fmt::Display for PropIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.name)
    }
}

/// A property and (optionally) its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavProp {
    pub identity: PropIdentity,
    pub value: Option<String>,
}

/// The trait that defines a storage provider.
///
/// Only `metadata`, `read_dir` and `read` are required; a provider that
/// does not implement the rest is effectively read-only.
pub trait DavProvider: Debug + Send + Sync + DynClone {
    /// Return the metadata of a file or directory.
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>>;

    /// List the entries of a directory.
    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<Box<dyn DavDirEntry>>>;

    /// Read the content of a file.
    fn read<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Bytes>;

    /// Create or replace the content of a file.
    #[allow(unused_variables)]
    fn write<'a>(&'a self, path: &'a DavPath, data: Bytes) -> FsFuture<'a, ()> {
        notimplemented!("write")
    }

    /// Create a directory. The parent must exist.
    #[allow(unused_variables)]
    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        notimplemented!("create_dir")
    }

    /// Remove a file, or a directory and everything below it.
    #[allow(unused_variables)]
    fn remove<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        notimplemented!("remove")
    }

    /// Rename a file or directory. An existing destination is replaced.
    #[allow(unused_variables)]
    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        notimplemented!("rename")
    }

    /// Copy a single file, including its dead properties.
    #[allow(unused_variables)]
    fn copy<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        notimplemented!("copy")
    }

    /// Return all dead properties of a resource.
    #[allow(unused_variables)]
    fn get_props<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<DavProp>> {
        notimplemented!("get_props")
    }

    /// Set (`true`) or remove (`false`) dead properties. Returns a
    /// status for every property in the patch.
    #[allow(unused_variables)]
    fn patch_props<'a>(
        &'a self,
        path: &'a DavPath,
        patch: Vec<(bool, DavProp)>,
    ) -> FsFuture<'a, Vec<(StatusCode, DavProp)>> {
        notimplemented!("patch_props")
    }
}

clone_trait_object! {DavProvider}

/// One entry of a directory listing.
pub trait DavDirEntry: Debug + Send + Sync {
    /// Name of the entry.
    fn name(&self) -> String;

    /// Metadata of the entry.
    fn metadata(&self) -> FsResult<Box<dyn DavMetaData>>;

    /// Default is to call metadata() and return `is_dir()`.
    fn is_dir(&self) -> FsResult<bool> {
        Ok(self.metadata()?.is_dir())
    }
}

/// File or directory metadata.
pub trait DavMetaData: Debug + Send + Sync + DynClone {
    /// Size of the file.
    fn len(&self) -> u64;
    /// `Modified` timestamp.
    fn modified(&self) -> FsResult<SystemTime>;
    /// File or directory (aka collection).
    fn is_dir(&self) -> bool;

    /// Simplistic implementation of `etag()`, apache style.
    fn etag(&self) -> Option<String> {
        let t = self.modified().ok()?;
        let t = DavTime::from(t).unix_micros();
        if self.is_dir() {
            Some(format!("{:x}", t))
        } else {
            Some(format!("{:x}-{:x}", self.len(), t))
        }
    }

    /// Is this a file and not a directory.
    fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Creation time.
    fn created(&self) -> FsResult<SystemTime> {
        Err(FsError::NotImplemented)
    }

    /// Content type, if the provider knows it.
    fn content_type(&self) -> Option<String> {
        None
    }

    /// Content encoding (charset), if the provider knows it.
    fn content_encoding(&self) -> Option<String> {
        None
    }
}

clone_trait_object! {DavMetaData}

impl std::error::Error for FsError {}

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
