//! A WebDAV (RFC4918) gateway engine.
//!
//! This crate is the layer between a decoded HTTP request and the storage
//! backends behind it. It does not speak HTTP or XML itself; it takes a
//! [`DavRequest`] and produces a [`DavResponse`] (or a [`DavError`] that
//! maps onto a status code).
//!
//! What it does:
//!
//! - routes every request to one of several mounted providers, by longest
//!   prefix, with optional per-account home directories
//! - checks the account's `+prefix` / `-prefix` permission rules
//! - keeps the lock table: exclusive and shared locks, depth, expiry
//! - merges basic metadata and dead properties for PROPFIND, and applies
//!   PROPPATCH with a status per property
//!
//! You supply the providers (see [`fs::DavProvider`]). Included are:
//!
//! - memfs: ephemeral in-memory provider. supports dead properties.
//! - memls: ephemeral in-memory locksystem.
//!
//! ```no_run
//! use davgate::{DavConfig, DavMount, DavRequest, DavMethod};
//! use davgate::{account::DavAccount, memfs::MemFs};
//!
//! # async fn example() -> davgate::DavResult<()> {
//! let dav = DavConfig::new()
//!     .mount(DavMount::new("/", "memory:///", MemFs::new()))
//!     .mount(DavMount::new("/~", "memory:///home", MemFs::new()).home_dir(true))
//!     .default_account(DavAccount::new("guest", ["+/", "-/private"])?)
//!     .build_handler()?;
//!
//! let account = dav.account(None)?;
//! let req = DavRequest::new(DavMethod::MkCol, "/shared");
//! let resp = dav.handle(&req, &account).await?;
//! println!("{}", resp.status());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;

mod davheaders;
mod distributor;
mod errors;
mod handle_copymove;
mod handle_delete;
mod handle_gethead;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;
mod request;
mod tree;
mod util;

pub mod account;
pub mod davpath;
pub mod davtime;
pub mod fs;
pub mod ls;
#[cfg(any(docsrs, feature = "memfs"))]
#[cfg_attr(docsrs, doc(cfg(feature = "memfs")))]
pub mod memfs;
pub mod memls;
pub mod props;

pub use crate::davheaders::{DavTimeout, Destination, IfTokens, LockToken, Overwrite, Timeout};
pub use crate::distributor::{DavConfig, DavMount, DavPassport, DavRoute, Distributor};
pub use crate::errors::{DavError, DavResult};
pub use crate::request::{DavRequest, DavResponse, LockInfo};
pub use crate::util::{DavMethod, DavMethodSet, Depth};
