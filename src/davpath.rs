//! Utility module to handle the path part of an URL as a normalized,
//! absolute path.
//!
//! A [`DavPath`] is a root marker plus a list of non-empty segments. It never
//! contains `.` or `..` segments, and its string form never ends in a slash
//! (except for the root itself).
use std::error::Error;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// A normalized absolute path.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct DavPath {
    segments: Vec<String>,
}

// Encode all non-unreserved characters (RFC3986). The separator is
// added between segments, never encoded.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Error returned by some of the DavPath methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// cannot parse, or too many dotdots.
    InvalidPath,
    /// not below the given ancestor.
    IllegalPath,
}

impl Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ParseError::InvalidPath => write!(f, "invalid path"),
            ParseError::IllegalPath => write!(f, "path outside of prefix"),
        }
    }
}

impl std::fmt::Display for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.segments {
            write!(f, "/{}", seg)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "DavPath({:?})", self.to_string())
    }
}

/// Ordering is lexicographic over the canonical string form.
impl Ord for DavPath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical_bytes().cmp(other.canonical_bytes())
    }
}

impl PartialOrd for DavPath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for DavPath {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DavPath::new(s)
    }
}

// a decoded segment can contain any value except '/' or '\0'
fn valid_segment(seg: &str) -> Result<(), ParseError> {
    if seg.chars().any(|c| c == '\0' || c == '/') {
        return Err(ParseError::InvalidPath);
    }
    Ok(())
}

impl DavPath {
    /// The root path, `/`.
    pub fn root() -> DavPath {
        DavPath { segments: Vec::new() }
    }

    /// Parse an (already decoded) absolute path.
    ///
    /// Empty and `.` segments are dropped, `..` removes the previous
    /// segment. Going above the root is an error.
    pub fn new(raw: &str) -> Result<DavPath, ParseError> {
        if !raw.starts_with('/') {
            return Err(ParseError::InvalidPath);
        }
        let mut segments: Vec<String> = Vec::new();
        for seg in raw.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(ParseError::InvalidPath);
                    }
                }
                s => {
                    valid_segment(s)?;
                    segments.push(s.to_string());
                }
            }
        }
        Ok(DavPath { segments })
    }

    /// From the (percent-encoded) path part of a request URI.
    ///
    /// The query part is removed, fragments are refused. Segments are
    /// decoded after splitting, so an encoded `%2F` can never introduce
    /// an extra level.
    pub fn from_uri_path(raw: &str) -> Result<DavPath, ParseError> {
        // must consist of printable ASCII
        if raw.bytes().any(|b| !(32..=126).contains(&b)) {
            return Err(ParseError::InvalidPath);
        }
        let mut rawpath = raw;
        if let Some(pos) = rawpath.find(['?', '#']) {
            if rawpath[pos..].starts_with('#') {
                return Err(ParseError::InvalidPath);
            }
            rawpath = &rawpath[..pos];
        }
        if !rawpath.starts_with('/') {
            return Err(ParseError::InvalidPath);
        }
        let mut segments: Vec<String> = Vec::new();
        for seg in rawpath.split('/') {
            let seg = percent_decode_str(seg)
                .decode_utf8()
                .map_err(|_| ParseError::InvalidPath)?;
            match seg.as_ref() {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(ParseError::InvalidPath);
                    }
                }
                s => {
                    valid_segment(s)?;
                    segments.push(s.to_string());
                }
            }
        }
        Ok(DavPath { segments })
    }

    /// From the value of a `Destination:` header, which is either an
    /// absolute URL or an absolute path.
    pub fn from_destination(dest: &str) -> Result<DavPath, ParseError> {
        match url::Url::parse(dest) {
            Ok(url) => DavPath::from_uri_path(url.path()),
            Err(url::ParseError::RelativeUrlWithoutBase) => DavPath::from_uri_path(dest),
            Err(_) => Err(ParseError::InvalidPath),
        }
    }

    fn canonical_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.segments
            .iter()
            .flat_map(|s| std::iter::once(b'/').chain(s.bytes()))
    }

    /// Is this the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segments, without separators.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Count the number of segments the path has. "/" has 0.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Drop the last segment. The root has no parent.
    pub fn parent(&self) -> Result<DavPath, ParseError> {
        match self.segments.split_last() {
            Some((_, rest)) => Ok(DavPath {
                segments: rest.to_vec(),
            }),
            None => Err(ParseError::InvalidPath),
        }
    }

    /// The last segment, or "/" for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(|s| s.as_str()).unwrap_or("/")
    }

    /// Is `self` a prefix (segment-wise) of `other`.
    pub fn is_ancestor_or_self(&self, other: &DavPath) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Strip `ancestor` off the front of this path.
    ///
    /// `/a/b/c` relative to `/a` is `/b/c`.
    pub fn child_relative_to(&self, ancestor: &DavPath) -> Result<DavPath, ParseError> {
        if !ancestor.is_ancestor_or_self(self) {
            return Err(ParseError::IllegalPath);
        }
        Ok(DavPath {
            segments: self.segments[ancestor.segments.len()..].to_vec(),
        })
    }

    /// Append a single raw segment (a file name from a listing, a user
    /// name). Separators and `..` are stripped out of it first.
    pub fn add_child(&self, raw: &str) -> Result<DavPath, ParseError> {
        let seg = raw.replace('/', "").replace("..", "");
        if seg.is_empty() || seg == "." {
            return Err(ParseError::InvalidPath);
        }
        valid_segment(&seg)?;
        let mut segments = self.segments.clone();
        segments.push(seg);
        Ok(DavPath { segments })
    }

    /// Append another path.
    pub fn join(&self, rel: &DavPath) -> DavPath {
        let mut segments = self.segments.clone();
        segments.extend(rel.segments.iter().cloned());
        DavPath { segments }
    }

    /// Insert a segment directly after `prefix`. Used to rewrite home
    /// directory paths: `/~/foo` with `/~` and `alice` becomes `/~/alice/foo`.
    pub(crate) fn insert_after(&self, prefix: &DavPath, raw: &str) -> Result<DavPath, ParseError> {
        let rel = self.child_relative_to(prefix)?;
        Ok(prefix.add_child(raw)?.join(&rel))
    }

    /// Iterate over this path and all of its ancestors, from the root down.
    pub fn ancestors_and_self(&self) -> impl Iterator<Item = DavPath> + '_ {
        (0..=self.segments.len()).map(move |n| DavPath {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// As URL encoded string.
    pub fn as_url_string(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut s = String::new();
        for seg in &self.segments {
            s.push('/');
            s.extend(utf8_percent_encode(seg, SEGMENT_ENCODE_SET));
        }
        s
    }

    /// As URL encoded string, with a trailing slash if this is a collection.
    pub fn as_collection_url_string(&self, is_collection: bool) -> String {
        let mut s = self.as_url_string();
        if is_collection && !self.is_root() {
            s.push('/');
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> DavPath {
        DavPath::new(s).unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(p("/a//b/./c/").to_string(), "/a/b/c");
        assert_eq!(p("/a/b/../c").to_string(), "/a/c");
        assert_eq!(p("/").to_string(), "/");
        assert_eq!(p("/a/..").to_string(), "/");
        assert!(p("/").is_root());
    }

    #[test]
    fn test_invalid() {
        assert_eq!(DavPath::new("a/b"), Err(ParseError::InvalidPath));
        assert_eq!(DavPath::new(""), Err(ParseError::InvalidPath));
        assert_eq!(DavPath::new("/.."), Err(ParseError::InvalidPath));
        assert_eq!(DavPath::new("/a/../.."), Err(ParseError::InvalidPath));
        assert_eq!(DavPath::new("/a\0b"), Err(ParseError::InvalidPath));
    }

    #[test]
    fn test_roundtrip() {
        for s in ["/", "/a", "/a/b c/d", "/x/y/z/w", "/~/alice"] {
            let path = p(s);
            assert_eq!(DavPath::new(&path.to_string()).unwrap(), path);
        }
    }

    #[test]
    fn test_dotdot_is_parent() {
        for s in ["/a", "/a/b", "/a/b/c"] {
            let path = p(s);
            let up = DavPath::new(&format!("{}/..", path)).unwrap();
            assert_eq!(up, path.parent().unwrap());
        }
        assert!(DavPath::new(&format!("{}/..", DavPath::root())).is_err());
        assert!(DavPath::root().parent().is_err());
    }

    #[test]
    fn test_name() {
        assert_eq!(p("/a/b").name(), "b");
        assert_eq!(DavPath::root().name(), "/");
    }

    #[test]
    fn test_ancestry() {
        let a = p("/a");
        let ab = p("/a/b");
        let abc = p("/abc");
        assert!(a.is_ancestor_or_self(&ab));
        assert!(a.is_ancestor_or_self(&a));
        assert!(!a.is_ancestor_or_self(&abc));
        assert!(!ab.is_ancestor_or_self(&a));
        assert!(DavPath::root().is_ancestor_or_self(&abc));

        assert_eq!(p("/a/b/c").child_relative_to(&a).unwrap(), p("/b/c"));
        assert_eq!(a.child_relative_to(&a).unwrap(), DavPath::root());
        assert_eq!(abc.child_relative_to(&a), Err(ParseError::IllegalPath));
    }

    #[test]
    fn test_add_child_sanitizes() {
        let a = p("/a");
        assert_eq!(a.add_child("b").unwrap(), p("/a/b"));
        assert_eq!(a.add_child("../etc").unwrap(), p("/a/etc"));
        assert_eq!(a.add_child("x/y").unwrap(), p("/a/xy"));
        assert!(a.add_child("..").is_err());
        assert!(a.add_child("/").is_err());
    }

    #[test]
    fn test_insert_after() {
        let home = p("/~");
        assert_eq!(
            p("/~/foo").insert_after(&home, "alice").unwrap(),
            p("/~/alice/foo")
        );
        assert_eq!(p("/~").insert_after(&home, "bob").unwrap(), p("/~/bob"));
    }

    #[test]
    fn test_uri_path() {
        assert_eq!(DavPath::from_uri_path("/a%20b/c?x=1").unwrap(), p("/a b/c"));
        assert!(DavPath::from_uri_path("/a%2Fb").is_err());
        assert!(DavPath::from_uri_path("/a#frag").is_err());
        assert!(DavPath::from_uri_path("/%2e%2e").is_err());
        assert_eq!(
            DavPath::from_destination("http://localhost:4918/dst/f%C3%A9").unwrap(),
            p("/dst/fé")
        );
        assert_eq!(DavPath::from_destination("/dst/x").unwrap(), p("/dst/x"));
    }

    #[test]
    fn test_url_string() {
        assert_eq!(p("/a b/é").as_url_string(), "/a%20b/%C3%A9");
        assert_eq!(p("/dir").as_collection_url_string(true), "/dir/");
        assert_eq!(DavPath::root().as_collection_url_string(true), "/");
    }

    #[test]
    fn test_ordering() {
        let mut v = vec![p("/b"), p("/a/b"), p("/"), p("/a"), p("/a b")];
        v.sort();
        let s: Vec<String> = v.iter().map(|p| p.to_string()).collect();
        let mut expected = s.clone();
        expected.sort();
        assert_eq!(s, expected);
        assert_eq!(s[0], "/");
    }
}
