//! Typed versions of the WebDAV request headers the distributor reads.
use headers::Header;
use http::header::{HeaderName, HeaderValue};

use crate::util::Depth;

pub static DEPTH: HeaderName = HeaderName::from_static("depth");
pub static TIMEOUT: HeaderName = HeaderName::from_static("timeout");
pub static OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
pub static DESTINATION: HeaderName = HeaderName::from_static("destination");
pub static LOCK_TOKEN: HeaderName = HeaderName::from_static("lock-token");
pub static IF: HeaderName = HeaderName::from_static("if");
pub static DAV: HeaderName = HeaderName::from_static("dav");

// helper.
fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(invalid)?;
    if values.next().is_some() {
        Err(invalid())
    } else {
        Ok(v)
    }
}

// helper
fn invalid() -> headers::Error {
    headers::Error::invalid()
}

// helper
fn map_invalid(_e: impl std::error::Error) -> headers::Error {
    headers::Error::invalid()
}

fn encode_str<E: Extend<HeaderValue>>(s: &str, values: &mut E) {
    if let Ok(value) = HeaderValue::from_str(s) {
        values.extend(std::iter::once(value));
    }
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?.to_str().map_err(map_invalid)?;
        Depth::parse(value).ok_or_else(invalid)
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "Infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavTimeout {
    Seconds(u32),
    Infinite,
}

/// `Timeout:` header, the client's preferences in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeout(pub Vec<DavTimeout>);

impl Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        let mut v = Vec::new();
        for word in value.to_str().map_err(map_invalid)?.split(',') {
            let word = word.trim();
            let w = match word {
                "Infinite" => DavTimeout::Infinite,
                _ => match word.strip_prefix("Second-") {
                    Some(num) => DavTimeout::Seconds(num.parse::<u32>().map_err(map_invalid)?),
                    None => return Err(invalid()),
                },
            };
            v.push(w);
        }
        Ok(Timeout(v))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let words: Vec<String> = self
            .0
            .iter()
            .map(|t| match t {
                DavTimeout::Seconds(n) => format!("Second-{}", n),
                DavTimeout::Infinite => "Infinite".to_string(),
            })
            .collect();
        encode_str(&words.join(", "), values);
    }
}

/// `Destination:` header, as sent (absolute URL or absolute path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?;
        if s.is_empty() {
            return Err(invalid());
        }
        Ok(Destination(s.to_string()))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        encode_str(&self.0, values);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let line = one(values)?;
        match line.as_bytes() {
            b"F" => Ok(Overwrite(false)),
            b"T" => Ok(Overwrite(true)),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = if self.0 { "T" } else { "F" };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// `Lock-Token:` header. The angle brackets are stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub String);

impl Header for LockToken {
    fn name() -> &'static HeaderName {
        &LOCK_TOKEN
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(map_invalid)?.trim();
        let s = s
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(s);
        if s.is_empty() {
            return Err(invalid());
        }
        Ok(LockToken(s.to_string()))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        encode_str(&format!("<{}>", self.0), values);
    }
}

/// The state tokens submitted in an `If:` header.
///
/// Only the tokens are kept: resource tags and entity tags are
/// skipped, as are tokens under `Not`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfTokens(pub Vec<String>);

// scan up to and including `close`, return the part in between.
fn scan_until(buf: &str, close: char) -> Result<(&str, &str), headers::Error> {
    let end = buf.find(close).ok_or_else(invalid)?;
    Ok((&buf[..end], &buf[end + close.len_utf8()..]))
}

impl Header for IfTokens {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let mut input = one(values)?.to_str().map_err(map_invalid)?;
        let mut tokens = Vec::new();
        let mut in_list = false;
        let mut not = false;
        let mut seen_list = false;

        loop {
            input = input.trim_start();
            let mut chars = input.chars();
            let Some(c) = chars.next() else { break };
            match c {
                '(' if !in_list => {
                    in_list = true;
                    seen_list = true;
                    input = chars.as_str();
                },
                ')' if in_list => {
                    in_list = false;
                    not = false;
                    input = chars.as_str();
                },
                '<' => {
                    let (tok, rest) = scan_until(chars.as_str(), '>')?;
                    if in_list && !not && !tokens.iter().any(|t| t == tok) {
                        tokens.push(tok.to_string());
                    }
                    not = false;
                    input = rest;
                },
                '[' if in_list => {
                    let (_etag, rest) = scan_until(chars.as_str(), ']')?;
                    not = false;
                    input = rest;
                },
                'N' if in_list && input.starts_with("Not") => {
                    not = true;
                    input = &input[3..];
                },
                _ => return Err(invalid()),
            }
        }
        if in_list || !seen_list {
            return Err(invalid());
        }
        Ok(IfTokens(tokens))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let lists: Vec<String> = self.0.iter().map(|t| format!("(<{}>)", t)).collect();
        encode_str(&lists.join(" "), values);
    }
}
