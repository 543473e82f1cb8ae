//! URL component splitting
//!
//! Slice-based scanning without allocations: the normalizer decides what to
//! rebuild, this module only finds component boundaries. Deliberately not a
//! full URL parser: anything without a `scheme://host` shape is reported as
//! unsplittable and the caller falls back to the raw string.

/// Component slices of a URL.
///
/// `path` keeps its leading `/` and may be empty (no path is distinct from a
/// root path). `query` and `fragment` exclude their `?`/`#` markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlParts<'a> {
    pub scheme: &'a str,
    pub host: &'a str,
    pub port: Option<&'a str>,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub fragment: Option<&'a str>,
}

impl<'a> UrlParts<'a> {
    /// Split a URL into its components.
    ///
    /// Returns `None` when there is no `scheme://host` shape to split.
    pub fn split(url: &'a str) -> Option<Self> {
        let scheme_end = scheme_end(url)?;
        let scheme = &url[..scheme_end - 3];
        let bytes = url.as_bytes();

        // Authority runs to the first of '/', '?', '#'
        let mut authority_end = url.len();
        for (i, &b) in bytes[scheme_end..].iter().enumerate() {
            if b == b'/' || b == b'?' || b == b'#' {
                authority_end = scheme_end + i;
                break;
            }
        }

        let mut authority = &url[scheme_end..authority_end];

        // Skip userinfo
        if let Some(at) = authority.find('@') {
            authority = &authority[at + 1..];
        }

        let (host, port) = match authority.find(':') {
            Some(colon) => (&authority[..colon], Some(&authority[colon + 1..])),
            None => (authority, None),
        };
        if host.is_empty() {
            return None;
        }

        let rest = &url[authority_end..];
        let (before_fragment, fragment) = match rest.find('#') {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };
        let (path, query) = match before_fragment.find('?') {
            Some(pos) => (&before_fragment[..pos], Some(&before_fragment[pos + 1..])),
            None => (before_fragment, None),
        };

        Some(Self {
            scheme,
            host,
            port,
            path,
            query,
            fragment,
        })
    }
}

/// Position just past `://`, or None if the URL has no such prefix.
#[inline]
fn scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();
    let colon = bytes.iter().position(|&b| b == b':')?;
    if colon == 0 || !bytes[0].is_ascii_alphabetic() {
        return None;
    }
    if !bytes[..colon]
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'-' || *b == b'.')
    {
        return None;
    }
    if bytes.len() > colon + 2 && bytes[colon + 1] == b'/' && bytes[colon + 2] == b'/' {
        Some(colon + 3)
    } else {
        None
    }
}

/// Ports dropped during normalization regardless of policy.
#[inline]
pub fn is_default_port(port: &str) -> bool {
    port == "80" || port == "443"
}
