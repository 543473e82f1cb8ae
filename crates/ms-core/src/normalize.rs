//! URL normalization
//!
//! One function, one policy snapshot: every write path (the bookmark-tree
//! walk) and every read path (queries) goes through [`normalize`], so keys
//! always compare under the same equivalence.
//!
//! Trailing-slash equivalence follows a single rule: with
//! `IGNORE_TRAILING_SLASH` set, trailing slashes never survive (stripped
//! before splitting and again after rebuilding); without it, the input's
//! slashes are preserved exactly.

use crate::policy::NormalizationPolicy;
use crate::url::{is_default_port, UrlParts};

/// Normalize a URL into its canonical comparison key.
///
/// Pure and deterministic. Input that does not split as `scheme://host...`
/// comes back unchanged apart from the case fold; normalization never
/// errors outward.
pub fn normalize(url: &str, policy: NormalizationPolicy) -> String {
    let trimmed = if policy.contains(NormalizationPolicy::IGNORE_TRAILING_SLASH) {
        url.trim_end_matches('/')
    } else {
        url
    };

    let parts = match UrlParts::split(trimmed) {
        Some(parts) => parts,
        None => {
            return if policy.contains(NormalizationPolicy::IGNORE_CASE) {
                url.to_ascii_lowercase()
            } else {
                url.to_string()
            };
        }
    };

    let scheme = if policy.contains(NormalizationPolicy::IGNORE_SCHEME)
        && parts.scheme.eq_ignore_ascii_case("http")
    {
        "https"
    } else {
        parts.scheme
    };

    let host = if policy.contains(NormalizationPolicy::IGNORE_WWW) {
        strip_www(parts.host)
    } else {
        parts.host
    };

    let path = if policy.contains(NormalizationPolicy::IGNORE_FORUM_REPLIES) {
        strip_reply_suffix(parts.path)
    } else {
        parts.path
    };

    let mut out = String::with_capacity(url.len());
    out.push_str(scheme);
    out.push_str("://");
    out.push_str(host);
    if let Some(port) = parts.port {
        // Default ports are dropped regardless of policy.
        if !is_default_port(port) {
            out.push(':');
            out.push_str(port);
        }
    }
    out.push_str(path);
    if let Some(query) = parts.query {
        out.push('?');
        out.push_str(query);
    }
    if !policy.contains(NormalizationPolicy::IGNORE_FRAGMENT) {
        if let Some(fragment) = parts.fragment {
            out.push('#');
            out.push_str(fragment);
        }
    }

    // Dropping a query or fragment can re-expose a trailing slash.
    if policy.contains(NormalizationPolicy::IGNORE_TRAILING_SLASH) {
        out.truncate(out.trim_end_matches('/').len());
    }
    if policy.contains(NormalizationPolicy::IGNORE_CASE) {
        out.make_ascii_lowercase();
    }
    out
}

/// Strip one leading `www.` label, case-insensitively.
#[inline]
fn strip_www(host: &str) -> &str {
    if host.len() > 4 && host[..4].eq_ignore_ascii_case("www.") {
        &host[4..]
    } else {
        host
    }
}

/// Drop the trailing reply index from paths of the exact shape
/// `/t/topic/<digits>/<digits>`, so reply anchors of one forum thread
/// collapse into the thread itself.
fn strip_reply_suffix(path: &str) -> &str {
    let rest = match path.strip_prefix("/t/topic/") {
        Some(rest) => rest,
        None => return path,
    };
    let mut segments = rest.split('/');
    let (topic, reply) = match (segments.next(), segments.next(), segments.next()) {
        (Some(topic), Some(reply), None) => (topic, reply),
        _ => return path,
    };
    if topic.is_empty() || reply.is_empty() {
        return path;
    }
    if !topic.bytes().all(|b| b.is_ascii_digit()) || !reply.bytes().all(|b| b.is_ascii_digit()) {
        return path;
    }
    &path[..path.len() - reply.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: NormalizationPolicy = NormalizationPolicy::all();

    #[test]
    fn test_default_policy_is_near_identity() {
        let policy = NormalizationPolicy::empty();
        assert_eq!(normalize("https://example.com/path", policy), "https://example.com/path");
        assert_eq!(normalize("https://example.com/path/", policy), "https://example.com/path/");
        assert_eq!(normalize("HTTP://Example.com/Path", policy), "HTTP://Example.com/Path");
    }

    #[test]
    fn test_default_policy_distinguishes_schemes() {
        let policy = NormalizationPolicy::empty();
        assert_ne!(normalize("http://a.com", policy), normalize("https://a.com", policy));
    }

    #[test]
    fn test_ignore_scheme_folds_http() {
        let policy = NormalizationPolicy::IGNORE_SCHEME;
        assert_eq!(
            normalize("http://a.com/x", policy),
            normalize("https://a.com/x", policy)
        );
        // Other schemes are left alone.
        assert_eq!(normalize("ftp://a.com/x", policy), "ftp://a.com/x");
    }

    #[test]
    fn test_ignore_case_folds_whole_string() {
        let policy = NormalizationPolicy::IGNORE_CASE;
        assert_eq!(
            normalize("HTTP://Example.com/Path", policy),
            normalize("http://example.com/path", policy)
        );
        // Whole-string fold: the path folds too, not just the host.
        assert_eq!(normalize("https://a.com/PaTh", policy), "https://a.com/path");
    }

    #[test]
    fn test_ignore_trailing_slash() {
        let policy = NormalizationPolicy::IGNORE_TRAILING_SLASH;
        assert_eq!(
            normalize("https://a.com/path/", policy),
            normalize("https://a.com/path", policy)
        );
        assert_eq!(
            normalize("https://a.com/", policy),
            normalize("https://a.com", policy)
        );
    }

    #[test]
    fn test_trailing_slash_restripped_after_fragment_drop() {
        let policy =
            NormalizationPolicy::IGNORE_TRAILING_SLASH | NormalizationPolicy::IGNORE_FRAGMENT;
        assert_eq!(normalize("https://a.com/path/#section", policy), "https://a.com/path");
    }

    #[test]
    fn test_ignore_www() {
        let policy = NormalizationPolicy::IGNORE_WWW;
        assert_eq!(
            normalize("https://www.example.com/x", policy),
            normalize("https://example.com/x", policy)
        );
        // Only a leading label, only once.
        assert_eq!(normalize("https://wwwexample.com/", policy), "https://wwwexample.com/");
        assert_eq!(
            normalize("https://www.www.example.com/", policy),
            "https://www.example.com/"
        );
    }

    #[test]
    fn test_ignore_fragment() {
        let policy = NormalizationPolicy::IGNORE_FRAGMENT;
        assert_eq!(
            normalize("https://a.com/p#section", policy),
            normalize("https://a.com/p", policy)
        );
    }

    #[test]
    fn test_default_ports_dropped_unconditionally() {
        let policy = NormalizationPolicy::empty();
        assert_eq!(normalize("http://a.com:80/x", policy), "http://a.com/x");
        assert_eq!(normalize("https://a.com:443/x", policy), "https://a.com/x");
        assert_eq!(normalize("https://a.com:8443/x", policy), "https://a.com:8443/x");
    }

    #[test]
    fn test_forum_reply_suffix() {
        let policy = NormalizationPolicy::IGNORE_FORUM_REPLIES;
        assert_eq!(
            normalize("https://forum.example.com/t/topic/1234/56", policy),
            "https://forum.example.com/t/topic/1234"
        );
        // Shape must match exactly: no reply segment, extra segments, or
        // non-numeric segments are left alone.
        assert_eq!(
            normalize("https://forum.example.com/t/topic/1234", policy),
            "https://forum.example.com/t/topic/1234"
        );
        assert_eq!(
            normalize("https://forum.example.com/t/topic/1234/56/7", policy),
            "https://forum.example.com/t/topic/1234/56/7"
        );
        assert_eq!(
            normalize("https://forum.example.com/t/topic/abc/56", policy),
            "https://forum.example.com/t/topic/abc/56"
        );
        // Off by default.
        assert_eq!(
            normalize("https://forum.example.com/t/topic/1234/56", NormalizationPolicy::empty()),
            "https://forum.example.com/t/topic/1234/56"
        );
    }

    #[test]
    fn test_query_preserved() {
        assert_eq!(
            normalize("https://a.com/search?q=rust&page=2", ALL),
            "https://a.com/search?q=rust&page=2"
        );
    }

    #[test]
    fn test_unsplittable_falls_back() {
        assert_eq!(normalize("not a url", NormalizationPolicy::empty()), "not a url");
        assert_eq!(normalize("Not A URL", NormalizationPolicy::IGNORE_CASE), "not a url");
        assert_eq!(
            normalize("mailto:Someone@Example.com", NormalizationPolicy::IGNORE_CASE),
            "mailto:someone@example.com"
        );
    }

    #[test]
    fn test_idempotent_under_all_policies() {
        let urls = [
            "https://www.Example.com:443/Path/?q=1#Frag",
            "http://a.com/t/topic/99/3/",
            "https://a.com",
            "http://a.com:8080/x/",
            "no scheme here",
        ];
        // Every single-flag policy, the empty policy and the full set.
        let mut policies = vec![NormalizationPolicy::empty(), ALL];
        policies.extend(ALL.iter());

        for policy in policies {
            for url in urls {
                let once = normalize(url, policy);
                let twice = normalize(&once, policy);
                assert_eq!(once, twice, "not idempotent for {:?} under {:?}", url, policy);
            }
        }
    }
}
