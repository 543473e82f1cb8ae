//! Normalization policy flags
//!
//! The policy decides which URL differences are ignored when computing
//! comparison keys. It is loaded once per session; any change invalidates
//! every derived structure, so the cache layer forces a full rebuild on
//! reload.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// URL equivalence policy applied by [`normalize`](crate::normalize).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NormalizationPolicy: u8 {
        /// Fold `http` to `https` for comparison purposes.
        const IGNORE_SCHEME = 1 << 0;
        /// Strip trailing slashes.
        const IGNORE_TRAILING_SLASH = 1 << 1;
        /// Lowercase the whole normalized string.
        const IGNORE_CASE = 1 << 2;
        /// Strip a leading `www.` host label.
        const IGNORE_WWW = 1 << 3;
        /// Strip the fragment.
        const IGNORE_FRAGMENT = 1 << 4;
        /// Collapse forum reply links of the shape `/t/topic/<id>/<n>`
        /// into their thread URL.
        const IGNORE_FORUM_REPLIES = 1 << 5;
    }
}

/// Settings-file form of the policy: camelCase booleans, all off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    pub ignore_scheme: bool,
    pub ignore_trailing_slash: bool,
    pub ignore_case: bool,
    pub ignore_www: bool,
    pub ignore_fragment: bool,
    pub ignore_forum_replies: bool,
}

impl PolicyConfig {
    /// Convert the boolean form into the flag set.
    pub fn to_policy(self) -> NormalizationPolicy {
        let mut policy = NormalizationPolicy::empty();
        policy.set(NormalizationPolicy::IGNORE_SCHEME, self.ignore_scheme);
        policy.set(
            NormalizationPolicy::IGNORE_TRAILING_SLASH,
            self.ignore_trailing_slash,
        );
        policy.set(NormalizationPolicy::IGNORE_CASE, self.ignore_case);
        policy.set(NormalizationPolicy::IGNORE_WWW, self.ignore_www);
        policy.set(NormalizationPolicy::IGNORE_FRAGMENT, self.ignore_fragment);
        policy.set(
            NormalizationPolicy::IGNORE_FORUM_REPLIES,
            self.ignore_forum_replies,
        );
        policy
    }
}

impl From<NormalizationPolicy> for PolicyConfig {
    fn from(policy: NormalizationPolicy) -> Self {
        Self {
            ignore_scheme: policy.contains(NormalizationPolicy::IGNORE_SCHEME),
            ignore_trailing_slash: policy.contains(NormalizationPolicy::IGNORE_TRAILING_SLASH),
            ignore_case: policy.contains(NormalizationPolicy::IGNORE_CASE),
            ignore_www: policy.contains(NormalizationPolicy::IGNORE_WWW),
            ignore_fragment: policy.contains(NormalizationPolicy::IGNORE_FRAGMENT),
            ignore_forum_replies: policy.contains(NormalizationPolicy::IGNORE_FORUM_REPLIES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_empty() {
        assert_eq!(PolicyConfig::default().to_policy(), NormalizationPolicy::empty());
    }

    #[test]
    fn test_config_roundtrip() {
        let policy = NormalizationPolicy::IGNORE_CASE
            | NormalizationPolicy::IGNORE_WWW
            | NormalizationPolicy::IGNORE_FORUM_REPLIES;
        assert_eq!(PolicyConfig::from(policy).to_policy(), policy);
    }

    #[test]
    fn test_config_deserializes_partial_json() {
        let config: PolicyConfig =
            serde_json::from_str(r#"{"ignoreCase": true, "ignoreWww": true}"#).unwrap();
        let policy = config.to_policy();
        assert!(policy.contains(NormalizationPolicy::IGNORE_CASE));
        assert!(policy.contains(NormalizationPolicy::IGNORE_WWW));
        assert!(!policy.contains(NormalizationPolicy::IGNORE_SCHEME));
    }
}
