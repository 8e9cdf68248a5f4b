use regex::Regex;

use crate::error::LensError;
use crate::models::LensConfig;
use crate::traits::ProxyMatcher;

pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

impl ProxyMatcher for PrefixMatcher {
    fn name(&self) -> &'static str {
        "prefix_matcher"
    }

    fn base_name(&self, type_name: &str) -> Option<String> {
        type_name
            .strip_prefix(self.prefix.as_str())
            .filter(|base| !base.is_empty())
            .map(str::to_string)
    }
}

pub struct SuffixMatcher {
    suffix: String,
}

impl SuffixMatcher {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
        }
    }
}

impl ProxyMatcher for SuffixMatcher {
    fn name(&self) -> &'static str {
        "suffix_matcher"
    }

    fn base_name(&self, type_name: &str) -> Option<String> {
        type_name
            .strip_suffix(self.suffix.as_str())
            .filter(|base| !base.is_empty())
            .map(str::to_string)
    }
}

/// Matches proxy names with a regex; the `base` capture group names the original class
pub struct PatternMatcher {
    pattern: Regex,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Result<Self, LensError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| LensError::ConfigError(format!("bad proxy pattern: {}", e)))?;

        if !pattern.capture_names().any(|name| name == Some("base")) {
            return Err(LensError::ConfigError(
                "proxy pattern needs a named `base` capture group".to_string(),
            ));
        }

        Ok(Self { pattern })
    }
}

impl ProxyMatcher for PatternMatcher {
    fn name(&self) -> &'static str {
        "pattern_matcher"
    }

    fn base_name(&self, type_name: &str) -> Option<String> {
        let caps = self.pattern.captures(type_name)?;
        caps.name("base")
            .map(|m| m.as_str().to_string())
            .filter(|base| !base.is_empty() && base != type_name)
    }
}

/// Matchers implied by the configured prefix/suffix conventions
pub fn matchers_from_config(config: &LensConfig) -> Vec<Box<dyn ProxyMatcher>> {
    let mut matchers: Vec<Box<dyn ProxyMatcher>> = Vec::new();
    for prefix in &config.proxy_prefixes {
        matchers.push(Box::new(PrefixMatcher::new(prefix)));
    }
    for suffix in &config.proxy_suffixes {
        matchers.push(Box::new(SuffixMatcher::new(suffix)));
    }
    matchers
}
