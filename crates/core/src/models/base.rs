use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_MAX_CLASS_DEPTH, DEFAULT_PROXY_PREFIXES, DEFAULT_PROXY_SUFFIXES, DEFAULT_SUMMARY_DEPTH,
    DEFAULT_TAG_MASK,
};
use crate::error::LensError;
use crate::utils::deserialize_address;

use super::ScalarEncoding;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    /// Mask applied to raw identity tags before catalog lookup
    pub tag_mask: u64,
    /// Upper bound on superclass walks (guards against cyclic metadata)
    pub max_class_depth: usize,
    /// When false, run-target requests are downgraded to no-run-target
    pub allow_runtime_calls: bool,
    /// Name prefixes of runtime-generated proxy classes
    pub proxy_prefixes: Vec<String>,
    /// Name suffixes of runtime-generated proxy classes
    pub proxy_suffixes: Vec<String>,
    /// Default child depth for summaries and formatted output
    pub summary_depth: usize,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            tag_mask: DEFAULT_TAG_MASK,
            max_class_depth: DEFAULT_MAX_CLASS_DEPTH,
            allow_runtime_calls: true,
            proxy_prefixes: DEFAULT_PROXY_PREFIXES.iter().map(|s| s.to_string()).collect(),
            proxy_suffixes: DEFAULT_PROXY_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            summary_depth: DEFAULT_SUMMARY_DEPTH,
        }
    }
}

impl LensConfig {
    pub fn from_path(path: &Path) -> Result<Self, LensError> {
        let text = std::fs::read_to_string(path)?;
        let config: LensConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LensError> {
        if self.tag_mask == 0 {
            return Err(LensError::ConfigError("tag_mask must not be zero".to_string()));
        }
        if self.max_class_depth == 0 {
            return Err(LensError::ConfigError(
                "max_class_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Applies the runtime-call kill switch to a requested policy
    pub fn effective_policy(&self, policy: ResolutionPolicy) -> ResolutionPolicy {
        match policy {
            ResolutionPolicy::DynamicAllowRunTarget if !self.allow_runtime_calls => {
                ResolutionPolicy::DynamicNoRunTarget
            }
            other => other,
        }
    }
}

/// Whether (and how) a value request resolves runtime identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionPolicy {
    NoDynamic,
    DynamicAllowRunTarget,
    DynamicNoRunTarget,
}

impl ResolutionPolicy {
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, ResolutionPolicy::NoDynamic)
    }

    pub fn may_run_target(&self) -> bool {
        matches!(self, ResolutionPolicy::DynamicAllowRunTarget)
    }
}

impl FromStr for ResolutionPolicy {
    type Err = LensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no-dynamic-values" | "none" => Ok(ResolutionPolicy::NoDynamic),
            "run-target" => Ok(ResolutionPolicy::DynamicAllowRunTarget),
            "no-run-target" => Ok(ResolutionPolicy::DynamicNoRunTarget),
            other => Err(LensError::ConfigError(format!(
                "unknown dynamic value policy '{}' (expected no-dynamic-values, run-target or no-run-target)",
                other
            ))),
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionPolicy::NoDynamic => write!(f, "no-dynamic-values"),
            ResolutionPolicy::DynamicAllowRunTarget => write!(f, "run-target"),
            ResolutionPolicy::DynamicNoRunTarget => write!(f, "no-run-target"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    #[default]
    Local,
    Argument,
    Global,
    /// Child member of another value
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ScalarValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Bool(bool),
}

impl ScalarValue {
    /// Decodes little-endian bytes; sizes other than 1/2/4/8 are rejected
    pub fn from_bytes(bytes: &[u8], encoding: ScalarEncoding) -> Option<Self> {
        let mut buf = [0u8; 8];
        if bytes.is_empty() || bytes.len() > 8 {
            return None;
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        let raw = u64::from_le_bytes(buf);

        let value = match (encoding, bytes.len()) {
            (ScalarEncoding::Bool, _) => ScalarValue::Bool(raw != 0),
            (ScalarEncoding::Unsigned, 1 | 2 | 4 | 8) => ScalarValue::Unsigned(raw),
            (ScalarEncoding::Signed, 1) => ScalarValue::Signed(raw as u8 as i8 as i64),
            (ScalarEncoding::Signed, 2) => ScalarValue::Signed(raw as u16 as i16 as i64),
            (ScalarEncoding::Signed, 4) => ScalarValue::Signed(raw as u32 as i32 as i64),
            (ScalarEncoding::Signed, 8) => ScalarValue::Signed(raw as i64),
            (ScalarEncoding::Float, 4) => ScalarValue::Float(f32::from_bits(raw as u32) as f64),
            (ScalarEncoding::Float, 8) => ScalarValue::Float(f64::from_bits(raw)),
            _ => return None,
        };
        Some(value)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ScalarValue::Signed(v) => Some(v),
            ScalarValue::Unsigned(v) => i64::try_from(v).ok(),
            ScalarValue::Bool(b) => Some(b as i64),
            ScalarValue::Float(_) => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Signed(v) => write!(f, "{}", v),
            ScalarValue::Unsigned(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Bool(true) => write!(f, "YES"),
            ScalarValue::Bool(false) => write!(f, "NO"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub type_name: String,
    /// Address of the variable's storage
    #[serde(deserialize_with = "deserialize_address")]
    pub address: u64,
    #[serde(default)]
    pub kind: VariableKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInfo {
    pub function: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub variables: Vec<VariableInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "run-target".parse::<ResolutionPolicy>().unwrap(),
            ResolutionPolicy::DynamicAllowRunTarget
        );
        assert_eq!(
            "no-dynamic-values".parse::<ResolutionPolicy>().unwrap(),
            ResolutionPolicy::NoDynamic
        );
        assert!("sometimes".parse::<ResolutionPolicy>().is_err());
        assert_eq!(ResolutionPolicy::DynamicNoRunTarget.to_string(), "no-run-target");
    }

    #[test]
    fn test_runtime_call_kill_switch() {
        let config = LensConfig {
            allow_runtime_calls: false,
            ..LensConfig::default()
        };
        assert_eq!(
            config.effective_policy(ResolutionPolicy::DynamicAllowRunTarget),
            ResolutionPolicy::DynamicNoRunTarget
        );
        assert_eq!(
            config.effective_policy(ResolutionPolicy::NoDynamic),
            ResolutionPolicy::NoDynamic
        );
    }

    #[test]
    fn test_config_validation() {
        let partial: LensConfig = serde_json::from_str(r#"{ "summary_depth": 3 }"#).unwrap();
        assert_eq!(partial.summary_depth, 3);
        assert_eq!(partial.tag_mask, DEFAULT_TAG_MASK);
        assert!(partial.validate().is_ok());

        let broken = LensConfig {
            tag_mask: 0,
            ..LensConfig::default()
        };
        assert!(matches!(broken.validate(), Err(LensError::ConfigError(_))));
    }

    #[test]
    fn test_scalar_decoding() {
        assert_eq!(
            ScalarValue::from_bytes(&[0x1e, 0, 0, 0], ScalarEncoding::Signed),
            Some(ScalarValue::Signed(30))
        );
        assert_eq!(
            ScalarValue::from_bytes(&[0xff, 0xff, 0xff, 0xff], ScalarEncoding::Signed),
            Some(ScalarValue::Signed(-1))
        );
        assert_eq!(
            ScalarValue::from_bytes(&[1], ScalarEncoding::Bool).map(|v| v.to_string()),
            Some("YES".to_string())
        );
        assert_eq!(ScalarValue::from_bytes(&[0, 0, 0], ScalarEncoding::Float), None);
    }
}
