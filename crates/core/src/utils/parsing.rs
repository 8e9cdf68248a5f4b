use serde::{Deserialize, Deserializer};

/// Parses `0x`-prefixed hexadecimal or plain decimal addresses
pub fn parse_address(text: &str) -> Result<u64, String> {
    let trimmed = text.trim().replace('_', "");
    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
    } else {
        trimmed.parse::<u64>()
    };

    parsed.map_err(|e| format!("invalid address '{}': {}", text, e))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAddress {
    Number(u64),
    Text(String),
}

/// Accepts either a JSON number or a `"0x…"` string
pub fn deserialize_address<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawAddress::deserialize(deserializer)? {
        RawAddress::Number(n) => Ok(n),
        RawAddress::Text(s) => parse_address(&s).map_err(serde::de::Error::custom),
    }
}

pub fn deserialize_optional_address<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawAddress>::deserialize(deserializer)? {
        Some(RawAddress::Number(n)) => Ok(Some(n)),
        Some(RawAddress::Text(s)) => parse_address(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

pub fn format_address(address: u64) -> String {
    format!("0x{:016x}", address)
}
