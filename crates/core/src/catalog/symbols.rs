use std::fmt;

use crate::consts::{ITANIUM_VTABLE_PREFIX, OBJC_CLASS_SYMBOL_PREFIXES};

/// A symbol whose address is (or derives) a runtime identity tag
#[derive(Debug, Clone, PartialEq)]
pub enum TagSymbol {
    /// ObjC class object; the isa of every instance points here
    ObjcClass(String),
    /// Itanium C++ vtable; instances store a pointer two slots past the symbol
    Vtable(String),
}

impl TagSymbol {
    pub fn class_name(&self) -> &str {
        match self {
            TagSymbol::ObjcClass(name) => name,
            TagSymbol::Vtable(name) => name,
        }
    }
}

impl fmt::Display for TagSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagSymbol::ObjcClass(name) => write!(f, "class object for {}", name),
            TagSymbol::Vtable(name) => write!(f, "vtable for {}", name),
        }
    }
}

pub fn decode_tag_symbol(symbol: &str) -> Option<TagSymbol> {
    for prefix in OBJC_CLASS_SYMBOL_PREFIXES {
        if let Some(name) = symbol.strip_prefix(prefix) {
            if !name.is_empty() {
                return Some(TagSymbol::ObjcClass(name.to_string()));
            }
        }
    }

    // Mach-O prepends an extra underscore to every C symbol
    let itanium = symbol.strip_prefix('_').filter(|s| s.starts_with("_Z")).unwrap_or(symbol);
    let encoded = itanium.strip_prefix(ITANIUM_VTABLE_PREFIX)?;
    let parts = parse_name(encoded).ok()?;
    Some(TagSymbol::Vtable(parts.join("::")))
}

/// Parses `<len><ident>` or `N<len><ident>...E`. Lengths count bytes.
fn parse_name(encoded: &str) -> Result<Vec<String>, &'static str> {
    let (body, nested) = match encoded.strip_prefix('N') {
        Some(rest) => (
            rest.strip_suffix('E').ok_or("Nested name is missing its E terminator")?,
            true,
        ),
        None => (encoded, false),
    };

    let bytes = body.as_bytes();
    let mut parts = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let digits = bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return Err("Expected a component length");
        }

        let length: usize = std::str::from_utf8(&bytes[i..i + digits])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or("Invalid length in mangled name")?;
        i += digits;

        let end = i.checked_add(length).ok_or("Component length exceeds remaining string")?;
        if length == 0 || end > bytes.len() {
            return Err("Component length exceeds remaining string");
        }

        let component =
            std::str::from_utf8(&bytes[i..end]).map_err(|_| "Component splits a character")?;
        parts.push(component.to_string());
        i = end;

        if !nested && i < bytes.len() {
            return Err("Trailing data after unqualified name");
        }
    }

    if parts.is_empty() {
        return Err("No components found in mangled name");
    }

    Ok(parts)
}
