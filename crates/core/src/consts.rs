// isa mask for the x86_64 ObjC runtime (non-pointer isa)
pub const DEFAULT_TAG_MASK: u64 = 0x0000_7fff_ffff_fff8;

pub const POINTER_SIZE: u64 = 8;

pub const DEFAULT_MAX_CLASS_DEPTH: usize = 64;

pub const DEFAULT_SUMMARY_DEPTH: usize = 1;

/// Class-name prefixes the KVO machinery uses for its swizzled subclasses
pub const DEFAULT_PROXY_PREFIXES: &[&str] = &["NSKVONotifying_"];

pub const DEFAULT_PROXY_SUFFIXES: &[&str] = &[];

pub const OBJC_CLASS_SYMBOL_PREFIXES: &[&str] = &["_OBJC_CLASS_$_", "OBJC_CLASS_$_"];

pub const ITANIUM_VTABLE_PREFIX: &str = "_ZTV";

// vtable symbols point at offset-to-top; the vptr stored in objects skips it and the typeinfo slot
pub const VTABLE_ADDRESS_POINT: u64 = 2 * POINTER_SIZE;

pub const PRIMITIVE_TYPES: &[(&str, u64, crate::models::ScalarEncoding)] = &[
    ("char", 1, crate::models::ScalarEncoding::Signed),
    ("unsigned char", 1, crate::models::ScalarEncoding::Unsigned),
    ("BOOL", 1, crate::models::ScalarEncoding::Bool),
    ("bool", 1, crate::models::ScalarEncoding::Bool),
    ("short", 2, crate::models::ScalarEncoding::Signed),
    ("unsigned short", 2, crate::models::ScalarEncoding::Unsigned),
    ("int", 4, crate::models::ScalarEncoding::Signed),
    ("unsigned int", 4, crate::models::ScalarEncoding::Unsigned),
    ("long", 8, crate::models::ScalarEncoding::Signed),
    ("unsigned long", 8, crate::models::ScalarEncoding::Unsigned),
    ("long long", 8, crate::models::ScalarEncoding::Signed),
    ("float", 4, crate::models::ScalarEncoding::Float),
    ("double", 8, crate::models::ScalarEncoding::Float),
    ("Class", 8, crate::models::ScalarEncoding::Unsigned),
];
