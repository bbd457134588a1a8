//! ID prefix constants.
//!
//! IDs are generated by `uw-db` as `"{prefix}-{8 hex chars}"`, e.g. `"del-a3f8b2c1"`.

pub const PREFIX_DEAL: &str = "del";
pub const PREFIX_SOURCE_DOCUMENT: &str = "src";
pub const PREFIX_VERIFICATION_ISSUE: &str = "vis";
pub const PREFIX_GENERATED_DOCUMENT: &str = "gdc";
pub const PREFIX_AUDIT: &str = "aud";

/// All prefixes, for exhaustive tests.
pub const ALL_PREFIXES: &[&str] = &[
    PREFIX_DEAL,
    PREFIX_SOURCE_DOCUMENT,
    PREFIX_VERIFICATION_ISSUE,
    PREFIX_GENERATED_DOCUMENT,
    PREFIX_AUDIT,
];
