//! Dialect-neutral type tokens for the schema model.
//!
//! A [`TypeToken`] is the canonical, database-agnostic spelling of a column
//! type. Each dialect maps its native catalog type names onto these tokens
//! during introspection and renders them back to native DDL during
//! translation, so that one migration plan produces correct DDL across
//! heterogeneous SQL engines.

use serde::{Deserialize, Serialize};

/// Canonical column type token.
///
/// Native types that no token covers are carried verbatim in the column's
/// raw type string with [`TypeToken::Unknown`] and flagged `approximate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeToken {
    /// Boolean/bit type.
    Boolean,
    /// 16-bit signed integer.
    SmallInt,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    BigInt,
    /// 32-bit floating point.
    Real,
    /// 64-bit floating point.
    Double,
    /// Exact decimal. Precision is total digits, scale is digits after the
    /// decimal point.
    Decimal { precision: u8, scale: u8 },
    /// Fixed-length character string.
    Char(u32),
    /// Variable-length character string with max length. 0 means unlimited.
    Varchar(u32),
    /// Unlimited text.
    Text,
    /// Fixed-length binary data.
    Binary(u32),
    /// Variable-length binary data with max length. 0 means unlimited.
    Varbinary(u32),
    /// Unlimited binary data.
    Blob,
    /// Date only (year, month, day).
    Date,
    /// Time only.
    Time,
    /// Date and time without timezone.
    Timestamp,
    /// Date and time with timezone.
    TimestampTz,
    /// UUID/GUID (128-bit identifier).
    Uuid,
    /// JSON document.
    Json,
    /// Native type with no canonical token. The column's raw type string
    /// holds the original spelling.
    Unknown,
}

impl TypeToken {
    /// Canonical raw rendering used when a declared column does not supply
    /// a dialect-specific raw type string.
    pub fn canonical_name(&self) -> String {
        match self {
            TypeToken::Boolean => "boolean".to_string(),
            TypeToken::SmallInt => "smallint".to_string(),
            TypeToken::Integer => "integer".to_string(),
            TypeToken::BigInt => "bigint".to_string(),
            TypeToken::Real => "real".to_string(),
            TypeToken::Double => "double precision".to_string(),
            TypeToken::Decimal { precision: 0, .. } => "decimal".to_string(),
            TypeToken::Decimal { precision, scale } => {
                format!("decimal({},{})", precision, scale)
            }
            TypeToken::Char(n) => format!("char({})", n),
            TypeToken::Varchar(0) => "varchar".to_string(),
            TypeToken::Varchar(n) => format!("varchar({})", n),
            TypeToken::Text => "text".to_string(),
            TypeToken::Binary(n) => format!("binary({})", n),
            TypeToken::Varbinary(0) => "varbinary".to_string(),
            TypeToken::Varbinary(n) => format!("varbinary({})", n),
            TypeToken::Blob => "blob".to_string(),
            TypeToken::Date => "date".to_string(),
            TypeToken::Time => "time".to_string(),
            TypeToken::Timestamp => "timestamp".to_string(),
            TypeToken::TimestampTz => "timestamp with time zone".to_string(),
            TypeToken::Uuid => "uuid".to_string(),
            TypeToken::Json => "json".to_string(),
            TypeToken::Unknown => "unknown".to_string(),
        }
    }
}

impl std::fmt::Display for TypeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

/// Declared type of a column: the neutral token plus the dialect-specific
/// raw type string observed in (or destined for) the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnType {
    /// Dialect-neutral token.
    pub token: TypeToken,

    /// Dialect-specific raw type string (e.g. "varchar(255)", "int8").
    pub raw: String,

    /// Set when introspection could not map the native type to a token;
    /// the raw string then carries all available information.
    #[serde(default)]
    pub approximate: bool,
}

impl ColumnType {
    /// Build a column type from a token, deriving the raw string from the
    /// token's canonical rendering.
    pub fn from_token(token: TypeToken) -> Self {
        let raw = token.canonical_name();
        Self {
            token,
            raw,
            approximate: false,
        }
    }

    /// Build a column type for a native type that has no canonical token.
    pub fn approximate(raw: impl Into<String>) -> Self {
        Self {
            token: TypeToken::Unknown,
            raw: raw.into(),
            approximate: true,
        }
    }

    /// Structural equivalence for diffing.
    ///
    /// Exact types compare by token; approximate types fall back to a
    /// case-insensitive comparison of the raw spelling, since their token
    /// carries no information.
    pub fn equivalent(&self, other: &ColumnType) -> bool {
        if self.approximate || other.approximate {
            self.raw.eq_ignore_ascii_case(&other.raw)
        } else {
            self.token == other.token
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.approximate {
            write!(f, "{} (approximate)", self.raw)
        } else {
            write!(f, "{}", self.token)
        }
    }
}
