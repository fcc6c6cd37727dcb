//! Identifier validation and quoting.
//!
//! SQL identifiers cannot be passed as statement parameters, so DDL
//! generation has to interpolate them. Every identifier that reaches a
//! statement goes through validation (reject null bytes, empty names,
//! oversized names) and dialect-appropriate quoting with embedded-quote
//! doubling.

use crate::error::{MigrateError, Result};

/// Conservative length cap across supported products (PostgreSQL caps at
/// 63 bytes, SQL Server at 128 characters, MySQL at 64).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier before it is interpolated into DDL.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote an identifier with ANSI double quotes, doubling embedded quotes.
pub fn quote_double(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}
