//! Log sequence number arithmetic
//!
//! PostgreSQL prints WAL positions as two hexadecimal halves, `XXXXXXXX/YYYYYYYY`.
//! Converting them to a single absolute byte offset turns lag into a subtraction.

use thiserror::Error;
use tokio_postgres::types::PgLsn;

/// Malformed LSN text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LsnError {
    #[error("LSN '{0}' has no '/' separator")]
    MissingSeparator(String),
    #[error("LSN '{lsn}' has invalid hex component '{part}'")]
    InvalidHex { lsn: String, part: String },
}

/// Convert `high/low` hex text into `high * 2^32 + low`
pub fn lsn_to_absolute(lsn: &str) -> Result<u64, LsnError> {
    let lsn = lsn.trim();
    let (high, low) = lsn
        .split_once('/')
        .ok_or_else(|| LsnError::MissingSeparator(lsn.to_string()))?;

    // PgLsn parses each half with u64::from_str_radix: that accepts a
    // leading '+' and lets an over-long low half spill into the high bits
    for part in [high, low] {
        if part.is_empty() || part.len() > 8 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid_hex(lsn, part));
        }
    }

    let parsed: PgLsn = lsn.parse().map_err(|_| invalid_hex(lsn, lsn))?;
    Ok(u64::from(parsed))
}

fn invalid_hex(lsn: &str, part: &str) -> LsnError {
    LsnError::InvalidHex {
        lsn: lsn.to_string(),
        part: part.to_string(),
    }
}
