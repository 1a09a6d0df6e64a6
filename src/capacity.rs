//! Volume size parsing

use crate::error::{Error, Result};

/// 1 GiB
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Smallest volume `create` accepts
pub const MIN_VOLUME_SIZE: u64 = GIB;

/// Parse capacity string (e.g., "100G", "512Mi", "1073741824") to bytes
///
/// Units are binary regardless of the `i` marker, as LVM treats them.
pub fn parse_capacity(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::CapacityParse("empty capacity string".into()));
    }

    let num_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let num_str = &s[..num_end];
    let unit_str = s[num_end..].trim();

    let num: f64 = num_str
        .parse()
        .map_err(|_| Error::CapacityParse(format!("invalid number: {}", s)))?;

    let multiplier: u64 = match unit_str.to_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KI" | "KIB" => 1024,
        "M" | "MB" | "MI" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GI" | "GIB" => GIB,
        "T" | "TB" | "TI" | "TIB" => 1024 * GIB,
        "P" | "PB" | "PI" | "PIB" => 1024 * 1024 * GIB,
        _ => {
            return Err(Error::CapacityParse(format!(
                "unknown unit: {}",
                unit_str
            )))
        }
    };

    let bytes = num * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(Error::CapacityParse(format!("capacity out of range: {}", s)));
    }
    Ok(bytes as u64)
}
