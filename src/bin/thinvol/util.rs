use anyhow::{anyhow, Result};
use typed_bytesize::ByteSizeIec;

/// Разбор размера: число байт или IEC-суффикс ("2GiB", "512MiB").
pub fn parse_size(s: &str) -> Result<u64> {
    if let Ok(n) = s.parse::<u64>() {
        return Ok(n);
    }
    let bs: ByteSizeIec = s
        .parse()
        .map_err(|_| anyhow!("invalid size {:?} (expected bytes or IEC suffix)", s))?;
    Ok(bs.0)
}

pub fn human_size(n: u64) -> String {
    ByteSizeIec(n).to_string()
}

/// Unix-секунды -> RFC 3339 (UTC).
pub fn fmt_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
