//! util — общие утилиты.
//!
//! Содержит:
//! - now_secs(): текущее Unix-время в секундах (i64, поле created_at).
//! - div_round_up(): целочисленное деление с округлением вверх.

/// Текущее Unix-время в секундах (i64, как time_t).
#[inline]
pub fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs() as i64
}

#[inline]
pub fn div_round_up(x: u64, y: u64) -> u64 {
    1 + (x - 1) / y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_nonzero() {
        let a = now_secs();
        let b = now_secs();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn div_round_up_basic() {
        assert_eq!(div_round_up(1, 4096), 1);
        assert_eq!(div_round_up(4096, 4096), 1);
        assert_eq!(div_round_up(4097, 4096), 2);
        assert_eq!(div_round_up(723_446, 4096), 177);
    }
}
