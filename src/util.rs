//! Small utility helpers used across modules.

/// `raw / max * 100` rounded to the nearest integer, ties rounding up.
/// Integer arithmetic only; `max == 0` yields 0.
pub fn percent_round_half_up(raw: u32, max: u32) -> u8 {
  if max == 0 {
    return 0;
  }
  let raw = u64::from(raw.min(max));
  let max = u64::from(max);
  ((raw * 200 + max) / (2 * max)) as u8
}

/// `0x1234…abcdef` style shortening for display.
pub fn short_hash(hash: &str) -> String {
  if hash.chars().count() <= 12 {
    return hash.to_string();
  }
  let head: String = hash.chars().take(6).collect();
  let tail: String = hash.chars().rev().take(6).collect::<Vec<_>>().into_iter().rev().collect();
  format!("{head}...{tail}")
}

/// Log-safe truncation for large strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}
