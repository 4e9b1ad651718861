//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// True if unicode char belongs to the Arabic script blocks.
/// Used to decide whether recognized text is an Arabic form or a romanization.
pub fn is_arabic_letter(ch: char) -> bool {
  (ch >= '\u{0600}' && ch <= '\u{06FF}')
    || (ch >= '\u{0750}' && ch <= '\u{077F}')
    || (ch >= '\u{08A0}' && ch <= '\u{08FF}')
    || (ch >= '\u{FB50}' && ch <= '\u{FDFF}')
    || (ch >= '\u{FE70}' && ch <= '\u{FEFF}')
}

/// Normalize an answer for comparison: lowercase, trim, collapse inner whitespace.
/// Mirrors what the matcher applies to both sides before scoring.
pub fn normalize_answer(s: &str) -> String {
  s.trim()
    .to_lowercase()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads. Cuts on a char
/// boundary so an Arabic payload cannot split a code point.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while cut > 0 && !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
