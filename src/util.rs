//! Small utility helpers used across modules.

/// Collapse runs of whitespace to single spaces and cut to `max` chars, adding `…`
/// when something was dropped. Used for the job-description preview.
pub fn job_snippet(query: &str, max: usize) -> String {
  let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
  if collapsed.chars().count() <= max {
    return collapsed;
  }
  let cut: String = collapsed.chars().take(max).collect();
  format!("{}…", cut)
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with whole job descriptions or submissions.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) { end -= 1; }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}
