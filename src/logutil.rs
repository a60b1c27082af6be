//! Keeps user-typed titles and model output on a single log line.

use std::fmt::Write;

/// Default cap for logged user text.
const MAX_PREVIEW: usize = 120;

/// Escape control characters (`\n`, `\r`, `\t`, backslash, others as `\xNN`)
/// and cut at [`MAX_PREVIEW`] characters.
pub fn escape_log(s: &str) -> String {
    preview(s, MAX_PREVIEW)
}

/// Like [`escape_log`] with an explicit character budget; a cut is marked with `…`.
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_multiline_titles() {
        assert_eq!(escape_log("Write\ntests\t\\ now"), "Write\\ntests\\t\\\\ now");
        assert_eq!(escape_log("bell\u{7}"), "bell\\x07");
    }

    #[test]
    fn preview_truncates_long_replies() {
        let long = "x".repeat(50);
        let out = preview(&long, 10);
        assert_eq!(out.chars().count(), 11);
        assert!(out.ends_with('…'));
    }
}
