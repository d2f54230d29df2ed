//! Minimal CSV quoting for the station's flat files.
//!
//! The log and registry rows are plain comma-separated lines; only display
//! names can contain troublesome characters, so fields are quoted exactly
//! when they need to be (comma, quote or newline inside) and passed through
//! untouched otherwise. Excel-style `""` escaping is used inside quotes.

use std::borrow::Cow;

/// Render one row, quoting fields only where required.
pub fn format_row(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Split one row back into fields, honoring quoted sections.
///
/// Tolerant of hand-edited files: an unterminated quote runs to the end of
/// the line instead of failing.
pub fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["2025-01-15 08:30:00", "EB-EE-C0-01", "GRANTED", "1"],
           "2025-01-15 08:30:00,EB-EE-C0-01,GRANTED,1")]
    #[case(&["AA-BB", "Silva, Ana"], "AA-BB,\"Silva, Ana\"")]
    #[case(&["AA-BB", "the \"boss\""], "AA-BB,\"the \"\"boss\"\"\"")]
    #[case(&["", ""], ",")]
    fn test_format_row(#[case] fields: &[&str], #[case] expected: &str) {
        assert_eq!(format_row(fields), expected);
    }

    #[rstest]
    #[case("a,b,c", &["a", "b", "c"])]
    #[case("a,\"b,c\",d", &["a", "b,c", "d"])]
    #[case("a,\"he said \"\"hi\"\"\"", &["a", "he said \"hi\""])]
    #[case(",", &["", ""])]
    #[case("plain", &["plain"])]
    fn test_split_row(#[case] line: &str, #[case] expected: &[&str]) {
        assert_eq!(split_row(line), expected);
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        assert_eq!(split_row("a,\"oops,b"), vec!["a", "oops,b"]);
    }

    #[rstest]
    #[case(&["Silva, Ana", "x\"y", "line\nbreak"])]
    #[case(&["ordinary", "fields", "only"])]
    fn test_round_trip(#[case] fields: &[&str]) {
        let row = format_row(fields);
        assert_eq!(split_row(&row), fields);
    }
}
