//! Minimal CSV codec
//!
//! Fields containing a comma, quote or line break are wrapped in quotes with
//! embedded quotes doubled. The reader honours quoted line breaks, which the
//! scheduler error logs routinely contain.

use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TabularError {
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("missing required column {0:?}")]
    MissingColumn(String),

    #[error("row {row} has {found} fields, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row}: invalid timestamp {value:?}")]
    InvalidTimestamp { row: usize, value: String },
}

/// Escape a single field for CSV output
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Format one CSV row, without the trailing newline
pub fn format_row<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a header and rows as a CSV document
pub fn render<S: AsRef<str>>(header: &[&str], rows: impl IntoIterator<Item = Vec<S>>) -> String {
    let mut out = format_row(header);
    out.push('\n');
    for row in rows {
        out.push_str(&format_row(&row));
        out.push('\n');
    }
    out
}

/// Format an optional float, empty when missing
pub fn format_opt_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Parse a CSV document into rows of fields
///
/// Blank lines are skipped. CRLF line endings are accepted.
pub fn parse(content: &str) -> Result<Vec<Vec<String>>, TabularError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut row_has_content = false;

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                quote_line = line;
                row_has_content = true;
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                row_has_content = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                if row_has_content || !field.is_empty() {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                row_has_content = false;
            }
            _ => {
                field.push(c);
                row_has_content = true;
            }
        }
    }

    if in_quotes {
        return Err(TabularError::UnterminatedQuote { line: quote_line });
    }
    if row_has_content || !field.is_empty() {
        row.push(field);
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_field() {
        assert_eq!(escape_field("plain"), "plain");
    }

    #[test]
    fn test_escape_special_fields() {
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_parse_quoted_commas_and_newlines() {
        let content = "a,b,c\n1,\"x, y\",\"multi\nline \"\"log\"\"\"\n";
        let rows = parse(content).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["a", "b", "c"]);
        assert_eq!(rows[1], vec!["1", "x, y", "multi\nline \"log\""]);
    }

    #[test]
    fn test_parse_empty_trailing_fields() {
        let rows = parse("a,b,c\r\n1,,\r\n").unwrap();
        assert_eq!(rows[1], vec!["1", "", ""]);
    }

    #[test]
    fn test_parse_skips_blank_lines() {
        let rows = parse("a\n\n1\n").unwrap();
        assert_eq!(rows, vec![vec!["a".to_string()], vec!["1".to_string()]]);
    }

    #[test]
    fn test_parse_unterminated_quote() {
        let err = parse("a,b\n1,\"open\n").unwrap_err();
        assert_eq!(err, TabularError::UnterminatedQuote { line: 2 });
    }

    #[test]
    fn test_render_then_parse_preserves_fields() {
        let doc = render(&["reason", "error_log"], vec![vec!["Error", "panic: a, b\n\"boom\""]]);
        let rows = parse(&doc).unwrap();
        assert_eq!(rows[1], vec!["Error", "panic: a, b\n\"boom\""]);
    }
}
