//! Top-level splitting of override values.

use crate::error::ParseError;

/// Split `text` on commas that are outside quotes and brackets.
///
/// `raw` is the full override, used only for error reporting.
pub(crate) fn split_top_level<'a>(raw: &str, text: &'a str) -> Result<Vec<&'a str>, ParseError> {
    let mut parts = Vec::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '[' => depth += 1,
            ']' => {
                if depth == 0 {
                    return Err(ParseError::UnbalancedBracket {
                        raw: raw.to_string(),
                    });
                }
                depth -= 1;
            }
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(ParseError::UnterminatedQuote {
            raw: raw.to_string(),
        });
    }
    if depth != 0 {
        return Err(ParseError::UnbalancedBracket {
            raw: raw.to_string(),
        });
    }

    parts.push(&text[start..]);
    Ok(parts)
}

/// Find the closing quote of a quoted element starting at byte 0 and
/// return the unescaped contents plus whatever follows the closing quote.
pub(crate) fn read_quoted<'a>(raw: &str, text: &'a str) -> Result<(String, &'a str), ParseError> {
    let mut chars = text.char_indices();
    let quote = match chars.next() {
        Some((_, q @ ('"' | '\''))) => q,
        _ => {
            return Err(ParseError::UnterminatedQuote {
                raw: raw.to_string(),
            })
        }
    };

    let mut out = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            out.push(match c {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((out, &text[i + c.len_utf8()..]));
        } else {
            out.push(c);
        }
    }

    Err(ParseError::UnterminatedQuote {
        raw: raw.to_string(),
    })
}
