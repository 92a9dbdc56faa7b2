use crate::{IdError, IdResult};

/// Escapes a container-relative path for use inside a resource identifier
///
/// Spaces become `+`. The characters that would otherwise be ambiguous in an
/// identifier (`+`, `!` and `%`) are percent-encoded, so that a `!/` sequence
/// inside an identifier can only ever be a segment separator.
///
/// # Examples
///
/// ```
/// use burrow::id::escape_path;
///
/// assert_eq!(escape_path("a b.txt"), "a+b.txt");
/// assert_eq!(escape_path("c++!/x"), "c%2B%2B%21/x");
/// ```
pub fn escape_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for ch in path.chars() {
        match ch {
            ' ' => escaped.push('+'),
            '+' => escaped.push_str("%2B"),
            '!' => escaped.push_str("%21"),
            '%' => escaped.push_str("%25"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Reverses [`escape_path`]
///
/// Any percent-encoded byte is accepted on input, not only the ones
/// `escape_path` produces. The decoded bytes must form valid UTF-8.
pub fn unescape_path(escaped: &str) -> IdResult<String> {
    let malformed = |reason: &str| IdError::Malformed {
        id: escaped.to_string(),
        reason: reason.to_string(),
    };

    let bytes = escaped.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .ok_or_else(|| malformed("truncated percent escape"))?;
                let high = hex_value(hex[0]).ok_or_else(|| malformed("invalid percent escape"))?;
                let low = hex_value(hex[1]).ok_or_else(|| malformed("invalid percent escape"))?;
                decoded.push(high << 4 | low);
                i += 3;
            }
            b => {
                decoded.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(decoded).map_err(|_| malformed("escaped path is not valid UTF-8"))
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
