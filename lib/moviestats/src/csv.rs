//! Quote-aware comma splitting for the movie CSV layouts.
//!
//! A comma separates two fields only when the rest of the line after it holds
//! an even number of quote characters, i.e. the comma does not sit inside a
//! `"..."` run. Doubled quotes (`""`) inside a quoted field are not treated as
//! escapes; such lines split wherever the quote parity says.

use crate::errors::ParseError;
use memchr::memchr_iter;

/// Split `line` and check it produced exactly `expected` fields.
pub fn split_fields(line: &str, expected: usize) -> Result<Vec<&str>, ParseError> {
    let fields = split_fields_any(line);
    if fields.len() != expected {
        return Err(ParseError::WrongColumnCount { expected, found: fields.len() });
    }
    Ok(fields)
}

/// Split `line` without validating the field count.
///
/// Empty fields are kept (`a,,b` gives three fields) and a field wrapped in a
/// pair of quotes is returned without them, so a bare `""` is an empty field.
pub fn split_fields_any(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let total_quotes = memchr_iter(b'"', bytes).count();
    let mut fields = Vec::with_capacity(9);
    let mut seen = 0usize;
    let mut start = 0usize;
    // '"' and ',' are ASCII, so every index we cut at is a char boundary
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => seen += 1,
            b',' if (total_quotes - seen) % 2 == 0 => {
                fields.push(unquote(&line[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(unquote(&line[start..]));
    fields
}

fn unquote(field: &str) -> &str {
    if field.len() >= 2 && field.starts_with('"') && field.ends_with('"') {
        &field[1..field.len() - 1]
    } else {
        field
    }
}
