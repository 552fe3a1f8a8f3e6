//! Record file codec.
//!
//! A record file is a `---` fenced header of `key: value` lines followed by a
//! free-form body:
//!
//! ```text
//! ---
//! status: new
//! subject: Hello
//! ---
//!
//! body text
//! ```

use crate::error::ParseError;
use crate::record::{Frontmatter, Metadata};

/// Header fence line.
pub const DELIMITER: &str = "---";

/// Parse raw file content into header metadata and body.
///
/// The opening fence must be the first non-blank line. Blank header lines
/// are ignored, keys are case-folded and values trimmed. The single blank
/// separator line written by [`serialize`] is not part of the body, while
/// later `---` lines are.
pub fn parse(raw: &str) -> Result<Frontmatter, ParseError> {
    let mut lines = raw.split_inclusive('\n');
    let mut offset = 0;
    let mut line_no = 0;

    loop {
        let line = lines.next().ok_or(ParseError::MissingHeader)?;
        offset += line.len();
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == DELIMITER {
            break;
        }
        return Err(ParseError::MissingHeader);
    }

    let mut metadata = Metadata::new();
    loop {
        let line = lines.next().ok_or(ParseError::UnterminatedHeader)?;
        offset += line.len();
        line_no += 1;
        let trimmed = line.trim();
        if trimmed == DELIMITER {
            break;
        }
        if trimmed.is_empty() {
            continue;
        }
        let (key, value) = trimmed
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedLine {
                line: line_no,
                content: trimmed.to_string(),
            })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::EmptyKey { line: line_no });
        }
        metadata.insert(key, value.trim());
    }

    let rest = &raw[offset..];
    let body = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest);

    Ok(Frontmatter {
        metadata,
        body: body.to_string(),
    })
}

/// Serialize header metadata and body into file content.
pub fn serialize(frontmatter: &Frontmatter) -> String {
    let mut out = String::with_capacity(frontmatter.body.len() + 64);
    out.push_str(DELIMITER);
    out.push('\n');
    for (key, value) in frontmatter.metadata.iter() {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push_str("\n\n");
    out.push_str(&frontmatter.body);
    out
}
