//! Parser for the `objects` attribute of a SecretProviderClass.
//!
//! The attribute holds a YAML-like list of secret declarations. Only a small,
//! line-oriented subset is accepted:
//!
//! ```text
//! # comments and blank lines are ignored
//! - secretName: "db-pass"
//! - secretName: api-key
//!   filePermission: "0400"
//! ```
//!
//! - every entry starts with `- ` followed by a `key: value` field;
//! - further fields of the same entry sit on their own lines, indented deeper
//!   than the entry's dash;
//! - keys are `secretName` (required) and `filePermission` (optional, decoded
//!   like the request permission);
//! - values are bare words or single/double-quoted strings without escapes.
//!
//! Anything else (top-level keys, nested mappings, flow collections, block
//! scalars, unterminated quotes, repeated keys) is rejected with the 1-based
//! line number rather than silently skipped.

use super::mount::SecretSpec;
use super::permission::parse_file_mode;
use crate::errors::ConfigError;

const KEY_SECRET_NAME: &str = "secretName";
const KEY_FILE_PERMISSION: &str = "filePermission";

/// Parse the `objects` attribute into secret declarations, in order.
///
/// An empty or comment-only document yields no secrets; rejecting that case
/// is left to validation.
pub fn parse_objects(input: &str) -> Result<Vec<SecretSpec>, ConfigError> {
    let mut secrets = Vec::new();
    let mut current: Option<PendingEntry> = None;

    for (index, raw_line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim_end_matches('\r');
        let content = line.trim_start();
        let indent = line.len() - content.len();

        if content.is_empty() || content.starts_with('#') {
            continue;
        }

        if let Some(rest) = content.strip_prefix('-') {
            if !rest.starts_with([' ', '\t']) {
                return Err(ConfigError::malformed_objects(
                    line_no,
                    "expected `- key: value` for a list entry",
                ));
            }
            if let Some(entry) = current.take() {
                secrets.push(entry.finish()?);
            }
            let mut entry = PendingEntry::new(line_no, indent);
            entry.apply_field(rest.trim_start(), line_no)?;
            current = Some(entry);
            continue;
        }

        match current.as_mut() {
            None => {
                return Err(ConfigError::malformed_objects(
                    line_no,
                    "expected a list entry starting with `- `",
                ));
            }
            Some(entry) if indent <= entry.dash_indent => {
                return Err(ConfigError::malformed_objects(
                    line_no,
                    "field must be indented under its list entry",
                ));
            }
            Some(entry) => entry.apply_field(content, line_no)?,
        }
    }

    if let Some(entry) = current.take() {
        secrets.push(entry.finish()?);
    }

    Ok(secrets)
}

/// Fields collected for the list entry currently being read.
struct PendingEntry {
    start_line: usize,
    dash_indent: usize,
    secret_name: Option<String>,
    file_permission: Option<u32>,
}

impl PendingEntry {
    fn new(start_line: usize, dash_indent: usize) -> Self {
        Self { start_line, dash_indent, secret_name: None, file_permission: None }
    }

    fn apply_field(&mut self, field: &str, line_no: usize) -> Result<(), ConfigError> {
        let (key, value) = field.split_once(':').ok_or_else(|| {
            ConfigError::malformed_objects(line_no, format!("expected `key: value`, found `{}`", field))
        })?;

        let key = key.trim_end();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(ConfigError::malformed_objects(line_no, format!("invalid key `{}`", key)));
        }

        let value = parse_scalar(value, key, line_no)?;

        match key {
            KEY_SECRET_NAME => {
                if self.secret_name.is_some() {
                    return Err(repeated_key(line_no, key));
                }
                self.secret_name = Some(value);
            }
            KEY_FILE_PERMISSION => {
                if self.file_permission.is_some() {
                    return Err(repeated_key(line_no, key));
                }
                let mode = parse_file_mode(&value).map_err(|e| {
                    ConfigError::malformed_objects(line_no, format!("invalid `filePermission`: {}", e))
                })?;
                self.file_permission = Some(mode);
            }
            other => {
                return Err(ConfigError::malformed_objects(
                    line_no,
                    format!(
                        "unknown key `{}` (supported: `{}`, `{}`)",
                        other, KEY_SECRET_NAME, KEY_FILE_PERMISSION
                    ),
                ));
            }
        }

        Ok(())
    }

    fn finish(self) -> Result<SecretSpec, ConfigError> {
        let name = self.secret_name.ok_or_else(|| {
            ConfigError::malformed_objects(self.start_line, "list entry has no `secretName`")
        })?;
        if name.trim().is_empty() {
            return Err(ConfigError::malformed_objects(self.start_line, "`secretName` is blank"));
        }
        Ok(SecretSpec { secret_name: name, file_permission: self.file_permission.unwrap_or(0) })
    }
}

fn repeated_key(line_no: usize, key: &str) -> ConfigError {
    ConfigError::malformed_objects(line_no, format!("key `{}` repeated within one entry", key))
}

/// Cut a trailing comment off a bare value. A `#` starts a comment only
/// after whitespace; anywhere else it is rejected.
fn strip_comment(value: &str, line_no: usize) -> Result<&str, ConfigError> {
    let mut previous = None;
    for (pos, c) in value.char_indices() {
        if c == '#' {
            return match previous {
                Some(p) if char::is_whitespace(p) => Ok(value[..pos].trim_end()),
                _ => Err(ConfigError::malformed_objects(
                    line_no,
                    "`#` is only allowed inside a quoted value or after whitespace",
                )),
            };
        }
        previous = Some(c);
    }
    Ok(value)
}

/// Parse the value part of a `key: value` field.
fn parse_scalar(raw: &str, key: &str, line_no: usize) -> Result<String, ConfigError> {
    let value = raw.trim();

    let Some(first) = value.chars().next() else {
        return Err(ConfigError::malformed_objects(
            line_no,
            format!("missing value for `{}`; nested mappings are not supported", key),
        ));
    };

    match first {
        '"' | '\'' => {
            let body = &value[1..];
            let close = body.find(first).ok_or_else(|| {
                ConfigError::malformed_objects(line_no, "unterminated quoted string")
            })?;
            let after = &body[close + 1..];
            let trailing = after.trim_start();
            let is_comment = trailing.starts_with('#') && after.len() > trailing.len();
            if !trailing.is_empty() && !is_comment {
                return Err(ConfigError::malformed_objects(
                    line_no,
                    format!("unexpected text after quoted value: `{}`", trailing),
                ));
            }
            Ok(body[..close].to_string())
        }
        '[' | '{' => Err(ConfigError::malformed_objects(
            line_no,
            "flow collections are not supported",
        )),
        '|' | '>' => Err(ConfigError::malformed_objects(line_no, "block scalars are not supported")),
        _ => {
            let bare = strip_comment(value, line_no)?;
            if bare.contains(['"', '\'']) {
                return Err(ConfigError::malformed_objects(
                    line_no,
                    "quotes are only allowed around the whole value",
                ));
            }
            if bare.contains(':') {
                return Err(ConfigError::malformed_objects(
                    line_no,
                    "`:` is only allowed inside a quoted value",
                ));
            }
            Ok(bare.to_string())
        }
    }
}
