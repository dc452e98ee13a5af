// Branch and remote name validation, a conservative subset of
// `git check-ref-format` that can be checked without spawning git.

use thiserror::Error;

/// Maximum allowed ref name length in bytes.
const MAX_REF_NAME_BYTES: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefNameError {
    #[error("ref name is empty")]
    Empty,

    #[error("ref name `{0}` exceeds maximum length of {MAX_REF_NAME_BYTES} bytes")]
    TooLong(String),

    #[error("ref name `{0}` must not start with `-`")]
    LeadingDash(String),

    #[error("ref name `{name}` contains invalid character {ch:?}")]
    InvalidCharacter { name: String, ch: char },

    #[error("ref name `{name}` contains forbidden sequence `{sequence}`")]
    InvalidSequence { name: String, sequence: &'static str },

    #[error("ref name `{0}` has an invalid component")]
    InvalidComponent(String),

    #[error("remote name `{0}` must not contain `/`")]
    SlashInRemoteName(String),
}

const FORBIDDEN_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];
const FORBIDDEN_SEQUENCES: &[&str] = &["..", "@{", "//"];

/// Validate a branch name (the part after `refs/heads/`).
///
/// Rules:
/// - Non-empty, at most 255 bytes
/// - No ASCII control characters, spaces, or any of `~^:?*[\`
/// - No `..`, `@{` or `//`
/// - Must not start with `-` or `/`, must not end with `/` or `.`
/// - No component may start with `.` or end with `.lock`
/// - Must not be the single character `@`
pub fn validate_branch_name(name: &str) -> Result<(), RefNameError> {
    if name.is_empty() {
        return Err(RefNameError::Empty);
    }
    if name.len() > MAX_REF_NAME_BYTES {
        return Err(RefNameError::TooLong(name.to_string()));
    }
    if name.starts_with('-') {
        return Err(RefNameError::LeadingDash(name.to_string()));
    }
    if name == "@" {
        return Err(RefNameError::InvalidComponent(name.to_string()));
    }

    if let Some(ch) = name.chars().find(|ch| ch.is_ascii_control() || FORBIDDEN_CHARS.contains(ch))
    {
        return Err(RefNameError::InvalidCharacter { name: name.to_string(), ch });
    }

    for sequence in FORBIDDEN_SEQUENCES {
        if name.contains(sequence) {
            return Err(RefNameError::InvalidSequence { name: name.to_string(), sequence });
        }
    }

    if name.starts_with('/') || name.ends_with('/') || name.ends_with('.') {
        return Err(RefNameError::InvalidComponent(name.to_string()));
    }

    let bad_component = name
        .split('/')
        .any(|component| component.starts_with('.') || component.ends_with(".lock"));
    if bad_component {
        return Err(RefNameError::InvalidComponent(name.to_string()));
    }

    Ok(())
}

/// Validate a remote name. Same rules as a branch name, without `/`.
pub fn validate_remote_name(name: &str) -> Result<(), RefNameError> {
    validate_branch_name(name)?;
    if name.contains('/') {
        return Err(RefNameError::SlashInRemoteName(name.to_string()));
    }
    Ok(())
}
