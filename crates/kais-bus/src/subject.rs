//! Subject/pattern tokenising and wildcard matching (§4.1).
//!
//! `*` matches exactly one token; `>` matches one or more trailing tokens and
//! is only valid as the final token of a pattern.

use kais_core::{Error, Result};

pub fn validate_subject(subject: &str) -> Result<()> {
    if subject.is_empty() || subject.split('.').any(str::is_empty) {
        return Err(Error::validation(format!("invalid subject: {subject}")));
    }
    Ok(())
}

pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::validation("pattern must not be empty"));
    }
    let tokens: Vec<&str> = pattern.split('.').collect();
    if tokens.iter().any(|t| t.is_empty()) {
        return Err(Error::validation(format!("invalid pattern: {pattern}")));
    }
    for (i, token) in tokens.iter().enumerate() {
        if *token == ">" && i != tokens.len() - 1 {
            return Err(Error::validation("'>' is only valid as the final token"));
        }
    }
    Ok(())
}

/// Whether `subject` is matched by `pattern` per the wildcard rules above.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    for (i, ptoken) in pattern_tokens.iter().enumerate() {
        if *ptoken == ">" {
            // '>' matches one or more trailing tokens: at least one must remain.
            return subject_tokens.len() > i;
        }
        let Some(stoken) = subject_tokens.get(i) else { return false };
        if *ptoken == "*" {
            continue;
        }
        if ptoken != stoken {
            return false;
        }
    }
    pattern_tokens.len() == subject_tokens.len()
}
