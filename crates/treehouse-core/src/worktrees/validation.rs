//! Worktree input validation
//!
//! Labels become a path component under the worktrees root, so they are held
//! to a stricter standard than branch names.

use super::errors::WorktreeError;

pub fn validate_label(label: &str) -> Result<String, WorktreeError> {
    let invalid = |reason: &str| WorktreeError::InvalidLabel {
        label: label.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(invalid("cannot be empty"));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(invalid("must not contain path separators"));
    }
    if trimmed.contains("..") || trimmed == "." {
        return Err(invalid("must not contain '..'"));
    }
    if trimmed.starts_with('-') {
        return Err(invalid("must not start with '-'"));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(invalid("contains control characters"));
    }

    Ok(trimmed.to_string())
}

pub fn validate_branch(branch: &str) -> Result<String, WorktreeError> {
    let invalid = |reason: &str| WorktreeError::InvalidBranch {
        branch: branch.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = branch.trim();
    if trimmed.is_empty() {
        return Err(invalid("cannot be empty"));
    }

    // Basic git ref-format rules; git itself has the final word
    if trimmed.contains("..") || trimmed.contains("::") {
        return Err(invalid("must not contain '..' or '::'"));
    }
    if trimmed.starts_with('-') || trimmed.starts_with('/') || trimmed.ends_with('/') {
        return Err(invalid("must not start with '-' or begin/end with '/'"));
    }
    if trimmed
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
    {
        return Err(invalid("contains characters git does not allow in branch names"));
    }

    Ok(trimmed.to_string())
}
