use std::collections::HashSet;

use crate::errors::{GenError, Result};
use crate::wire::GeneratedProject;

/// Ensure `candidate` stays inside the archive root once extracted.
///
/// Rules:
/// - must be non-empty, relative, and free of NUL/control characters
/// - `\` counts as a separator, so Windows-style escapes are caught too
/// - no `..` segment anywhere, no empty or `.` segment, no trailing `/`
/// - no drive prefix (`C:`) and no `~` home expansion
pub fn validate_relative_path(candidate: &str) -> Result<()> {
    if candidate.trim().is_empty() {
        return Err(GenError::invalid_path(candidate, "path is empty"));
    }
    if candidate.chars().any(|c| c.is_control()) {
        return Err(GenError::invalid_path(candidate, "contains control characters"));
    }

    let normalized = candidate.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(GenError::invalid_path(candidate, "absolute path not allowed"));
    }
    let bytes = normalized.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(GenError::invalid_path(candidate, "drive prefix not allowed"));
    }
    if normalized.starts_with('~') {
        return Err(GenError::invalid_path(candidate, "home-relative path not allowed"));
    }

    for seg in normalized.split('/') {
        match seg {
            ".." => return Err(GenError::invalid_path(candidate, "parent traversal not allowed")),
            "." => return Err(GenError::invalid_path(candidate, "'.' segment not allowed")),
            "" => return Err(GenError::invalid_path(candidate, "empty segment not allowed")),
            _ => {}
        }
    }

    Ok(())
}

/// Validate every entry before anything is written; duplicates are rejected
/// because the second write would silently replace the first.
pub fn validate_project(project: &GeneratedProject) -> Result<()> {
    let mut seen = HashSet::new();
    for file in &project.files {
        validate_relative_path(&file.path)?;
        if !seen.insert(file.path.replace('\\', "/")) {
            return Err(GenError::invalid_path(&file.path, "duplicate entry"));
        }
    }
    Ok(())
}
