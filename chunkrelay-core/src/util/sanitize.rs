use crate::error::{RelayError, Result};

/// Accept `part` as a single path component under the assembly root.
pub fn file_component(part: &str) -> Result<&str> {
    if part.is_empty() || part == "." || part == ".." {
        return Err(RelayError::InvalidName(format!("{part:?}")));
    }
    if part.contains(['/', '\\', '\0']) {
        return Err(RelayError::InvalidName(format!(
            "{part:?} contains a path separator"
        )));
    }
    Ok(part)
}
