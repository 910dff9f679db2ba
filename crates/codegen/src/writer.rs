use crate::error::CodegenError;
use std::fs;
use std::path::Path;

/// Change-aware file writer for generated output
pub struct CodeWriter;

impl CodeWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write `content` to `path`, creating parent directories, but leave
    /// the file untouched when it already holds the same bytes.
    pub fn write_if_changed(&self, path: &Path, content: &str) -> Result<bool, CodegenError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if path.exists() {
            let existing = fs::read_to_string(path)?;
            if existing == content {
                return Ok(false);
            }
        }

        fs::write(path, content)?;
        Ok(true)
    }
}

impl Default for CodeWriter {
    fn default() -> Self {
        Self::new()
    }
}
