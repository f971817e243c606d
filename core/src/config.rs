use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Settings of one [`crate::InvertedIndex`] instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Name given to the background worker thread.
    pub worker_thread_name: String,
    /// Use smoothed IDF = 1 + ln((1 + N) / (1 + df)) instead of ln(N / df)
    pub smoothed_idf: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { worker_thread_name: "inverted-index-worker".to_string(), smoothed_idf: true }
    }
}

impl IndexConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut f = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let mut buf = String::new();
        f.read_to_string(&mut buf)?;
        let config: IndexConfig = serde_json::from_str(&buf)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "smoothed_idf": false }}"#).unwrap();
        let config = IndexConfig::from_json_file(file.path()).unwrap();
        assert!(!config.smoothed_idf);
        assert_eq!(config.worker_thread_name, "inverted-index-worker");
    }

    #[test]
    fn unreadable_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(IndexConfig::from_json_file(dir.path().join("nope.json")).is_err());
    }
}
