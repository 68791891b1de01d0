use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::image::{Boundary, Interpolation};
use crate::source::SNIPPET_LEN;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Io { path: String, source: std::io::Error },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Compiler and evaluator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Recursion ceiling of the compiler, macro expansion included.
    pub max_depth: usize,
    /// Initial value of the `boundary` slot.
    pub boundary: Boundary,
    /// Initial value of the `interpolation` slot.
    pub interpolation: Interpolation,
    /// RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    pub snippet_len: usize,
    /// Largest vector a constant size may ask for (`eye`, `vectorN`, slices, `crop`).
    pub max_vector_len: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_depth: 256,
            boundary: Boundary::Dirichlet,
            interpolation: Interpolation::Nearest,
            seed: None,
            snippet_len: SNIPPET_LEN,
            max_vector_len: 1 << 20,
        }
    }
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Settings, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Settings::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_take_defaults() {
        let s = Settings::from_json_str(r#"{"boundary": "mirror", "seed": 7}"#).unwrap();
        assert_eq!(s.boundary, Boundary::Mirror);
        assert_eq!(s.seed, Some(7));
        assert_eq!(s.max_depth, 256);
        assert_eq!(s.interpolation, Interpolation::Nearest);
        assert_eq!(s.max_vector_len, 1 << 20);
    }

    #[test]
    fn unknown_boundary_is_rejected() {
        assert!(matches!(Settings::from_json_str(r#"{"boundary": "wrap"}"#), Err(ConfigError::Json(_))));
    }

    #[test]
    fn load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"max_depth": 12, "interpolation": "linear"}}"#).unwrap();
        let s = Settings::load(f.path()).unwrap();
        assert_eq!(s.max_depth, 12);
        assert_eq!(s.interpolation, Interpolation::Linear);
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(Settings::load("/nonexistent/pixform.json"), Err(ConfigError::Io { .. })));
    }
}
