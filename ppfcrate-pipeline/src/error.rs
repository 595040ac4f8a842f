//! Per-fragment and configuration errors

use ppfcrate_core::Error;
use std::fmt;
use thiserror::Error;

/// Pipeline stage a fragment failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Normals,
    Sampling,
    Neighbors,
    Features,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Normals => "normal estimation",
            Stage::Sampling => "reference sampling",
            Stage::Neighbors => "neighbor collection",
            Stage::Features => "feature construction",
            Stage::Store => "store",
        };
        f.write_str(name)
    }
}

/// A failure confined to one fragment.
///
/// Carries the fragment id and the stage so a batch driver can report it and
/// move on to the next fragment.
#[derive(Error, Debug)]
#[error("fragment {fragment_id} failed during {stage}: {source}")]
pub struct FragmentError {
    pub fragment_id: String,
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl FragmentError {
    pub fn new(fragment_id: impl Into<String>, stage: Stage, source: Error) -> Self {
        Self {
            fragment_id: fragment_id.into(),
            stage,
            source,
        }
    }
}

/// Attach fragment and stage context to a core result
pub(crate) trait StageContext<T> {
    fn at(self, fragment_id: &str, stage: Stage) -> Result<T, FragmentError>;
}

impl<T> StageContext<T> for ppfcrate_core::Result<T> {
    fn at(self, fragment_id: &str, stage: Stage) -> Result<T, FragmentError> {
        self.map_err(|source| FragmentError::new(fragment_id, stage, source))
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_error_message_names_fragment_and_stage() {
        let err = FragmentError::new("cloud_bin_3", Stage::Sampling, Error::Sampling("no neighbors".to_string()));
        let message = err.to_string();
        assert!(message.contains("cloud_bin_3"));
        assert!(message.contains("reference sampling"));
        assert!(message.contains("no neighbors"));
    }

    #[test]
    fn test_stage_context() {
        let result: ppfcrate_core::Result<()> = Err(Error::Load("missing".to_string()));
        let err = result.at("frag", Stage::Load).unwrap_err();
        assert_eq!(err.stage, Stage::Load);
        assert_eq!(err.fragment_id, "frag");
        assert!(err.source.is_load());
    }
}
