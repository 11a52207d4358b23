//! Styler tuning knobs.

use crate::threshold::Thresholds;
use crate::{Result, StylerError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum joined length of one output string list.
pub const DEFAULT_BUDGET: usize = 200;
/// Include cut: entries scoring below `top - 0.02` are dropped.
pub const DEFAULT_INCLUDE_OFFSET: f32 = 0.02;
/// Exclude cut: entries scoring at or below `top - 0.04` are excluded.
pub const DEFAULT_EXCLUDE_OFFSET: f32 = 0.04;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylerConfig {
    /// Character budget for each of the include / exclude outputs.
    pub budget: usize,
    pub include_offset: f32,
    pub exclude_offset: f32,
    /// Optional cap on how many ranked entries feed each side.
    pub window: Option<usize>,
}

impl Default for StylerConfig {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            include_offset: DEFAULT_INCLUDE_OFFSET,
            exclude_offset: DEFAULT_EXCLUDE_OFFSET,
            window: None,
        }
    }
}

impl StylerConfig {
    /// Read a JSON config file; missing fields fall back to the defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.include_offset.is_finite() || self.include_offset < 0.0 {
            return Err(StylerError::Invalid(format!(
                "include_offset must be a non-negative number, got {}",
                self.include_offset
            )));
        }
        if !self.exclude_offset.is_finite() || self.exclude_offset <= self.include_offset {
            return Err(StylerError::Invalid(format!(
                "exclude_offset ({}) must be greater than include_offset ({})",
                self.exclude_offset, self.include_offset
            )));
        }
        if self.window == Some(0) {
            return Err(StylerError::Invalid("window must be at least 1".into()));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            include_offset: self.include_offset,
            exclude_offset: self.exclude_offset,
            window: self.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "budget": 120 }}"#).unwrap();
        let cfg = StylerConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.budget, 120);
        assert_eq!(cfg.include_offset, DEFAULT_INCLUDE_OFFSET);
        assert_eq!(cfg.exclude_offset, DEFAULT_EXCLUDE_OFFSET);
        assert_eq!(cfg.window, None);
    }

    #[test]
    fn rejects_inverted_offsets() {
        let cfg = StylerConfig {
            include_offset: 0.05,
            exclude_offset: 0.01,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(StylerError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_window() {
        let cfg = StylerConfig {
            window: Some(0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
