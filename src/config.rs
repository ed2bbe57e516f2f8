//! Export configuration.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes. Loaded from JSON like the lesson itself.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::planner::DEFAULT_PAGE_HEIGHT_PX;
use crate::settle::DEFAULT_SETTLE_TIMEOUT;

/// Default caption attached when the document is shared.
pub const DEFAULT_SHARE_CAPTION: &str = "Medicinska lekcija";

/// JPEG quality tier of the page imagery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    /// Bulk export path (0.85).
    #[default]
    Bulk,
    /// Single high-quality export path (0.95).
    High,
}

impl ExportQuality {
    pub fn jpeg_quality(self) -> f32 {
        match self {
            ExportQuality::Bulk => 0.85,
            ExportQuality::High => 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Page height threshold for the pagination planner, in logical px.
    /// Kept below the ~1123px of A4 at 96 dpi to leave some margin.
    pub page_height_px: f32,
    /// Logical width of the render surface.
    pub container_width_px: f32,
    /// Device pixels per logical pixel when rasterizing.
    pub scale: f32,
    /// Upper bound on waiting for illustrations to load.
    pub settle_timeout_ms: u64,
    pub quality: ExportQuality,
    pub share_caption: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_height_px: DEFAULT_PAGE_HEIGHT_PX,
            container_width_px: 800.0,
            scale: 2.0,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT.as_millis() as u64,
            quality: ExportQuality::Bulk,
            share_caption: DEFAULT_SHARE_CAPTION.to_string(),
        }
    }
}

impl ExportConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{name} must be positive, got {v}")))
            }
        };
        positive("page_height_px", self.page_height_px)?;
        positive("container_width_px", self.container_width_px)?;
        positive("scale", self.scale)?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read '{}': {e}", path.display())))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_export_constants() {
        let c = ExportConfig::default();
        assert_eq!(c.page_height_px, 1050.0);
        assert_eq!(c.container_width_px, 800.0);
        assert_eq!(c.scale, 2.0);
        assert_eq!(c.settle_timeout(), Duration::from_millis(500));
        assert_eq!(c.quality.jpeg_quality(), 0.85);
        assert_eq!(ExportQuality::High.jpeg_quality(), 0.95);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = ExportConfig::from_json(r#"{ "quality": "high", "page_height_px": 1000 }"#).unwrap();
        assert_eq!(c.quality, ExportQuality::High);
        assert_eq!(c.page_height_px, 1000.0);
        assert_eq!(c.scale, 2.0);
    }

    #[test]
    fn rejects_non_positive_values() {
        assert!(matches!(
            ExportConfig::from_json(r#"{ "scale": 0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ExportConfig::from_json(r#"{ "quality": "ultra" }"#),
            Err(Error::Config(_))
        ));
    }
}
