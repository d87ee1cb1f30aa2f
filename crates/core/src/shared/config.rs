use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    CONTROL_TOPIC, DEFAULT_BLUR_THRESHOLD, DEFAULT_CONFIDENCE, DEFAULT_IDENTITY,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_PADDING, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RETRY_DELAY_MS,
    GAME_TOPIC, STATUS_TOPIC,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// One generated picture style: prompt template plus backend model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    pub name: String,
    /// Prompt text; `{description}` is replaced by the face description.
    pub prompt_template: String,
    pub model_version: String,
    pub style_name: String,
    pub guidance_scale: f64,
    pub negative_prompt: String,
    pub style_strength_ratio: u32,
    pub num_steps: u32,
}

/// Process configuration, loaded from JSON. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub identity: String,
    pub control_topic: String,
    pub status_topic: String,
    pub game_topic: String,
    /// Camera device path, video file or stream URL.
    pub camera: String,
    /// libavdevice input format, e.g. `v4l2`. `None` lets ffmpeg probe.
    pub camera_format: Option<String>,
    pub confidence: f64,
    pub padding: i32,
    pub blur_threshold: f64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub handoff_dir: PathBuf,
    pub output_dir: PathBuf,
    /// PNG with alpha composited over each generated picture when set.
    pub overlay_path: Option<PathBuf>,
    pub replicate_base_url: String,
    pub describer_version: String,
    pub styles: Vec<StyleConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            control_topic: CONTROL_TOPIC.to_string(),
            status_topic: STATUS_TOPIC.to_string(),
            game_topic: GAME_TOPIC.to_string(),
            camera: "/dev/video0".to_string(),
            camera_format: Some("v4l2".to_string()),
            confidence: DEFAULT_CONFIDENCE,
            padding: DEFAULT_PADDING,
            blur_threshold: DEFAULT_BLUR_THRESHOLD,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            handoff_dir: PathBuf::from("."),
            output_dir: PathBuf::from("pictures"),
            overlay_path: None,
            replicate_base_url: "https://api.replicate.com/v1".to_string(),
            describer_version:
                "f677695e5e89f8b236e52ecd1d3f01beb44c34606419bcc19345e046d8f786f9".to_string(),
            styles: default_styles(),
        }
    }
}

fn default_styles() -> Vec<StyleConfig> {
    vec![
        StyleConfig {
            name: "epic".to_string(),
            prompt_template: "sketch of {description} img. dark, dramatic, low detail, \
                              dressed in alchemist clothes, looking serious"
                .to_string(),
            model_version: "467d062309da518648ba89d226490e02b8ed09b5abc15026e54e31c5a8cd0769"
                .to_string(),
            style_name: "Cinematic".to_string(),
            guidance_scale: 5.0,
            negative_prompt: "realistic, photo-realistic, worst quality, greyscale, bad anatomy, \
                              bad hands, error, text, hat, wizard hat"
                .to_string(),
            style_strength_ratio: 35,
            num_steps: 50,
        },
        StyleConfig {
            name: "sketch".to_string(),
            prompt_template: "a rough sketch of a {description} img, alchemist clothes, dressed \
                              as an alchemist, unrefined, with pencil strokes, solid background, \
                              magical setting, two colors"
                .to_string(),
            model_version: "ddfc2b08d209f9fa8c1eca692712918bd449f695dabb4a958da31802a9570fe4"
                .to_string(),
            style_name: "(No style)".to_string(),
            guidance_scale: 3.0,
            negative_prompt: "text, nsfw, realistic, refined, hat, wand, bad anatomy, bad hands, \
                              wizard hat, error, missing fingers, extra digit, fewer digits, \
                              cropped, jpeg artifacts, signature, watermark, username, blurry, \
                              nude, hats, wizard hats"
                .to_string(),
            style_strength_ratio: 30,
            num_steps: 50,
        },
    ]
}

impl AppConfig {
    /// `<config dir>/Faceinator/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Faceinator").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Loads an explicit path strictly; the default location falls back to
    /// built-in defaults when missing or unreadable.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let Some(path) = Self::default_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        match Self::load(&path) {
            Ok(config) => Ok(config),
            Err(e) => {
                log::warn!("{e}; using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.trim().is_empty() {
            return Err(ConfigError::Invalid("identity must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::Invalid(format!(
                "confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            )));
        }
        if self.padding < 0 {
            return Err(ConfigError::Invalid(format!(
                "padding must be non-negative, got {}",
                self.padding
            )));
        }
        if self.blur_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "blur threshold must be non-negative, got {}",
                self.blur_threshold
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max attempts must be at least 1".into()));
        }
        if self.styles.is_empty() {
            return Err(ConfigError::Invalid("at least one style is required".into()));
        }
        if let Some(style) = self
            .styles
            .iter()
            .find(|s| !s.prompt_template.contains("{description}"))
        {
            return Err(ConfigError::Invalid(format!(
                "style '{}' prompt template lacks {{description}}",
                style.name
            )));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.identity, "faceinator");
        assert_eq!(config.control_topic, "alch/faceinator");
        assert_eq!(config.styles.len(), 2);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"identity": "booth-2", "blur_threshold": 250.0}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();

        assert_eq!(config.identity, "booth-2");
        assert_eq!(config.blur_threshold, 250.0);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.status_topic, "alch");
    }

    #[test]
    fn test_save_and_load_matches() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        let mut config = AppConfig::default();
        config.camera = "/dev/video2".to_string();
        config.overlay_path = Some(PathBuf::from("frame.png"));
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = AppConfig::load_or_default(Some(&tmp.path().join("missing.json")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let config = AppConfig {
            confidence: 1.5,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let mut config = AppConfig::default();
        config.styles[0].prompt_template = "no placeholder".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("epic"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = AppConfig {
            max_attempts: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
