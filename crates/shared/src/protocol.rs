use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{domain::GenerationConfig, error::ValidationError};

pub const DEFAULT_CREATIVITY_LEVEL: f64 = 0.7;
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 9.8;

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Body of `POST /generate/`: one-shot content generation without a stored
/// book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(flatten)]
    pub config: GenerationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
    #[serde(default = "default_creativity_level")]
    pub creativity_level: f64,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
}

fn default_creativity_level() -> f64 {
    DEFAULT_CREATIVITY_LEVEL
}

fn default_quality_threshold() -> f64 {
    DEFAULT_QUALITY_THRESHOLD
}

impl GenerationRequest {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            additional_instructions: None,
            creativity_level: DEFAULT_CREATIVITY_LEVEL,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range("creativity_level", self.creativity_level, 0.0, 1.0)?;
        check_range("quality_threshold", self.quality_threshold, 0.0, 10.0)?;
        Ok(())
    }
}

fn check_range(field: &'static str, actual: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    // NaN is never contained.
    if (min..=max).contains(&actual) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            actual,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub timestamp: DateTime<Utc>,
    pub version: String,
    #[serde(default)]
    pub quality_metrics: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: serde_json::Map<String, serde_json::Value>,
    pub metadata: GenerationMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GenerationConfig {
        GenerationConfig {
            title: "T".into(),
            description: "D".into(),
            genre: "G".into(),
            target_audience: "A".into(),
            style: "S".into(),
            tone: "N".into(),
            length: "L".into(),
        }
    }

    #[test]
    fn generation_request_serializes_flat() {
        let value = serde_json::to_value(GenerationRequest::new(config())).expect("encode");
        assert_eq!(value["title"], "T");
        assert_eq!(value["target_audience"], "A");
        assert_eq!(value["creativity_level"], 0.7);
        assert!(value.get("additional_instructions").is_none());
        assert!(value.get("config").is_none());
    }

    #[test]
    fn generation_request_defaults_apply_on_decode() {
        let request: GenerationRequest = serde_json::from_str(
            r#"{"title":"T","description":"D","genre":"G","target_audience":"A",
                "style":"S","tone":"N","length":"L"}"#,
        )
        .expect("decode");
        assert_eq!(request.quality_threshold, DEFAULT_QUALITY_THRESHOLD);
        assert_eq!(request.config, config());
    }

    #[test]
    fn validate_rejects_out_of_range_levels() {
        let mut request = GenerationRequest::new(config());
        assert!(request.validate().is_ok());

        request.creativity_level = 1.5;
        let err = request.validate().expect_err("creativity too high");
        assert!(err.to_string().contains("creativity_level"));

        request.creativity_level = 0.0;
        request.quality_threshold = f64::NAN;
        assert!(request.validate().is_err());

        request.quality_threshold = 10.0;
        assert!(request.validate().is_ok());
    }
}
