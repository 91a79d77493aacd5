//! Typed view over the registry's string tags

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

pub const STAGE_KEY: &str = "stage";
pub const STATUS_KEY: &str = "validation_status";
pub const METRIC_KEY: &str = "rmse";

/// Named pointer to a single model version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alias {
    /// Freshly trained version awaiting a promotion decision
    Candidate,
    /// Version designated for production serving
    Champion,
}

impl Alias {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alias::Candidate => "candidate",
            Alias::Champion => "champion",
        }
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Alias {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "candidate" => Ok(Alias::Candidate),
            "champion" => Ok(Alias::Champion),
            other => Err(PipelineError::ConfigError(format!("unknown model alias: {}", other))),
        }
    }
}

/// Lifecycle stage tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Staging,
    Production,
    Archived,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Staging => "Staging",
            Stage::Production => "Production",
            Stage::Archived => "Archived",
        }
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Staging" => Ok(Stage::Staging),
            "Production" => Ok(Stage::Production),
            "Archived" => Ok(Stage::Archived),
            other => Err(invalid(STAGE_KEY, other, "expected Staging, Production or Archived")),
        }
    }
}

/// Validation status tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Approved => "approved",
            ValidationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ValidationStatus::Pending),
            "approved" => Ok(ValidationStatus::Approved),
            "rejected" => Ok(ValidationStatus::Rejected),
            other => Err(invalid(STATUS_KEY, other, "expected pending, approved or rejected")),
        }
    }
}

/// Parsed version tags
///
/// The registry only stores strings; everything past this boundary works
/// with the typed fields. Tags other than the three known keys are kept
/// verbatim in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionTags {
    pub stage: Stage,
    pub validation_status: ValidationStatus,
    pub rmse: f64,
    pub extra: BTreeMap<String, String>,
}

impl VersionTags {
    /// Parse a raw tag map; every known key must be present and valid
    pub fn parse(raw: &BTreeMap<String, String>) -> Result<Self> {
        let stage = required(raw, STAGE_KEY)?.parse()?;
        let validation_status = required(raw, STATUS_KEY)?.parse()?;
        let rmse = parse_rmse(raw)?;
        let extra = raw
            .iter()
            .filter(|(k, _)| ![STAGE_KEY, STATUS_KEY, METRIC_KEY].contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            stage,
            validation_status,
            rmse,
            extra,
        })
    }

    /// Serialize back to the registry's string form
    pub fn to_raw(&self) -> BTreeMap<String, String> {
        let mut raw = self.extra.clone();
        raw.insert(STAGE_KEY.to_string(), self.stage.as_str().to_string());
        raw.insert(STATUS_KEY.to_string(), self.validation_status.as_str().to_string());
        raw.insert(METRIC_KEY.to_string(), self.rmse.to_string());
        raw
    }
}

/// Read the `rmse` tag as a float; missing or non-numeric is fatal
pub fn parse_rmse(raw: &BTreeMap<String, String>) -> Result<f64> {
    let value = required(raw, METRIC_KEY)?;
    let rmse: f64 = value
        .trim()
        .parse()
        .map_err(|_| invalid(METRIC_KEY, value, "not a number"))?;
    if rmse.is_nan() {
        return Err(invalid(METRIC_KEY, value, "not a number"));
    }
    Ok(rmse)
}

fn required<'a>(raw: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str> {
    raw.get(key)
        .map(String::as_str)
        .ok_or_else(|| invalid(key, "", "tag is missing"))
}

fn invalid(key: &str, value: &str, reason: &str) -> PipelineError {
    PipelineError::InvalidTag {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_and_serialize() {
        let tags = raw(&[
            ("stage", "Staging"),
            ("validation_status", "pending"),
            ("rmse", "4.25"),
            ("r2", "0.91"),
        ]);
        let parsed = VersionTags::parse(&tags).unwrap();
        assert_eq!(parsed.stage, Stage::Staging);
        assert_eq!(parsed.validation_status, ValidationStatus::Pending);
        assert_eq!(parsed.rmse, 4.25);
        assert_eq!(parsed.extra.get("r2").map(String::as_str), Some("0.91"));
        assert_eq!(parsed.to_raw(), tags);
    }

    #[test]
    fn test_missing_rmse_is_fatal() {
        let tags = raw(&[("stage", "Staging"), ("validation_status", "pending")]);
        let err = VersionTags::parse(&tags).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTag { ref key, .. } if key == "rmse"));
    }

    #[test]
    fn test_non_numeric_rmse_is_fatal() {
        let err = parse_rmse(&raw(&[("rmse", "n/a")])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTag { .. }));
        assert!(parse_rmse(&raw(&[("rmse", "NaN")])).is_err());
    }

    #[test]
    fn test_unknown_stage_rejected() {
        assert!("Retired".parse::<Stage>().is_err());
        assert_eq!("Archived".parse::<Stage>().unwrap(), Stage::Archived);
    }

    #[test]
    fn test_alias_round_trip() {
        assert_eq!("champion".parse::<Alias>().unwrap(), Alias::Champion);
        assert_eq!(Alias::Candidate.to_string(), "candidate");
        assert!("deprecated".parse::<Alias>().is_err());
    }
}
