use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TaskStage {
    #[serde(rename = "filter")]
    Filter,
    #[serde(rename = "inference")]
    Inference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TaskStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "NOT_FOUND")]
    #[strum(serialize = "NOT_FOUND")]
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub image_id: String,
    pub gender: String,
    pub master_category: String,
    pub sub_category: String,
    pub article_type: String,
    pub base_colour: String,
    pub season: String,
    pub year: i32,
    pub usage: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub image_name: String,
    pub massive_attr: Vec<f32>,
    pub categories: Vec<f32>,
    pub category_prediction: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub gender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_colour: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub augmentation_config: Option<AugmentationConfig>,
}

fn field_matches(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().map_or(true, |wanted| wanted == value)
}

impl FilterPredicate {
    /// Predicate semantics shared by every catalog backend: equality on each
    /// provided field, year equality when only start_year is given, inclusive
    /// range when both bounds are given. An absent field imposes no filter.
    pub fn matches(&self, record: &ProductRecord) -> bool {
        if record.gender != self.gender {
            return false;
        }
        let year_ok = match (self.start_year, self.end_year) {
            (Some(start), Some(end)) => record.year >= start && record.year <= end,
            (Some(start), None) => record.year == start,
            (None, Some(end)) => record.year <= end,
            (None, None) => true,
        };
        year_ok
            && field_matches(&self.master_category, &record.master_category)
            && field_matches(&self.sub_category, &record.sub_category)
            && field_matches(&self.article_type, &record.article_type)
            && field_matches(&self.base_colour, &record.base_colour)
            && field_matches(&self.season, &record.season)
            && field_matches(&self.usage, &record.usage)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AugmentationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cropping: Option<Cropping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<Resize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cropping {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<HeightBounds>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeightBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resize {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Fully resolved crop/resize parameters. Every leaf of the incoming config
/// must be present before augmentation runs; a missing leaf fails the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropResize {
    pub min_height: u32,
    pub max_height: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ConfigError {
    #[display(fmt = "missing augmentation field: {}", _0)]
    MissingField(&'static str),
    #[display(fmt = "cropping.height.min {} exceeds max {}", min, max)]
    InvalidBounds { min: u32, max: u32 },
    #[display(fmt = "augmentation field must be positive: {}", _0)]
    NotPositive(&'static str),
}

impl std::error::Error for ConfigError {}

impl AugmentationConfig {
    pub fn resolve(&self) -> Result<CropResize, ConfigError> {
        let bounds = self
            .cropping
            .as_ref()
            .ok_or(ConfigError::MissingField("cropping"))?
            .height
            .as_ref()
            .ok_or(ConfigError::MissingField("cropping.height"))?;
        let min_height = bounds
            .min
            .ok_or(ConfigError::MissingField("cropping.height.min"))?;
        let max_height = bounds
            .max
            .ok_or(ConfigError::MissingField("cropping.height.max"))?;
        let resize = self
            .resize
            .as_ref()
            .ok_or(ConfigError::MissingField("resize"))?;
        let width = resize
            .width
            .ok_or(ConfigError::MissingField("resize.width"))?;
        let height = resize
            .height
            .ok_or(ConfigError::MissingField("resize.height"))?;
        if min_height > max_height {
            return Err(ConfigError::InvalidBounds {
                min: min_height,
                max: max_height,
            });
        }
        if min_height == 0 {
            return Err(ConfigError::NotPositive("cropping.height.min"));
        }
        if width == 0 {
            return Err(ConfigError::NotPositive("resize.width"));
        }
        if height == 0 {
            return Err(ConfigError::NotPositive("resize.height"));
        }
        Ok(CropResize {
            min_height,
            max_height,
            width,
            height,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ValidationIssue {
    pub fn missing(loc: &[&str]) -> Self {
        Self {
            loc: loc.iter().map(|part| (*part).to_string()).collect(),
            msg: "field required".to_string(),
            kind: "missing".to_string(),
        }
    }

    pub fn invalid(loc: &[&str], msg: impl Into<String>) -> Self {
        Self {
            loc: loc.iter().map(|part| (*part).to_string()).collect(),
            msg: msg.into(),
            kind: "invalid".to_string(),
        }
    }
}

/// Body of `POST /filter`. All fields optional on the wire; `validate`
/// reports every missing requirement at once.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterSubmission {
    pub queue: Option<String>,
    pub gender: Option<String>,
    pub master_category: Option<String>,
    pub sub_category: Option<String>,
    pub article_type: Option<String>,
    pub base_colour: Option<String>,
    pub season: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub usage: Option<String>,
    pub limit: Option<u32>,
    pub augmentation_config: Option<AugmentationConfig>,
}

impl FilterSubmission {
    pub fn validate(self) -> Result<(FilterPredicate, Option<String>), Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        if self.gender.is_none() {
            issues.push(ValidationIssue::missing(&["body", "gender"]));
        }
        if let (Some(start), Some(end)) = (self.start_year, self.end_year) {
            if start > end {
                issues.push(ValidationIssue::invalid(
                    &["body", "end_year"],
                    format!("end_year {end} precedes start_year {start}"),
                ));
            }
        }
        if !issues.is_empty() {
            return Err(issues);
        }
        let predicate = FilterPredicate {
            gender: self.gender.unwrap_or_default(),
            master_category: self.master_category,
            sub_category: self.sub_category,
            article_type: self.article_type,
            base_colour: self.base_colour,
            season: self.season,
            start_year: self.start_year,
            end_year: self.end_year,
            usage: self.usage,
            limit: self.limit,
            augmentation_config: self.augmentation_config,
        };
        Ok((predicate, self.queue))
    }
}

/// Body of `POST /predict`: a reference to a completed filter task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictSubmission {
    pub task_id: Option<String>,
    pub queue: Option<String>,
}

impl PredictSubmission {
    pub fn validate(self) -> Result<(InferenceMessage, Option<String>), Vec<ValidationIssue>> {
        match self.task_id {
            Some(task_id) => Ok((InferenceMessage { task_id }, self.queue)),
            None => Err(vec![ValidationIssue::missing(&["body", "task_id"])]),
        }
    }
}

/// Queue message consumed by the inference worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceMessage {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub task_id: String,
    pub queue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn success(result: serde_json::Value) -> Self {
        Self {
            status: TaskStatus::Success,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: TaskStatus::Failed,
            result: None,
            error: Some(error),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: TaskStatus::NotFound,
            result: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ProductRecord {
        ProductRecord {
            image_id: "10054".to_string(),
            gender: "Women".to_string(),
            master_category: "Apparel".to_string(),
            sub_category: "Dress".to_string(),
            article_type: "Dresses".to_string(),
            base_colour: "Blue".to_string(),
            season: "Summer".to_string(),
            year: 2012,
            usage: "Casual".to_string(),
            display_name: "Blue summer dress".to_string(),
        }
    }

    fn predicate(gender: &str) -> FilterPredicate {
        FilterPredicate {
            gender: gender.to_string(),
            master_category: None,
            sub_category: None,
            article_type: None,
            base_colour: None,
            season: None,
            start_year: None,
            end_year: None,
            usage: None,
            limit: None,
            augmentation_config: None,
        }
    }

    #[test]
    fn absent_fields_impose_no_filter() {
        assert!(predicate("Women").matches(&record()));
        assert!(!predicate("Men").matches(&record()));
    }

    #[test]
    fn start_year_alone_means_equality() {
        let mut p = predicate("Women");
        p.start_year = Some(2012);
        assert!(p.matches(&record()));
        p.start_year = Some(2011);
        assert!(!p.matches(&record()));
    }

    #[test]
    fn year_range_is_inclusive() {
        let mut p = predicate("Women");
        p.start_year = Some(2011);
        p.end_year = Some(2012);
        assert!(p.matches(&record()));
        p.end_year = Some(2011);
        assert!(!p.matches(&record()));
    }

    #[test]
    fn equality_fields_must_agree() {
        let mut p = predicate("Women");
        p.sub_category = Some("Dress".to_string());
        p.base_colour = Some("Blue".to_string());
        assert!(p.matches(&record()));
        p.base_colour = Some("Red".to_string());
        assert!(!p.matches(&record()));
    }

    #[test]
    fn resolve_reports_the_missing_leaf() {
        let config = AugmentationConfig::default();
        assert_eq!(config.resolve(), Err(ConfigError::MissingField("cropping")));

        let config: AugmentationConfig = serde_json::from_value(serde_json::json!({
            "cropping": {"height": {"min": 80}},
            "resize": {"width": 64, "height": 64},
        }))
        .unwrap();
        assert_eq!(
            config.resolve(),
            Err(ConfigError::MissingField("cropping.height.max"))
        );
    }

    #[test]
    fn resolve_rejects_inverted_bounds() {
        let config: AugmentationConfig = serde_json::from_value(serde_json::json!({
            "cropping": {"height": {"min": 120, "max": 80}},
            "resize": {"width": 64, "height": 64},
        }))
        .unwrap();
        assert_eq!(
            config.resolve(),
            Err(ConfigError::InvalidBounds { min: 120, max: 80 })
        );
    }

    #[test]
    fn resolve_accepts_a_complete_config() {
        let config: AugmentationConfig = serde_json::from_value(serde_json::json!({
            "cropping": {"height": {"min": 80, "max": 120}},
            "resize": {"width": 64, "height": 48},
        }))
        .unwrap();
        assert_eq!(
            config.resolve().unwrap(),
            CropResize {
                min_height: 80,
                max_height: 120,
                width: 64,
                height: 48,
            }
        );
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::NotFound).unwrap(),
            "\"NOT_FOUND\""
        );
        assert_eq!(
            serde_json::to_string(&TaskStatus::Pending).unwrap(),
            "\"PENDING\""
        );
    }

    #[test]
    fn stage_round_trips_through_strings() {
        use std::str::FromStr;
        assert_eq!(TaskStage::Filter.to_string(), "filter");
        assert_eq!(
            TaskStage::from_str("inference").unwrap(),
            TaskStage::Inference
        );
    }

    #[test]
    fn missing_gender_is_the_only_issue_for_unrelated_bodies() {
        let submission: FilterSubmission =
            serde_json::from_value(serde_json::json!({"foo": 1})).unwrap();
        let issues = submission.validate().unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].loc, vec!["body", "gender"]);
        assert_eq!(issues[0].kind, "missing");
    }
}
