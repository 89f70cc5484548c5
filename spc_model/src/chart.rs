//! Chart configurations: how a data source's table maps onto an SPC
//! aggregation pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::{ValidationErrors, check_text};

pub const DEFAULT_PRODUCT_COLUMN: &str = "Product";
pub const DEFAULT_OPERATION_COLUMN: &str = "Operation";
pub const DEFAULT_AGGREGATION_SIZE: i64 = 1;

const INVALID_NUMBER: &str = "A valid number is required.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationType {
    #[default]
    TimeHour,
    TimeDay,
    Count,
}

impl AggregationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationType::TimeHour => "TIME_HOUR",
            AggregationType::TimeDay => "TIME_DAY",
            AggregationType::Count => "COUNT",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AggregationType::TimeHour => "Hourly",
            AggregationType::TimeDay => "Daily",
            AggregationType::Count => "By Count",
        }
    }
}

impl std::fmt::Display for AggregationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AggregationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TIME_HOUR" => Ok(AggregationType::TimeHour),
            "TIME_DAY" => Ok(AggregationType::TimeDay),
            "COUNT" => Ok(AggregationType::Count),
            _ => Err(format!("Invalid aggregation type: {}", s)),
        }
    }
}

impl TryFrom<String> for AggregationType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A spec-limit value as it travels to the server: either a JSON number or
/// the caller's raw numeric text. Only the server turns it into an `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitValue {
    Number(f64),
    Text(String),
}

impl LimitValue {
    pub fn parse(&self) -> Result<f64, &'static str> {
        let value = match self {
            LimitValue::Number(n) => *n,
            LimitValue::Text(text) => text.trim().parse::<f64>().map_err(|_| INVALID_NUMBER)?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(INVALID_NUMBER)
        }
    }
}

/// The body of a chart-creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSubmission {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub data_source: Option<i64>,
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub value_column: String,
    #[serde(default)]
    pub datetime_column: String,
    #[serde(default = "default_product_column")]
    pub product_column: String,
    #[serde(default)]
    pub product_identifier: Option<String>,
    #[serde(default = "default_operation_column")]
    pub operation_column: String,
    #[serde(default)]
    pub operation_identifier: Option<String>,
    #[serde(default)]
    pub upper_spec_limit: Option<LimitValue>,
    #[serde(default)]
    pub lower_spec_limit: Option<LimitValue>,
    #[serde(default)]
    pub target: Option<LimitValue>,
    #[serde(default)]
    pub aggregation_type: AggregationType,
    #[serde(default = "default_aggregation_size")]
    pub aggregation_size: i64,
    #[serde(default = "default_weco_rules")]
    pub weco_rules: Value,
}

fn default_product_column() -> String {
    DEFAULT_PRODUCT_COLUMN.to_string()
}

fn default_operation_column() -> String {
    DEFAULT_OPERATION_COLUMN.to_string()
}

fn default_aggregation_size() -> i64 {
    DEFAULT_AGGREGATION_SIZE
}

fn default_weco_rules() -> Value {
    Value::Object(Default::default())
}

impl Default for ChartSubmission {
    fn default() -> Self {
        Self {
            title: String::new(),
            data_source: None,
            table_name: String::new(),
            value_column: String::new(),
            datetime_column: String::new(),
            product_column: default_product_column(),
            product_identifier: None,
            operation_column: default_operation_column(),
            operation_identifier: None,
            upper_spec_limit: None,
            lower_spec_limit: None,
            target: None,
            aggregation_type: AggregationType::default(),
            aggregation_size: default_aggregation_size(),
            weco_rules: default_weco_rules(),
        }
    }
}

/// A submission whose fields all passed validation. Whether `data_source`
/// names an existing, active source is checked by whoever stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidChart {
    pub title: String,
    pub data_source: i64,
    pub table_name: String,
    pub value_column: String,
    pub datetime_column: String,
    pub product_column: String,
    pub product_identifier: Option<String>,
    pub operation_column: String,
    pub operation_identifier: Option<String>,
    pub upper_spec_limit: Option<f64>,
    pub lower_spec_limit: Option<f64>,
    pub target: Option<f64>,
    pub aggregation_type: AggregationType,
    pub aggregation_size: u32,
    pub weco_rules: Value,
}

impl ChartSubmission {
    pub fn validate(&self) -> Result<ValidChart, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        check_text(&mut errors, "title", &self.title, false, 255);
        if self.data_source.is_none() {
            errors.add("data_source", "This field is required.");
        }
        check_text(&mut errors, "table_name", &self.table_name, true, 255);
        check_text(&mut errors, "value_column", &self.value_column, true, 255);
        check_text(&mut errors, "datetime_column", &self.datetime_column, true, 255);
        check_text(&mut errors, "product_column", &self.product_column, true, 255);
        check_text(&mut errors, "operation_column", &self.operation_column, true, 255);

        let product_identifier = non_blank(self.product_identifier.as_deref());
        let operation_identifier = non_blank(self.operation_identifier.as_deref());
        if let Some(value) = &product_identifier {
            check_text(&mut errors, "product_identifier", value, false, 255);
        }
        if let Some(value) = &operation_identifier {
            check_text(&mut errors, "operation_identifier", value, false, 255);
        }

        let upper = parse_limit(&mut errors, "upper_spec_limit", self.upper_spec_limit.as_ref());
        let lower = parse_limit(&mut errors, "lower_spec_limit", self.lower_spec_limit.as_ref());
        let target = parse_limit(&mut errors, "target", self.target.as_ref());
        check_limit_order(&mut errors, lower, target, upper);

        if self.aggregation_size < 1 {
            errors.add(
                "aggregation_size",
                "Ensure this value is greater than or equal to 1.",
            );
        } else if self.aggregation_size > i64::from(u32::MAX) {
            errors.add(
                "aggregation_size",
                format!("Ensure this value is less than or equal to {}.", u32::MAX),
            );
        }

        if !self.weco_rules.is_object() {
            errors.add(
                "weco_rules",
                "Expected a dictionary of items but got something else.",
            );
        }

        errors.into_result(ValidChart {
            title: self.title.trim().to_string(),
            data_source: self.data_source.unwrap_or_default(),
            table_name: self.table_name.trim().to_string(),
            value_column: self.value_column.trim().to_string(),
            datetime_column: self.datetime_column.trim().to_string(),
            product_column: self.product_column.trim().to_string(),
            product_identifier,
            operation_column: self.operation_column.trim().to_string(),
            operation_identifier,
            upper_spec_limit: upper,
            lower_spec_limit: lower,
            target,
            aggregation_type: self.aggregation_type,
            aggregation_size: u32::try_from(self.aggregation_size).unwrap_or(1),
            weco_rules: self.weco_rules.clone(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_limit(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&LimitValue>,
) -> Option<f64> {
    match value.map(LimitValue::parse) {
        None => None,
        Some(Ok(n)) => Some(n),
        Some(Err(message)) => {
            errors.add(field, message);
            None
        }
    }
}

/// LSL <= target <= USL, for whichever of the three are present.
fn check_limit_order(
    errors: &mut ValidationErrors,
    lower: Option<f64>,
    target: Option<f64>,
    upper: Option<f64>,
) {
    if let (Some(lower), Some(upper)) = (lower, upper) {
        if lower > upper {
            errors.add(
                "lower_spec_limit",
                "Ensure the lower spec limit does not exceed the upper spec limit.",
            );
        }
    }
    if let Some(target) = target {
        if lower.is_some_and(|lower| target < lower) || upper.is_some_and(|upper| target > upper) {
            errors.add("target", "Ensure the target lies within the spec limits.");
        }
    }
}

/// A stored chart configuration as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub id: i64,
    pub owner: i64,
    pub title: String,
    pub data_source: i64,
    pub data_source_name: String,
    pub table_name: String,
    pub value_column: String,
    pub datetime_column: String,
    pub product_column: String,
    pub product_identifier: Option<String>,
    pub operation_column: String,
    pub operation_identifier: Option<String>,
    pub upper_spec_limit: Option<f64>,
    pub lower_spec_limit: Option<f64>,
    pub target: Option<f64>,
    pub aggregation_type: AggregationType,
    pub aggregation_size: u32,
    #[serde(default = "default_weco_rules")]
    pub weco_rules: Value,
    pub created_at: String,
    pub updated_at: String,
}

impl ChartConfig {
    /// Title to show, falling back to the product/operation identifiers.
    pub fn display_name(&self) -> String {
        if !self.title.is_empty() {
            return self.title.clone();
        }
        format!(
            "{} - {}",
            self.product_identifier.as_deref().unwrap_or(""),
            self.operation_identifier.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn submission() -> ChartSubmission {
        ChartSubmission {
            title: "Diameter".into(),
            data_source: Some(1),
            table_name: "production_data".into(),
            value_column: "measurement_val".into(),
            datetime_column: "created_at".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_missing_wire_fields() {
        let parsed: ChartSubmission = serde_json::from_value(json!({
            "data_source": 1,
            "table_name": "production_data",
            "value_column": "measurement_val",
            "datetime_column": "created_at"
        }))
        .unwrap();
        assert_eq!(parsed.product_column, "Product");
        assert_eq!(parsed.operation_column, "Operation");
        assert_eq!(parsed.aggregation_type, AggregationType::TimeHour);
        assert_eq!(parsed.aggregation_size, 1);
        assert_eq!(parsed.weco_rules, json!({}));
    }

    #[test]
    fn absent_limits_serialize_as_null() {
        let json = serde_json::to_value(submission()).unwrap();
        assert_eq!(json["upper_spec_limit"], Value::Null);
        assert_eq!(json["lower_spec_limit"], Value::Null);
        assert_eq!(json["target"], Value::Null);
    }

    #[test]
    fn aggregation_type_wire_names() {
        assert_eq!(
            serde_json::to_value(AggregationType::TimeDay).unwrap(),
            json!("TIME_DAY")
        );
        assert_eq!("count".parse::<AggregationType>(), Ok(AggregationType::Count));
    }

    #[test]
    fn limits_accept_numbers_and_numeric_text() {
        let mut s = submission();
        s.upper_spec_limit = Some(LimitValue::Text("10.5".into()));
        s.lower_spec_limit = Some(LimitValue::Number(9.5));
        s.target = Some(LimitValue::Text(" 10 ".into()));
        let valid = s.validate().unwrap();
        assert_eq!(valid.upper_spec_limit, Some(10.5));
        assert_eq!(valid.lower_spec_limit, Some(9.5));
        assert_eq!(valid.target, Some(10.0));
    }

    #[test]
    fn empty_or_garbage_limit_text_is_rejected() {
        let mut s = submission();
        s.upper_spec_limit = Some(LimitValue::Text(String::new()));
        s.target = Some(LimitValue::Text("abc".into()));
        s.lower_spec_limit = Some(LimitValue::Text("NaN".into()));
        let errors = s.validate().unwrap_err();
        assert_eq!(errors.get("upper_spec_limit").unwrap()[0], INVALID_NUMBER);
        assert_eq!(errors.get("target").unwrap()[0], INVALID_NUMBER);
        assert!(errors.contains("lower_spec_limit"));
    }

    #[test]
    fn aggregation_size_must_be_positive() {
        for size in [0, -1] {
            let mut s = submission();
            s.aggregation_size = size;
            assert!(s.validate().unwrap_err().contains("aggregation_size"));
        }
    }

    #[test]
    fn required_mapping_fields() {
        let errors = ChartSubmission::default().validate().unwrap_err();
        for field in ["data_source", "table_name", "value_column", "datetime_column"] {
            assert!(errors.contains(field), "missing error for {field}");
        }
        assert!(!errors.contains("title"));
    }

    #[test]
    fn blank_identifiers_mean_no_filter() {
        let mut s = submission();
        s.product_identifier = Some("  ".into());
        s.operation_identifier = Some("OP-20".into());
        let valid = s.validate().unwrap();
        assert_eq!(valid.product_identifier, None);
        assert_eq!(valid.operation_identifier.as_deref(), Some("OP-20"));
    }

    #[test]
    fn limit_ordering_is_enforced() {
        let mut s = submission();
        s.lower_spec_limit = Some(LimitValue::Number(11.0));
        s.upper_spec_limit = Some(LimitValue::Number(10.0));
        assert!(s.validate().unwrap_err().contains("lower_spec_limit"));

        let mut s = submission();
        s.lower_spec_limit = Some(LimitValue::Number(9.0));
        s.target = Some(LimitValue::Number(8.0));
        assert!(s.validate().unwrap_err().contains("target"));

        let mut s = submission();
        s.upper_spec_limit = Some(LimitValue::Number(10.0));
        s.target = Some(LimitValue::Number(12.0));
        assert!(s.validate().unwrap_err().contains("target"));

        let mut s = submission();
        s.lower_spec_limit = Some(LimitValue::Number(9.0));
        s.target = Some(LimitValue::Number(12.0));
        assert!(s.validate().is_ok());

        let mut s = submission();
        s.target = Some(LimitValue::Number(12.0));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn weco_rules_must_be_an_object() {
        let mut s = submission();
        s.weco_rules = json!([1, 2]);
        assert!(s.validate().unwrap_err().contains("weco_rules"));
    }

    #[test]
    fn display_name_falls_back_to_identifiers() {
        let chart = ChartConfig {
            id: 1,
            owner: 1,
            title: String::new(),
            data_source: 1,
            data_source_name: "Line1".into(),
            table_name: "t".into(),
            value_column: "v".into(),
            datetime_column: "d".into(),
            product_column: "Product".into(),
            product_identifier: Some("P-101".into()),
            operation_column: "Operation".into(),
            operation_identifier: Some("OP-20".into()),
            upper_spec_limit: None,
            lower_spec_limit: None,
            target: None,
            aggregation_type: AggregationType::Count,
            aggregation_size: 30,
            weco_rules: json!({}),
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(chart.display_name(), "P-101 - OP-20");
    }
}
