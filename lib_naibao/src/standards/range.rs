use serde_json::Value;

/// The `{min, max, recommended, unit}` payload of a reference row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeData {
    pub min: f64,
    pub max: f64,
    pub recommended: f64,
    pub unit: String,
}

fn number_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key) {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Some(_) => None,
    }
}

/// Parses a reference payload.
///
/// Absent or null numbers read as 0 and numeric strings are accepted. Any
/// malformed field fails the whole payload.
pub fn parse_range_data(raw: &Value) -> Option<RangeData> {
    let obj = raw.as_object()?;
    let unit = match obj.get("unit") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return None,
    };
    Some(RangeData {
        min: number_field(obj, "min")?,
        max: number_field(obj, "max")?,
        recommended: number_field(obj, "recommended")?,
        unit,
    })
}

fn round_half_up(v: f64) -> i64 {
    (v + 0.5) as i64
}

/// Renders `min-max` with a unit-specific suffix, e.g. `600-700ml/天`.
pub fn format_range_text(min: f64, max: f64, unit: &str) -> String {
    let unit = unit.trim();
    if unit.contains("ml/day") {
        format!("{}-{}ml/天", round_half_up(min), round_half_up(max))
    } else if unit.contains("mm/day") {
        format!("{}-{}mm/天", min, max)
    } else if unit.contains("kg/day") {
        format!("{}-{}kg/天", min, max)
    } else if !unit.is_empty() {
        format!("{}-{}{}", min, max, unit)
    } else {
        format!("{}-{}", min, max)
    }
}

impl RangeData {
    pub fn text(&self) -> String {
        format_range_text(self.min, self.max, &self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_accepts_numbers_strings_and_missing_fields() {
        let d = parse_range_data(&json!({"min": 600, "max": "700", "unit": " ml/day "})).unwrap();
        assert_eq!(d.min, 600.0);
        assert_eq!(d.max, 700.0);
        assert_eq!(d.recommended, 0.0);
        assert_eq!(d.unit, "ml/day");

        let d = parse_range_data(&json!({"recommended": null})).unwrap();
        assert_eq!(d, RangeData::default());
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        assert!(parse_range_data(&json!({"min": "abc", "max": 700})).is_none());
        assert!(parse_range_data(&json!({"min": true})).is_none());
        assert!(parse_range_data(&json!({"unit": 5})).is_none());
        assert!(parse_range_data(&json!([1, 2])).is_none());
        assert!(parse_range_data(&Value::Null).is_none());
    }

    #[test]
    fn test_format_templates_by_unit() {
        assert_eq!(format_range_text(599.6, 700.2, "ml/day"), "600-700ml/天");
        assert_eq!(format_range_text(8.0, 11.0, "mm/day"), "8-11mm/天");
        assert_eq!(format_range_text(0.025, 0.035, "kg/day"), "0.025-0.035kg/天");
        assert_eq!(format_range_text(1.5, 2.0, "cm/month"), "1.5-2cm/month");
        assert_eq!(format_range_text(3.0, 4.25, ""), "3-4.25");
    }
}
