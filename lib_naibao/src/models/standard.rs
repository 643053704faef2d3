use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference table kinds the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardKind {
    MilkByWeight,
    MilkByAge,
    WeightGain,
    HeightGain,
}

impl StandardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardKind::MilkByWeight => "milk_by_weight",
            StandardKind::MilkByAge => "milk_by_age",
            StandardKind::WeightGain => "weight_gain",
            StandardKind::HeightGain => "height_gain",
        }
    }
}

/// One versioned, age-bucketed reference row covering `[month_min, month_max)`.
///
/// `data` holds `{min, max, recommended, unit}`; it stays raw JSON until a
/// lookup parses it so that one malformed row cannot poison a whole load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardEntry {
    pub id: u64,
    pub version: String,
    pub standard_type: String,
    pub month_min: Option<i32>,
    pub month_max: Option<i32>,
    pub data: Value,
    pub is_active: bool,
}
