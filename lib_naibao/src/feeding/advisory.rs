use super::calculator::{RecommendedAmount, WarningLevel};
use super::schedule::DaySchedule;
use chrono::{DateTime, Duration, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryLevel {
    /// Not enough history to judge.
    Unknown,
    Good,
    Attention,
    Alert,
}

/// Machine-readable reason behind an advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryCode {
    NoRecords,
    LongGap,
    Overdue,
    AboveStandard,
    BelowStandard,
    OnTrack,
}

/// One reminder for display: `level` and `code` for clients to branch on,
/// the texts for people.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedingAdvisory {
    pub level: AdvisoryLevel,
    pub code: AdvisoryCode,
    pub title: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl FeedingAdvisory {
    fn new(level: AdvisoryLevel, code: AdvisoryCode, title: &str, detail: String, suggestions: &[&str]) -> Self {
        Self {
            level,
            code,
            title: title.to_string(),
            detail,
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The most pressing advisory for right now.
///
/// The gap since the last feeding wins over intake: twice the interval that
/// followed the last feeding is an alert, anything past it needs attention.
/// Intake above the standard is flagged at any hour, intake below it only
/// once the day window has closed.
pub fn assess_feeding<Z: TimeZone>(
    now: &DateTime<Z>,
    last_feeding: Option<&DateTime<Z>>,
    schedule: &DaySchedule,
    recommendation: &RecommendedAmount,
) -> FeedingAdvisory {
    let Some(last) = last_feeding else {
        return FeedingAdvisory::new(
            AdvisoryLevel::Unknown,
            AdvisoryCode::NoRecords,
            "还没有喂奶记录",
            "记录第一次喂奶后开始提醒".to_string(),
            &[],
        );
    };

    let elapsed = now.clone() - last.clone();
    let hours = schedule.interval_after(last.hour());
    let interval = Duration::hours(hours);
    let since = format_elapsed(elapsed);

    if elapsed >= interval * 2 {
        return FeedingAdvisory::new(
            AdvisoryLevel::Alert,
            AdvisoryCode::LongGap,
            "距上次喂奶时间过长",
            format!("距上次喂奶已{}，超过建议间隔{}小时的两倍", since, hours),
            &["尽快安排一次喂奶", "宝宝持续拒奶或精神差时请咨询医生"],
        );
    }
    if elapsed > interval {
        return FeedingAdvisory::new(
            AdvisoryLevel::Attention,
            AdvisoryCode::Overdue,
            "已到喂奶时间",
            format!("距上次喂奶已{}，建议间隔{}小时", since, hours),
            &["留意宝宝的饥饿信号"],
        );
    }

    let intake = format!(
        "今日已喂{}ml，参考量约{}ml",
        recommendation.daily_consumed, recommendation.daily_standard
    );
    match recommendation.warning {
        WarningLevel::High => FeedingAdvisory::new(
            AdvisoryLevel::Attention,
            AdvisoryCode::AboveStandard,
            "今日奶量偏多",
            intake,
            &["适当减少单次奶量", "留意吐奶和腹胀"],
        ),
        WarningLevel::Low if now.hour() >= schedule.day_end_hour => FeedingAdvisory::new(
            AdvisoryLevel::Attention,
            AdvisoryCode::BelowStandard,
            "今日奶量偏少",
            intake,
            &["睡前可适当增加一次喂奶"],
        ),
        _ => FeedingAdvisory::new(
            AdvisoryLevel::Good,
            AdvisoryCode::OnTrack,
            "喂养节奏正常",
            format!("距上次喂奶{}", since),
            &[],
        ),
    }
}

/// `X天Y小时Z分`, dropping leading zero units; seconds only below a minute.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    let (days, hours, mins) = (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60);
    if days > 0 {
        format!("{}天{}小时{}分", days, hours, mins)
    } else if hours > 0 {
        format!("{}小时{}分", hours, mins)
    } else if mins > 0 {
        format!("{}分", mins)
    } else {
        format!("{}秒", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CivilClock;
    use chrono::NaiveDateTime;
    use chrono_tz::Tz;

    fn at(s: &str) -> DateTime<Tz> {
        let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap();
        CivilClock::default().from_wall_clock(naive)
    }

    fn recommendation(warning: WarningLevel, consumed: i32) -> RecommendedAmount {
        RecommendedAmount {
            recommended: 120,
            daily_standard: 675,
            daily_consumed: consumed,
            remaining_times: 3,
            warning,
            age_reference: "700-900ml/天".to_string(),
        }
    }

    fn assess(now: &str, last: Option<&str>, warning: WarningLevel) -> FeedingAdvisory {
        let last = last.map(at);
        assess_feeding(&at(now), last.as_ref(), &DaySchedule::default(), &recommendation(warning, 400))
    }

    #[test]
    fn test_no_history_is_unknown() {
        let advisory = assess("2026-02-01 10:00", None, WarningLevel::Low);
        assert_eq!(advisory.level, AdvisoryLevel::Unknown);
        assert_eq!(advisory.code, AdvisoryCode::NoRecords);
    }

    #[test]
    fn test_gap_uses_the_interval_after_the_last_feeding() {
        // 06:00 is day time, 3h interval.
        let overdue = assess("2026-02-01 10:00", Some("2026-02-01 06:00"), WarningLevel::Normal);
        assert_eq!((overdue.level, overdue.code), (AdvisoryLevel::Attention, AdvisoryCode::Overdue));
        assert_eq!(overdue.detail, "距上次喂奶已4小时0分，建议间隔3小时");

        // 03:00 is night time, 5h interval.
        let overdue = assess("2026-02-01 10:00", Some("2026-02-01 03:00"), WarningLevel::Normal);
        assert_eq!(overdue.code, AdvisoryCode::Overdue);
        let long = assess("2026-02-01 13:00", Some("2026-02-01 03:00"), WarningLevel::Normal);
        assert_eq!((long.level, long.code), (AdvisoryLevel::Alert, AdvisoryCode::LongGap));
    }

    #[test]
    fn test_gap_outranks_intake() {
        let advisory = assess("2026-02-01 16:00", Some("2026-02-01 09:00"), WarningLevel::High);
        assert_eq!(advisory.code, AdvisoryCode::LongGap);
    }

    #[test]
    fn test_intake_checks_after_a_recent_feeding() {
        let high = assess("2026-02-01 10:00", Some("2026-02-01 09:00"), WarningLevel::High);
        assert_eq!((high.level, high.code), (AdvisoryLevel::Attention, AdvisoryCode::AboveStandard));
        assert_eq!(high.detail, "今日已喂400ml，参考量约675ml");

        // low intake is only flagged once the day window has closed
        let morning = assess("2026-02-01 10:00", Some("2026-02-01 09:00"), WarningLevel::Low);
        assert_eq!((morning.level, morning.code), (AdvisoryLevel::Good, AdvisoryCode::OnTrack));
        let evening = assess("2026-02-01 19:00", Some("2026-02-01 18:30"), WarningLevel::Low);
        assert_eq!(evening.code, AdvisoryCode::BelowStandard);
        assert!(!evening.suggestions.is_empty());
    }

    #[test]
    fn test_elapsed_text() {
        assert_eq!(format_elapsed(Duration::seconds(-30)), "0秒");
        assert_eq!(format_elapsed(Duration::seconds(45)), "45秒");
        assert_eq!(format_elapsed(Duration::seconds(90)), "1分");
        assert_eq!(format_elapsed(Duration::minutes(185)), "3小时5分");
        assert_eq!(format_elapsed(Duration::minutes(26 * 60 + 3)), "1天2小时3分");
    }

    #[test]
    fn test_wire_shape() {
        let advisory = assess("2026-02-01 10:00", Some("2026-02-01 09:30"), WarningLevel::Normal);
        let value = serde_json::to_value(&advisory).unwrap();
        assert_eq!(value["level"], "good");
        assert_eq!(value["code"], "on_track");
        assert!(value.get("suggestions").is_none());
    }
}
