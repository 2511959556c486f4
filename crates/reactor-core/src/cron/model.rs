use serde::Deserialize;

/// One schedule field: month, day, hour, or minute. `Empty` means "don't
/// care" — the field can never fail readiness on its own, but a task whose
/// every field is `Empty` is a configuration error (§ readiness predicate).
/// `Invalid` is a distinct third state for a non-empty field that isn't one
/// of the two well-formed shapes (e.g. `"abc"`, `"*/x"`) — it is never
/// ready, which permanently blocks the task from firing on that field
/// rather than silently becoming don't-care.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScheduleField {
    #[default]
    Empty,
    Exact(i64),
    Every(i64),
    Invalid,
}

impl ScheduleField {
    /// Parses the three accepted textual forms: empty string, an integer,
    /// or `*/k`. Anything else parses to `Invalid`, which `is_ready` always
    /// rejects — this struct itself only distinguishes the well-formed
    /// shapes from the malformed one.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return ScheduleField::Empty;
        }
        if let Some(step) = raw.strip_prefix("*/") {
            return match step.parse::<i64>() {
                Ok(k) => ScheduleField::Every(k),
                Err(_) => ScheduleField::Invalid,
            };
        }
        match raw.parse::<i64>() {
            Ok(n) => ScheduleField::Exact(n),
            Err(_) => ScheduleField::Invalid,
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, ScheduleField::Empty)
    }

    /// Readiness against the current field value `n`. `Invalid` is never
    /// ready, per §4.3's readiness predicate ("Otherwise → false").
    pub fn is_ready(&self, n: i64) -> bool {
        match self {
            ScheduleField::Empty => true,
            ScheduleField::Every(k) if *k != 0 => n % k == 0,
            ScheduleField::Every(_) => false,
            ScheduleField::Exact(s) => n == *s,
            ScheduleField::Invalid => false,
        }
    }
}

/// A static cron entry. At least one of the four fields must be set
/// (enforced at schedule-check time, not at deserialization, to match the
/// "log and skip" behaviour instead of refusing to start).
#[derive(Debug, Clone, Deserialize)]
pub struct CronTaskDef {
    pub name: String,
    pub handler: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default, deserialize_with = "deserialize_field")]
    pub month: ScheduleField,
    #[serde(default, deserialize_with = "deserialize_field")]
    pub day: ScheduleField,
    #[serde(default, deserialize_with = "deserialize_field")]
    pub hour: ScheduleField,
    #[serde(default, deserialize_with = "deserialize_field")]
    pub minute: ScheduleField,
}

fn deserialize_field<'de, D>(deserializer: D) -> Result<ScheduleField, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(ScheduleField::parse(&raw))
}

/// Granularity of the finest (most frequent) non-empty schedule field,
/// which determines both the lock TTL and the "elapsed >= min_ttl before
/// release" correctness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub fn min_ttl_seconds(self) -> u64 {
        match self {
            Granularity::Minute => 60,
            Granularity::Hour => 3_600,
            Granularity::Day => 86_400,
            Granularity::Month => 2_678_400,
        }
    }
}

impl CronTaskDef {
    /// The finest granularity among the fields that are actually set.
    /// `None` when the task has no schedule field set at all (the
    /// configuration-error case).
    pub fn granularity(&self) -> Option<Granularity> {
        if self.minute.is_set() {
            Some(Granularity::Minute)
        } else if self.hour.is_set() {
            Some(Granularity::Hour)
        } else if self.day.is_set() {
            Some(Granularity::Day)
        } else if self.month.is_set() {
            Some(Granularity::Month)
        } else {
            None
        }
    }

    pub fn lock_name(&self) -> String {
        format!("cron:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_string_is_dont_care() {
        assert_eq!(ScheduleField::parse(""), ScheduleField::Empty);
    }

    #[test]
    fn parse_exact_integer() {
        assert_eq!(ScheduleField::parse("5"), ScheduleField::Exact(5));
    }

    #[test]
    fn parse_step_pattern() {
        assert_eq!(ScheduleField::parse("*/15"), ScheduleField::Every(15));
    }

    #[test]
    fn parse_malformed_field_is_invalid_not_empty() {
        assert_eq!(ScheduleField::parse("garbage"), ScheduleField::Invalid);
    }

    #[test]
    fn parse_malformed_step_pattern_is_invalid() {
        assert_eq!(ScheduleField::parse("*/notanumber"), ScheduleField::Invalid);
    }

    #[test]
    fn empty_field_is_always_ready() {
        assert!(ScheduleField::Empty.is_ready(0));
        assert!(ScheduleField::Empty.is_ready(59));
    }

    #[test]
    fn invalid_field_is_never_ready() {
        assert!(!ScheduleField::Invalid.is_ready(0));
        assert!(!ScheduleField::Invalid.is_ready(59));
    }

    #[test]
    fn invalid_field_counts_as_set() {
        assert!(ScheduleField::Invalid.is_set());
    }

    #[test]
    fn step_field_boundary_at_multiple() {
        let field = ScheduleField::Every(5);
        assert!(field.is_ready(5));
        assert!(field.is_ready(10));
        assert!(!field.is_ready(7));
    }

    #[test]
    fn exact_field_matches_only_its_value() {
        let field = ScheduleField::Exact(30);
        assert!(field.is_ready(30));
        assert!(!field.is_ready(31));
    }

    #[test]
    fn granularity_prefers_finest_set_field() {
        let task = CronTaskDef {
            name: "t".into(),
            handler: "h".into(),
            args: serde_json::json!({}),
            month: ScheduleField::Exact(1),
            day: ScheduleField::Empty,
            hour: ScheduleField::Empty,
            minute: ScheduleField::Every(5),
        };
        assert_eq!(task.granularity(), Some(Granularity::Minute));
    }

    #[test]
    fn granularity_is_none_when_nothing_set() {
        let task = CronTaskDef {
            name: "t".into(),
            handler: "h".into(),
            args: serde_json::json!({}),
            month: ScheduleField::Empty,
            day: ScheduleField::Empty,
            hour: ScheduleField::Empty,
            minute: ScheduleField::Empty,
        };
        assert_eq!(task.granularity(), None);
    }

    #[test]
    fn min_ttl_seconds_per_granularity() {
        assert_eq!(Granularity::Minute.min_ttl_seconds(), 60);
        assert_eq!(Granularity::Hour.min_ttl_seconds(), 3_600);
        assert_eq!(Granularity::Day.min_ttl_seconds(), 86_400);
        assert_eq!(Granularity::Month.min_ttl_seconds(), 2_678_400);
    }

    #[test]
    fn lock_name_is_prefixed() {
        let task = CronTaskDef {
            name: "cleanup_sessions".into(),
            handler: "h".into(),
            args: serde_json::json!({}),
            month: ScheduleField::Empty,
            day: ScheduleField::Empty,
            hour: ScheduleField::Empty,
            minute: ScheduleField::Every(1),
        };
        assert_eq!(task.lock_name(), "cron:cleanup_sessions");
    }
}
