use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    Lecture,
    Practice,
    Lab,
    Seminar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ScheduleEntry {
    pub id: i64,
    pub subject: String,
    #[serde(default)]
    pub teacher: Option<String>,
    pub room: String,
    #[serde(default)]
    pub building: String,
    /// e.g. `09:00-10:30`
    pub time: String,
    pub day: String,
    pub lesson_type: LessonType,
    #[serde(default)]
    pub color: Option<String>,
}

impl ScheduleEntry {
    /// Start of the slot, parsed from `time`.
    pub fn starts_at(&self) -> Option<chrono::NaiveTime> {
        let start = self.time.split('-').next()?.trim();
        chrono::NaiveTime::parse_from_str(start, "%H:%M").ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Course {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub teacher: Option<String>,
    #[serde(default)]
    pub credits: Option<f32>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum GradeKind {
    Exam,
    Test,
    Homework,
    Project,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Grade {
    pub id: i64,
    pub subject: String,
    pub grade: f32,
    pub max_grade: f32,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: GradeKind,
    #[serde(default)]
    pub teacher: Option<String>,
}

impl Grade {
    /// Score as a percentage of the maximum, `None` when the maximum is zero.
    pub fn percent(&self) -> Option<f32> {
        (self.max_grade > 0.0).then(|| self.grade * 100.0 / self.max_grade)
    }
}
