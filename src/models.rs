use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

/// One (student, lesson) observation from the watch-time export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchTimeRecord {
    pub id: String,
    pub student_email: String,
    pub student_name: String,
    pub discipline_name_raw: String,
    pub lesson_video_name: String,
    /// `HH:MM:SS` watched so far.
    pub watched_duration: String,
    /// `HH:MM:SS` length of the video.
    pub total_video_duration: String,
    pub status: String,
    pub agent_email: String,
    pub completed_flag: String,
    pub completed_date: Option<NaiveDate>,
}

impl WatchTimeRecord {
    /// The platform's own completion mark: flag set and a completion date.
    pub fn platform_completed(&self) -> bool {
        self.completed_flag.trim().eq_ignore_ascii_case("true") && self.completed_date.is_some()
    }

    /// Lesson identity within a discipline. Falls back to the video name for
    /// rows exported without an id.
    pub fn lesson_key(&self) -> &str {
        let id = self.id.trim();
        if id.is_empty() {
            self.lesson_video_name.trim()
        } else {
            id
        }
    }
}

/// One row of a per-discipline grade export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeRecord {
    /// Local part of the student's email, without domain.
    pub username: String,
    pub total_score_percent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GradeStatus {
    NotFound,
    Passed { score: f64 },
    Failed { score: f64 },
}

impl GradeStatus {
    pub fn is_passing(&self) -> bool {
        matches!(self, GradeStatus::Passed { .. })
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            GradeStatus::NotFound => None,
            GradeStatus::Passed { score } | GradeStatus::Failed { score } => Some(*score),
        }
    }
}

impl fmt::Display for GradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeStatus::NotFound => write!(f, "no grade"),
            GradeStatus::Passed { score } => write!(f, "passed ({score:.1}%)"),
            GradeStatus::Failed { score } => write!(f, "failed ({score:.1}%)"),
        }
    }
}

/// Completion evidence for one (student, discipline) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionFact {
    pub student_email: String,
    pub discipline: String,
    pub completed_by_watch_time: bool,
    pub grade: GradeStatus,
}

impl CompletionFact {
    pub fn completed_by_grade(&self) -> bool {
        self.grade.is_passing()
    }

    /// Either evidence source is sufficient.
    pub fn completed(&self) -> bool {
        self.completed_by_watch_time || self.completed_by_grade()
    }
}

/// Which evidence a discipline breakdown counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionSource {
    WatchTime,
    Grade,
    Unified,
}

impl CompletionSource {
    pub fn accepts(&self, fact: &CompletionFact) -> bool {
        match self {
            CompletionSource::WatchTime => fact.completed_by_watch_time,
            CompletionSource::Grade => fact.completed_by_grade(),
            CompletionSource::Unified => fact.completed(),
        }
    }
}

impl fmt::Display for CompletionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CompletionSource::WatchTime => "watch-time",
            CompletionSource::Grade => "grade",
            CompletionSource::Unified => "unified",
        };
        f.write_str(label)
    }
}

impl FromStr for CompletionSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "watch-time" | "watchtime" | "watch_time" => Ok(CompletionSource::WatchTime),
            "grade" | "grades" => Ok(CompletionSource::Grade),
            "unified" | "any" => Ok(CompletionSource::Unified),
            other => Err(format!(
                "unknown completion source '{other}' (expected watch-time, grade or unified)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisciplineCompletions {
    pub count: usize,
    pub students: BTreeSet<String>,
}

impl DisciplineCompletions {
    pub fn insert(&mut self, student_email: &str) {
        if self.students.insert(student_email.to_string()) {
            self.count = self.students.len();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRollup {
    pub agent_email: String,
    pub per_discipline: BTreeMap<String, DisciplineCompletions>,
}

impl AgentRollup {
    pub fn new(agent_email: impl Into<String>) -> Self {
        Self {
            agent_email: agent_email.into(),
            per_discipline: BTreeMap::new(),
        }
    }

    /// Short display name: the local part of the agent email.
    pub fn label(&self) -> &str {
        self.agent_email
            .split('@')
            .next()
            .unwrap_or(self.agent_email.as_str())
    }

    pub fn count(&self, discipline: &str) -> usize {
        self.per_discipline
            .get(discipline)
            .map(|entry| entry.count)
            .unwrap_or(0)
    }

    pub fn total_completions(&self) -> usize {
        self.per_discipline.values().map(|entry| entry.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainRollup {
    pub domain: String,
    pub students: usize,
    pub per_discipline: BTreeMap<String, DisciplineCompletions>,
}

impl DomainRollup {
    pub fn total_completions(&self) -> usize {
        self.per_discipline.values().map(|entry| entry.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReachEntry {
    pub module: String,
    pub students_reached: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleFunnelEntry {
    pub module: String,
    pub students_currently_here: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unified_completion_accepts_either_source() {
        let mut fact = CompletionFact {
            student_email: "ana@example.com".to_string(),
            discipline: "Linux".to_string(),
            completed_by_watch_time: true,
            grade: GradeStatus::NotFound,
        };
        assert!(fact.completed());

        fact.completed_by_watch_time = false;
        fact.grade = GradeStatus::Passed { score: 75.5 };
        assert!(fact.completed());
        assert!(CompletionSource::Grade.accepts(&fact));
        assert!(!CompletionSource::WatchTime.accepts(&fact));

        fact.grade = GradeStatus::Failed { score: 59.0 };
        assert!(!fact.completed());
    }

    #[test]
    fn lesson_key_falls_back_to_video_name() {
        let record = WatchTimeRecord {
            id: "  ".to_string(),
            lesson_video_name: "Aula 1".to_string(),
            ..Default::default()
        };
        assert_eq!(record.lesson_key(), "Aula 1");
    }

    #[test]
    fn platform_completion_needs_flag_and_date() {
        let mut record = WatchTimeRecord {
            completed_flag: "TRUE".to_string(),
            ..Default::default()
        };
        assert!(!record.platform_completed());
        record.completed_date = NaiveDate::from_ymd_opt(2025, 3, 1);
        assert!(record.platform_completed());
    }

    #[test]
    fn agent_rollup_totals_and_label() {
        let mut rollup = AgentRollup::new("maria@projetodesenvolve.com.br");
        rollup
            .per_discipline
            .entry("Linux".to_string())
            .or_default()
            .insert("a@example.com");
        rollup
            .per_discipline
            .entry("Linux".to_string())
            .or_default()
            .insert("a@example.com");
        rollup
            .per_discipline
            .entry("Scratch".to_string())
            .or_default()
            .insert("b@example.com");

        assert_eq!(rollup.label(), "maria");
        assert_eq!(rollup.count("Linux"), 1);
        assert_eq!(rollup.count("JavaScript"), 0);
        assert_eq!(rollup.total_completions(), 2);
    }

    #[test]
    fn completion_source_parses_cli_spellings() {
        assert_eq!("watch-time".parse::<CompletionSource>(), Ok(CompletionSource::WatchTime));
        assert_eq!("Grade".parse::<CompletionSource>(), Ok(CompletionSource::Grade));
        assert_eq!("unified".parse::<CompletionSource>(), Ok(CompletionSource::Unified));
        assert!("nope".parse::<CompletionSource>().is_err());
    }
}
