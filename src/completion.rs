use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::catalog::Catalog;
use crate::duration::parse_duration;
use crate::models::{CompletionFact, GradeRecord, GradeStatus, WatchTimeRecord};
use crate::progress::LessonTally;

pub const DEFAULT_PASSING_SCORE: f64 = 60.0;

/// Thresholds used by one kind of report.
///
/// `lesson` is the watched fraction of a video that counts the lesson as
/// completed; `discipline` is the fraction of a discipline's lessons that
/// counts the discipline as completed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdProfile {
    pub lesson: f64,
    pub discipline: f64,
    /// Also count lessons the platform itself marked completed.
    pub trust_platform_flag: bool,
}

impl ThresholdProfile {
    /// Per-student detail view.
    pub const STUDENT: ThresholdProfile = ThresholdProfile::new(0.5, 0.8);
    /// Agent leaderboard and domain rollups.
    pub const AGENT: ThresholdProfile = ThresholdProfile::new(0.5, 0.5);
    /// Module reach/funnel and discipline-by-module breakdown.
    pub const CATALOGUE: ThresholdProfile = ThresholdProfile::new(0.8, 0.8);

    pub const fn new(lesson: f64, discipline: f64) -> Self {
        Self {
            lesson,
            discipline,
            trust_platform_flag: false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [("lesson", self.lesson), ("discipline", self.discipline)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} threshold must be within 0..=1, got {value}"));
            }
        }
        Ok(())
    }
}

/// A lesson is watched when the video has a length and at least
/// `threshold` of it was watched.
pub fn is_lesson_watched(record: &WatchTimeRecord, threshold: f64) -> bool {
    let video_total_seconds = parse_duration(&record.total_video_duration);
    let watched_seconds = parse_duration(&record.watched_duration);
    video_total_seconds > 0 && (watched_seconds as f64) >= (video_total_seconds as f64) * threshold
}

/// Lesson predicate for a report profile.
pub fn lesson_completed(record: &WatchTimeRecord, profile: &ThresholdProfile) -> bool {
    is_lesson_watched(record, profile.lesson)
        || (profile.trust_platform_flag && record.platform_completed())
}

/// Share of a discipline's lessons completed; zero when the discipline has no
/// known lesson total.
pub fn completion_rate(completed_lessons: usize, total_lessons: u32) -> f64 {
    if total_lessons == 0 {
        return 0.0;
    }
    completed_lessons as f64 / total_lessons as f64
}

pub fn completed_by_watch_time(
    completed_lessons: usize,
    total_lessons: u32,
    threshold: f64,
) -> bool {
    total_lessons > 0
        && completed_lessons > 0
        && completion_rate(completed_lessons, total_lessons) >= threshold
}

/// Watch-time progress of one student in one discipline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisciplineProgress {
    pub discipline: String,
    pub completed_lessons: usize,
    pub total_lessons: u32,
    pub completion_rate: f64,
    pub completed: bool,
}

impl DisciplineProgress {
    pub fn from_tally(
        discipline: &str,
        tally: &LessonTally,
        catalog: &Catalog,
        profile: &ThresholdProfile,
    ) -> Self {
        let completed_lessons = tally.completed_lessons();
        let total_lessons = catalog.total_lessons(discipline);
        Self {
            discipline: discipline.to_string(),
            completed_lessons,
            total_lessons,
            completion_rate: completion_rate(completed_lessons, total_lessons),
            completed: completed_by_watch_time(
                completed_lessons,
                total_lessons,
                profile.discipline,
            ),
        }
    }
}

/// Resolves watch-time completion for one student's records, keyed by
/// canonical discipline.
pub fn resolve_watch_time<'a, I>(
    records: I,
    catalog: &Catalog,
    profile: &ThresholdProfile,
) -> BTreeMap<String, DisciplineProgress>
where
    I: IntoIterator<Item = &'a WatchTimeRecord>,
{
    let mut tallies: BTreeMap<String, LessonTally> = BTreeMap::new();
    for record in records {
        let key = catalog.normalize(&record.discipline_name_raw);
        tallies
            .entry(key.to_string())
            .or_default()
            .observe(record, profile);
    }

    tallies
        .iter()
        .map(|(key, tally)| {
            (
                key.clone(),
                DisciplineProgress::from_tally(key, tally, catalog, profile),
            )
        })
        .collect()
}

/// Grade-file username for a student email: the lowercased local part.
pub fn username_of(email: &str) -> String {
    email
        .split('@')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Parses a score such as `75,5` or `75.5`.
pub fn parse_score(text: &str) -> Option<f64> {
    let score: f64 = text.trim().replace(',', ".").parse().ok()?;
    score.is_finite().then_some(score)
}

/// Grade exports indexed by canonical discipline and lowercased username.
#[derive(Debug, Clone)]
pub struct GradeBook {
    passing_score: f64,
    by_discipline: BTreeMap<String, HashMap<String, String>>,
}

impl Default for GradeBook {
    fn default() -> Self {
        Self::new(DEFAULT_PASSING_SCORE)
    }
}

impl GradeBook {
    pub fn new(passing_score: f64) -> Self {
        Self {
            passing_score,
            by_discipline: BTreeMap::new(),
        }
    }

    /// Adds one discipline's grade rows. The first row seen for a username
    /// wins, matching a top-down lookup of the export.
    pub fn insert(&mut self, discipline: &str, records: impl IntoIterator<Item = GradeRecord>) {
        let rows = self.by_discipline.entry(discipline.to_string()).or_default();
        for record in records {
            let username = record.username.trim().to_lowercase();
            if username.is_empty() {
                continue;
            }
            rows.entry(username).or_insert(record.total_score_percent);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_discipline.is_empty()
    }

    pub fn disciplines(&self) -> impl Iterator<Item = &str> {
        self.by_discipline.keys().map(String::as_str)
    }

    pub fn usernames<'a>(&'a self, discipline: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.by_discipline
            .get(discipline)
            .into_iter()
            .flat_map(|rows| rows.keys().map(String::as_str))
    }

    /// Grade status of a username. A row without a readable score counts as
    /// not found.
    pub fn status_for_username(&self, discipline: &str, username: &str) -> GradeStatus {
        let score = self
            .by_discipline
            .get(discipline)
            .and_then(|rows| rows.get(&username.trim().to_lowercase()))
            .and_then(|raw| parse_score(raw));

        match score {
            None => GradeStatus::NotFound,
            Some(score) if score >= self.passing_score => GradeStatus::Passed { score },
            Some(score) => GradeStatus::Failed { score },
        }
    }

    pub fn status(&self, discipline: &str, student_email: &str) -> GradeStatus {
        self.status_for_username(discipline, &username_of(student_email))
    }
}

/// Combines both evidence sources for one (student, discipline) pair.
pub fn unify(
    student_email: &str,
    discipline: &str,
    completed_by_watch_time: bool,
    grades: &GradeBook,
) -> CompletionFact {
    CompletionFact {
        student_email: student_email.to_string(),
        discipline: discipline.to_string(),
        completed_by_watch_time,
        grade: grades.status(discipline, student_email),
    }
}
