use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::completion::GradeBook;
use crate::duration::format_duration;
use crate::models::{
    AgentRollup, CompletionSource, GradeStatus, ModuleFunnelEntry, ModuleReachEntry,
};
use crate::modules::current_module;
use crate::progress::{email_key, ProgressIndex, StudentActivity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    pub agent_email: String,
    pub label: String,
    pub total_completions: usize,
}

/// Leaderboard rows, keeping the rollup order.
pub fn leaderboard(rollups: &[AgentRollup]) -> Vec<LeaderboardRow> {
    rollups
        .iter()
        .map(|rollup| LeaderboardRow {
            agent_email: rollup.agent_email.clone(),
            label: rollup.label().to_string(),
            total_completions: rollup.total_completions(),
        })
        .collect()
}

/// The first `limit` leaderboard rows.
pub fn top_agents(rollups: &[AgentRollup], limit: usize) -> Vec<LeaderboardRow> {
    let mut rows = leaderboard(rollups);
    rows.truncate(limit);
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSeriesPoint {
    pub module: String,
    pub reach: usize,
    pub currently_here: usize,
}

/// Joins reach and funnel by module name, in catalog order.
pub fn module_series(
    catalog: &Catalog,
    reach: &[ModuleReachEntry],
    funnel: &[ModuleFunnelEntry],
) -> Vec<ModuleSeriesPoint> {
    catalog
        .modules()
        .iter()
        .map(|module| ModuleSeriesPoint {
            module: module.name.clone(),
            reach: reach
                .iter()
                .find(|entry| entry.module == module.name)
                .map(|entry| entry.students_reached)
                .unwrap_or(0),
            currently_here: funnel
                .iter()
                .find(|entry| entry.module == module.name)
                .map(|entry| entry.students_currently_here)
                .unwrap_or(0),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisciplineCount {
    pub discipline: String,
    pub total_lessons: u32,
    pub completed_students: usize,
    /// Passing grade rows whose username matches no student anywhere in the
    /// watch-time export, so their email domain cannot be determined.
    pub unattributed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleBreakdown {
    pub module: String,
    pub disciplines: Vec<DisciplineCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisciplineBreakdown {
    pub source: CompletionSource,
    pub modules: Vec<ModuleBreakdown>,
}

impl DisciplineBreakdown {
    pub fn total_completions(&self) -> usize {
        self.modules
            .iter()
            .flat_map(|module| module.disciplines.iter())
            .map(|count| count.completed_students)
            .sum()
    }
}

/// Students completing each catalog discipline under the requested evidence
/// source, grouped by module.
pub fn discipline_breakdown(
    index: &ProgressIndex,
    catalog: &Catalog,
    grades: &GradeBook,
    source: CompletionSource,
) -> DisciplineBreakdown {
    let mut unresolved = 0usize;
    let modules = catalog
        .modules()
        .iter()
        .map(|module| ModuleBreakdown {
            module: module.name.clone(),
            disciplines: module
                .disciplines
                .iter()
                .map(|discipline| {
                    let completed_students = index
                        .students()
                        .filter(|student| {
                            let by_watch_time = source != CompletionSource::Grade
                                && index.completed_by_watch_time(student, discipline, catalog);
                            let grade = if source == CompletionSource::WatchTime {
                                GradeStatus::NotFound
                            } else {
                                grades.status(discipline, &student.email)
                            };
                            by_watch_time || grade.is_passing()
                        })
                        .count();

                    let unattributed = if source == CompletionSource::WatchTime {
                        0
                    } else {
                        grades
                            .usernames(discipline)
                            .filter(|username| !index.knows_username(username))
                            .filter(|username| {
                                grades.status_for_username(discipline, username).is_passing()
                            })
                            .count()
                    };
                    unresolved += unattributed;

                    DisciplineCount {
                        discipline: discipline.clone(),
                        total_lessons: catalog.total_lessons(discipline),
                        completed_students,
                        unattributed,
                    }
                })
                .collect(),
        })
        .collect();

    if unresolved > 0 {
        tracing::warn!(
            unresolved,
            "passing grades match no watch-time student, reported as unattributed"
        );
    }

    DisciplineBreakdown { source, modules }
}

/// Per-module discipline table for one agent, zero-filled.
pub fn agent_detail(rollup: &AgentRollup, catalog: &Catalog) -> Vec<ModuleBreakdown> {
    catalog
        .modules()
        .iter()
        .map(|module| ModuleBreakdown {
            module: module.name.clone(),
            disciplines: module
                .disciplines
                .iter()
                .map(|discipline| DisciplineCount {
                    discipline: discipline.clone(),
                    total_lessons: catalog.total_lessons(discipline),
                    completed_students: rollup.count(discipline),
                    unattributed: 0,
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentDisciplineRow {
    pub discipline: String,
    pub completed_lessons: usize,
    pub total_lessons: u32,
    pub completion_rate: f64,
    pub completed_by_watch_time: bool,
    pub grade: GradeStatus,
    pub completed: bool,
    pub watched_seconds: u64,
    pub last_completed_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentDetail {
    pub email: String,
    pub name: String,
    pub current_module: Option<String>,
    pub rows: Vec<StudentDisciplineRow>,
}

impl StudentDetail {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Detail rows for one student: every discipline with watch-time activity or
/// a grade row, catalog disciplines first in catalog order.
pub fn student_detail(
    index: &ProgressIndex,
    catalog: &Catalog,
    grades: &GradeBook,
    email: &str,
) -> StudentDetail {
    let email = email_key(email);
    let student = index.student(&email);

    let mut disciplines: BTreeSet<String> = student
        .map(|student| student.disciplines().map(|(key, _)| key.to_string()).collect())
        .unwrap_or_default();
    for discipline in grades.disciplines() {
        if grades.status(discipline, &email) != GradeStatus::NotFound {
            disciplines.insert(discipline.to_string());
        }
    }

    let mut rows: Vec<StudentDisciplineRow> = disciplines
        .into_iter()
        .map(|discipline| student_row(index, catalog, grades, student, &email, discipline))
        .collect();
    rows.sort_by(|a, b| {
        let rank = |row: &StudentDisciplineRow| {
            catalog.position(&row.discipline).unwrap_or(usize::MAX)
        };
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.discipline.cmp(&b.discipline))
    });

    StudentDetail {
        email: email.clone(),
        name: student.map(|s| s.name.clone()).unwrap_or_default(),
        current_module: student
            .and_then(|student| current_module(student, index, catalog, grades))
            .map(|module| module.name.clone()),
        rows,
    }
}

fn student_row(
    index: &ProgressIndex,
    catalog: &Catalog,
    grades: &GradeBook,
    student: Option<&StudentActivity>,
    email: &str,
    discipline: String,
) -> StudentDisciplineRow {
    let tally = student.and_then(|student| student.discipline(&discipline));
    let progress = tally.map(|tally| index.progress(&discipline, tally, catalog));
    let grade = grades.status(&discipline, email);
    let completed_by_watch_time = progress.as_ref().map_or(false, |p| p.completed);

    StudentDisciplineRow {
        completed_lessons: progress.as_ref().map_or(0, |p| p.completed_lessons),
        total_lessons: catalog.total_lessons(&discipline),
        completion_rate: progress.as_ref().map_or(0.0, |p| p.completion_rate),
        completed_by_watch_time,
        grade,
        completed: completed_by_watch_time || grade.is_passing(),
        watched_seconds: tally.map_or(0, |t| t.watched_seconds),
        last_completed_on: tally.and_then(|t| t.last_completed_on),
        discipline,
    }
}

pub fn build_report(
    scope: Option<&str>,
    generated_on: NaiveDate,
    leaderboard: &[LeaderboardRow],
    series: &[ModuleSeriesPoint],
    breakdown: &DisciplineBreakdown,
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all students");

    let _ = writeln!(output, "# Course Completion Report");
    let _ = writeln!(output, "Generated for {} on {}", scope_label, generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Agent Leaderboard");

    if leaderboard.is_empty() {
        let _ = writeln!(output, "No agent assignments in this data set.");
    } else {
        for (rank, row) in leaderboard.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} ({}): {} completions",
                rank + 1,
                row.label,
                row.agent_email,
                row.total_completions
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Module Reach and Funnel");
    let _ = writeln!(output, "| Module | Reached | Currently here |");
    let _ = writeln!(output, "|---|---:|---:|");
    for point in series {
        let _ = writeln!(
            output,
            "| {} | {} | {} |",
            point.module, point.reach, point.currently_here
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Completions by Discipline ({})", breakdown.source);
    for module in &breakdown.modules {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {}", module.module);
        for count in &module.disciplines {
            let _ = write!(
                output,
                "- {} ({} lessons): {} students",
                count.discipline, count.total_lessons, count.completed_students
            );
            if count.unattributed > 0 {
                let _ = write!(output, ", {} unattributed grades", count.unattributed);
            }
            let _ = writeln!(output);
        }
    }

    output
}

/// Plain-text rendering of a student's detail rows.
pub fn render_student(detail: &StudentDetail) -> String {
    let mut output = String::new();

    if detail.is_empty() {
        let _ = writeln!(output, "No data found for {}.", detail.email);
        return output;
    }

    let _ = writeln!(output, "{} ({})", detail.name, detail.email);
    if let Some(module) = &detail.current_module {
        let _ = writeln!(output, "Currently in: {module}");
    }

    for row in &detail.rows {
        let status = if row.completed { "completed" } else { "in progress" };
        let _ = write!(
            output,
            "- {}: {}/{} lessons ({:.0}%), watched {}, {}, {}",
            row.discipline,
            row.completed_lessons,
            row.total_lessons,
            row.completion_rate * 100.0,
            format_duration(row.watched_seconds as f64),
            row.grade,
            status
        );
        if let Some(date) = row.last_completed_on {
            let _ = write!(output, " (last completion {date})");
        }
        let _ = writeln!(output);
    }

    output
}

/// Groups an agent's completed students by discipline for a detail listing.
pub fn agent_students(rollup: &AgentRollup) -> BTreeMap<&str, Vec<&str>> {
    rollup
        .per_discipline
        .iter()
        .map(|(discipline, entry)| {
            (
                discipline.as_str(),
                entry.students.iter().map(String::as_str).collect(),
            )
        })
        .collect()
}
