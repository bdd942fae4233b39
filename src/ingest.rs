use std::io;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::catalog::Catalog;
use crate::completion::GradeBook;
use crate::error::{Error, Result};
use crate::models::{GradeRecord, WatchTimeRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct WatchTimeRow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    user_email: String,
    #[serde(default)]
    user_full_name: String,
    #[serde(default)]
    lesson_name: String,
    #[serde(default)]
    course_name: String,
    #[serde(default)]
    video_name: String,
    #[serde(default)]
    total_duration: String,
    #[serde(default)]
    completed: String,
    #[serde(default)]
    completed_date: String,
    #[serde(default)]
    video_total_duration: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    ags: String,
}

impl From<WatchTimeRow> for WatchTimeRecord {
    fn from(row: WatchTimeRow) -> Self {
        let lesson_video_name = if row.video_name.is_empty() {
            row.lesson_name
        } else {
            row.video_name
        };

        WatchTimeRecord {
            id: row.id,
            student_email: row.user_email,
            student_name: row.user_full_name,
            discipline_name_raw: row.course_name,
            lesson_video_name,
            watched_duration: row.total_duration,
            total_video_duration: row.video_total_duration,
            status: row.status,
            agent_email: row.ags,
            completed_flag: row.completed,
            completed_date: parse_completed_date(&row.completed_date),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GradeRow {
    #[serde(rename = "Usuário", default)]
    username: String,
    #[serde(rename = "Nota total (%)", default)]
    total_score_percent: String,
}

/// Decodes the date part of a completion timestamp (`2025-03-01 10:00:00`,
/// `2025-03-01T10:00:00Z` or `01/03/2025`).
pub fn parse_completed_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    text.get(..10).and_then(|prefix| {
        NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(prefix, "%d/%m/%Y"))
            .ok()
    })
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All);
    builder
}

fn read_rows<R, T, U>(reader: R, source: &str) -> Result<(Vec<U>, IngestSummary)>
where
    R: io::Read,
    T: for<'de> Deserialize<'de>,
    U: From<T>,
{
    let mut reader = reader_builder().from_reader(reader);
    let mut rows = Vec::new();
    let mut summary = IngestSummary::default();

    let headers = reader
        .headers()
        .map_err(|source_err| Error::Csv {
            path: source.to_string(),
            source: source_err,
        })?
        .clone();

    for result in reader.records() {
        // Short rows are padded so trailing missing columns read as empty.
        let decoded = result.and_then(|mut record| {
            while record.len() < headers.len() {
                record.push_field("");
            }
            record.deserialize::<T>(Some(&headers))
        });
        match decoded {
            Ok(row) => {
                rows.push(U::from(row));
                summary.loaded += 1;
            }
            Err(err) => {
                summary.skipped += 1;
                if summary.skipped <= 5 {
                    tracing::warn!(source, error = %err, "skipping unreadable CSV row");
                }
            }
        }
    }

    tracing::info!(
        source,
        loaded = summary.loaded,
        skipped = summary.skipped,
        "CSV loaded"
    );
    Ok((rows, summary))
}

pub fn read_watch_time_from<R: io::Read>(
    reader: R,
    source: &str,
) -> Result<(Vec<WatchTimeRecord>, IngestSummary)> {
    read_rows::<R, WatchTimeRow, WatchTimeRecord>(reader, source)
}

pub fn read_watch_time(path: &Path) -> Result<(Vec<WatchTimeRecord>, IngestSummary)> {
    let file = std::fs::File::open(path)?;
    read_watch_time_from(file, &path.display().to_string())
}

impl From<GradeRow> for GradeRecord {
    fn from(row: GradeRow) -> Self {
        GradeRecord {
            username: row.username,
            total_score_percent: row.total_score_percent,
        }
    }
}

pub fn read_grades_from<R: io::Read>(
    reader: R,
    source: &str,
) -> Result<(Vec<GradeRecord>, IngestSummary)> {
    read_rows::<R, GradeRow, GradeRecord>(reader, source)
}

pub fn read_grades(path: &Path) -> Result<(Vec<GradeRecord>, IngestSummary)> {
    let file = std::fs::File::open(path)?;
    read_grades_from(file, &path.display().to_string())
}

/// Loads every grade file the catalog maps to a discipline from `dir`.
/// Files that are not present are skipped.
pub fn load_grade_book(dir: &Path, catalog: &Catalog, passing_score: f64) -> Result<GradeBook> {
    let mut book = GradeBook::new(passing_score);

    for (discipline, file_name) in catalog.grade_files() {
        let path = dir.join(file_name);
        if !path.is_file() {
            tracing::warn!(discipline, path = %path.display(), "grade file not found, skipping");
            continue;
        }

        let (records, _) = read_grades(&path)?;
        book.insert(catalog.normalize(discipline), records);
    }

    Ok(book)
}
