use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use crate::catalog::{Catalog, DomainSet};
use crate::completion::{lesson_completed, username_of, DisciplineProgress, ThresholdProfile};
use crate::duration::parse_duration;
use crate::models::WatchTimeRecord;

/// Lessons seen and completed by one student in one discipline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LessonTally {
    pub records: usize,
    completed: HashSet<String>,
    pub watched_seconds: u64,
    pub last_completed_on: Option<NaiveDate>,
}

impl LessonTally {
    pub fn observe(&mut self, record: &WatchTimeRecord, profile: &ThresholdProfile) {
        self.records += 1;
        self.watched_seconds += parse_duration(&record.watched_duration);
        if record.completed_date > self.last_completed_on {
            self.last_completed_on = record.completed_date;
        }
        if lesson_completed(record, profile) {
            self.completed.insert(record.lesson_key().to_string());
        }
    }

    /// Distinct completed lesson ids; re-watch rows count once.
    pub fn completed_lessons(&self) -> usize {
        self.completed.len()
    }
}

/// Which records take part in a report.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    active_statuses: Vec<String>,
    domain: Option<DomainSet>,
}

impl RecordFilter {
    /// Accepts only these statuses (case-insensitive). An empty list accepts
    /// every status.
    pub fn with_active_statuses(
        mut self,
        statuses: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        self.active_statuses = statuses
            .into_iter()
            .map(|status| status.as_ref().trim().to_lowercase())
            .filter(|status| !status.is_empty())
            .collect();
        self
    }

    pub fn with_domain(mut self, domain: Option<DomainSet>) -> Self {
        self.domain = domain;
        self
    }

    pub fn domain(&self) -> Option<&DomainSet> {
        self.domain.as_ref()
    }

    pub fn accepts(&self, record: &WatchTimeRecord) -> bool {
        let status_ok = self.active_statuses.is_empty()
            || self
                .active_statuses
                .iter()
                .any(|allowed| record.status.trim().eq_ignore_ascii_case(allowed));
        let domain_ok = self
            .domain
            .as_ref()
            .map_or(true, |domain| domain.matches(&record.student_email));
        status_ok && domain_ok
    }
}

/// Normalized lookup key for student and agent emails.
pub fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct StudentActivity {
    pub email: String,
    pub name: String,
    disciplines: BTreeMap<String, LessonTally>,
    by_agent: BTreeMap<String, BTreeMap<String, LessonTally>>,
}

impl StudentActivity {
    pub fn discipline(&self, key: &str) -> Option<&LessonTally> {
        self.disciplines.get(key)
    }

    pub fn disciplines(&self) -> impl Iterator<Item = (&str, &LessonTally)> {
        self.disciplines.iter().map(|(key, tally)| (key.as_str(), tally))
    }

    /// Tallies restricted to records assigned to each agent.
    pub fn agents(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, LessonTally>)> {
        self.by_agent.iter().map(|(agent, tallies)| (agent.as_str(), tallies))
    }

    pub fn has_activity_in<'a>(&self, keys: impl IntoIterator<Item = &'a String>) -> bool {
        keys.into_iter().any(|key| self.disciplines.contains_key(key))
    }

    pub fn domain(&self) -> &str {
        self.email.split_once('@').map(|(_, domain)| domain).unwrap_or("")
    }
}

/// Students and their lesson tallies for one threshold profile.
#[derive(Debug, Clone)]
pub struct ProgressIndex {
    profile: ThresholdProfile,
    students: BTreeMap<String, StudentActivity>,
    /// Usernames of every student in the export, filtered out or not.
    known_usernames: HashSet<String>,
    records_seen: usize,
    records_kept: usize,
}

impl ProgressIndex {
    pub fn build<'a, I>(
        records: I,
        catalog: &Catalog,
        filter: &RecordFilter,
        profile: ThresholdProfile,
    ) -> Self
    where
        I: IntoIterator<Item = &'a WatchTimeRecord>,
    {
        let mut students: BTreeMap<String, StudentActivity> = BTreeMap::new();
        let mut known_usernames = HashSet::new();
        let mut records_seen = 0usize;
        let mut records_kept = 0usize;

        for record in records {
            records_seen += 1;
            let email = email_key(&record.student_email);
            if email.is_empty() {
                continue;
            }
            known_usernames.insert(username_of(&email));
            if !filter.accepts(record) {
                continue;
            }
            records_kept += 1;

            let discipline = catalog.normalize(&record.discipline_name_raw).to_string();
            let student = students.entry(email.clone()).or_insert_with(|| StudentActivity {
                email,
                name: record.student_name.trim().to_string(),
                ..Default::default()
            });
            if student.name.is_empty() {
                student.name = record.student_name.trim().to_string();
            }

            let agent = email_key(&record.agent_email);
            if !agent.is_empty() {
                student
                    .by_agent
                    .entry(agent)
                    .or_default()
                    .entry(discipline.clone())
                    .or_default()
                    .observe(record, &profile);
            }
            student
                .disciplines
                .entry(discipline)
                .or_default()
                .observe(record, &profile);
        }

        tracing::debug!(
            records_seen,
            records_kept,
            students = students.len(),
            lesson = profile.lesson,
            discipline = profile.discipline,
            "progress index built"
        );

        Self {
            profile,
            students,
            known_usernames,
            records_seen,
            records_kept,
        }
    }

    pub fn profile(&self) -> &ThresholdProfile {
        &self.profile
    }

    pub fn student(&self, email: &str) -> Option<&StudentActivity> {
        self.students.get(&email_key(email))
    }

    pub fn students(&self) -> impl Iterator<Item = &StudentActivity> {
        self.students.values()
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    /// Whether any student in the export, including filtered-out ones, has
    /// this username.
    pub fn knows_username(&self, username: &str) -> bool {
        self.known_usernames.contains(username)
    }

    pub fn records_seen(&self) -> usize {
        self.records_seen
    }

    pub fn records_kept(&self) -> usize {
        self.records_kept
    }

    pub fn progress(
        &self,
        discipline: &str,
        tally: &LessonTally,
        catalog: &Catalog,
    ) -> DisciplineProgress {
        DisciplineProgress::from_tally(discipline, tally, catalog, &self.profile)
    }

    /// Watch-time completion of a discipline for a student, false when the
    /// student has no records in it.
    pub fn completed_by_watch_time(
        &self,
        student: &StudentActivity,
        discipline: &str,
        catalog: &Catalog,
    ) -> bool {
        student
            .discipline(discipline)
            .map(|tally| self.progress(discipline, tally, catalog).completed)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        email: &str,
        agent: &str,
        discipline: &str,
        id: &str,
        status: &str,
    ) -> WatchTimeRecord {
        WatchTimeRecord {
            id: id.to_string(),
            student_email: email.to_string(),
            student_name: "Aluno".to_string(),
            discipline_name_raw: discipline.to_string(),
            watched_duration: "00:10:00".to_string(),
            total_video_duration: "00:10:00".to_string(),
            status: status.to_string(),
            agent_email: agent.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn groups_by_student_and_normalized_discipline() {
        let catalog = Catalog::builtin();
        let records = vec![
            record("Ana@Example.com", "ag@pd.com", "Banco de Dados", "1", "ativo"),
            record("ana@example.com", "ag@pd.com", "Banco de Dados Relacional", "2", "ativo"),
            record("ana@example.com", "ag@pd.com", "Banco de Dados Relacional", "2", "ativo"),
        ];
        let index = ProgressIndex::build(
            &records,
            &catalog,
            &RecordFilter::default(),
            ThresholdProfile::STUDENT,
        );

        assert_eq!(index.len(), 1);
        let student = index.student("ANA@example.com").expect("student indexed");
        let tally = student.discipline("Banco de Dados Relacional").expect("tally");
        assert_eq!(tally.records, 3);
        assert_eq!(tally.completed_lessons(), 2);
        assert!(student.discipline("Banco de Dados").is_none());
        assert_eq!(student.domain(), "example.com");
    }

    #[test]
    fn filter_drops_inactive_statuses_and_foreign_domains() {
        let catalog = Catalog::builtin();
        let records = vec![
            record("a@pd.com.br", "", "Linux", "1", "Ativo"),
            record("b@pd.com.br", "", "Linux", "1", "cancelado"),
            record("c@gmail.com", "", "Linux", "1", "ativo"),
        ];
        let filter = RecordFilter::default()
            .with_active_statuses(["ativo"])
            .with_domain(Some(DomainSet::new("pd", ["@pd.com.br"])));
        let index = ProgressIndex::build(&records, &catalog, &filter, ThresholdProfile::STUDENT);

        assert_eq!(index.len(), 1);
        assert!(index.student("a@pd.com.br").is_some());
        assert_eq!(index.records_seen(), 3);
        assert_eq!(index.records_kept(), 1);
        assert!(index.knows_username("b"));
        assert!(index.knows_username("c"));
        assert!(!index.knows_username("d"));
    }

    #[test]
    fn agent_tallies_only_hold_that_agents_records() {
        let catalog = Catalog::builtin();
        let records = vec![
            record("a@x.com", "one@pd.com", "Linux", "1", ""),
            record("a@x.com", "two@pd.com", "Linux", "2", ""),
            record("a@x.com", "", "Linux", "3", ""),
        ];
        let index = ProgressIndex::build(
            &records,
            &catalog,
            &RecordFilter::default(),
            ThresholdProfile::AGENT,
        );
        let student = index.student("a@x.com").expect("student");

        let agents: Vec<(&str, usize)> = student
            .agents()
            .map(|(agent, tallies)| (agent, tallies["Linux"].completed_lessons()))
            .collect();
        assert_eq!(agents, vec![("one@pd.com", 1), ("two@pd.com", 1)]);
        assert_eq!(student.discipline("Linux").map(|t| t.completed_lessons()), Some(3));
    }

    #[test]
    fn records_without_email_are_ignored() {
        let catalog = Catalog::builtin();
        let records = vec![record("  ", "", "Linux", "1", "")];
        let index = ProgressIndex::build(
            &records,
            &catalog,
            &RecordFilter::default(),
            ThresholdProfile::STUDENT,
        );
        assert!(index.is_empty());
    }
}
