use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::catalog::{Catalog, DomainSet};
use crate::completion::{ThresholdProfile, DEFAULT_PASSING_SCORE};
use crate::error::{Error, Result};
use crate::progress::RecordFilter;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "WATCHTIME_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Per-student detail view.
    Student,
    /// Agent leaderboard and domain rollups.
    Agent,
    /// Module reach/funnel and discipline breakdown.
    Catalogue,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    /// Named tenant domain sets: `name = ["@suffix", ...]`.
    #[serde(default)]
    pub domains: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub grades: GradeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug)]
pub struct ThresholdConfig {
    pub student: ThresholdProfile,
    pub agent: ThresholdProfile,
    pub catalogue: ThresholdProfile,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            student: ThresholdProfile::STUDENT,
            agent: ThresholdProfile::AGENT,
            catalogue: ThresholdProfile::CATALOGUE,
        }
    }
}

/// `[thresholds.*]` table as written; unset keys keep the built-in profile.
#[derive(Debug, Default, Deserialize)]
struct ProfileOverride {
    lesson: Option<f64>,
    discipline: Option<f64>,
    trust_platform_flag: Option<bool>,
}

impl ProfileOverride {
    fn apply(self, base: ThresholdProfile) -> ThresholdProfile {
        ThresholdProfile {
            lesson: self.lesson.unwrap_or(base.lesson),
            discipline: self.discipline.unwrap_or(base.discipline),
            trust_platform_flag: self.trust_platform_flag.unwrap_or(base.trust_platform_flag),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ThresholdOverrides {
    #[serde(default)]
    student: ProfileOverride,
    #[serde(default)]
    agent: ProfileOverride,
    #[serde(default)]
    catalogue: ProfileOverride,
}

impl<'de> Deserialize<'de> for ThresholdConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let overrides = ThresholdOverrides::deserialize(deserializer)?;
        Ok(Self {
            student: overrides.student.apply(ThresholdProfile::STUDENT),
            agent: overrides.agent.apply(ThresholdProfile::AGENT),
            catalogue: overrides.catalogue.apply(ThresholdProfile::CATALOGUE),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FilterConfig {
    /// Record statuses treated as active. Empty accepts every status.
    #[serde(default)]
    pub active_statuses: Vec<String>,

    /// Agents dropped from aggregation, on top of the built-in list.
    #[serde(default)]
    pub excluded_agents: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GradeConfig {
    #[serde(default = "default_passing_score")]
    pub passing_score: f64,
}

impl Default for GradeConfig {
    fn default() -> Self {
        Self {
            passing_score: default_passing_score(),
        }
    }
}

fn default_passing_score() -> f64 {
    DEFAULT_PASSING_SCORE
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Loads from `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, profile) in [
            ("student", &self.thresholds.student),
            ("agent", &self.thresholds.agent),
            ("catalogue", &self.thresholds.catalogue),
        ] {
            profile
                .validate()
                .map_err(|e| Error::Config(format!("thresholds.{name}: {e}")))?;
        }

        if !self.grades.passing_score.is_finite() {
            return Err(Error::Config("grades.passing_score must be a number".to_string()));
        }
        Ok(())
    }

    pub fn profile(&self, kind: ReportKind) -> ThresholdProfile {
        match kind {
            ReportKind::Student => self.thresholds.student,
            ReportKind::Agent => self.thresholds.agent,
            ReportKind::Catalogue => self.thresholds.catalogue,
        }
    }

    /// The built-in catalog extended with this config's domain sets and
    /// agent exclusions.
    pub fn catalog(&self) -> Catalog {
        let mut catalog = Catalog::builtin();
        for agent in &self.filters.excluded_agents {
            catalog = catalog.with_excluded_agent(agent);
        }
        for (name, suffixes) in &self.domains {
            catalog = catalog.with_domain_set(DomainSet::new(name.clone(), suffixes));
        }
        catalog
    }

    /// Record filter for the active statuses and an optional named domain set.
    pub fn record_filter(&self, catalog: &Catalog, domain: Option<&str>) -> Result<RecordFilter> {
        let domain = match domain {
            Some(name) => Some(catalog.domain_set(name).cloned().ok_or_else(|| {
                let known: Vec<&str> = catalog.domain_set_names().collect();
                Error::Config(format!(
                    "unknown domain set '{}' (configured: {})",
                    name,
                    if known.is_empty() { "none".to_string() } else { known.join(", ") }
                ))
            })?),
            None => None,
        };

        Ok(RecordFilter::default()
            .with_active_statuses(&self.filters.active_statuses)
            .with_domain(domain))
    }
}
