use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use watchtime_completion::agents::{aggregate_agents, aggregate_domains};
use watchtime_completion::config::CONFIG_ENV;
use watchtime_completion::modules::{module_funnel, module_reach};
use watchtime_completion::progress::email_key;
use watchtime_completion::{
    ingest, logging, report, Catalog, CompletionSource, Config, GradeBook, ProgressIndex,
    RecordFilter, ReportKind, WatchTimeRecord,
};

#[derive(Parser)]
#[command(name = "watchtime-completion")]
#[command(about = "Course completion reports from watch-time and grade exports", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DataArgs {
    /// Watch-time export (semicolon-delimited CSV)
    #[arg(long)]
    watchtime: PathBuf,
    /// Directory holding the per-discipline grade exports
    #[arg(long)]
    grades_dir: Option<PathBuf>,
    /// Restrict students to a configured domain set
    #[arg(long)]
    domain: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank agents by completed disciplines
    Leaderboard {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Per-module completions for one agent
    Agent {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        email: String,
    },
    /// Module reach and where active students currently are
    Funnel {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Completed students per discipline
    Disciplines {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, default_value = "unified")]
        source: CompletionSource,
    },
    /// Completions grouped by student email domain
    Domains {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Disciplines, lessons and grades of one student
    Student {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long)]
        email: String,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

struct Dataset {
    records: Vec<WatchTimeRecord>,
    grades: GradeBook,
    filter: RecordFilter,
}

impl Dataset {
    fn load(config: &Config, catalog: &Catalog, data: &DataArgs) -> anyhow::Result<Self> {
        let (records, summary) = ingest::read_watch_time(&data.watchtime)
            .with_context(|| format!("failed to read {}", data.watchtime.display()))?;
        if summary.loaded == 0 {
            anyhow::bail!(
                "{} contains no readable watch-time rows",
                data.watchtime.display()
            );
        }

        let grades = match &data.grades_dir {
            Some(dir) => ingest::load_grade_book(dir, catalog, config.grades.passing_score)
                .with_context(|| format!("failed to load grades from {}", dir.display()))?,
            None => GradeBook::new(config.grades.passing_score),
        };

        let filter = config.record_filter(catalog, data.domain.as_deref())?;
        Ok(Self {
            records,
            grades,
            filter,
        })
    }

    fn index(&self, config: &Config, catalog: &Catalog, kind: ReportKind) -> ProgressIndex {
        ProgressIndex::build(&self.records, catalog, &self.filter, config.profile(kind))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    logging::init(&config.logging.level);
    let catalog = config.catalog();

    match cli.command {
        Commands::Leaderboard { data, limit } => {
            let dataset = Dataset::load(&config, &catalog, &data)?;
            let index = dataset.index(&config, &catalog, ReportKind::Agent);
            let rows = report::top_agents(&aggregate_agents(&index, &catalog), limit);

            if cli.json {
                return print_json(&rows);
            }
            if rows.is_empty() {
                println!("No agent assignments found.");
                return Ok(());
            }

            println!("Agents by completed disciplines:");
            for (rank, row) in rows.iter().enumerate() {
                println!(
                    "{}. {} ({}) {} completions",
                    rank + 1,
                    row.label,
                    row.agent_email,
                    row.total_completions
                );
            }
        }
        Commands::Agent { data, email } => {
            let dataset = Dataset::load(&config, &catalog, &data)?;
            let index = dataset.index(&config, &catalog, ReportKind::Agent);
            let rollups = aggregate_agents(&index, &catalog);
            let agent = email_key(&email);

            let Some(rollup) = rollups.iter().find(|r| r.agent_email == agent) else {
                if cli.json {
                    return print_json(&serde_json::Value::Null);
                }
                println!("No students found for agent {email}.");
                return Ok(());
            };

            let table = report::agent_detail(rollup, &catalog);
            if cli.json {
                return print_json(&table);
            }

            println!("Disciplines completed by students of {}:", rollup.agent_email);
            for module in &table {
                println!();
                println!("{}", module.module);
                for count in &module.disciplines {
                    println!("  {}: {}", count.discipline, count.completed_students);
                }
            }
            let students = report::agent_students(rollup);
            if !students.is_empty() {
                println!();
                println!("Students:");
                for (discipline, emails) in students {
                    println!("  {}: {}", discipline, emails.join(", "));
                }
            }
        }
        Commands::Funnel { data } => {
            let dataset = Dataset::load(&config, &catalog, &data)?;
            let index = dataset.index(&config, &catalog, ReportKind::Catalogue);
            let series = report::module_series(
                &catalog,
                &module_reach(&index, &catalog),
                &module_funnel(&index, &catalog, &dataset.grades),
            );

            if cli.json {
                return print_json(&series);
            }

            println!("Module reach and funnel ({} active students):", index.len());
            for point in &series {
                println!(
                    "- {}: reached {}, currently here {}",
                    point.module, point.reach, point.currently_here
                );
            }
        }
        Commands::Disciplines { data, source } => {
            let dataset = Dataset::load(&config, &catalog, &data)?;
            let index = dataset.index(&config, &catalog, ReportKind::Catalogue);
            let breakdown = report::discipline_breakdown(&index, &catalog, &dataset.grades, source);

            if cli.json {
                return print_json(&breakdown);
            }

            println!("Completed students per discipline ({source}):");
            for module in &breakdown.modules {
                println!();
                println!("{}", module.module);
                for count in &module.disciplines {
                    if count.unattributed > 0 {
                        println!(
                            "  {}: {} (+{} unattributed grades)",
                            count.discipline, count.completed_students, count.unattributed
                        );
                    } else {
                        println!("  {}: {}", count.discipline, count.completed_students);
                    }
                }
            }
        }
        Commands::Domains { data } => {
            let dataset = Dataset::load(&config, &catalog, &data)?;
            let index = dataset.index(&config, &catalog, ReportKind::Agent);
            let rollups = aggregate_domains(&index, &catalog);

            if cli.json {
                return print_json(&rollups);
            }

            for rollup in &rollups {
                println!(
                    "- {}: {} students, {} completions",
                    if rollup.domain.is_empty() { "(no domain)" } else { rollup.domain.as_str() },
                    rollup.students,
                    rollup.total_completions()
                );
            }
        }
        Commands::Student { data, email } => {
            let dataset = Dataset::load(&config, &catalog, &data)?;
            let index = dataset.index(&config, &catalog, ReportKind::Student);
            let detail = report::student_detail(&index, &catalog, &dataset.grades, &email);

            if cli.json {
                return print_json(&detail);
            }
            print!("{}", report::render_student(&detail));
        }
        Commands::Report { data, out } => {
            let dataset = Dataset::load(&config, &catalog, &data)?;
            let agent_index = dataset.index(&config, &catalog, ReportKind::Agent);
            let catalogue_index = dataset.index(&config, &catalog, ReportKind::Catalogue);

            let leaderboard = report::leaderboard(&aggregate_agents(&agent_index, &catalog));
            let series = report::module_series(
                &catalog,
                &module_reach(&catalogue_index, &catalog),
                &module_funnel(&catalogue_index, &catalog, &dataset.grades),
            );
            let breakdown = report::discipline_breakdown(
                &catalogue_index,
                &catalog,
                &dataset.grades,
                CompletionSource::Unified,
            );

            let output = report::build_report(
                data.domain.as_deref(),
                Utc::now().date_naive(),
                &leaderboard,
                &series,
                &breakdown,
            );
            std::fs::write(&out, output)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
