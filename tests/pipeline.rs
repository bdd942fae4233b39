use std::fs;
use std::path::Path;

use tempfile::TempDir;
use watchtime_completion::agents::aggregate_agents;
use watchtime_completion::modules::{module_funnel, module_reach};
use watchtime_completion::{
    ingest, report, CompletionSource, Config, GradeStatus, ProgressIndex, ReportKind,
};

const HEADER: &str = "id;user_email;user_full_name;lesson_name;course_name;video_name;total_duration;completed;completed_date;until_completed_duration;video_total_duration;created_at;updated_at;export_date;registration_code;status;ags";

fn row(id: &str, email: &str, course: &str, watched: &str, status: &str, agent: &str) -> String {
    format!(
        "{id};{email};Aluno {id};Aula {id};{course};Video {id};{watched};false;;;00:10:00;;;;;{status};{agent}"
    )
}

fn write_watch_time(dir: &Path, rows: &[String]) -> std::path::PathBuf {
    let path = dir.join("relatorio_watchtime.csv");
    let mut content = String::from(HEADER);
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    content.push('\n');
    fs::write(&path, content).unwrap();
    path
}

/// Twenty lessons of "Banco de Dados" (35 in the catalog) plus one re-watch.
fn banco_rows(email: &str, agent: &str) -> Vec<String> {
    let mut rows: Vec<String> = (1..=20)
        .map(|i| row(&format!("bd{i}"), email, "Banco de Dados", "00:09:00", "Ativo", agent))
        .collect();
    rows.push(row("bd1", email, "Banco de Dados", "00:10:00", "Ativo", agent));
    rows
}

#[test]
fn banco_de_dados_completion_depends_on_report_profile() {
    let dir = TempDir::new().unwrap();
    let path = write_watch_time(dir.path(), &banco_rows("joao@pd.com.br", "maria@pd.com.br"));
    let (records, summary) = ingest::read_watch_time(&path).unwrap();
    assert_eq!(summary.loaded, 21);

    let config = Config::default();
    let catalog = config.catalog();
    let filter = config.record_filter(&catalog, None).unwrap();

    let agent_index =
        ProgressIndex::build(&records, &catalog, &filter, config.profile(ReportKind::Agent));
    let rollups = aggregate_agents(&agent_index, &catalog);
    assert_eq!(rollups.len(), 1);
    assert_eq!(rollups[0].count("Banco de Dados Relacional"), 1);

    let student_index =
        ProgressIndex::build(&records, &catalog, &filter, config.profile(ReportKind::Student));
    let detail =
        report::student_detail(&student_index, &catalog, &Default::default(), "joao@pd.com.br");
    let row = &detail.rows[0];
    assert_eq!(row.discipline, "Banco de Dados Relacional");
    assert_eq!(row.completed_lessons, 20);
    assert_eq!(row.total_lessons, 35);
    assert!(!row.completed);
    assert_eq!(detail.current_module.as_deref(), Some("Módulo 2: Backend e Dados"));
}

#[test]
fn grades_directory_feeds_unified_completion() {
    let dir = TempDir::new().unwrap();
    let path = write_watch_time(
        dir.path(),
        &[
            row("s1", "joao@pd.com.br", "Scratch", "00:01:00", "Ativo", "maria@pd.com.br"),
            row("s1", "ana@pd.com.br", "Scratch", "00:01:00", "Ativo", "maria@pd.com.br"),
        ],
    );
    fs::write(
        dir.path().join("course-v1_ProjetoDesenvolve+Scratch1+01.csv"),
        "Usuário;Nota total (%)\njoao;75,5\nana;59\nzeca;90\n",
    )
    .unwrap();

    let config = Config::default();
    let catalog = config.catalog();
    let (records, _) = ingest::read_watch_time(&path).unwrap();
    let grades =
        ingest::load_grade_book(dir.path(), &catalog, config.grades.passing_score).unwrap();
    assert_eq!(grades.status("Scratch", "joao@pd.com.br"), GradeStatus::Passed { score: 75.5 });
    assert_eq!(grades.status("Scratch", "ana@pd.com.br"), GradeStatus::Failed { score: 59.0 });

    let filter = config.record_filter(&catalog, None).unwrap();
    let index =
        ProgressIndex::build(&records, &catalog, &filter, config.profile(ReportKind::Catalogue));

    let breakdown =
        report::discipline_breakdown(&index, &catalog, &grades, CompletionSource::Unified);
    let scratch = &breakdown.modules[0].disciplines[0];
    assert_eq!(scratch.discipline, "Scratch");
    assert_eq!(scratch.completed_students, 1);
    assert_eq!(scratch.unattributed, 1);

    let watch_only =
        report::discipline_breakdown(&index, &catalog, &grades, CompletionSource::WatchTime);
    assert_eq!(watch_only.total_completions(), 0);
}

#[test]
fn missing_grade_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    let config = Config::default();
    let grades = ingest::load_grade_book(dir.path(), &config.catalog(), 60.0).unwrap();
    assert!(grades.is_empty());
}

#[test]
fn status_and_domain_filters_shape_the_funnel() {
    let dir = TempDir::new().unwrap();
    let mut rows = vec![
        row("l1", "ana@pd.com.br", "Linux", "00:02:00", "Ativo", ""),
        row("l1", "bia@pd.com.br", "Linux", "00:02:00", "Cancelado", ""),
        row("j1", "caio@gmail.com", "JavaScript", "00:02:00", "Ativo", ""),
    ];
    rows.push(row("j1", "ana@pd.com.br", "JavaScript", "00:02:00", "Ativo", ""));
    let path = write_watch_time(dir.path(), &rows);

    let config = Config::parse(
        r#"
[filters]
active_statuses = ["ativo"]

[domains]
pd = ["@pd.com.br"]
"#,
    )
    .unwrap();
    let catalog = config.catalog();
    let (records, _) = ingest::read_watch_time(&path).unwrap();

    let filter = config.record_filter(&catalog, Some("pd")).unwrap();
    let index =
        ProgressIndex::build(&records, &catalog, &filter, config.profile(ReportKind::Catalogue));
    assert_eq!(index.len(), 1);

    let grades = Default::default();
    let series = report::module_series(
        &catalog,
        &module_reach(&index, &catalog),
        &module_funnel(&index, &catalog, &grades),
    );
    assert_eq!(series[0].reach, 1);
    assert_eq!(series[1].reach, 1);
    assert_eq!(series[0].currently_here, 1);
    assert_eq!(series[1].currently_here, 0);

    let unfiltered = config.record_filter(&catalog, None).unwrap();
    let index = ProgressIndex::build(
        &records,
        &catalog,
        &unfiltered,
        config.profile(ReportKind::Catalogue),
    );
    let funnel = module_funnel(&index, &catalog, &grades);
    let bucketed: usize = funnel.iter().map(|entry| entry.students_currently_here).sum();
    assert_eq!(index.len(), 2);
    assert!(bucketed <= index.len());
}

#[test]
fn excluded_agent_never_reaches_the_leaderboard() {
    let dir = TempDir::new().unwrap();
    let mut rows = banco_rows("joao@pd.com.br", "agentx@pd.com.br");
    rows.extend(banco_rows("ana@pd.com.br", "maria@pd.com.br"));
    let path = write_watch_time(dir.path(), &rows);

    let config = Config::parse("[filters]\nexcluded_agents = [\"AgentX@pd.com.br\"]\n").unwrap();
    let catalog = config.catalog();
    let (records, _) = ingest::read_watch_time(&path).unwrap();
    let filter = config.record_filter(&catalog, None).unwrap();
    let index =
        ProgressIndex::build(&records, &catalog, &filter, config.profile(ReportKind::Agent));

    let board = report::leaderboard(&aggregate_agents(&index, &catalog));
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].label, "maria");
    assert_eq!(board[0].total_completions, 1);
}
