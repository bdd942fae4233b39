use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::models::{AgentRollup, DomainRollup};
use crate::progress::ProgressIndex;

/// Per-agent watch-time completions, ordered for a leaderboard: most
/// completions first, ties by agent email ascending. Agents on the catalog's
/// exclusion list contribute nothing.
pub fn aggregate_agents(index: &ProgressIndex, catalog: &Catalog) -> Vec<AgentRollup> {
    let mut rollups: BTreeMap<String, AgentRollup> = BTreeMap::new();
    let mut excluded_rows = 0usize;

    for student in index.students() {
        for (agent, tallies) in student.agents() {
            if catalog.is_excluded_agent(agent) {
                excluded_rows += 1;
                continue;
            }

            let rollup = rollups
                .entry(agent.to_string())
                .or_insert_with(|| AgentRollup::new(agent));

            for (discipline, tally) in tallies {
                if index.progress(discipline, tally, catalog).completed {
                    rollup
                        .per_discipline
                        .entry(discipline.clone())
                        .or_default()
                        .insert(&student.email);
                }
            }
        }
    }

    if excluded_rows > 0 {
        tracing::debug!(excluded_rows, "skipped student assignments of excluded agents");
    }

    let mut values: Vec<AgentRollup> = rollups.into_values().collect();
    values.sort_by(|a, b| {
        b.total_completions()
            .cmp(&a.total_completions())
            .then_with(|| a.agent_email.cmp(&b.agent_email))
    });
    values
}

/// Watch-time completions grouped by the students' email domain.
pub fn aggregate_domains(index: &ProgressIndex, catalog: &Catalog) -> Vec<DomainRollup> {
    let mut rollups: BTreeMap<String, DomainRollup> = BTreeMap::new();

    for student in index.students() {
        let domain = student.domain().to_string();
        let rollup = rollups
            .entry(domain.clone())
            .or_insert_with(|| DomainRollup {
                domain,
                students: 0,
                per_discipline: BTreeMap::new(),
            });
        rollup.students += 1;

        for (discipline, tally) in student.disciplines() {
            if index.progress(discipline, tally, catalog).completed {
                rollup
                    .per_discipline
                    .entry(discipline.to_string())
                    .or_default()
                    .insert(&student.email);
            }
        }
    }

    let mut values: Vec<DomainRollup> = rollups.into_values().collect();
    values.sort_by(|a, b| {
        b.total_completions()
            .cmp(&a.total_completions())
            .then_with(|| a.domain.cmp(&b.domain))
    });
    values
}
