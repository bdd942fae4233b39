use crate::catalog::{Catalog, Module};
use crate::completion::{unify, GradeBook};
use crate::models::{ModuleFunnelEntry, ModuleReachEntry};
use crate::progress::{ProgressIndex, StudentActivity};

/// Distinct students with activity in any discipline of each module, in
/// catalog order.
pub fn module_reach(index: &ProgressIndex, catalog: &Catalog) -> Vec<ModuleReachEntry> {
    catalog
        .modules()
        .iter()
        .map(|module| ModuleReachEntry {
            module: module.name.clone(),
            students_reached: index
                .students()
                .filter(|student| student.has_activity_in(&module.disciplines))
                .count(),
        })
        .collect()
}

/// True when every discipline of the module is completed by watch-time or
/// grade.
pub fn module_completed(
    student: &StudentActivity,
    module: &Module,
    index: &ProgressIndex,
    catalog: &Catalog,
    grades: &GradeBook,
) -> bool {
    module.disciplines.iter().all(|discipline| {
        let by_watch_time = index.completed_by_watch_time(student, discipline, catalog);
        unify(&student.email, discipline, by_watch_time, grades).completed()
    })
}

/// The module a student is stalled in: the first module, in catalog order,
/// with activity but not fully completed. Modules without activity are
/// skipped; completed modules are passed through. `None` once nothing
/// remains unfinished.
pub fn current_module<'c>(
    student: &StudentActivity,
    index: &ProgressIndex,
    catalog: &'c Catalog,
    grades: &GradeBook,
) -> Option<&'c Module> {
    catalog.modules().iter().find(|module| {
        student.has_activity_in(&module.disciplines)
            && !module_completed(student, module, index, catalog, grades)
    })
}

/// Students attributed to their current module. Each student lands in at
/// most one bucket.
pub fn module_funnel(
    index: &ProgressIndex,
    catalog: &Catalog,
    grades: &GradeBook,
) -> Vec<ModuleFunnelEntry> {
    let mut counts = vec![0usize; catalog.modules().len()];
    let mut finished = 0usize;

    for student in index.students() {
        let position = current_module(student, index, catalog, grades)
            .and_then(|module| catalog.modules().iter().position(|m| m.name == module.name));
        match position {
            Some(position) => counts[position] += 1,
            None => finished += 1,
        }
    }

    tracing::debug!(
        students = index.len(),
        without_bucket = finished,
        "module funnel computed"
    );

    catalog
        .modules()
        .iter()
        .zip(counts)
        .map(|(module, students_currently_here)| ModuleFunnelEntry {
            module: module.name.clone(),
            students_currently_here,
        })
        .collect()
}
