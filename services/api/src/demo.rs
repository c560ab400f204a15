use assignment_engine::config::{AppConfig, ReportConfig};
use assignment_engine::error::AppError;
use assignment_engine::workflows::assignments::{
    AdminId, AssignmentCoordinator, AssignmentLogEntry, AssignmentReports, AuditQuery, Database,
    FacultyAccount, FacultyId, FacultyLoadEntry, PageRequest, Submission, SubmissionId,
};
use chrono::{Duration, Utc};
use clap::Args;

const DEMO_COURSES: [&str; 3] = ["data-structures", "distributed-systems", "compilers"];
const DEMO_LEVELS: [&str; 2] = ["junior", "senior"];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of queued submissions to seed
    #[arg(long, default_value_t = 14)]
    pub(crate) submissions: usize,
    /// Administrator recorded against every demo action
    #[arg(long, default_value = "demo-admin")]
    pub(crate) admin: String,
    /// Skip the redistribution step of the demo
    #[arg(long)]
    pub(crate) skip_redistribute: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            submissions: 14,
            admin: "demo-admin".to_string(),
            skip_redistribute: false,
        }
    }
}

#[derive(Args, Debug, Default)]
pub(crate) struct LoadReportArgs {
    /// SQLite database to read (defaults to APP_DATABASE_PATH)
    #[arg(long)]
    pub(crate) database: Option<String>,
    /// Only list reviewers currently accepting work
    #[arg(long)]
    pub(crate) available_only: bool,
}

pub(crate) fn run_load_report(args: LoadReportArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(path) = args.database {
        config.database.path = path;
    }

    let db = Database::open(&config.database)?;
    let reports = AssignmentReports::new(db, &config.reports);
    let loads = reports.faculty_load(args.available_only)?;

    println!("Faculty load ({})", config.database.path);
    render_load_report(&loads);
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let db = Database::open_in_memory()?;
    let coordinator = AssignmentCoordinator::new(db.clone());
    let reports = AssignmentReports::new(db, &ReportConfig::default());
    let admin = AdminId::new(args.admin);

    seed_demo_ledger(&coordinator, args.submissions)?;
    println!("Faculty assignment demo");
    println!(
        "Seeded {} reviewers and {} queued submissions",
        demo_faculty().len(),
        args.submissions
    );

    let auto = coordinator.auto_assign(&admin)?;
    println!(
        "\nAuto-assign: {} placed, {} left in the queue",
        auto.assigned_count, auto.skipped
    );

    let leftovers: Vec<SubmissionId> = reports
        .unassigned_queue(None, None)?
        .into_iter()
        .map(|submission| submission.id)
        .collect();
    if leftovers.is_empty() {
        println!("Bulk assign: queue already empty");
    } else {
        let target = FacultyId::new("hopper");
        coordinator.set_capacity(&admin, &target, 10)?;
        let bulk = coordinator.bulk_assign(&admin, &leftovers, &target)?;
        println!(
            "Bulk assign to {}: {} placed, {} skipped",
            target,
            bulk.assigned.len(),
            bulk.errors.len()
        );
        for failure in &bulk.errors {
            println!("- {}: {}", failure.submission_id, failure.reason.label());
        }
    }

    if !args.skip_redistribute {
        let leaving = FacultyId::new("lovelace");
        coordinator.set_availability(&admin, &leaving, false)?;
        let outcome = coordinator.redistribute(&admin, &leaving)?;
        println!(
            "Redistribute from {}: {} moved, {} stayed",
            leaving, outcome.redistributed_count, outcome.skipped
        );
    }

    println!("\nFaculty load");
    render_load_report(&reports.faculty_load(false)?);

    let trail = reports.audit_log(&AuditQuery {
        page: PageRequest::new(1, 20),
        ..AuditQuery::default()
    })?;
    println!(
        "\nAudit trail (latest {} of {})",
        trail.data.len(),
        trail.pagination.total
    );
    render_audit_trail(&trail.data);

    Ok(())
}

fn demo_faculty() -> Vec<FacultyAccount> {
    [("hopper", 3), ("knuth", 4), ("liskov", 2), ("lovelace", 3)]
        .into_iter()
        .map(|(id, max_capacity)| FacultyAccount {
            id: FacultyId::new(id),
            name: format!("Prof. {}", capitalize(id)),
            max_capacity,
            is_available: true,
            current_load: 0,
        })
        .collect()
}

fn seed_demo_ledger(coordinator: &AssignmentCoordinator, count: usize) -> Result<(), AppError> {
    for account in demo_faculty() {
        coordinator.register_faculty(&account)?;
    }

    let opened = Utc::now() - Duration::hours(count as i64);
    for n in 0..count {
        coordinator.register_submission(&Submission {
            id: SubmissionId::new(format!("sub-{:03}", n + 1)),
            candidate: format!("Candidate {}", n + 1),
            course: DEMO_COURSES[n % DEMO_COURSES.len()].to_string(),
            level: DEMO_LEVELS[n % DEMO_LEVELS.len()].to_string(),
            submitted_at: opened + Duration::hours(n as i64),
            status: "queued".to_string(),
            weight: 1,
        })?;
    }
    Ok(())
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn render_load_report(loads: &[FacultyLoadEntry]) {
    if loads.is_empty() {
        println!("- no faculty registered");
        return;
    }
    for entry in loads {
        let availability = if entry.is_available { "available" } else { "away" };
        println!(
            "- {} ({}): {}/{} active, {} evaluated, {} [{}]",
            entry.name,
            entry.id,
            entry.live_load,
            entry.max_capacity,
            entry.completed,
            availability,
            entry.courses.join(", ")
        );
        if entry.live_load != entry.current_load {
            println!(
                "  cached load {} is stale; run recalculate to repair",
                entry.current_load
            );
        }
    }
}

pub(crate) fn render_audit_trail(entries: &[AssignmentLogEntry]) {
    for entry in entries {
        let from = entry
            .from_faculty_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        let to = entry
            .to_faculty_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "- {} {} {} -> {} ({})",
            entry.created_at.format("%H:%M:%S"),
            entry.action_type,
            from,
            to,
            entry.submission_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_against_a_fresh_ledger() {
        run_demo(DemoArgs::default()).expect("demo completes");
    }

    #[test]
    fn seeded_ledger_spreads_work_within_capacity() {
        let db = Database::open_in_memory().expect("database");
        let coordinator = AssignmentCoordinator::new(db.clone());
        let reports = AssignmentReports::new(db, &ReportConfig::default());
        seed_demo_ledger(&coordinator, 8).expect("seed");

        let outcome = coordinator
            .auto_assign(&AdminId::new("demo-admin"))
            .expect("auto assign");
        assert_eq!(outcome.assigned_count, 8);

        let loads = reports.faculty_load(false).expect("loads");
        assert!(loads.iter().all(|entry| entry.live_load <= entry.max_capacity));
        assert_eq!(loads.iter().map(|entry| entry.live_load).sum::<u32>(), 8);
    }

    #[test]
    fn capitalize_handles_empty_input() {
        assert_eq!(capitalize("knuth"), "Knuth");
        assert_eq!(capitalize(""), "");
    }
}
