//! Project phase transitions.
//!
//! Moving a project between phases fans out the phase's checklist templates
//! into per-project progress rows and records the change in the activity
//! feed. The steps are deliberately not wrapped in a transaction: a failed
//! template insert is recorded and skipped so it can never block the phase
//! update or the audit entry.

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::db::Database;
use crate::error::Error;
use crate::models::{CreateActivityInput, Phase, Project};

#[derive(Debug, Clone, Serialize)]
pub struct PhaseTransition {
    pub project: Project,
    pub checklist_items_created: usize,
    /// Template items skipped because their insert failed. Duplicates are
    /// not errors; they are silently ignored and simply not counted.
    pub checklist_errors: Vec<String>,
}

pub fn transition_phase(
    db: &Database,
    project_id: i64,
    new_phase: Phase,
) -> Result<PhaseTransition, Error> {
    let now = Utc::now();
    let touched = db.set_project_phase(project_id, new_phase, now)?;
    if touched == 0 {
        return Err(Error::NotFound(format!("project {project_id}")));
    }

    let templates = db.templates_for_phase(new_phase)?;
    let mut created = 0;
    let mut errors = Vec::new();
    for template in &templates {
        match db.insert_progress_if_absent(project_id, template.id) {
            Ok(true) => created += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    project_id,
                    item_id = template.id,
                    "checklist insert skipped: {:#}",
                    e
                );
                errors.push(format!("{} ({:#})", template.title, e));
            }
        }
    }

    db.log_activity(CreateActivityInput {
        project_id: Some(project_id),
        kind: "phase_change".into(),
        title: format!("Phase changed to {}", new_phase.as_str()),
        description: Some(format!("{created} checklist item(s) created")),
        metadata: Some(json!({
            "phase": new_phase.as_str(),
            "checklist_items_created": created,
        })),
    })?;

    let project = db
        .get_project(project_id)?
        .context("project disappeared mid-transition")?;

    Ok(PhaseTransition {
        project,
        checklist_items_created: created,
        checklist_errors: errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateProjectInput;
    use crate::query::Filter;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn project(db: &Database, name: &str) -> Project {
        db.create_project(CreateProjectInput {
            name: name.to_string(),
            status: None,
            phase: None,
            repo_url: None,
            deploy_url: None,
        })
        .unwrap()
        .unwrap()
    }

    fn phase_change_count(db: &Database, project_id: i64) -> usize {
        let filter = Filter::new()
            .eq("project_id", project_id)
            .eq("type", "phase_change");
        db.list_activity(&filter, 100).unwrap().len()
    }

    #[test]
    fn transition_sets_phase_and_logs_once() {
        let db = db();
        let p = project(&db, "atlas");
        db.create_checklist_item(Phase::Live, "set up monitoring").unwrap();
        db.create_checklist_item(Phase::Live, "announce launch").unwrap();

        let result = transition_phase(&db, p.id, Phase::Live).unwrap();
        assert_eq!(result.project.phase, Phase::Live);
        assert_eq!(result.checklist_items_created, 2);
        assert!(result.checklist_errors.is_empty());
        assert_eq!(phase_change_count(&db, p.id), 1);
    }

    #[test]
    fn repeated_transition_is_idempotent_for_checklist() {
        let db = db();
        let p = project(&db, "atlas");
        db.create_checklist_item(Phase::Live, "set up monitoring").unwrap();

        let first = transition_phase(&db, p.id, Phase::Live).unwrap();
        assert_eq!(first.checklist_items_created, 1);

        let second = transition_phase(&db, p.id, Phase::Live).unwrap();
        assert_eq!(second.checklist_items_created, 0);
        assert_eq!(db.checklist_for_project(p.id).unwrap().len(), 1);
        // every transition still logs, even a no-op re-entry
        assert_eq!(phase_change_count(&db, p.id), 2);
    }

    #[test]
    fn missing_project_is_not_found() {
        let db = db();
        let err = transition_phase(&db, 999, Phase::Live).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn failing_checklist_insert_does_not_block_transition() {
        let db = db();
        let p = project(&db, "atlas");
        let poisoned = db.create_checklist_item(Phase::Live, "announce launch").unwrap();
        db.create_checklist_item(Phase::Live, "set up monitoring").unwrap();

        // Force exactly one template insert to fail at the store level.
        db.execute_batch_for_tests(&format!(
            "CREATE TRIGGER poison BEFORE INSERT ON checklist_progress
             WHEN NEW.checklist_item_id = {}
             BEGIN SELECT RAISE(ABORT, 'simulated store failure'); END;",
            poisoned.id
        ));

        let result = transition_phase(&db, p.id, Phase::Live).unwrap();
        assert_eq!(result.checklist_items_created, 1);
        assert_eq!(result.checklist_errors.len(), 1);
        assert!(result.checklist_errors[0].contains("announce launch"));

        // primary update and audit entry both landed
        assert_eq!(db.get_project(p.id).unwrap().unwrap().phase, Phase::Live);
        assert_eq!(phase_change_count(&db, p.id), 1);
    }

    #[test]
    fn transition_back_to_build_instantiates_build_templates() {
        let db = db();
        let p = project(&db, "atlas");
        db.create_checklist_item(Phase::Build, "write tests").unwrap();

        transition_phase(&db, p.id, Phase::Live).unwrap();
        let back = transition_phase(&db, p.id, Phase::Build).unwrap();
        assert_eq!(back.project.phase, Phase::Build);
        assert_eq!(back.checklist_items_created, 1);
    }
}
