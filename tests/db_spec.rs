use std::sync::Arc;

use grantwright::db::Database;
use grantwright::models::*;
use grantwright::store::{ProjectBackend, Store};
use serde_json::json;
use speculate2::speculate;

fn project(topic: &str, agents: &[&str]) -> Project {
    let versions: Vec<_> = agents
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            json!({
                "version": i + 1,
                "agent": agent,
                "timestamp": format!("2025-01-0{}T12:00:00Z", i + 1),
                "output": {"text": format!("draft {}", i + 1)},
                "rationale": "test",
                "input_context": {"topic": topic},
            })
        })
        .collect();

    serde_json::from_value(json!({
        "topic": topic,
        "versions": versions,
        "agents_used": [],
        "created_at": "2025-01-01T12:00:00Z",
        "last_updated": "2025-01-01T12:00:00Z",
    }))
    .expect("Failed to build project")
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "upsert_project" {
        it "stores a new topic" {
            db.upsert_project(&project("Solar", &["OutlineDesigner"]))
                .expect("Failed to upsert");

            let found = db
                .get_project("Solar")
                .expect("Query failed")
                .expect("Missing project");
            assert_eq!(found.versions.len(), 1);
            assert_eq!(found.versions[0].agent, AgentKind::OutlineDesigner);
        }

        it "replaces the stored history of an existing topic" {
            db.upsert_project(&project("Solar", &["OutlineDesigner"]))
                .expect("Failed to upsert");
            db.upsert_project(&project("Solar", &["OutlineDesigner", "BudgetEstimator"]))
                .expect("Failed to upsert");

            let found = db
                .get_project("Solar")
                .expect("Query failed")
                .expect("Missing project");
            assert_eq!(found.versions.len(), 2);
            assert_eq!(db.get_all_projects().expect("Query failed").len(), 1);
        }
    }

    describe "get_project" {
        it "returns None for an unknown topic" {
            assert!(db.get_project("Nope").expect("Query failed").is_none());
        }

        it "treats topics as case-sensitive" {
            db.upsert_project(&project("Solar", &["OutlineDesigner"]))
                .expect("Failed to upsert");
            assert!(db.get_project("solar").expect("Query failed").is_none());
        }

        it "recomputes derived fields on load" {
            db.upsert_project(&project("Solar", &["OutlineDesigner", "BudgetEstimator"]))
                .expect("Failed to upsert");

            let found = db
                .get_project("Solar")
                .expect("Query failed")
                .expect("Missing project");
            assert_eq!(found.agents_used.len(), 2);
            assert_eq!(found.last_updated, found.versions[1].timestamp);
        }

        it "keeps unknown agent names verbatim" {
            db.upsert_project(&project("Solar", &["OutlineDesigner", "FutureAgent"]))
                .expect("Failed to upsert");

            let found = db
                .get_project("Solar")
                .expect("Query failed")
                .expect("Missing project");
            assert_eq!(
                found.versions[1].agent,
                AgentKind::Other("FutureAgent".to_string())
            );
        }
    }

    describe "get_all_projects" {
        it "returns topics in lexicographic order" {
            db.upsert_project(&project("Zebra", &["OutlineDesigner"]))
                .expect("Failed to upsert");
            db.upsert_project(&project("Alpha", &["OutlineDesigner"]))
                .expect("Failed to upsert");

            let topics: Vec<String> = db
                .get_all_projects()
                .expect("Query failed")
                .into_iter()
                .map(|p| p.topic)
                .collect();
            assert_eq!(topics, vec!["Alpha", "Zebra"]);
        }
    }

    describe "delete_project" {
        it "reports whether the topic existed" {
            db.upsert_project(&project("Solar", &["OutlineDesigner"]))
                .expect("Failed to upsert");

            assert!(db.delete_project("Solar").expect("Delete failed"));
            assert!(!db.delete_project("Solar").expect("Delete failed"));
            assert!(db.get_project("Solar").expect("Query failed").is_none());
        }
    }

    describe "as a project backend" {
        it "saves, loads and removes through the trait" {
            let backend: &dyn ProjectBackend = &db;
            backend
                .save(&project("Solar", &["OutlineDesigner"]))
                .expect("Failed to save");

            assert_eq!(backend.load_all().expect("Failed to load").len(), 1);
            assert!(backend.remove("Solar").expect("Failed to remove"));
            assert!(backend.load_all().expect("Failed to load").is_empty());
        }

        it "backs a store that numbers versions" {
            db.upsert_project(&project("Solar", &["OutlineDesigner"]))
                .expect("Failed to upsert");
            let store = Store::open(Arc::new(db.clone())).expect("Failed to open store");

            let updated = tokio_test::block_on(store.create_or_append(
                "Solar",
                NewVersion::new(AgentKind::BudgetEstimator, json!({}), "estimate"),
            ))
            .expect("Failed to append");

            assert_eq!(updated.versions.len(), 2);
            let stored = db
                .get_project("Solar")
                .expect("Query failed")
                .expect("Missing project");
            assert_eq!(stored.versions[1].agent, AgentKind::BudgetEstimator);
        }
    }
}

#[test]
fn projects_survive_reopening_the_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("grantwright.db");

    {
        let db = Database::open(path.clone()).expect("Failed to open database");
        db.migrate().expect("Failed to run migrations");
        db.upsert_project(&project("Solar", &["OutlineDesigner", "BudgetEstimator"]))
            .expect("Failed to upsert");
    }

    let db = Database::open(path).expect("Failed to reopen database");
    db.migrate().expect("Failed to run migrations");
    let found = db
        .get_project("Solar")
        .expect("Query failed")
        .expect("Missing project");
    assert_eq!(found.versions.len(), 2);
}
