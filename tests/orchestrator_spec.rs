use std::sync::Arc;
use std::time::Duration;

use grantwright::agents::fakes::{FailingGenerator, ScriptedGenerator, StaticGenerator};
use grantwright::agents::{AgentRegistry, TextGenerator};
use grantwright::models::*;
use grantwright::store::Store;
use grantwright::{Error, ErrorKind, Orchestrator};

/// A response every agent accepts: outline prose, costed budget lines and review scores.
const DRAFT: &str = "1. Executive Summary: community solar microgrids\n\
2. Research Plan: field trials in three towns\n\
Personnel: $120,000 for two researchers\n\
Equipment: $30,000 for inverters and sensors\n\
Travel: $5,000 for site visits\n\
Technical merit: 4/5\n\
Recommendation: Fund";

fn orchestrator_with(generator: Arc<dyn TextGenerator>) -> Orchestrator {
    Orchestrator::new(Store::in_memory(), AgentRegistry::new(generator))
}

fn orchestrator() -> Orchestrator {
    orchestrator_with(Arc::new(StaticGenerator::new(DRAFT)))
}

fn outline_request(topic: &str) -> OutlineRequest {
    OutlineRequest::new(topic, "Cut rural energy costs", "DOE")
}

fn agents(project: &Project) -> Vec<AgentKind> {
    project.versions.iter().map(|v| v.agent.clone()).collect()
}

mod generation {
    use super::*;

    #[tokio::test]
    async fn outline_starts_a_project() {
        let orchestrator = orchestrator();

        let project = orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .expect("Failed to generate outline");

        assert_eq!(project.versions.len(), 1);
        let record = &project.versions[0];
        assert_eq!(record.agent, AgentKind::OutlineDesigner);
        assert_eq!(record.input_context["funding_agency"], "DOE");
        assert_eq!(record.input_context["duration"], DEFAULT_DURATION);
        assert!(record.output["outline"]["sections"].is_array());
        assert!(!record.rationale.is_empty());
    }

    #[tokio::test]
    async fn budget_inherits_fields_from_the_outline() {
        let orchestrator = orchestrator();
        let mut request = outline_request("Solar");
        request.duration = Some("2 years".into());
        orchestrator.generate_outline(request).await.unwrap();

        let project = orchestrator
            .generate_budget(BudgetRequest {
                target_amount: Some(150_000.0),
                ..BudgetRequest::new("Solar")
            })
            .await
            .expect("Failed to generate budget");

        let budget = project.latest().unwrap();
        assert_eq!(budget.agent, AgentKind::BudgetEstimator);
        assert_eq!(budget.input_context["outline_version"], 1);
        assert_eq!(budget.input_context["duration"], "2 years");
        assert_eq!(budget.input_context["funding_agency"], "DOE");
        assert_eq!(budget.output["budget_summary"]["total_cost"], 155_000.0);
        assert_eq!(budget.output["target_amount"], 150_000.0);
    }

    #[tokio::test]
    async fn budget_without_outline_starts_a_project() {
        let orchestrator = orchestrator();

        let project = orchestrator
            .generate_budget(BudgetRequest::new("Wind"))
            .await
            .unwrap();

        assert_eq!(agents(&project), vec![AgentKind::BudgetEstimator]);
        assert!(project.versions[0]
            .input_context
            .get("outline_version")
            .is_none());
    }

    #[tokio::test]
    async fn review_references_the_latest_outline_and_budget() {
        let orchestrator = orchestrator();
        orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap();
        orchestrator
            .generate_budget(BudgetRequest::new("Solar"))
            .await
            .unwrap();
        orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap();

        let project = orchestrator
            .simulate_review(ReviewRequest {
                perspectives: Some(vec![
                    ReviewerPerspective::BudgetAnalyst,
                    ReviewerPerspective::BudgetAnalyst,
                ]),
                ..ReviewRequest::new("Solar")
            })
            .await
            .unwrap();

        let review = project.latest().unwrap();
        assert_eq!(review.version, 4);
        assert_eq!(review.input_context["outline_version"], 3);
        assert_eq!(review.input_context["budget_version"], 2);
        assert_eq!(
            review.input_context["perspectives"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            review.output["individual_reviews"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn review_calls_the_model_once_per_perspective() {
        let generator = Arc::new(ScriptedGenerator::new(DRAFT));
        let orchestrator = orchestrator_with(generator.clone());

        orchestrator
            .simulate_review(ReviewRequest::new("Solar"))
            .await
            .unwrap();

        assert_eq!(generator.calls(), ReviewerPerspective::PANEL.len());
    }

    #[tokio::test]
    async fn derived_fields_track_the_history() {
        let orchestrator = orchestrator();
        orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap();
        let project = orchestrator
            .generate_budget(BudgetRequest::new("Solar"))
            .await
            .unwrap();

        assert_eq!(project.agents_used.len(), 2);
        assert_eq!(project.last_updated, project.latest().unwrap().timestamp);
        assert_eq!(project.created_at, project.versions[0].timestamp);
    }
}

mod complete {
    use super::*;

    fn complete_request(topic: &str) -> CompleteRequest {
        CompleteRequest {
            outline: outline_request(topic),
            target_amount: Some(200_000.0),
            perspectives: Some(vec![ReviewerPerspective::ProgramOfficer]),
        }
    }

    #[tokio::test]
    async fn runs_outline_budget_and_review_in_order() {
        let orchestrator = orchestrator();

        let outcome = orchestrator
            .generate_complete(complete_request("Solar"))
            .await
            .expect("Failed to generate complete proposal");

        assert!(outcome.failure.is_none());
        assert_eq!(
            outcome.completed,
            vec![
                AgentKind::OutlineDesigner,
                AgentKind::BudgetEstimator,
                AgentKind::ReviewerSimulation
            ]
        );
        assert_eq!(agents(&outcome.project), outcome.completed);
        let review = outcome.project.latest().unwrap();
        assert_eq!(review.input_context["outline_version"], 1);
        assert_eq!(review.input_context["budget_version"], 2);
    }

    #[tokio::test]
    async fn keeps_completed_steps_when_a_later_one_fails() {
        let generator = Arc::new(
            ScriptedGenerator::new(DRAFT)
                .then_respond(DRAFT)
                .then_fail("connection reset"),
        );
        let orchestrator = orchestrator_with(generator);

        let outcome = orchestrator
            .generate_complete(complete_request("Solar"))
            .await
            .expect("Outline step should have succeeded");

        assert_eq!(outcome.completed, vec![AgentKind::OutlineDesigner]);
        let failure = outcome.failure.expect("Missing failure");
        assert_eq!(failure.agent, AgentKind::BudgetEstimator);
        assert_eq!(failure.error.kind(), ErrorKind::GenerationFailure);
        assert_eq!(
            agents(&orchestrator.get_project("Solar").unwrap()),
            vec![AgentKind::OutlineDesigner]
        );
    }

    #[tokio::test]
    async fn deleting_after_the_outline_stops_the_later_steps() {
        let generator = StaticGenerator::new(DRAFT).with_delay(Duration::from_millis(300));
        let orchestrator = orchestrator_with(Arc::new(generator));

        let completing = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .generate_complete(complete_request("Solar"))
                    .await
            })
        };
        // The outline lands at ~300ms; the budget call is still in flight at 450ms.
        tokio::time::sleep(Duration::from_millis(450)).await;
        orchestrator.delete_topic("Solar").await.unwrap();

        let outcome = completing
            .await
            .unwrap()
            .expect("Outline step should have succeeded");
        assert_eq!(outcome.completed, vec![AgentKind::OutlineDesigner]);
        let failure = outcome.failure.expect("Missing failure");
        assert_eq!(failure.agent, AgentKind::BudgetEstimator);
        assert_eq!(failure.error.kind(), ErrorKind::NoPriorVersion);
        assert!(orchestrator.list_topics().is_empty());
    }

    #[tokio::test]
    async fn fails_outright_when_the_outline_fails() {
        let orchestrator = orchestrator_with(Arc::new(FailingGenerator::default()));

        let err = orchestrator
            .generate_complete(complete_request("Solar"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::GenerationFailure);
        assert!(orchestrator.list_topics().is_empty());
    }

    #[tokio::test]
    async fn validates_every_step_before_calling_the_model() {
        let generator = Arc::new(ScriptedGenerator::new(DRAFT));
        let orchestrator = orchestrator_with(generator.clone());
        let mut request = complete_request("Solar");
        request.target_amount = Some(-1.0);

        let err = orchestrator.generate_complete(request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(generator.calls(), 0);
        assert!(orchestrator.list_topics().is_empty());
    }
}

mod derived {
    use super::*;

    async fn with_budget(orchestrator: &Orchestrator, topic: &str) {
        orchestrator
            .generate_outline(outline_request(topic))
            .await
            .unwrap();
        orchestrator
            .generate_budget(BudgetRequest::new(topic))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let orchestrator = orchestrator();
        with_budget(&orchestrator, "Solar").await;

        let refined = orchestrator
            .refine(RefineRequest {
                topic: "Solar".into(),
                agent_type: AgentKind::from("outline"),
                feedback: "Strengthen the evaluation plan".into(),
            })
            .await
            .expect("Failed to refine");
        let record = refined.latest().unwrap();
        assert_eq!(record.version, 3);
        assert_eq!(record.agent, AgentKind::OutlineDesigner);
        assert_eq!(record.input_context["refines_version"], 1);
        assert_eq!(record.output["refined_version"], 1);

        let adjusted = orchestrator
            .adjust_budget(AdjustBudgetRequest {
                topic: "Solar".into(),
                target_amount: 100_000.0,
                constraints: Some("Keep both researchers".into()),
            })
            .await
            .expect("Failed to adjust");
        let record = adjusted.latest().unwrap();
        assert_eq!(record.version, 4);
        assert_eq!(record.agent, AgentKind::BudgetAdjust);
        assert_eq!(record.input_context["source_version"], 2);
        assert_eq!(record.output["target_amount"], 100_000.0);

        orchestrator
            .delete_topic("Solar")
            .await
            .expect("Failed to delete");
        let err = orchestrator.get_project("Solar").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let fresh = orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap();
        assert_eq!(fresh.versions.len(), 1);
    }

    #[tokio::test]
    async fn refine_uses_the_latest_version_of_the_target() {
        let orchestrator = orchestrator();
        with_budget(&orchestrator, "Solar").await;
        orchestrator
            .generate_budget(BudgetRequest::new("Solar"))
            .await
            .unwrap();

        let project = orchestrator
            .refine(RefineRequest {
                topic: "Solar".into(),
                agent_type: AgentKind::BudgetEstimator,
                feedback: "Trim travel".into(),
            })
            .await
            .unwrap();

        assert_eq!(
            project.latest().unwrap().input_context["refines_version"],
            3
        );
    }

    #[tokio::test]
    async fn refine_without_a_prior_version_changes_nothing() {
        let orchestrator = orchestrator();
        orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap();
        let before = orchestrator.get_project("Solar").unwrap();

        let err = orchestrator
            .refine(RefineRequest {
                topic: "Solar".into(),
                agent_type: AgentKind::ReviewerSimulation,
                feedback: "More detail".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::NoPriorVersion { agent: AgentKind::ReviewerSimulation, .. }
        ));
        assert_eq!(orchestrator.get_project("Solar").unwrap(), before);
    }

    #[tokio::test]
    async fn refine_rejects_derived_kinds() {
        let orchestrator = orchestrator();
        with_budget(&orchestrator, "Solar").await;

        let err = orchestrator
            .refine(RefineRequest {
                topic: "Solar".into(),
                agent_type: AgentKind::PanelSummary,
                feedback: "Shorter".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn derived_operations_on_unknown_topics_are_not_found() {
        let orchestrator = orchestrator();

        let refine = orchestrator
            .refine(RefineRequest {
                topic: "Nope".into(),
                agent_type: AgentKind::OutlineDesigner,
                feedback: "x".into(),
            })
            .await
            .unwrap_err();
        let adjust = orchestrator
            .adjust_budget(AdjustBudgetRequest {
                topic: "Nope".into(),
                target_amount: 10.0,
                constraints: None,
            })
            .await
            .unwrap_err();
        let panel = orchestrator
            .generate_panel_summary("Nope")
            .await
            .unwrap_err();

        assert_eq!(refine.kind(), ErrorKind::NotFound);
        assert_eq!(adjust.kind(), ErrorKind::NotFound);
        assert_eq!(panel.kind(), ErrorKind::NotFound);
        assert!(orchestrator.list_topics().is_empty());
    }

    #[tokio::test]
    async fn adjust_without_a_budget_is_no_prior_version() {
        let orchestrator = orchestrator();
        orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap();

        let err = orchestrator
            .adjust_budget(AdjustBudgetRequest {
                topic: "Solar".into(),
                target_amount: 10.0,
                constraints: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoPriorVersion);
        assert_eq!(orchestrator.get_project("Solar").unwrap().versions.len(), 1);
    }

    #[tokio::test]
    async fn panel_summary_needs_a_review() {
        let orchestrator = orchestrator();
        orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap();

        let before = orchestrator.get_project("Solar").unwrap();

        let err = orchestrator
            .generate_panel_summary("Solar")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::NoPriorVersion { agent: AgentKind::ReviewerSimulation, .. }
        ));
        assert_eq!(orchestrator.get_project("Solar").unwrap(), before);
    }

    #[tokio::test]
    async fn panel_summary_covers_every_review() {
        let orchestrator = orchestrator();
        let single = || ReviewRequest {
            perspectives: Some(vec![ReviewerPerspective::TechnicalExpert]),
            ..ReviewRequest::new("Solar")
        };
        orchestrator.simulate_review(single()).await.unwrap();
        orchestrator.simulate_review(single()).await.unwrap();

        let project = orchestrator.generate_panel_summary("Solar").await.unwrap();

        let summary = project.latest().unwrap();
        assert_eq!(summary.agent, AgentKind::PanelSummary);
        assert_eq!(
            summary.input_context["review_versions"],
            serde_json::json!([1, 2])
        );
        assert_eq!(summary.output["consensus_recommendation"], "Fund");
    }

    #[tokio::test]
    async fn budget_after_an_outline_refine_keeps_the_original_request() {
        let orchestrator = orchestrator();
        let mut request = outline_request("Solar");
        request.duration = Some("2 years".into());
        request.team_size = Some("small (1-2 people)".into());
        orchestrator.generate_outline(request).await.unwrap();
        orchestrator
            .refine(RefineRequest {
                topic: "Solar".into(),
                agent_type: AgentKind::OutlineDesigner,
                feedback: "Tighten the aims".into(),
            })
            .await
            .unwrap();

        let project = orchestrator
            .generate_budget(BudgetRequest::new("Solar"))
            .await
            .unwrap();

        let budget = project.latest().unwrap();
        assert_eq!(budget.input_context["outline_version"], 2);
        assert_eq!(budget.input_context["duration"], "2 years");
        assert_eq!(budget.input_context["team_size"], "small (1-2 people)");
        assert_eq!(budget.input_context["goals"], "Cut rural energy costs");
        assert_eq!(budget.input_context["funding_agency"], "DOE");
    }

    #[tokio::test]
    async fn refine_context_keeps_the_source_request_fields() {
        let orchestrator = orchestrator();
        orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap();

        let project = orchestrator
            .refine(RefineRequest {
                topic: "Solar".into(),
                agent_type: AgentKind::OutlineDesigner,
                feedback: "Tighten the aims".into(),
            })
            .await
            .unwrap();

        let context = &project.latest().unwrap().input_context;
        assert_eq!(context["refines_version"], 1);
        assert_eq!(context["feedback"], "Tighten the aims");
        assert_eq!(context["funding_agency"], "DOE");
        assert_eq!(context["duration"], DEFAULT_DURATION);
    }

    #[tokio::test]
    async fn panel_summary_includes_refined_reviews() {
        let generator = Arc::new(ScriptedGenerator::new(DRAFT));
        let orchestrator = orchestrator_with(generator.clone());
        orchestrator
            .simulate_review(ReviewRequest {
                perspectives: Some(vec![ReviewerPerspective::TechnicalExpert]),
                ..ReviewRequest::new("Solar")
            })
            .await
            .unwrap();
        generator.push(Ok(
            "Stricter second look: the field trial sites are not yet secured. Decline.".into(),
        ));
        orchestrator
            .refine(RefineRequest {
                topic: "Solar".into(),
                agent_type: AgentKind::ReviewerSimulation,
                feedback: "Be stricter about feasibility".into(),
            })
            .await
            .unwrap();

        let project = orchestrator.generate_panel_summary("Solar").await.unwrap();

        let prompt = generator.prompts().last().cloned().unwrap();
        assert!(prompt.contains("the field trial sites are not yet secured"));
        assert!(!prompt.contains("Individual reviews: null"));
        let summary = project.latest().unwrap();
        assert_eq!(
            summary.input_context["review_versions"],
            serde_json::json!([1, 2])
        );
    }

    #[tokio::test]
    async fn deleting_during_an_adjustment_does_not_resurrect_the_topic() {
        let generator = StaticGenerator::new(DRAFT).with_delay(Duration::from_millis(200));
        let orchestrator = orchestrator_with(Arc::new(generator));
        with_budget(&orchestrator, "Solar").await;

        let adjusting = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .adjust_budget(AdjustBudgetRequest {
                        topic: "Solar".into(),
                        target_amount: 50_000.0,
                        constraints: None,
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.delete_topic("Solar").await.unwrap();

        let err = adjusting.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::NoPriorVersion { agent: AgentKind::BudgetEstimator, .. }
        ));
        assert!(orchestrator.list_topics().is_empty());
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn invalid_requests_never_reach_the_model() {
        let generator = Arc::new(ScriptedGenerator::new(DRAFT));
        let orchestrator = orchestrator_with(generator.clone());

        let blank_topic = orchestrator
            .generate_outline(OutlineRequest::new("  ", "goals", "NSF"))
            .await
            .unwrap_err();
        let blank_goals = orchestrator
            .generate_outline(OutlineRequest::new("Solar", "", "NSF"))
            .await
            .unwrap_err();
        let zero_target = orchestrator
            .generate_budget(BudgetRequest {
                target_amount: Some(0.0),
                ..BudgetRequest::new("Solar")
            })
            .await
            .unwrap_err();
        let no_reviewers = orchestrator
            .simulate_review(ReviewRequest {
                perspectives: Some(vec![]),
                ..ReviewRequest::new("Solar")
            })
            .await
            .unwrap_err();

        for err in [blank_topic, blank_goals, zero_target, no_reviewers] {
            assert_eq!(err.kind(), ErrorKind::ValidationError);
        }
        assert_eq!(generator.calls(), 0);
        assert!(orchestrator.list_topics().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_leaves_the_store_untouched() {
        let generator = Arc::new(ScriptedGenerator::new(DRAFT));
        let orchestrator = orchestrator_with(generator.clone());
        orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap();
        let before = orchestrator.get_project("Solar").unwrap();

        generator.push(Err("model overloaded".into()));
        let err = orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::GenerationFailure);
        assert!(err.is_retryable());
        assert_eq!(orchestrator.get_project("Solar").unwrap(), before);
    }

    #[tokio::test]
    async fn malformed_output_is_not_recorded() {
        let generator = Arc::new(ScriptedGenerator::new(DRAFT).then_respond("no costs here"));
        let orchestrator = orchestrator_with(generator);

        let err = orchestrator
            .generate_budget(BudgetRequest::new("Solar"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedOutput);
        assert_eq!(err.raw_response(), Some("no costs here"));
        assert!(orchestrator.list_topics().is_empty());
    }

    #[tokio::test]
    async fn blank_model_output_is_malformed() {
        let orchestrator = orchestrator_with(Arc::new(StaticGenerator::new("   ")));

        let err = orchestrator
            .generate_outline(outline_request("Solar"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedOutput);
    }
}

mod reads {
    use super::*;

    #[tokio::test]
    async fn summary_and_listing() {
        let orchestrator = orchestrator();
        orchestrator
            .generate_outline(outline_request("Wind"))
            .await
            .unwrap();
        orchestrator
            .generate_outline(outline_request("Algae"))
            .await
            .unwrap();
        orchestrator
            .generate_budget(BudgetRequest::new("Algae"))
            .await
            .unwrap();

        assert_eq!(orchestrator.list_topics(), vec!["Algae", "Wind"]);
        let summary = orchestrator.topic_summary("Algae").unwrap();
        assert_eq!(summary.versions, 2);
        assert_eq!(
            summary.latest_version.map(|v| v.agent),
            Some(AgentKind::BudgetEstimator)
        );
        assert_eq!(
            orchestrator.topic_summary("Nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn registry_exposes_all_agents() {
        let orchestrator = orchestrator();
        assert_eq!(orchestrator.agent_kinds().len(), AgentKind::ALL.len());
    }
}
