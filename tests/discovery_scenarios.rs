//! End-to-end discovery scenarios against in-memory collaborators

use async_trait::async_trait;
use evigraph::{
    Anchor, AnchorPlan, CitationDraft, CitationKind, DiscoveryConfig, DiscoveryService, EdgeStatus,
    Entity, EntityType, EvidenceBatch, EvidenceSummary, MockPlanner, Phase, Relation, RelationKind,
    RunEvent, StaticSource, Synthesis, SynthesisError, Synthesizer, TemplateSynthesizer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

async fn collect_events(mut rx: UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("run should finish within the test deadline")
            .expect("stream closed before a terminal event");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

fn assert_percent_monotonic(events: &[RunEvent]) {
    let mut last = 0u8;
    for event in events {
        if let RunEvent::Status { percent, .. } = event {
            assert!(
                *percent >= last,
                "progress went backwards: {} after {}",
                percent,
                last
            );
            last = *percent;
        }
    }
}

fn metabolic_planner() -> MockPlanner {
    MockPlanner::new().with_plan(
        "how does obesity relate to type 2 diabetes?",
        AnchorPlan::bridging(vec![
            Anchor::resolved("obesity", EntityType::Disease, "obesity", "Obesity", 0.9),
            Anchor::resolved(
                "type 2 diabetes",
                EntityType::Disease,
                "type 2 diabetes",
                "Type 2 diabetes",
                0.9,
            ),
        ]),
    )
}

fn metabolic_source() -> StaticSource {
    let obesity = Entity::new(EntityType::Disease, "obesity", "Obesity").with_score(0.9);
    let t2d = Entity::new(EntityType::Disease, "type 2 diabetes", "Type 2 diabetes").with_score(0.9);
    let irs1 = Entity::new(EntityType::Target, "IRS1", "Insulin receptor substrate 1")
        .with_score(0.8);

    StaticSource::new("literature")
        .with_search(
            "obesity",
            EvidenceBatch::default()
                .with_entity(obesity.clone())
                .with_entity(irs1.clone())
                .with_relation(
                    Relation::new(obesity.key(), irs1.key(), RelationKind::DiseaseTarget)
                        .with_status(EdgeStatus::Connected)
                        .with_weight(0.8)
                        .with_provenance("literature"),
                )
                .with_citation(CitationDraft::new(
                    CitationKind::Article,
                    "Obesity-driven IRS1 serine phosphorylation",
                    "pubmed",
                )),
        )
        .with_search(
            "type 2 diabetes",
            EvidenceBatch::default()
                .with_entity(t2d.clone())
                .with_entity(irs1.clone())
                .with_relation(
                    Relation::new(t2d.key(), irs1.key(), RelationKind::DiseaseTarget)
                        .with_status(EdgeStatus::Connected)
                        .with_weight(0.9)
                        .with_provenance("literature"),
                )
                .with_citation(CitationDraft::new(
                    CitationKind::Article,
                    "IRS1 variants in type 2 diabetes",
                    "pubmed",
                )),
        )
}

#[tokio::test]
async fn shared_target_produces_a_connected_bridge() {
    let service = DiscoveryService::new(
        Arc::new(metabolic_planner()),
        Arc::new(TemplateSynthesizer),
        DiscoveryConfig::for_tests(),
    )
    .with_source(Arc::new(metabolic_source()));

    let (_, rx) = service
        .start("alice", "how does obesity relate to type 2 diabetes?")
        .expect("run admitted");
    let events = collect_events(rx).await;

    match &events[0] {
        RunEvent::Status { phase, .. } => assert_eq!(*phase, Phase::Planning),
        other => panic!("first event should be a planning status, got {:?}", other),
    }
    assert_percent_monotonic(&events);

    let connected = events.iter().any(|e| match e {
        RunEvent::PathUpdate { path } => {
            path.connected_across_anchors && path.nodes.contains(&"target:irs1".to_string())
        }
        _ => false,
    });
    assert!(connected, "expected a connected path through target:irs1");

    match events.last().unwrap() {
        RunEvent::Done { brief } => {
            let path = brief.path.as_ref().expect("final brief carries the path");
            assert!(path.connected_across_anchors);
            assert_eq!(brief.citations.len(), 2);
            let indices: Vec<u32> = brief.citations.iter().map(|c| c.index).collect();
            assert_eq!(indices, vec![1, 2]);
            assert!(brief.usage.batches_applied >= 2);
        }
        other => panic!("expected a done event, got {:?}", other),
    }
}

#[tokio::test]
async fn disjoint_evidence_reports_an_unconnected_path() {
    let planner = MockPlanner::new().with_plan(
        "how does oxidative stress relate to als?",
        AnchorPlan::bridging(vec![
            Anchor::resolved(
                "als",
                EntityType::Disease,
                "als",
                "Amyotrophic lateral sclerosis",
                0.9,
            ),
            Anchor::resolved(
                "oxidative stress",
                EntityType::Disease,
                "oxidative stress",
                "Oxidative stress",
                0.8,
            ),
        ]),
    );
    let als = Entity::new(
        EntityType::Disease,
        "als",
        "Amyotrophic lateral sclerosis",
    );
    let sod1 = Entity::new(EntityType::Target, "SOD1", "Superoxide dismutase 1");
    let oxstress = Entity::new(EntityType::Disease, "oxidative stress", "Oxidative stress");
    let source = StaticSource::new("literature")
        .with_search(
            "amyotrophic lateral sclerosis",
            EvidenceBatch::default()
                .with_entity(als.clone())
                .with_entity(sod1.clone())
                .with_relation(
                    Relation::new(als.key(), sod1.key(), RelationKind::DiseaseTarget)
                        .with_status(EdgeStatus::Connected)
                        .with_provenance("literature"),
                ),
        )
        .with_search(
            "oxidative stress",
            EvidenceBatch::default().with_entity(oxstress.clone()),
        );

    let service = DiscoveryService::new(
        Arc::new(planner),
        Arc::new(TemplateSynthesizer),
        DiscoveryConfig::for_tests(),
    )
    .with_source(Arc::new(source));

    let (_, rx) = service
        .start("bob", "how does oxidative stress relate to als?")
        .expect("run admitted");
    let events = collect_events(rx).await;

    let last_path = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::PathUpdate { path } => Some(path),
            _ => None,
        })
        .last()
        .expect("at least one path update");
    assert!(!last_path.connected_across_anchors);
    assert!(!last_path.unresolved_pairs.is_empty());

    match events.last().unwrap() {
        RunEvent::Done { brief } => {
            assert!(
                !brief.caveats.is_empty(),
                "an unconnected result should carry caveats"
            );
        }
        other => panic!("expected a done event, got {:?}", other),
    }
}

#[tokio::test]
async fn interrupt_ends_the_run_and_frees_the_session() {
    let slow = StaticSource::new("slow").with_delay(Duration::from_secs(30));
    let service = DiscoveryService::new(
        Arc::new(metabolic_planner()),
        Arc::new(TemplateSynthesizer),
        DiscoveryConfig::for_tests(),
    )
    .with_source(Arc::new(slow));

    let (_, rx) = service
        .start("carol", "how does obesity relate to type 2 diabetes?")
        .expect("run admitted");
    assert!(service.interrupt("carol"));

    // Slot is free before the run observed cancellation
    assert!(service.session_status("carol").is_none());
    let (_, rx2) = service
        .start("carol", "how does obesity relate to type 2 diabetes?")
        .expect("run admitted");
    drop(rx2);

    let events = collect_events(rx).await;
    match events.last().unwrap() {
        RunEvent::Error {
            recoverable,
            message,
        } => {
            assert!(*recoverable, "interruption is recoverable");
            assert!(message.contains("interrupted"));
        }
        other => panic!("expected an error event, got {:?}", other),
    }
}

#[tokio::test]
async fn unplannable_question_finishes_gracefully() {
    let service = DiscoveryService::new(
        Arc::new(MockPlanner::new()),
        Arc::new(TemplateSynthesizer),
        DiscoveryConfig::for_tests(),
    );

    let (_, rx) = service.start("dave", "tell me about biology").expect("run admitted");
    let events = collect_events(rx).await;

    match events.last().unwrap() {
        RunEvent::Done { brief } => {
            assert!(brief.brief.contains("could not identify two anchors"));
            assert!(brief.path.is_none());
        }
        other => panic!("expected a graceful done, got {:?}", other),
    }

    // The slot is released once the run finishes
    for _ in 0..50 {
        if service.session_status("dave").is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session slot was not released");
}

#[tokio::test]
async fn failing_sources_still_yield_a_candidate_path() {
    let service = DiscoveryService::new(
        Arc::new(metabolic_planner()),
        Arc::new(TemplateSynthesizer),
        DiscoveryConfig::for_tests(),
    )
    .with_source(Arc::new(StaticSource::new("flaky").failing("backend down")));

    let (_, rx) = service
        .start("frank", "how does obesity relate to type 2 diabetes?")
        .expect("run admitted");
    let events = collect_events(rx).await;

    // The seeded anchor graph alone must produce a candidate path, even when
    // every source fails before contributing evidence.
    let seeded = events
        .iter()
        .find_map(|e| match e {
            RunEvent::PathUpdate { path } => Some(path),
            _ => None,
        })
        .expect("the anchor seed should announce a candidate path");
    assert!(!seeded.connected_across_anchors);

    match events.last().unwrap() {
        RunEvent::Done { brief } => {
            let path = brief.path.as_ref().expect("final brief carries the candidate path");
            assert!(!path.connected_across_anchors);
        }
        other => panic!("expected a done event, got {:?}", other),
    }
}

/// Delegates to the template synthesizer after a fixed delay.
struct SlowSynthesizer {
    delay: Duration,
}

#[async_trait]
impl Synthesizer for SlowSynthesizer {
    async fn synthesize(&self, summary: &EvidenceSummary) -> Result<Synthesis, SynthesisError> {
        tokio::time::sleep(self.delay).await;
        TemplateSynthesizer.synthesize(summary).await
    }
}

#[tokio::test]
async fn slow_synthesis_keeps_heartbeats_flowing() {
    let service = DiscoveryService::new(
        Arc::new(metabolic_planner()),
        Arc::new(SlowSynthesizer {
            delay: Duration::from_millis(350),
        }),
        DiscoveryConfig::for_tests(),
    )
    .with_source(Arc::new(metabolic_source()));

    let (_, rx) = service
        .start("grace", "how does obesity relate to type 2 diabetes?")
        .expect("run admitted");
    let events = collect_events(rx).await;
    assert_percent_monotonic(&events);

    // Heartbeat interval is 100ms, so a 350ms synthesis must surface
    // at least two synthesizing heartbeats.
    let synth_statuses = events
        .iter()
        .filter(|e| matches!(e, RunEvent::Status { phase, .. } if *phase == Phase::Synthesizing))
        .count();
    assert!(
        synth_statuses >= 2,
        "expected heartbeats during a slow synthesis, got {} status events",
        synth_statuses
    );
    assert!(matches!(events.last().unwrap(), RunEvent::Done { .. }));
}

#[test]
fn public_api_exposes_upsert_outcomes() {
    let graph = evigraph::DiscoveryGraph::new();
    let obesity = Entity::new(EntityType::Disease, "obesity", "Obesity");
    let irs1 = Entity::new(EntityType::Target, "IRS1", "Insulin receptor substrate 1");

    let outcome: evigraph::NodeUpsert = graph.upsert_node(obesity.clone());
    assert!(outcome.created && outcome.changed);
    graph.upsert_node(irs1.clone());

    let edge: Result<evigraph::EdgeUpsert, evigraph::GraphError> = graph.upsert_edge(
        Relation::new(obesity.key(), irs1.key(), RelationKind::DiseaseTarget),
    );
    assert!(edge.unwrap().created);

    let meta: evigraph::Meta = evigraph::Meta::new();
    assert!(meta.is_empty());
}

#[tokio::test]
async fn duplicate_citations_across_sources_keep_stable_indices() {
    let shared = CitationDraft::new(
        CitationKind::Article,
        "IRS1 variants in type 2 diabetes",
        "pubmed",
    );
    let first = metabolic_source();
    let second = StaticSource::new("trials").with_search(
        "type 2 diabetes",
        EvidenceBatch::default()
            .with_entity(Entity::new(
                EntityType::Disease,
                "type 2 diabetes",
                "Type 2 diabetes",
            ))
            .with_citation(shared)
            .with_citation(CitationDraft::new(
                CitationKind::Trial,
                "Metformin in early type 2 diabetes",
                "clinicaltrials",
            )),
    );

    let service = DiscoveryService::new(
        Arc::new(metabolic_planner()),
        Arc::new(TemplateSynthesizer),
        DiscoveryConfig::for_tests(),
    )
    .with_source(Arc::new(first))
    .with_source(Arc::new(second));

    let (_, rx) = service
        .start("erin", "how does obesity relate to type 2 diabetes?")
        .expect("run admitted");
    let events = collect_events(rx).await;

    match events.last().unwrap() {
        RunEvent::Done { brief } => {
            // 2 from the literature source, 1 unique from trials; the shared
            // draft is deduplicated
            assert_eq!(brief.citations.len(), 3);
            let mut indices: Vec<u32> = brief.citations.iter().map(|c| c.index).collect();
            indices.sort_unstable();
            assert_eq!(indices, vec![1, 2, 3]);
            assert_eq!(brief.article_total, 2);
            assert_eq!(brief.trial_total, 1);
        }
        other => panic!("expected a done event, got {:?}", other),
    }
}
