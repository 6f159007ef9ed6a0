//! One discovery run, end to end
//!
//! Phases execute in order: plan, gather, expand, synthesize. Evidence
//! gathering fans out one task per anchor-source pair and folds batches in
//! completion order; the graph's merge semantics make the result
//! order-independent. Cancellation is checked between operations, the
//! budget before each external call. Failures below the run level (a
//! source, the synthesizer) degrade the result; only interruption or a
//! panicked task ends the stream with an error event.

use super::planner::AnchorPlanner;
use super::DiscoveryError;
use super::synthesis::{EvidenceSummary, Synthesis, Synthesizer};
use crate::config::DiscoveryConfig;
use crate::evidence::{CitationLedger, EvidenceBatch, EvidenceSource, SourceError};
use crate::graph::{DiscoveryGraph, Entity, EntityType, GraphDelta, Relation, RelationKind};
use crate::path::{resolve_path, Anchor, BridgePath};
use crate::session::{CancellationToken, RunBudget, SessionManager};
use crate::stream::{
    spawn_heartbeat, EdgeSummary, EventChannel, FinalBrief, NodeSummary, PathSummary, Phase,
    ProgressBand, RunEvent, RunUsage, SourceHealth,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

const PLAN_BAND: ProgressBand = ProgressBand::new(2, 10);
const GATHER_BAND: ProgressBand = ProgressBand::new(10, 80);
const EXPAND_BAND: ProgressBand = ProgressBand::new(80, 90);
const SYNTH_BAND: ProgressBand = ProgressBand::new(90, 98);

/// Mutable state accumulated over one run.
struct RunState {
    graph: DiscoveryGraph,
    ledger: CitationLedger,
    path_signature: Option<String>,
    active_path: Option<BridgePath>,
    health: BTreeMap<String, SourceHealth>,
    batches_applied: usize,
    budget_degraded: bool,
}

/// Everything one spawned run needs, moved into its task.
pub(crate) struct RunContext {
    pub run_id: Uuid,
    pub session_key: String,
    pub question: String,
    pub planner: Arc<dyn AnchorPlanner>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub sources: Vec<Arc<dyn EvidenceSource>>,
    pub config: DiscoveryConfig,
    pub token: CancellationToken,
    pub channel: EventChannel,
    pub sessions: Arc<SessionManager>,
}

impl RunContext {
    /// Drive the run to a terminal event, then release the session slot.
    pub(crate) async fn execute(self) {
        match self.drive().await {
            Ok(()) => {}
            Err(DiscoveryError::Interrupted) => {
                tracing::info!(session = %self.session_key, run = %self.run_id, "run interrupted");
                self.channel.emit(RunEvent::Error {
                    message: "run interrupted".to_string(),
                    recoverable: true,
                });
            }
            Err(DiscoveryError::Fatal(message)) => {
                tracing::error!(session = %self.session_key, run = %self.run_id, error = %message, "run failed");
                self.channel.emit(RunEvent::Error {
                    message,
                    recoverable: false,
                });
            }
        }
        self.sessions.release(&self.session_key, self.run_id);
    }

    async fn drive(&self) -> Result<(), DiscoveryError> {
        let budget = RunBudget::new(
            self.config.run_budget,
            self.config.safety_margin,
            self.config.reserve,
        );
        let mut state = RunState {
            graph: DiscoveryGraph::new(),
            ledger: CitationLedger::new(),
            path_signature: None,
            active_path: None,
            health: self
                .sources
                .iter()
                .map(|s| (s.id().to_string(), SourceHealth::Green))
                .collect(),
            batches_applied: 0,
            budget_degraded: false,
        };

        // Planning
        self.check_interrupt()?;
        self.channel.status(
            Phase::Planning,
            "resolving question anchors",
            PLAN_BAND.map(0),
            state.health.clone(),
        );
        let plan = {
            let granted = budget.op_timeout(self.config.op_timeout);
            let outcome = if granted.is_zero() {
                Err("planning budget exhausted".to_string())
            } else {
                match tokio::time::timeout(granted, self.planner.resolve_anchors(&self.question))
                    .await
                {
                    Ok(Ok(plan)) if plan.anchors.len() >= 2 => Ok(plan),
                    Ok(Ok(_)) => Err("the question names fewer than two anchors".to_string()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err("anchor planning timed out".to_string()),
                }
            };
            match outcome {
                Ok(plan) => plan,
                Err(reason) => {
                    tracing::warn!(run = %self.run_id, reason = %reason, "finishing without anchors");
                    return self.finish_without_anchors(&state, reason);
                }
            }
        };
        self.seed_anchors(&mut state, &plan.anchors);
        self.channel.status(
            Phase::Planning,
            format!("{} anchors resolved", plan.anchors.len()),
            PLAN_BAND.map(100),
            state.health.clone(),
        );

        // Gathering: fan out anchor x source searches, fold in completion order
        self.check_interrupt()?;
        self.channel.status(
            Phase::Gathering,
            "querying evidence sources",
            GATHER_BAND.map(0),
            state.health.clone(),
        );
        let heartbeat = spawn_heartbeat(
            self.channel.clone(),
            Phase::Gathering,
            self.config.heartbeat_interval,
        );
        let mut searches: JoinSet<(String, Result<EvidenceBatch, SourceError>)> = JoinSet::new();
        let mut scheduled = 0usize;
        for anchor in &plan.anchors {
            for source in &self.sources {
                let granted = budget.op_timeout(self.config.op_timeout);
                if granted.is_zero() {
                    continue;
                }
                let source = Arc::clone(source);
                let query = anchor.label().to_string();
                let limit = self.config.search_limit;
                searches.spawn(async move {
                    let id = source.id().to_string();
                    let result = match tokio::time::timeout(granted, source.search(&query, limit))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(SourceError::Timeout),
                    };
                    (id, result)
                });
                scheduled += 1;
            }
        }
        let mut completed = 0usize;
        while let Some(joined) = searches.join_next().await {
            if self.token.is_cancelled() {
                searches.abort_all();
                heartbeat.abort();
                return Err(DiscoveryError::Interrupted);
            }
            completed += 1;
            let (source_id, result) = match joined {
                Ok(pair) => pair,
                Err(e) if e.is_panic() => {
                    searches.abort_all();
                    heartbeat.abort();
                    return Err(DiscoveryError::Fatal("evidence task panicked".to_string()));
                }
                Err(_) => continue,
            };
            match result {
                Ok(batch) => {
                    state.health.insert(source_id, SourceHealth::Green);
                    self.ingest_batch(&mut state, &plan.anchors, batch);
                }
                Err(SourceError::Timeout) => {
                    tracing::warn!(source = %source_id, "source query timed out");
                    state.health.insert(source_id, SourceHealth::Yellow);
                }
                Err(e) => {
                    tracing::warn!(source = %source_id, error = %e, "source query failed");
                    state.health.insert(source_id, SourceHealth::Red);
                }
            }
            self.channel.status(
                Phase::Gathering,
                format!("{} of {} source queries complete", completed, scheduled),
                GATHER_BAND.map((completed * 100 / scheduled.max(1)) as u8),
                state.health.clone(),
            );
            if budget.exhausted() {
                self.channel.status(
                    Phase::Gathering,
                    "run budget reached; stopping evidence gathering",
                    GATHER_BAND.map(100),
                    state.health.clone(),
                );
                searches.abort_all();
                break;
            }
        }
        heartbeat.abort();

        // Expanding: second-hop lookups on the top-scoring bridge candidates
        self.check_interrupt()?;
        if budget.reserve_reached() {
            state.budget_degraded = true;
            self.channel.status(
                Phase::Expanding,
                "budget low; skipping expansion",
                EXPAND_BAND.map(0),
                state.health.clone(),
            );
        } else {
            let heartbeat = spawn_heartbeat(
                self.channel.clone(),
                Phase::Expanding,
                self.config.heartbeat_interval,
            );
            let expanded = self.expand(&mut state, &plan.anchors, &budget).await;
            heartbeat.abort();
            expanded?;
        }

        // Synthesizing
        self.check_interrupt()?;
        self.channel.status(
            Phase::Synthesizing,
            "composing brief",
            SYNTH_BAND.map(0),
            state.health.clone(),
        );
        let heartbeat = spawn_heartbeat(
            self.channel.clone(),
            Phase::Synthesizing,
            self.config.heartbeat_interval,
        );
        let summary = self.summarize(&state, &plan.intent);
        let synthesis = {
            let granted = budget.op_timeout(self.config.op_timeout);
            let outcome = if granted.is_zero() {
                None
            } else {
                match tokio::time::timeout(granted, self.synthesizer.synthesize(&summary)).await {
                    Ok(Ok(s)) if !s.brief.trim().is_empty() => Some(s),
                    Ok(Ok(_)) => {
                        tracing::warn!(run = %self.run_id, "synthesizer returned an empty brief");
                        None
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(run = %self.run_id, error = %e, "synthesis failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(run = %self.run_id, "synthesis timed out");
                        None
                    }
                }
            };
            outcome.unwrap_or_else(|| fallback_synthesis(&summary))
        };
        heartbeat.abort();

        let brief = FinalBrief {
            brief: synthesis.brief,
            key_findings: synthesis.key_findings,
            caveats: synthesis.caveats,
            next_actions: synthesis.next_actions,
            path: summary.path.clone(),
            citations: state.ledger.all().to_vec(),
            article_total: state.ledger.article_total(),
            trial_total: state.ledger.trial_total(),
            usage: RunUsage {
                elapsed_ms: self.channel.elapsed_ms(),
                sources_queried: self.sources.len(),
                batches_applied: state.batches_applied,
                budget_degraded: state.budget_degraded,
            },
        };
        self.channel.status(
            Phase::Finished,
            "discovery complete",
            100,
            state.health.clone(),
        );
        self.channel.emit(RunEvent::Done { brief });
        Ok(())
    }

    fn check_interrupt(&self) -> Result<(), DiscoveryError> {
        if self.token.is_cancelled() {
            Err(DiscoveryError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Upsert virtual nodes for typed anchors, with proxy bridges between
    /// consecutive disease anchors so the graph renders one picture from the
    /// first delta. The seed is a mutation batch like any other: the path is
    /// recomputed from it, so a candidate path exists even if every source
    /// later fails.
    fn seed_anchors(&self, state: &mut RunState, anchors: &[Anchor]) {
        let mut nodes = Vec::new();
        for anchor in anchors {
            if let Some(entity_type) = anchor.entity_type {
                let id = anchor.id.as_deref().unwrap_or(&anchor.mention);
                nodes.push(
                    Entity::new(entity_type, id, anchor.label())
                        .with_score(anchor.confidence)
                        .virtual_node(),
                );
            }
        }
        let mut edges = Vec::new();
        for pair in nodes.windows(2) {
            if pair[0].entity_type == EntityType::Disease
                && pair[1].entity_type == EntityType::Disease
            {
                edges.push(
                    Relation::new(pair[0].key(), pair[1].key(), RelationKind::DiseaseDisease)
                        .proxy_edge()
                        .with_weight(0.1)
                        .with_provenance("planner"),
                );
            }
        }
        if !nodes.is_empty() {
            let delta = state.graph.apply(nodes, edges);
            self.emit_delta(&delta);
            self.refresh_path(state, anchors);
        }
    }

    async fn expand(
        &self,
        state: &mut RunState,
        anchors: &[Anchor],
        budget: &RunBudget,
    ) -> Result<(), DiscoveryError> {
        self.channel.status(
            Phase::Expanding,
            "expanding top-scoring entities",
            EXPAND_BAND.map(0),
            state.health.clone(),
        );
        let snapshot = state.graph.snapshot();
        let mut candidates: Vec<_> = snapshot
            .nodes
            .iter()
            .filter(|n| matches!(n.entity_type, EntityType::Target | EntityType::Pathway))
            .map(|n| (n.key(), n.score))
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(self.config.expansion_limit);
        let total = candidates.len().max(1);

        for (done, (key, _)) in candidates.into_iter().enumerate() {
            self.check_interrupt()?;
            if budget.reserve_reached() {
                state.budget_degraded = true;
                self.channel.status(
                    Phase::Expanding,
                    "budget low; stopping expansion early",
                    EXPAND_BAND.map((done * 100 / total) as u8),
                    state.health.clone(),
                );
                break;
            }
            for source in &self.sources {
                let granted = budget.op_timeout(self.config.op_timeout);
                if granted.is_zero() {
                    break;
                }
                let source_id = source.id().to_string();
                match tokio::time::timeout(granted, source.lookup(&key)).await {
                    Ok(Ok(batch)) => {
                        state.health.insert(source_id, SourceHealth::Green);
                        self.ingest_batch(state, anchors, batch);
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(source = %source_id, error = %e, "entity lookup failed");
                        state.health.insert(source_id, SourceHealth::Red);
                    }
                    Err(_) => {
                        tracing::warn!(source = %source_id, "entity lookup timed out");
                        state.health.insert(source_id, SourceHealth::Yellow);
                    }
                }
            }
            self.channel.status(
                Phase::Expanding,
                format!("expanded {} of {} entities", done + 1, total),
                EXPAND_BAND.map(((done + 1) * 100 / total) as u8),
                state.health.clone(),
            );
        }
        Ok(())
    }

    /// Fold one evidence batch into the run: counts, graph, citations, path.
    fn ingest_batch(&self, state: &mut RunState, anchors: &[Anchor], batch: EvidenceBatch) {
        if batch.is_empty() && batch.article_count == 0 && batch.trial_count == 0 {
            return;
        }
        state.batches_applied += 1;
        state.ledger.report_counts(batch.article_count, batch.trial_count);

        let delta = state.graph.apply(batch.entities, batch.relations);
        self.emit_delta(&delta);

        let issued = state.ledger.merge(batch.citations);
        if !issued.is_empty() {
            self.channel.emit(RunEvent::CitationBundle { citations: issued });
        }

        self.refresh_path(state, anchors);
    }

    /// Recompute the bridge path against a fresh snapshot; emit an update
    /// only when its signature changed.
    fn refresh_path(&self, state: &mut RunState, anchors: &[Anchor]) {
        if let Some(path) = resolve_path(&state.graph.snapshot(), anchors, &self.config) {
            let signature = path.signature();
            if state.path_signature.as_deref() != Some(signature.as_str()) {
                self.channel.emit(RunEvent::PathUpdate {
                    path: PathSummary::from(&path),
                });
                state.path_signature = Some(signature);
                state.active_path = Some(path);
            }
        }
    }

    fn emit_delta(&self, delta: &GraphDelta) {
        for rejection in &delta.rejections {
            tracing::debug!(rejection = %rejection, "edge skipped");
        }
        if delta.is_empty() {
            return;
        }
        self.channel.emit(RunEvent::GraphDelta {
            nodes: delta.nodes.iter().map(NodeSummary::from).collect(),
            edges: delta.edges.iter().map(EdgeSummary::from).collect(),
            node_total: delta.node_total,
            edge_total: delta.edge_total,
        });
    }

    fn summarize(&self, state: &RunState, intent: &str) -> EvidenceSummary {
        let snapshot = state.graph.snapshot();
        let mut ranked: Vec<_> = snapshot
            .nodes
            .iter()
            .filter(|n| !n.meta.contains_key("virtual"))
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        EvidenceSummary {
            question: self.question.clone(),
            intent: intent.to_string(),
            path: state.active_path.as_ref().map(PathSummary::from),
            top_findings: ranked.iter().take(5).map(|n| n.label.clone()).collect(),
            citation_preview: state
                .ledger
                .all()
                .iter()
                .take(5)
                .map(|c| c.label.clone())
                .collect(),
        }
    }

    /// Terminal path for runs that never got two anchors: still a graceful
    /// `done`, with the reason as the brief.
    fn finish_without_anchors(&self, state: &RunState, reason: String) -> Result<(), DiscoveryError> {
        let brief = FinalBrief {
            brief: format!(
                "Discovery could not identify two anchors to bridge: {}.",
                reason
            ),
            caveats: vec![reason],
            usage: RunUsage {
                elapsed_ms: self.channel.elapsed_ms(),
                sources_queried: self.sources.len(),
                ..RunUsage::default()
            },
            ..FinalBrief::default()
        };
        self.channel.status(
            Phase::Finished,
            "finished without anchors",
            100,
            state.health.clone(),
        );
        self.channel.emit(RunEvent::Done { brief });
        Ok(())
    }
}

/// Deterministic brief used when the synthesizer is unavailable.
fn fallback_synthesis(summary: &EvidenceSummary) -> Synthesis {
    let brief = if summary.top_findings.is_empty() {
        "Discovery finished but narrative synthesis was unavailable and no findings were retrieved.".to_string()
    } else {
        format!(
            "Discovery finished; narrative synthesis was unavailable. Top findings: {}.",
            summary.top_findings.join(", ")
        )
    };
    Synthesis {
        brief,
        key_findings: summary.top_findings.clone(),
        caveats: vec!["narrative synthesis was unavailable; findings are listed verbatim".to_string()],
        next_actions: vec!["retry once the synthesis backend recovers".to_string()],
    }
}
