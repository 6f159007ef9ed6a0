//! evigraph server binary

use clap::{Parser, Subcommand};
use evigraph::server;
use evigraph::{
    CitationDraft, CitationKind, DiscoveryConfig, DiscoveryService, EdgeStatus, Entity, EntityKey,
    EntityType, EvidenceBatch, KeywordPlanner, Relation, RelationKind, StaticSource,
    TemplateSynthesizer,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "evigraph",
    version,
    about = "Evidence-graph engine for biomedical mechanism discovery"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP/SSE discovery server
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Overall wall-clock budget per run, in seconds
        #[arg(long, default_value_t = 90)]
        budget_secs: u64,
        /// Serve the built-in demo evidence catalog
        #[arg(long)]
        demo: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), server::ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            port,
            budget_secs,
            demo,
        } => {
            let config = DiscoveryConfig {
                run_budget: Duration::from_secs(budget_secs),
                ..DiscoveryConfig::default()
            };
            let mut service = DiscoveryService::new(
                Arc::new(KeywordPlanner),
                Arc::new(TemplateSynthesizer),
                config,
            );
            if demo {
                tracing::info!("loading demo evidence catalog");
                service = service.with_source(Arc::new(demo_catalog()));
            }
            server::serve(Arc::new(service), port).await
        }
    }
}

/// A small static obesity / type 2 diabetes catalog so the server can be
/// exercised without any external evidence backend:
///
///   curl -N localhost:8080/discover \
///     -H 'content-type: application/json' \
///     -d '{"session":"demo","question":"how does obesity relate to type 2 diabetes?"}'
fn demo_catalog() -> StaticSource {
    let obesity = Entity::new(EntityType::Disease, "obesity", "Obesity").with_score(0.9);
    let t2d = Entity::new(EntityType::Disease, "type 2 diabetes", "Type 2 diabetes")
        .with_alias("T2D")
        .with_score(0.9);
    let irs1 = Entity::new(EntityType::Target, "IRS1", "Insulin receptor substrate 1")
        .with_alias("IRS-1")
        .with_score(0.8);
    let tnf = Entity::new(EntityType::Target, "TNF", "Tumor necrosis factor").with_score(0.6);
    let insulin_signaling =
        Entity::new(EntityType::Pathway, "insulin signaling", "Insulin signaling pathway")
            .with_score(0.7);
    let metformin = Entity::new(EntityType::Drug, "metformin", "Metformin")
        .with_alias("Glucophage")
        .with_score(0.7);

    let obesity_batch = EvidenceBatch::default()
        .with_entity(obesity.clone())
        .with_entity(irs1.clone())
        .with_entity(tnf.clone())
        .with_relation(
            Relation::new(obesity.key(), irs1.key(), RelationKind::DiseaseTarget)
                .with_status(EdgeStatus::Connected)
                .with_weight(0.8)
                .with_provenance("demo"),
        )
        .with_relation(
            Relation::new(obesity.key(), tnf.key(), RelationKind::DiseaseTarget)
                .with_status(EdgeStatus::Connected)
                .with_weight(0.6)
                .with_provenance("demo"),
        )
        .with_citation(
            CitationDraft::new(
                CitationKind::Article,
                "Obesity-induced insulin resistance via IRS1 serine phosphorylation",
                "pubmed",
            )
            .with_url("https://pubmed.example/irs1-obesity"),
        );

    let t2d_batch = EvidenceBatch::default()
        .with_entity(t2d.clone())
        .with_entity(irs1.clone())
        .with_entity(insulin_signaling.clone())
        .with_entity(metformin.clone())
        .with_relation(
            Relation::new(t2d.key(), irs1.key(), RelationKind::DiseaseTarget)
                .with_status(EdgeStatus::Connected)
                .with_weight(0.9)
                .with_provenance("demo"),
        )
        .with_relation(
            Relation::new(irs1.key(), insulin_signaling.key(), RelationKind::TargetPathway)
                .with_status(EdgeStatus::Connected)
                .with_weight(0.7)
                .with_provenance("demo"),
        )
        .with_relation(
            Relation::new(metformin.key(), irs1.key(), RelationKind::DrugTarget)
                .with_status(EdgeStatus::Connected)
                .with_weight(0.5)
                .with_provenance("demo"),
        )
        .with_citation(
            CitationDraft::new(
                CitationKind::Article,
                "IRS1 variants and type 2 diabetes susceptibility",
                "pubmed",
            )
            .with_url("https://pubmed.example/irs1-t2d"),
        )
        .with_citation(
            CitationDraft::new(
                CitationKind::Trial,
                "Metformin in early type 2 diabetes",
                "clinicaltrials",
            )
            .with_url("https://trials.example/metformin-t2d"),
        );

    let irs1_lookup = EvidenceBatch::default()
        .with_entity(irs1.clone())
        .with_entity(insulin_signaling.clone())
        .with_relation(
            Relation::new(irs1.key(), insulin_signaling.key(), RelationKind::TargetPathway)
                .with_status(EdgeStatus::Connected)
                .with_weight(0.7)
                .with_provenance("demo"),
        );

    StaticSource::new("demo-catalog")
        .with_search("obesity", obesity_batch)
        .with_search("type 2 diabetes", t2d_batch)
        .with_lookup(EntityKey::derive(EntityType::Target, "IRS1"), irs1_lookup)
}
