//! Evidence producers and the citation ledger

mod citation;
mod source;

pub use citation::{Citation, CitationDraft, CitationKind, CitationLedger};
pub use source::{EvidenceBatch, EvidenceSource, SourceError, StaticSource};
