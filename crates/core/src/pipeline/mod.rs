pub mod backfill;
pub mod entry;
pub mod filter;
pub mod orchestrator;
pub mod revaluation;
pub mod sleep;
pub mod verification;
pub mod writer;
