//! Triple-Sync: one finished analysis written to three independent destinations.

use crate::domain::analysis::ScoredSnapshot;
use crate::domain::records::{AnalysisCacheRecord, Destination, DiscoveryRecord, PredictionRecord};
use crate::error::{detail, PersistenceError};
use crate::storage::AnalysisStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DestinationOutcome {
    pub destination: Destination,
    pub result: Result<(), PersistenceError>,
}

/// Per-destination results of one `persist` call, in write order.
#[derive(Debug, Clone, Default)]
pub struct PersistReport {
    pub outcomes: Vec<DestinationOutcome>,
}

impl PersistReport {
    pub fn succeeded(&self) -> impl Iterator<Item = Destination> + '_ {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.destination)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PersistenceError> + '_ {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.len() == Destination::ALL.len() && self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn outcome(&self, destination: Destination) -> Option<&DestinationOutcome> {
        self.outcomes.iter().find(|o| o.destination == destination)
    }
}

#[derive(Clone)]
pub struct TripleSyncWriter {
    store: Arc<dyn AnalysisStore>,
}

impl TripleSyncWriter {
    pub fn new(store: Arc<dyn AnalysisStore>) -> Self {
        Self { store }
    }

    /// Attempts every destination exactly once, whatever happened to the others. Failures are
    /// logged and returned in the report; this never fails as a whole.
    pub async fn persist(&self, scored: &ScoredSnapshot, now: DateTime<Utc>) -> PersistReport {
        let mut report = PersistReport::default();
        for destination in Destination::ALL {
            let result = self.write_one(destination, scored, now).await.map_err(|err| {
                PersistenceError {
                    destination,
                    ticker: scored.ticker().to_string(),
                    detail: detail(&err),
                }
            });

            match &result {
                Ok(()) => tracing::debug!(ticker = %scored.ticker(), %destination, "destination synced"),
                Err(err) => tracing::warn!(
                    ticker = %scored.ticker(),
                    %destination,
                    error = %err.detail,
                    "destination write failed; continuing with remaining destinations"
                ),
            }

            report.outcomes.push(DestinationOutcome {
                destination,
                result,
            });
        }
        report
    }

    async fn write_one(
        &self,
        destination: Destination,
        scored: &ScoredSnapshot,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        match destination {
            Destination::Discovery => {
                self.store
                    .upsert_discovery(&DiscoveryRecord::from_scored(scored, now))
                    .await
            }
            Destination::AnalysisCache => {
                let record = AnalysisCacheRecord::from_scored(scored, now)?;
                self.store.upsert_analysis_cache(&record).await
            }
            Destination::Predictions => {
                self.store
                    .upsert_prediction(&PredictionRecord::from_scored(scored, now))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::Direction;
    use crate::testing::{scored, MemoryStore};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 20, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn writes_all_three_destinations() {
        let store = Arc::new(MemoryStore::default());
        let writer = TripleSyncWriter::new(store.clone());

        let report = writer.persist(&scored("SNDL", 1.5, 72.0), now()).await;

        assert!(report.is_complete());
        assert_eq!(report.succeeded().count(), 3);
        for destination in Destination::ALL {
            assert_eq!(store.write_attempts(destination), 1);
        }

        let discovery = store.discovery("SNDL").unwrap();
        assert_eq!(discovery.dna_score, 72.0);
        assert_eq!(discovery.updated_at, now());
        let cache = store.analysis_cache("SNDL").unwrap();
        assert_eq!(cache.analysis["dnaScore"], 72.0);
        let predictions = store.predictions_for("SNDL");
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].predicted_direction, Direction::Bullish);
    }

    #[tokio::test]
    async fn one_failing_destination_does_not_block_the_others() {
        let store = Arc::new(MemoryStore::default().failing(Destination::AnalysisCache));
        let writer = TripleSyncWriter::new(store.clone());

        let report = writer.persist(&scored("MULN", 0.2, 40.0), now()).await;

        assert!(!report.is_complete());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].destination, Destination::AnalysisCache);
        assert_eq!(failures[0].ticker, "MULN");
        assert!(report.outcome(Destination::Discovery).unwrap().result.is_ok());
        assert!(report.outcome(Destination::Predictions).unwrap().result.is_ok());

        assert!(store.discovery("MULN").is_some());
        assert!(store.analysis_cache("MULN").is_none());
        assert_eq!(store.predictions_for("MULN").len(), 1);
        for destination in Destination::ALL {
            assert_eq!(store.write_attempts(destination), 1);
        }
    }

    #[tokio::test]
    async fn every_destination_failing_still_attempts_all() {
        let store = Arc::new(
            MemoryStore::default()
                .failing(Destination::Discovery)
                .failing(Destination::AnalysisCache)
                .failing(Destination::Predictions),
        );
        let writer = TripleSyncWriter::new(store.clone());

        let report = writer.persist(&scored("IDEX", 0.5, 10.0), now()).await;

        assert_eq!(report.failures().count(), 3);
        let order: Vec<_> = report.outcomes.iter().map(|o| o.destination).collect();
        assert_eq!(order, Destination::ALL.to_vec());
    }

    #[tokio::test]
    async fn persisting_twice_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let writer = TripleSyncWriter::new(store.clone());
        let s = scored("FCEL", 5.0, 61.0);

        writer.persist(&s, now()).await;
        let once = store.snapshot();
        writer.persist(&s, now()).await;
        let twice = store.snapshot();

        assert_eq!(once, twice);
        assert_eq!(store.predictions_for("FCEL").len(), 1);
    }

    #[tokio::test]
    async fn rerun_refreshes_rows_instead_of_duplicating() {
        let store = Arc::new(MemoryStore::default());
        let writer = TripleSyncWriter::new(store.clone());

        writer.persist(&scored("ZOM", 0.1, 30.0), now()).await;
        writer
            .persist(&scored("ZOM", 0.12, 65.0), now() + Duration::hours(1))
            .await;

        assert_eq!(store.discovery("ZOM").unwrap().dna_score, 65.0);
        let predictions = store.predictions_for("ZOM");
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].predicted_direction, Direction::Bullish);
        assert_eq!(predictions[0].start_price, 0.12);

        writer
            .persist(&scored("ZOM", 0.15, 20.0), now() + Duration::days(1))
            .await;
        assert_eq!(store.predictions_for("ZOM").len(), 2);
    }
}
