//! Running one lane of city units.
//!
//! A lane is one batch file handed to one worker. Lanes do not talk to each
//! other: each marks its start and end in the log directory, runs its units
//! with bounded concurrency on blocking threads, and leaves completion to be
//! established later by reconciling the result store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt as _;
use rent_gap_ledger::TaskList;
use rent_gap_ledger::lanes::{Marker, write_marker};
use rent_gap_models::{CityUnit, UnitOutcome};

use crate::progress::ProgressCallback;
use crate::{CityPipeline, PipelineError};

/// What happened to each unit of a lane, in task order.
#[derive(Debug, Default)]
pub struct LaneSummary {
    pub outcomes: Vec<(CityUnit, UnitOutcome)>,
    /// Units whose log or result could not be written at all.
    pub errored: Vec<(CityUnit, String)>,
}

impl LaneSummary {
    #[must_use]
    pub fn computed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_persisted()).count()
    }

    #[must_use]
    pub fn zero_loss(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, UnitOutcome::ZeroLoss(_)))
            .count()
    }

    /// Failed unit counts keyed by failure kind.
    #[must_use]
    pub fn failures_by_kind(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (_, outcome) in &self.outcomes {
            if let UnitOutcome::Failed { kind, .. } = outcome {
                *counts.entry(kind.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Runs lanes of units through a shared [`CityPipeline`].
#[derive(Debug, Clone)]
pub struct BatchRunner {
    pipeline: Arc<CityPipeline>,
    jobs: usize,
}

impl BatchRunner {
    #[must_use]
    pub fn new(pipeline: CityPipeline) -> Self {
        let jobs = pipeline.config().jobs.max(1);
        Self {
            pipeline: Arc::new(pipeline),
            jobs,
        }
    }

    #[must_use]
    pub const fn pipeline(&self) -> &Arc<CityPipeline> {
        &self.pipeline
    }

    /// Runs every unit of `tasks` as lane `lane`, between its start and end
    /// markers.
    ///
    /// Units are independent: a unit that cannot even write its log is
    /// recorded in [`LaneSummary::errored`] and the lane carries on.
    ///
    /// # Errors
    ///
    /// Returns an error if a lane marker cannot be written.
    pub async fn run_lane(
        &self,
        lane: &str,
        tasks: &TaskList,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<LaneSummary, PipelineError> {
        let log_dir = self.pipeline.config().log_dir.clone();
        write_marker(&log_dir, Marker::Start, lane, Utc::now())?;
        log::info!(
            "Lane {lane}: running {} units, {} at a time",
            tasks.len(),
            self.jobs
        );

        progress.set_total(u64::try_from(tasks.len()).unwrap_or(u64::MAX));
        progress.set_message(format!("lane {lane}"));

        let results: Vec<(CityUnit, Result<UnitOutcome, PipelineError>)> =
            futures::stream::iter(tasks.units().iter().cloned().map(|unit| {
                let pipeline = Arc::clone(&self.pipeline);
                let progress = Arc::clone(&progress);
                async move {
                    let blocking_unit = unit.clone();
                    let result =
                        match tokio::task::spawn_blocking(move || pipeline.run(&blocking_unit))
                            .await
                        {
                            Ok(result) => result,
                            Err(e) => Err(PipelineError::from(e)),
                        };
                    progress.inc(1);
                    (unit, result)
                }
            }))
            .buffer_unordered(self.jobs)
            .collect()
            .await;

        let mut summary = LaneSummary::default();
        for (unit, result) in results {
            match result {
                Ok(outcome) => summary.outcomes.push((unit, outcome)),
                Err(e) => {
                    log::error!("{}: {e}", unit.key());
                    summary.errored.push((unit, e.to_string()));
                }
            }
        }
        summary.outcomes.sort_by_key(|(unit, _)| unit.id);
        summary.errored.sort_by_key(|(unit, _)| unit.id);

        write_marker(&log_dir, Marker::End, lane, Utc::now())?;

        let message = format!(
            "lane {lane}: {} of {} units recorded",
            summary.computed(),
            tasks.len()
        );
        log::info!("{message}");
        progress.finish(message);

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rent_gap_ledger::lanes::wall_time;
    use rent_gap_ledger::reconcile;
    use rent_gap_models::{CityKey, FailureKind};

    use super::*;
    use crate::fixtures::write_city_data;
    use crate::progress::null_progress;

    #[tokio::test]
    async fn runs_a_lane_between_markers() {
        let tmp = std::env::temp_dir().join("rent_gap_runner_lane_test");
        let _ = fs::remove_dir_all(&tmp);
        let config = write_city_data(&tmp);
        let log_dir = config.log_dir.clone();

        let runner = BatchRunner::new(CityPipeline::new(config).unwrap());
        let tasks = TaskList::from_keys([
            CityKey::new("Henan", "Anyang"),
            CityKey::new("Henan", "Hebi"),
            CityKey::new("Hubei", "Wuhan"),
        ]);

        let summary = runner.run_lane("1", &tasks, null_progress()).await.unwrap();
        assert_eq!(summary.outcomes.len(), 3);
        assert!(summary.errored.is_empty());
        assert_eq!(summary.computed(), 1);
        assert_eq!(summary.zero_loss(), 0);
        assert_eq!(summary.outcomes[0].0.key(), CityKey::new("Henan", "Anyang"));

        let failures = summary.failures_by_kind();
        assert_eq!(
            failures.get(&FailureKind::GeometryNotFoundError.to_string()),
            Some(&1)
        );
        assert_eq!(failures.get("DATA_ERROR"), Some(&1));

        assert!(log_dir.join("start_time_1").exists());
        assert!(log_dir.join("end_time_1").exists());
        let wall = wall_time(&log_dir).unwrap().unwrap();
        assert!(wall.end >= wall.start);

        let ledger = reconcile(&tasks, runner.pipeline().store(), &log_dir).unwrap();
        assert_eq!(ledger.completed, 1);
        assert_eq!(ledger.missing_tasks().len(), 2);

        let _ = fs::remove_dir_all(&tmp);
    }
}
