use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;
use uuid::Uuid;

use crate::artifacts::ArtifactHandle;
use crate::classifier::{Classification, QueryClassifier};
use crate::error::{PipelineError, Result};
use crate::scrape::ScrapeStage;
use crate::search::SearchStage;

pub const CANNOT_SEARCH: &str = "Cannot search: Query is out-of-domain";
pub const CANNOT_SCRAPE: &str = "Cannot scrape: No valid search results";

/// Success/error counts for a scrape run. Advisory, for the operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tally {
    pub succeeded: usize,
    pub errored: usize,
}

/// Tagged handoff value between stages. Replaces the sentinel-string channel:
/// downstream stages match on the variant instead of inspecting substrings.
/// The textual sentinels survive only in `Display`, for logs and the report.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed {
        handle: ArtifactHandle,
        tally: Option<Tally>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: PipelineError,
    },
}

impl StageOutcome {
    pub fn completed(handle: ArtifactHandle) -> Self {
        StageOutcome::Completed {
            handle,
            tally: None,
        }
    }

    pub fn completed_with_tally(handle: ArtifactHandle, tally: Tally) -> Self {
        StageOutcome::Completed {
            handle,
            tally: Some(tally),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        StageOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(error: PipelineError) -> Self {
        StageOutcome::Failed { error }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed { .. })
    }

    pub fn handle(&self) -> Option<&ArtifactHandle> {
        match self {
            StageOutcome::Completed { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Completed {
                handle,
                tally: Some(tally),
            } => write!(
                f,
                "{} (Success: {}, Errors: {})",
                handle, tally.succeeded, tally.errored
            ),
            StageOutcome::Completed { handle, tally: None } => write!(f, "{}", handle),
            StageOutcome::Skipped { reason } => write!(f, "{}", reason),
            StageOutcome::Failed { error } => write!(f, "ERROR: {}", error),
        }
    }
}

/// The three stages in fixed order: Classify, Search, Scrape. No loops, no
/// backward transitions, no retries. A classifier failure is terminal; search
/// and scrape failures are contained in their outcome.
pub struct Pipeline {
    classifier: QueryClassifier,
    search: SearchStage,
    scrape: ScrapeStage,
}

impl Pipeline {
    pub fn new(classifier: QueryClassifier, search: SearchStage, scrape: ScrapeStage) -> Self {
        Self {
            classifier,
            search,
            scrape,
        }
    }

    pub async fn run(&self, query: &str) -> Result<PipelineReport> {
        if query.trim().is_empty() {
            return Err(
                PipelineError::Precondition("query must not be empty".to_string()).into(),
            );
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting pipeline run {} for query: {}", run_id, query);

        let classification = self.classifier.classify(query).await?;

        let search = self.search.execute(&classification).await;
        info!("Search stage: {}", search);

        let scrape = self.scrape.execute(&search, &classification).await;
        info!("Scrape stage: {}", scrape);

        Ok(PipelineReport {
            run_id,
            started_at,
            query: query.to_string(),
            classification,
            search,
            scrape,
        })
    }
}

/// Everything one run produced, for the operator.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub query: String,
    pub classification: Classification,
    pub search: StageOutcome,
    pub scrape: StageOutcome,
}

impl PipelineReport {
    pub fn render(&self) -> String {
        format!(
            "Pipeline run {} started {}\n\
             Query:          {}\n\
             Classification: {} ({})\n\
             Search:         {}\n\
             Scrape:         {}",
            self.run_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.query,
            self.classification.label(),
            self.classification.context,
            self.search,
            self.scrape,
        )
    }
}
