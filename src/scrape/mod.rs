use async_stream::stream;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tracing::{error, info};

use crate::artifacts::{ArtifactHandle, ArtifactStore};
use crate::browser::{BrowserSession, PageOutcome};
use crate::classifier::Classification;
use crate::error::PipelineError;
use crate::pipeline::{StageOutcome, Tally, CANNOT_SCRAPE};

/// One output row: the input URL and what loading it produced. Output
/// cardinality and order always match the input table.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeRecord {
    pub url: String,
    pub outcome: PageOutcome,
}

/// Scrape Stage: visits every URL of the search artifact in order with one
/// browser session, containing per-URL failures as sentinel cells.
pub struct ScrapeStage {
    store: ArtifactStore,
    page_timeout: Duration,
}

impl ScrapeStage {
    pub fn new(store: ArtifactStore, page_timeout: Duration) -> Self {
        Self {
            store,
            page_timeout,
        }
    }

    pub async fn execute(
        &self,
        search: &StageOutcome,
        classification: &Classification,
    ) -> StageOutcome {
        let handle = match search {
            StageOutcome::Completed { handle, .. } if !classification.is_out_of_domain() => handle,
            _ => {
                info!("{}", CANNOT_SCRAPE);
                return StageOutcome::skipped(CANNOT_SCRAPE);
            }
        };

        match self.run(handle, classification).await {
            Ok((handle, tally)) => StageOutcome::completed_with_tally(handle, tally),
            Err(e) => {
                error!("Scrape stage failed: {}", e);
                StageOutcome::failed(e)
            }
        }
    }

    async fn run(
        &self,
        input: &ArtifactHandle,
        classification: &Classification,
    ) -> std::result::Result<(ArtifactHandle, Tally), PipelineError> {
        info!("Reading URLs from '{}'", input);
        let urls = self.store.read_href_column(input.as_path())?;
        if urls.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        info!("Starting to scrape {} URLs", urls.len());
        let session = BrowserSession::launch().await?;

        // nothing fallible between launch and close: per-URL failures are
        // recorded as outcomes, so the session is released on every path
        let records: Vec<ScrapeRecord> = page_outcomes(&session, &urls, self.page_timeout)
            .collect()
            .await;

        session.close().await;

        let succeeded = records.iter().filter(|r| r.outcome.is_success()).count();
        let tally = Tally {
            succeeded,
            errored: records.len() - succeeded,
        };

        let label = classification
            .primary_domain()
            .map(|d| d.label())
            .unwrap_or("out-of-domain");
        let handle = self.store.write_scraped_pages(label, &records)?;

        info!("Successfully scraped: {}/{} URLs", succeeded, records.len());
        Ok((handle, tally))
    }
}

/// Lazy finite sequence of per-URL outcomes: strictly sequential, one page
/// reused across navigations, materialized by the caller at stage end.
fn page_outcomes<'a>(
    session: &'a BrowserSession,
    urls: &'a [String],
    timeout: Duration,
) -> impl Stream<Item = ScrapeRecord> + 'a {
    stream! {
        for (index, url) in urls.iter().enumerate() {
            info!("Scraping ({}/{}): {}", index + 1, urls.len(), url);
            let outcome = session.fetch_page_text(url, timeout).await;
            yield ScrapeRecord {
                url: url.clone(),
                outcome,
            };
        }
    }
}
