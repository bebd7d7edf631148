use percent_encoding::percent_decode_str;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

use crate::artifacts::{ArtifactHandle, ArtifactStore};
use crate::classifier::Classification;
use crate::config::SearchConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::{StageOutcome, CANNOT_SEARCH};

/// One search result row. Insertion order is the provider's relevance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub title: String,
    pub href: String,
    pub snippet: String,
}

/// Seam over the external search backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchRecord>>;
}

/// Scrapes the DuckDuckGo HTML search endpoint. One POST per call, fixed
/// parameters from config: region, safe search, recency window.
pub struct DuckDuckGoProvider {
    client: Client,
    region: String,
    safe_search: bool,
    recency: String,
    result_selector: Selector,
    link_selector: Selector,
    snippet_selector: Selector,
}

impl DuckDuckGoProvider {
    pub fn new(config: &SearchConfig) -> std::result::Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            region: config.region.clone(),
            safe_search: config.safe_search,
            recency: config.recency.clone(),
            result_selector: Selector::parse(".result")
                .map_err(|e| PipelineError::Parse(format!("Invalid result selector: {}", e)))?,
            link_selector: Selector::parse("a.result__a")
                .map_err(|e| PipelineError::Parse(format!("Invalid link selector: {}", e)))?,
            snippet_selector: Selector::parse("a.result__snippet, .result__snippet")
                .map_err(|e| PipelineError::Parse(format!("Invalid snippet selector: {}", e)))?,
        })
    }

    fn parse_results(&self, html: &str, max_results: usize) -> Vec<SearchRecord> {
        let doc = Html::parse_document(html);
        let mut records = Vec::new();

        for result in doc.select(&self.result_selector).take(max_results) {
            let title = result
                .select(&self.link_selector)
                .next()
                .map(|el| el.text().collect::<String>())
                .unwrap_or_default()
                .trim()
                .to_string();

            let href = result
                .select(&self.link_selector)
                .next()
                .and_then(|el| el.value().attr("href"))
                .map(extract_redirect_url)
                .unwrap_or_default();

            let snippet = result
                .select(&self.snippet_selector)
                .next()
                .map(|el| el.text().collect::<String>())
                .unwrap_or_default()
                .trim()
                .to_string();

            if !title.is_empty() {
                records.push(SearchRecord {
                    title,
                    href,
                    snippet,
                });
            }
        }

        records
    }
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchRecord>> {
        let mut form = vec![
            ("q", query.to_string()),
            ("kl", self.region.clone()),
            ("df", self.recency.clone()),
        ];
        if !self.safe_search {
            form.push(("kp", "-2".to_string()));
        }

        let response = self
            .client
            .post("https://html.duckduckgo.com/html/")
            .form(&form)
            .header("Accept", "text/html")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Search endpoint error: HTTP {}", response.status()).into());
        }

        let body = response.text().await?;
        Ok(self.parse_results(&body, max_results))
    }
}

/// Result URLs come wrapped in redirect links like
/// `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...`.
fn extract_redirect_url(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let start = pos + 5;
        let end = href[start..]
            .find('&')
            .map(|i| start + i)
            .unwrap_or(href.len());
        let encoded = &href[start..end];
        if !encoded.is_empty() {
            return percent_decode_str(encoded)
                .decode_utf8_lossy()
                .into_owned();
        }
    }
    href.to_string()
}

fn is_valid_href(href: &str) -> bool {
    match Url::parse(href) {
        Ok(url) => url.scheme() == "http" || url.scheme() == "https",
        Err(_) => false,
    }
}

/// Search Stage: one request, one durable artifact. Skips itself for
/// out-of-domain classifications; failures are contained in the outcome.
pub struct SearchStage {
    provider: Arc<dyn SearchProvider>,
    store: ArtifactStore,
    max_results: usize,
}

impl SearchStage {
    pub fn new(provider: Arc<dyn SearchProvider>, store: ArtifactStore, max_results: usize) -> Self {
        Self {
            provider,
            store,
            max_results,
        }
    }

    pub async fn execute(&self, classification: &Classification) -> StageOutcome {
        if classification.is_out_of_domain() {
            info!("{}", CANNOT_SEARCH);
            return StageOutcome::skipped(CANNOT_SEARCH);
        }

        match self.run(&classification.context).await {
            Ok(handle) => StageOutcome::completed(handle),
            Err(e) => {
                error!("Search stage failed: {}", e);
                StageOutcome::failed(e)
            }
        }
    }

    async fn run(&self, query: &str) -> std::result::Result<ArtifactHandle, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::Precondition(
                "search query must not be empty".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(PipelineError::Precondition(
                "max_results must be greater than 0".to_string(),
            ));
        }

        info!("Searching for: {}", query);
        let mut records = self
            .provider
            .search(query, self.max_results)
            .await
            .map_err(|e| PipelineError::Provider(e.to_string()))?;

        // every persisted record must carry a usable href
        records.retain(|r| is_valid_href(&r.href));
        if records.is_empty() {
            return Err(PipelineError::EmptyResult);
        }
        records.truncate(self.max_results);

        self.store.write_search_results(query, &records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const RESULT_PAGE: &str = r#"
        <html><body>
          <div class="result">
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Frobots&rut=abc">Humanoid robots</a>
            <a class="result__snippet">Recent breakthroughs in humanoid robotics.</a>
          </div>
          <div class="result">
            <a class="result__a" href="https://example.org/direct">Direct link</a>
            <div class="result__snippet">A result without redirect wrapping.</div>
          </div>
          <div class="result">
            <a class="result__a" href="https://example.net/untitled"></a>
          </div>
        </body></html>
    "#;

    fn stage_with(provider: MockSearchProvider, dir: &std::path::Path, max: usize) -> SearchStage {
        SearchStage::new(
            Arc::new(provider),
            ArtifactStore::new(dir.to_path_buf()),
            max,
        )
    }

    fn in_domain(context: &str) -> Classification {
        Classification {
            domains: vec![crate::classifier::Domain::AiRobotics],
            context: context.to_string(),
        }
    }

    #[test]
    fn test_parse_results_from_result_page() {
        let provider = DuckDuckGoProvider::new(&crate::config::Config::default().search).unwrap();
        let records = provider.parse_results(RESULT_PAGE, 50);

        // the third result has no title and is dropped
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Humanoid robots");
        assert_eq!(records[0].href, "https://example.com/robots");
        assert_eq!(records[0].snippet, "Recent breakthroughs in humanoid robotics.");
        assert_eq!(records[1].href, "https://example.org/direct");
    }

    #[test]
    fn test_parse_results_respects_max() {
        let provider = DuckDuckGoProvider::new(&crate::config::Config::default().search).unwrap();
        let records = provider.parse_results(RESULT_PAGE, 1);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_extract_redirect_url() {
        assert_eq!(
            extract_redirect_url("//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fa&rut=x"),
            "https://example.com/a"
        );
        assert_eq!(
            extract_redirect_url("https://example.com/plain"),
            "https://example.com/plain"
        );
    }

    #[test]
    fn test_is_valid_href() {
        assert!(is_valid_href("https://example.com/a"));
        assert!(is_valid_href("http://example.com"));
        assert!(!is_valid_href(""));
        assert!(!is_valid_href("not a url"));
        assert!(!is_valid_href("ftp://example.com/file"));
    }

    #[tokio::test]
    async fn test_search_persists_results_with_hrefs() {
        let temp_dir = tempdir().unwrap();

        let mut provider = MockSearchProvider::new();
        provider.expect_search().times(1).returning(|_, _| {
            Ok(vec![
                SearchRecord {
                    title: "a".to_string(),
                    href: "https://example.com/a".to_string(),
                    snippet: "".to_string(),
                },
                SearchRecord {
                    title: "no link".to_string(),
                    href: "".to_string(),
                    snippet: "".to_string(),
                },
            ])
        });

        let stage = stage_with(provider, temp_dir.path(), 50);
        let outcome = stage.execute(&in_domain("humanoid robotics")).await;

        let handle = outcome.handle().expect("search should complete").clone();
        let store = ArtifactStore::new(temp_dir.path().to_path_buf());
        let hrefs = store.read_href_column(handle.as_path()).unwrap();

        // the record without a usable href was dropped, at least one remains
        assert_eq!(hrefs, vec!["https://example.com/a"]);
    }

    #[tokio::test]
    async fn test_search_with_zero_results_fails_with_empty_result() {
        let temp_dir = tempdir().unwrap();

        let mut provider = MockSearchProvider::new();
        provider.expect_search().times(1).returning(|_, _| Ok(vec![]));

        let stage = stage_with(provider, temp_dir.path(), 50);
        let outcome = stage.execute(&in_domain("anything")).await;

        assert_eq!(outcome, StageOutcome::failed(PipelineError::EmptyResult));
    }

    #[tokio::test]
    async fn test_search_with_only_invalid_hrefs_fails_with_empty_result() {
        let temp_dir = tempdir().unwrap();

        let mut provider = MockSearchProvider::new();
        provider.expect_search().times(1).returning(|_, _| {
            Ok(vec![SearchRecord {
                title: "broken".to_string(),
                href: "not a url".to_string(),
                snippet: "".to_string(),
            }])
        });

        let stage = stage_with(provider, temp_dir.path(), 50);
        let outcome = stage.execute(&in_domain("anything")).await;

        assert_eq!(outcome, StageOutcome::failed(PipelineError::EmptyResult));
    }

    #[tokio::test]
    async fn test_empty_query_precondition() {
        let temp_dir = tempdir().unwrap();
        let mut provider = MockSearchProvider::new();
        provider.expect_search().never();

        let stage = stage_with(provider, temp_dir.path(), 50);
        let outcome = stage.execute(&in_domain("  ")).await;

        assert!(matches!(
            outcome,
            StageOutcome::Failed {
                error: PipelineError::Precondition(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_max_results_precondition() {
        let temp_dir = tempdir().unwrap();
        let mut provider = MockSearchProvider::new();
        provider.expect_search().never();

        let stage = stage_with(provider, temp_dir.path(), 0);
        let outcome = stage.execute(&in_domain("robotics")).await;

        assert!(matches!(
            outcome,
            StageOutcome::Failed {
                error: PipelineError::Precondition(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_out_of_domain_skips_without_calling_provider() {
        let temp_dir = tempdir().unwrap();
        let mut provider = MockSearchProvider::new();
        provider.expect_search().never();

        let stage = stage_with(provider, temp_dir.path(), 50);
        let outcome = stage
            .execute(&Classification::out_of_domain("best pizza recipe"))
            .await;

        assert_eq!(outcome, StageOutcome::skipped(CANNOT_SEARCH));
    }
}
