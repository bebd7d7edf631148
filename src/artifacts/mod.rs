use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::scrape::ScrapeRecord;
use crate::search::SearchRecord;

/// Path to a persisted stage output. Stages hand data to each other only
/// through these — an artifact is durable before the next stage begins.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactHandle(PathBuf);

impl ArtifactHandle {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Owns the output directory and the deterministic artifact naming scheme.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn ensure_dir(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| PipelineError::Storage(format!("Failed to create output directory: {}", e)))?;
        Ok(())
    }

    pub fn search_results_path(&self, query: &str) -> PathBuf {
        self.output_dir
            .join(format!("search_results_{}.csv", normalize_stem(query)))
    }

    pub fn scraped_content_path(&self, domain_label: &str) -> PathBuf {
        self.output_dir
            .join(format!("scraped_content_{}.csv", normalize_stem(domain_label)))
    }

    /// Persist a search result table. A repeated call with the same query
    /// overwrites the prior artifact (last-writer-wins, no versioning).
    pub fn write_search_results(
        &self,
        query: &str,
        records: &[SearchRecord],
    ) -> Result<ArtifactHandle, PipelineError> {
        self.ensure_dir()?;
        let path = self.search_results_path(query);

        let mut content = String::from("title,href,snippet\n");
        for record in records {
            let row = [
                escape_csv_field(&single_line(&record.title)),
                escape_csv_field(&single_line(&record.href)),
                escape_csv_field(&single_line(&record.snippet)),
            ];
            content.push_str(&row.join(","));
            content.push('\n');
        }

        fs::write(&path, content)?;
        info!("Saved {} search results to '{}'", records.len(), path.display());
        Ok(ArtifactHandle::new(path))
    }

    /// Persist the scrape output table, one row per input URL in input order.
    pub fn write_scraped_pages(
        &self,
        domain_label: &str,
        records: &[ScrapeRecord],
    ) -> Result<ArtifactHandle, PipelineError> {
        self.ensure_dir()?;
        let path = self.scraped_content_path(domain_label);

        let mut content = String::from("url,scraped_text\n");
        for record in records {
            let row = [
                escape_csv_field(&record.url),
                escape_csv_field(&record.outcome.to_field()),
            ];
            content.push_str(&row.join(","));
            content.push('\n');
        }

        fs::write(&path, content)?;
        info!("Saved scraped content to '{}'", path.display());
        Ok(ArtifactHandle::new(path))
    }

    /// Read the `href` column back from a search result table, preserving
    /// row order and cardinality. Rows shorter than the header yield an
    /// empty href rather than being dropped.
    pub fn read_href_column(&self, path: &Path) -> Result<Vec<String>, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::MissingInput(path.display().to_string()));
        }

        let content = fs::read_to_string(path)?;
        let mut lines = content.lines();

        let header = lines
            .next()
            .ok_or_else(|| PipelineError::Schema("CSV file is empty".to_string()))?;
        let columns = parse_csv_line(header);
        let href_idx = columns
            .iter()
            .position(|c| c == "href")
            .ok_or_else(|| PipelineError::Schema("CSV must contain 'href' column".to_string()))?;

        let hrefs: Vec<String> = lines
            .filter(|line| !line.is_empty())
            .map(|line| {
                let fields = parse_csv_line(line);
                fields.get(href_idx).cloned().unwrap_or_default()
            })
            .collect();

        debug!("Read {} rows from '{}'", hrefs.len(), path.display());
        Ok(hrefs)
    }
}

/// Deterministic filename stem: lowercase, hyphens and whitespace become
/// underscores, everything else non-alphanumeric is dropped.
pub fn normalize_stem(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c)
            } else if c == '-' || c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect()
}

fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Search tables are written without embedded newlines, so the reader can
/// stay line-based; fields may still be quoted and contain commas.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}
