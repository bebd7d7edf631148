use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::llm::LanguageModel;

/// Coarse topic a query can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    AiRobotics,
    Geopolitics,
}

impl Domain {
    pub fn label(&self) -> &'static str {
        match self {
            Domain::AiRobotics => "AI-Robotics",
            Domain::Geopolitics => "Geopolitics",
        }
    }
}

/// Routing decision for one query: which domains it belongs to (empty means
/// out-of-domain) and a short context string used as the downstream search
/// query. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub domains: Vec<Domain>,
    pub context: String,
}

impl Classification {
    pub fn out_of_domain(context: impl Into<String>) -> Self {
        Self {
            domains: Vec::new(),
            context: context.into(),
        }
    }

    pub fn is_out_of_domain(&self) -> bool {
        self.domains.is_empty()
    }

    /// One of "AI-Robotics", "Geopolitics", "AI-Robotics,Geopolitics",
    /// "out-of-domain".
    pub fn label(&self) -> String {
        if self.domains.is_empty() {
            "out-of-domain".to_string()
        } else {
            self.domains
                .iter()
                .map(|d| d.label())
                .collect::<Vec<_>>()
                .join(",")
        }
    }

    pub fn primary_domain(&self) -> Option<Domain> {
        self.domains.first().copied()
    }
}

/// Labels and summarizes queries with a language model. The classifier never
/// answers the query itself — it only routes it.
pub struct QueryClassifier {
    model: Arc<dyn LanguageModel>,
}

impl QueryClassifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Classify a query into the four label forms. Model unreachability is
    /// the only failure mode and propagates as a terminal pipeline error.
    pub async fn classify(&self, query: &str) -> Result<Classification> {
        debug!("Classifying query: {}", query);

        let prompt = build_prompt(query);
        let raw = self
            .model
            .generate(&prompt)
            .await
            .map_err(|e| PipelineError::Classifier(format!("Model request failed: {}", e)))?;

        let classification = parse_classification(&raw, query);
        info!("Classified query as '{}'", classification.label());
        Ok(classification)
    }
}

fn build_prompt(query: &str) -> String {
    format!(
        "Analyze the user query below and classify it.\n\
         \n\
         Classification rules:\n\
         1. If the query is primarily about artificial intelligence, machine learning, \
         robotics, automation, neural networks, or autonomous systems, classify it as \"AI-Robotics\".\n\
         2. If the query is primarily about international relations, foreign policy, global \
         conflicts, treaties, or the political and economic relationships between countries, \
         classify it as \"Geopolitics\".\n\
         3. If the query clearly contains elements of both, classify it as both, \
         separated by a comma.\n\
         4. If the query does not fit any of the above, classify it as \"out-of-domain\".\n\
         \n\
         Output exactly two lines and nothing else:\n\
         Domain: <the domain label(s)>\n\
         Context: <a concise summary of the query's main topic>\n\
         \n\
         Do NOT answer the query itself. Only provide the classification and context.\n\
         \n\
         Query: {}",
        query
    )
}

/// Pull the domain label and context out of the model's free-text reply.
/// Tolerant of markdown decoration; an unrecognizable label degrades to
/// out-of-domain with the raw query as context. When both domains are
/// present the order is pinned to AI-Robotics first, whatever the model said.
fn parse_classification(raw: &str, query: &str) -> Classification {
    let mut domain_value: Option<String> = None;
    let mut context_value: Option<String> = None;

    for line in raw.lines() {
        let cleaned = line.trim().trim_start_matches(['*', '#', '-']).trim();
        let lower = cleaned.to_lowercase();

        if lower.starts_with("domain") && domain_value.is_none() {
            domain_value = field_value(cleaned);
        } else if lower.starts_with("context") && context_value.is_none() {
            context_value = field_value(cleaned);
        }
    }

    let domain_text = domain_value
        .unwrap_or_else(|| raw.to_string())
        .to_lowercase();

    let mut domains = Vec::new();
    if domain_text.contains("ai-robotics") {
        domains.push(Domain::AiRobotics);
    }
    if domain_text.contains("geopolitics") {
        domains.push(Domain::Geopolitics);
    }

    if domains.is_empty() || domain_text.contains("out-of-domain") {
        debug!("Query classified out-of-domain");
        return Classification::out_of_domain(query);
    }

    let context = context_value
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| query.to_string());

    Classification { domains, context }
}

fn field_value(line: &str) -> Option<String> {
    line.splitn(2, ':')
        .nth(1)
        .map(|v| v.trim().trim_matches('*').trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;

    #[test]
    fn test_parse_single_domain() {
        let raw = "Domain: AI-Robotics\nContext: humanoid robotics breakthroughs";
        let c = parse_classification(raw, "latest humanoid robotics breakthroughs");

        assert_eq!(c.domains, vec![Domain::AiRobotics]);
        assert_eq!(c.context, "humanoid robotics breakthroughs");
        assert_eq!(c.label(), "AI-Robotics");
    }

    #[test]
    fn test_parse_both_domains_pins_order() {
        // model emitted Geopolitics first; the label order is fixed anyway
        let raw = "Domain: Geopolitics, AI-Robotics\nContext: the global race for semiconductor supremacy";
        let c = parse_classification(raw, "semiconductor supremacy");

        assert_eq!(c.domains, vec![Domain::AiRobotics, Domain::Geopolitics]);
        assert_eq!(c.label(), "AI-Robotics,Geopolitics");
        assert_eq!(c.primary_domain(), Some(Domain::AiRobotics));
    }

    #[test]
    fn test_parse_out_of_domain_uses_query_as_context() {
        let raw = "The query is out-of-domain.\nbest pizza recipe";
        let c = parse_classification(raw, "best pizza recipe");

        assert!(c.is_out_of_domain());
        assert_eq!(c.label(), "out-of-domain");
        assert_eq!(c.context, "best pizza recipe");
    }

    #[test]
    fn test_parse_tolerates_markdown_decoration() {
        let raw = "**Domain**: Geopolitics\n**Context**: NATO summit outcomes";
        let c = parse_classification(raw, "what happened at the NATO summit");

        assert_eq!(c.domains, vec![Domain::Geopolitics]);
        assert_eq!(c.context, "NATO summit outcomes");
    }

    #[test]
    fn test_parse_missing_context_falls_back_to_query() {
        let raw = "Domain: AI-Robotics";
        let c = parse_classification(raw, "neural network pruning");

        assert_eq!(c.domains, vec![Domain::AiRobotics]);
        assert_eq!(c.context, "neural network pruning");
    }

    #[test]
    fn test_parse_unrecognizable_reply_degrades_to_out_of_domain() {
        let raw = "I think this is a very interesting question about cooking.";
        let c = parse_classification(raw, "how do I bake bread");

        assert!(c.is_out_of_domain());
        assert_eq!(c.context, "how do I bake bread");
    }

    #[tokio::test]
    async fn test_classify_via_model() {
        let mut model = MockLanguageModel::new();
        model.expect_generate().returning(|_| {
            Ok("Domain: AI-Robotics\nContext: humanoid robotics breakthroughs".to_string())
        });

        let classifier = QueryClassifier::new(Arc::new(model));
        let c = classifier
            .classify("latest humanoid robotics breakthroughs")
            .await
            .unwrap();

        assert_eq!(c.label(), "AI-Robotics");
        assert_eq!(c.context, "humanoid robotics breakthroughs");
    }

    #[tokio::test]
    async fn test_classify_propagates_model_failure() {
        let mut model = MockLanguageModel::new();
        model
            .expect_generate()
            .returning(|_| Err("connection refused".into()));

        let classifier = QueryClassifier::new(Arc::new(model));
        let err = classifier.classify("anything").await.unwrap_err();
        assert!(err.to_string().contains("Classifier error"));
    }
}
