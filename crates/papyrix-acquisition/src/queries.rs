//! Search query generation.
//!
//! Queries come from an LLM when one is configured. Any failure (backend down,
//! empty or short answer) is papered over with deterministic queries built
//! from the topic, so the search loop always gets exactly the count it asked for.

use std::sync::Arc;

use async_trait::async_trait;
use papyrix_llm::{LlmBackend, LlmRequest, Message};
use regex::Regex;
use tracing::{debug, warn};

use crate::models::Paper;

/// Titles of earlier results included in a broadening prompt.
const MAX_CONTEXT_TITLES: usize = 15;

const FOCUSED_TEMPLATES: &[&str] = &[
    "{t}",
    "{t} review",
    "{t} recent advances",
    "{t} methods",
    "{t} applications",
    "{t} challenges",
    "{t} systematic review",
    "{t} case study",
    "{t} experimental results",
    "{t} future directions",
];

const BROAD_TEMPLATES: &[&str] = &[
    "{t}",
    "{t} overview",
    "{t} survey",
    "{t} background",
    "{t} trends",
    "{t} related work",
    "{t} fundamentals",
    "{t} perspectives",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "in", "of", "to", "for", "on", "with", "by",
    "from", "using", "based", "via", "into", "its", "their",
];

#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// `previous` carries papers found so far when asking for broader queries.
    async fn generate(
        &self,
        topic: &str,
        count: usize,
        previous: Option<&[Paper]>,
    ) -> anyhow::Result<Vec<String>>;
}

/// Always-available generator producing [`fallback_queries`].
pub struct FallbackQueryGenerator;

#[async_trait]
impl QueryGenerator for FallbackQueryGenerator {
    async fn generate(
        &self,
        topic: &str,
        count: usize,
        previous: Option<&[Paper]>,
    ) -> anyhow::Result<Vec<String>> {
        Ok(fallback_queries(topic, count, previous.is_some()))
    }
}

pub struct LlmQueryGenerator {
    backend: Arc<dyn LlmBackend>,
}

impl LlmQueryGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl QueryGenerator for LlmQueryGenerator {
    async fn generate(
        &self,
        topic: &str,
        count: usize,
        previous: Option<&[Paper]>,
    ) -> anyhow::Result<Vec<String>> {
        let req = LlmRequest::new(vec![
            Message::system(
                "You write search queries for academic literature databases. \
                 Reply with one query per line and nothing else.",
            ),
            Message::user(build_prompt(topic, count, previous)),
        ])
        .with_temperature(if previous.is_some() { 0.9 } else { 0.7 });

        let resp = self.backend.complete(req).await?;
        let queries = parse_queries(&resp.content);
        debug!(model = %resp.model, n = queries.len(), "LLM generated queries");
        if queries.is_empty() {
            anyhow::bail!("LLM returned no usable queries");
        }
        Ok(queries)
    }
}

fn build_prompt(topic: &str, count: usize, previous: Option<&[Paper]>) -> String {
    let mut prompt = format!(
        "Generate {count} distinct search queries for finding academic papers about: {topic}\n"
    );
    match previous {
        Some(papers) if !papers.is_empty() => {
            prompt.push_str(
                "\nThe search so far has found too few papers. These were already found:\n",
            );
            for p in papers.iter().take(MAX_CONTEXT_TITLES) {
                prompt.push_str(&format!("- {}\n", p.title));
            }
            prompt.push_str(
                "\nWrite broader, less restrictive queries (synonyms, neighbouring fields, \
                 more general terms) that would find different related work.\n",
            );
        }
        Some(_) => prompt.push_str(
            "\nThe search so far has found nothing. Write broader, more general queries.\n",
        ),
        None => {}
    }
    prompt.push_str("Do not number the queries.");
    prompt
}

fn list_marker_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "1. ", "2) ", "- ", "* ", "• ", "Query 3: "
        Regex::new(r"^\s*(?:(?i:query)\s*\d+\s*[:.)-]|\d+\s*[.):-]|[-*•]+)\s*").unwrap()
    })
}

/// One query per non-empty line, list markers and quotes removed, repeats dropped.
pub fn parse_queries(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in content.lines() {
        let stripped = list_marker_regex().replace(line, "");
        let query = stripped
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
            .trim();
        if query.is_empty() || query.ends_with(':') {
            continue;
        }
        if !out.iter().any(|q| q.eq_ignore_ascii_case(query)) {
            out.push(query.to_string());
        }
    }
    out
}

/// Deterministic queries derived from the topic, exactly `count` long.
pub fn fallback_queries(topic: &str, count: usize, broaden: bool) -> Vec<String> {
    let topic = topic.split_whitespace().collect::<Vec<_>>().join(" ");
    let (base, templates) = if broaden {
        (broad_core(&topic), BROAD_TEMPLATES)
    } else {
        (topic.clone(), FOCUSED_TEMPLATES)
    };

    (0..count)
        .map(|i| match templates.get(i) {
            Some(t) => t.replace("{t}", &base),
            None => format!("{base} research {}", i - templates.len() + 2),
        })
        .collect()
}

/// The topic's leading content words; a less specific query stem.
fn broad_core(topic: &str) -> String {
    let words: Vec<&str> = topic
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if words.len() <= 2 {
        return topic.to_string();
    }
    let keep = 3.max(words.len() / 2).min(words.len());
    words[..keep].join(" ")
}

/// Never fails: falls back on error and pads or truncates to exactly `count`.
pub async fn queries_or_fallback(
    generator: &dyn QueryGenerator,
    topic: &str,
    count: usize,
    previous: Option<&[Paper]>,
) -> Vec<String> {
    let broaden = previous.is_some();
    let mut queries = match generator.generate(topic, count, previous).await {
        Ok(q) => q,
        Err(e) => {
            warn!("Query generation failed, using fallback queries: {e}");
            Vec::new()
        }
    };
    queries.retain(|q| !q.trim().is_empty());
    queries.truncate(count);

    if queries.len() < count {
        for candidate in fallback_queries(topic, count * 2, broaden) {
            if queries.len() == count {
                break;
            }
            if !queries.iter().any(|q| q.eq_ignore_ascii_case(&candidate)) {
                queries.push(candidate);
            }
        }
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use papyrix_llm::{LlmError, LlmResponse};
    use pretty_assertions::assert_eq;

    struct CannedBackend(Result<String, ()>);

    #[async_trait]
    impl LlmBackend for CannedBackend {
        async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse, LlmError> {
            match &self.0 {
                Ok(content) => Ok(LlmResponse {
                    content: content.clone(),
                    model: "canned".into(),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                }),
                Err(()) => Err(LlmError::Unavailable("offline".into())),
            }
        }
        fn model_id(&self) -> &str { "canned" }
        fn is_local(&self) -> bool { true }
    }

    #[test]
    fn test_parse_queries_strips_markers() {
        let raw = "Here are the queries:\n1. \"graph neural networks\"\n2) GNN molecules\n- message passing\n\n* Graph Neural Networks\nQuery 5: graph transformers";
        assert_eq!(
            parse_queries(raw),
            vec!["graph neural networks", "GNN molecules", "message passing", "graph transformers"]
        );
    }

    #[test]
    fn test_fallback_is_deterministic_and_exact() {
        let a = fallback_queries("  protein   folding ", 12, false);
        assert_eq!(a.len(), 12);
        assert_eq!(a[0], "protein folding");
        assert_eq!(a[1], "protein folding review");
        assert_eq!(a[10], "protein folding research 2");
        assert_eq!(a, fallback_queries("protein folding", 12, false));
        assert!(fallback_queries("x", 0, false).is_empty());
    }

    #[test]
    fn test_broad_fallback_drops_specific_terms() {
        let q = fallback_queries("transformer models for low resource machine translation", 2, true);
        assert_eq!(q, vec!["transformer models low", "transformer models low overview"]);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back() {
        let gen = LlmQueryGenerator::new(Arc::new(CannedBackend(Err(()))));
        let queries = queries_or_fallback(&gen, "soil microbiome", 3, None).await;
        assert_eq!(queries, fallback_queries("soil microbiome", 3, false));
    }

    #[tokio::test]
    async fn test_short_llm_answer_is_padded() {
        let gen = LlmQueryGenerator::new(Arc::new(CannedBackend(Ok("soil bacteria diversity".into()))));
        let queries = queries_or_fallback(&gen, "soil microbiome", 3, None).await;
        assert_eq!(queries, vec!["soil bacteria diversity", "soil microbiome", "soil microbiome review"]);
    }

    #[tokio::test]
    async fn test_long_llm_answer_is_truncated() {
        let gen = LlmQueryGenerator::new(Arc::new(CannedBackend(Ok("a\nb\nc\nd".into()))));
        assert_eq!(queries_or_fallback(&gen, "t", 2, None).await, vec!["a", "b"]);
    }

    #[test]
    fn test_broaden_prompt_lists_previous_titles() {
        let papers = vec![Paper::new("Known result", "10.1/k")];
        let prompt = build_prompt("topic", 4, Some(papers.as_slice()));
        assert!(prompt.contains("- Known result"));
        assert!(prompt.contains("broader"));
        assert!(!build_prompt("topic", 4, None).contains("broader"));
    }
}
