use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::models::{Flashcard, RelatedLink};

const MAX_LINKS_PER_CARD: usize = 3;
const MAX_QUERY_TOKENS: usize = 4;
const ENRICHMENT_CONCURRENCY: usize = 4;

/// Common English stop words stripped when deriving a search query from a
/// flashcard question.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "was", "what",
    "when", "where", "which", "who", "why", "will", "with", "you", "your",
];

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(String),

    #[error("search returned no results")]
    NoResults,
}

/// A web-search backend behind a uniform contract.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<RelatedLink>, SearchError>;
}

/// Derive a short search query from a flashcard question: lowercase, strip
/// punctuation and stop words, keep the first few content tokens.
pub fn derive_query(question: &str) -> String {
    static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
    let punctuation = PUNCTUATION.get_or_init(|| Regex::new(r"[^a-z0-9\s]").unwrap());

    let lowered = question.to_lowercase();
    let stripped = punctuation.replace_all(&lowered, " ");

    stripped
        .split_whitespace()
        .filter(|token| !STOP_WORDS.contains(token))
        .take(MAX_QUERY_TOKENS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// DuckDuckGo Instant Answer API. Free, no key, modest result quality.
pub struct DuckDuckGoBackend {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DdgResponse {
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<DdgTopic>,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "Heading", default)]
    heading: String,
}

#[derive(Debug, Deserialize)]
struct DdgTopic {
    #[serde(rename = "Text", default)]
    text: String,
    #[serde(rename = "FirstURL", default)]
    first_url: String,
}

impl DuckDuckGoBackend {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.unwrap_or_else(|| "https://api.duckduckgo.com".to_string()),
        }
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RelatedLink>, SearchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!("status {}", response.status())));
        }

        let parsed: DdgResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let mut links = Vec::new();

        if !parsed.abstract_url.is_empty() {
            links.push(RelatedLink {
                title: parsed.heading.clone(),
                url: parsed.abstract_url.clone(),
                description: parsed.abstract_text.clone(),
            });
        }

        for topic in parsed.related_topics {
            if links.len() >= max_results {
                break;
            }
            if topic.first_url.is_empty() || topic.text.is_empty() {
                continue;
            }
            links.push(RelatedLink {
                title: topic.text.chars().take(80).collect(),
                url: topic.first_url,
                description: topic.text,
            });
        }

        if links.is_empty() {
            Err(SearchError::NoResults)
        } else {
            links.truncate(max_results);
            Ok(links)
        }
    }
}

/// Serper.dev Google search. Paid, used only when a key is configured.
pub struct SerperBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl SerperBackend {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://google.serper.dev".to_string()),
        }
    }
}

#[async_trait]
impl SearchBackend for SerperBackend {
    fn name(&self) -> &'static str {
        "serper"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RelatedLink>, SearchError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&serde_json::json!({ "q": query }))
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!("status {}", response.status())));
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let links: Vec<RelatedLink> = parsed
            .organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(max_results)
            .map(|r| RelatedLink {
                title: r.title,
                url: r.link,
                description: r.snippet,
            })
            .collect();

        if links.is_empty() {
            Err(SearchError::NoResults)
        } else {
            Ok(links)
        }
    }
}

/// Always-available last resort: point the query at well-known educational
/// sites instead of performing a real search.
pub struct StaticLinkBackend;

#[async_trait]
impl SearchBackend for StaticLinkBackend {
    fn name(&self) -> &'static str {
        "static-links"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RelatedLink>, SearchError> {
        let encoded: String = query
            .chars()
            .map(|c| if c == ' ' { '+' } else { c })
            .collect();

        let mut links = vec![
            RelatedLink {
                title: format!("Search \"{}\" on Khan Academy", query),
                url: format!("https://www.khanacademy.org/search?page_search_query={}", encoded),
                description: "Free lessons and practice on this topic".to_string(),
            },
            RelatedLink {
                title: format!("Search \"{}\" on Wikipedia", query),
                url: format!("https://en.wikipedia.org/w/index.php?search={}", encoded),
                description: "Encyclopedia background reading".to_string(),
            },
            RelatedLink {
                title: format!("Search \"{}\" on Quizlet", query),
                url: format!("https://quizlet.com/search?query={}", encoded),
                description: "Community flashcard sets for this topic".to_string(),
            },
        ];
        links.truncate(max_results);
        Ok(links)
    }
}

/// Best-effort decorator that appends related links to each flashcard's
/// answer. Never fails the batch: a card whose enrichment errors or runs past
/// its deadline passes through unmodified.
pub struct LinkEnricher {
    backends: Vec<Arc<dyn SearchBackend>>,
    stagger: Duration,
    per_card_deadline: Duration,
}

impl LinkEnricher {
    pub fn new(backends: Vec<Arc<dyn SearchBackend>>) -> Self {
        Self {
            backends,
            stagger: Duration::from_millis(200),
            per_card_deadline: Duration::from_secs(5),
        }
    }

    /// Build the reference chain from configuration: DuckDuckGo first, Serper
    /// when a key is configured, static links always last.
    pub fn from_config(config: &SearchConfig) -> Self {
        let timeout = Duration::from_secs(5);
        let mut backends: Vec<Arc<dyn SearchBackend>> =
            vec![Arc::new(DuckDuckGoBackend::new(None, timeout))];

        if let Some(key) = &config.serper_api_key {
            backends.push(Arc::new(SerperBackend::new(key.clone(), None, timeout)));
        }
        backends.push(Arc::new(StaticLinkBackend));

        Self::new(backends)
    }

    /// Remove the inter-card stagger. Intended for tests that stub the
    /// search backends.
    pub fn without_delays(mut self) -> Self {
        self.stagger = Duration::ZERO;
        self
    }

    /// Enrich every card, joining all per-card tasks (bounded concurrency,
    /// order preserved) before returning.
    pub async fn enrich(&self, flashcards: Vec<Flashcard>) -> Vec<Flashcard> {
        stream::iter(flashcards.into_iter().enumerate())
            .map(|(index, card)| self.enrich_card(index, card))
            .buffered(ENRICHMENT_CONCURRENCY)
            .collect()
            .await
    }

    async fn enrich_card(&self, index: usize, card: Flashcard) -> Flashcard {
        // Stagger card starts to avoid bursting the search backend.
        if !self.stagger.is_zero() {
            tokio::time::sleep(self.stagger * index as u32).await;
        }

        let query = derive_query(&card.question);
        if query.is_empty() {
            return card;
        }

        match tokio::time::timeout(self.per_card_deadline, self.search_chain(&query)).await {
            Ok(Some(links)) => attach_links(card, links),
            Ok(None) => card,
            Err(_) => {
                debug!(card_id = %card.id, "Enrichment deadline elapsed, returning card unenriched");
                card
            }
        }
    }

    /// First non-empty success wins; failures are classified into logs and
    /// the next backend is tried.
    async fn search_chain(&self, query: &str) -> Option<Vec<RelatedLink>> {
        for backend in &self.backends {
            match backend.search(query, MAX_LINKS_PER_CARD).await {
                Ok(links) if !links.is_empty() => {
                    debug!(
                        backend = backend.name(),
                        query = %query,
                        link_count = links.len(),
                        "Search backend returned links"
                    );
                    return Some(links);
                }
                Ok(_) => continue,
                Err(err) => {
                    warn!(
                        backend = backend.name(),
                        query = %query,
                        error = %err,
                        "Search backend failed, trying next"
                    );
                }
            }
        }
        None
    }
}

fn attach_links(mut card: Flashcard, links: Vec<RelatedLink>) -> Flashcard {
    let mut block = String::from("\n\n---\nRelated links:\n");
    for link in &links {
        block.push_str(&format!("- {}: {}\n", link.title, link.url));
    }
    card.answer.push_str(&block);
    card.related_links = Some(links);
    card
}
