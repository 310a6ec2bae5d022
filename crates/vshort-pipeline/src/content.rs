//! Content planning: topics, scripts, keywords and footage search.

use std::sync::Arc;

use rand::Rng;
use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vshort_models::{ContentUnit, MediaDescriptor, VideoFormat};

use crate::cache::{CacheKey, ResponseCache};
use crate::error::{PipelineError, PipelineResult};
use crate::providers::{GenerationProvider, GenerationRequest, SearchProvider, SearchQuery};
use crate::registry::UsedResourceRegistry;
use crate::retry::RateLimitedExecutor;

const TOPICS_MAX_TOKENS: u32 = 1024;
const SCRIPT_MAX_TOKENS: u32 = 2048;
const KEYWORDS_MAX_TOKENS: u32 = 256;

/// Keywords searched one by one before combining.
const PRIMARY_KEYWORDS: usize = 2;
/// Keywords joined into the combined query.
const COMBINED_KEYWORDS: usize = 3;
/// Keywords this short are too vague for the combined query.
const MIN_COMBINED_KEYWORD_LEN: usize = 3;
/// Last-resort queries, searched on a random page.
const FALLBACK_QUERIES: &[&str] = &["technology", "business"];
const FALLBACK_MAX_PAGE: u32 = 5;

const KEYWORDS_SYSTEM_PROMPT: &str = "Convert the sentence into 3-5 positive English keywords \
suitable for a stock video search. Soften provocative or dangerous terms. Reply with the keywords \
separated by commas.";

const ALTERNATIVE_KEYWORDS_SYSTEM_PROMPT: &str = "Suggest 3-5 alternative English keywords that \
could visually represent the sentence. More general or abstract concepts are fine. Reply with the \
keywords separated by commas.";

fn topics_prompt(keyword: &str) -> String {
    format!(
        "You are a YouTube content planner. Suggest 5 engaging, fact-based video topics for the \
         keyword below. Do not use numbering, bullet points or other special characters.\n\n\
         Keyword: {}\n\nList only the topics, one per line.",
        keyword
    )
}

fn script_prompt(topic: &str) -> String {
    format!(
        "You are a YouTube script writer. Write a 40-second narration for a YouTube Shorts video \
         on the topic below.\n\nTopic: {}\n\n\
         Open with the problem and why it matters, explain it in the body, and close with a short \
         summary and a question inviting comments. Keep every sentence essential and the whole \
         narration under 40 seconds. Never use numbering, bullet points or quotation marks, and do \
         not name real companies.\n\nReply with the narration script only.",
        topic
    )
}

/// Split a topic suggestion response into one topic per line.
pub fn parse_topics(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a comma separated keyword response.
pub fn parse_keywords(response: &str) -> Vec<String> {
    response
        .split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

/// Plans content units for a topic.
///
/// Keyword extraction is cached by sentence text and footage search by
/// `(keywords, page, format)`. Every selected footage id is claimed in the
/// registry so it is never selected again.
///
/// With a shutdown signal attached, planning stops between sentences and
/// before any claim once the signal flips, so an abandoned run leaves no
/// registry entries behind.
pub struct ContentService {
    writer: Arc<dyn GenerationProvider>,
    keyword_model: Arc<dyn GenerationProvider>,
    search: Arc<dyn SearchProvider>,
    registry: Arc<UsedResourceRegistry>,
    executor: RateLimitedExecutor,
    keyword_cache: ResponseCache<Vec<String>>,
    search_cache: ResponseCache<MediaDescriptor>,
    sentence_boundary: Regex,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ContentService {
    pub fn new(
        writer: Arc<dyn GenerationProvider>,
        keyword_model: Arc<dyn GenerationProvider>,
        search: Arc<dyn SearchProvider>,
        registry: Arc<UsedResourceRegistry>,
        executor: RateLimitedExecutor,
    ) -> PipelineResult<Self> {
        let sentence_boundary = Regex::new(r"\.\s+")
            .map_err(|e| PipelineError::config(format!("invalid sentence pattern: {}", e)))?;

        Ok(Self {
            writer,
            keyword_model,
            search,
            registry,
            executor,
            keyword_cache: ResponseCache::new("keywords"),
            search_cache: ResponseCache::new("media_search"),
            sentence_boundary,
            shutdown: None,
        })
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn ensure_running(&self) -> PipelineResult<()> {
        match &self.shutdown {
            Some(rx) if *rx.borrow() => Err(PipelineError::Cancelled),
            _ => Ok(()),
        }
    }

    pub fn registry(&self) -> &UsedResourceRegistry {
        &self.registry
    }

    /// Suggested video topics for a seed keyword.
    pub async fn suggest_topics(&self, keyword: &str) -> PipelineResult<Vec<String>> {
        let request = GenerationRequest::new(topics_prompt(keyword.trim()))
            .with_max_tokens(TOPICS_MAX_TOKENS);
        let response = self
            .executor
            .execute_with_retry("suggest_topics", || self.writer.generate(&request))
            .await?;

        let topics = parse_topics(&response);
        if topics.is_empty() {
            return Err(PipelineError::invalid_response("claude", "no topics suggested"));
        }
        info!(keyword, count = topics.len(), "Topics suggested");
        Ok(topics)
    }

    /// Narration script for a topic.
    pub async fn generate_script(&self, topic: &str) -> PipelineResult<String> {
        let request = GenerationRequest::new(script_prompt(topic.trim()))
            .with_max_tokens(SCRIPT_MAX_TOKENS);
        let script = self
            .executor
            .execute_with_retry("generate_script", || self.writer.generate(&request))
            .await?;
        Ok(script.trim().to_string())
    }

    /// Split a script after every `.` followed by whitespace. The period stays
    /// with its sentence and blank pieces are dropped.
    pub fn split_sentences(&self, script: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;
        for boundary in self.sentence_boundary.find_iter(script) {
            sentences.push(&script[start..boundary.start() + 1]);
            start = boundary.end();
        }
        sentences.push(&script[start..]);

        sentences
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Search keywords for a sentence. Cached by the trimmed sentence.
    pub async fn translate_keywords(&self, sentence: &str) -> PipelineResult<Vec<String>> {
        let key = CacheKey::text(sentence);
        self.keyword_cache
            .get_or_compute(&key, || async {
                self.request_keywords("translate_keywords", KEYWORDS_SYSTEM_PROMPT, sentence)
                    .await
            })
            .await
    }

    /// Broader keywords for a sentence whose own keywords found nothing.
    pub async fn alternative_keywords(&self, sentence: &str) -> PipelineResult<Vec<String>> {
        self.request_keywords(
            "alternative_keywords",
            ALTERNATIVE_KEYWORDS_SYSTEM_PROMPT,
            sentence,
        )
        .await
    }

    async fn request_keywords(
        &self,
        operation: &str,
        system: &str,
        sentence: &str,
    ) -> PipelineResult<Vec<String>> {
        let request = GenerationRequest::new(sentence.trim())
            .with_system(system)
            .with_max_tokens(KEYWORDS_MAX_TOKENS);
        let response = self
            .executor
            .execute_with_retry(operation, || self.keyword_model.generate(&request))
            .await?;
        Ok(parse_keywords(&response))
    }

    /// Find unused footage for `keywords`.
    ///
    /// Tries each of the first two keywords alone, then the longer keywords
    /// combined with `OR`, then generic fallback queries on a random page.
    /// The selected footage is marked used with the joined keywords as
    /// context. Only successful lookups are cached, and a cache hit returns
    /// the footage claimed by the first lookup, so sentences with identical
    /// keywords in one run share a clip.
    pub async fn search_media(
        &self,
        keywords: &[String],
        page: u32,
        format: VideoFormat,
    ) -> PipelineResult<MediaDescriptor> {
        let page = page.max(1);
        let mut fields: Vec<String> = keywords.to_vec();
        fields.push(page.to_string());
        fields.push(format.dimensions());
        let key = CacheKey::composite(&fields);

        self.search_cache
            .get_or_compute(&key, || self.search_strategies(keywords, page, format))
            .await
    }

    async fn search_strategies(
        &self,
        keywords: &[String],
        page: u32,
        format: VideoFormat,
    ) -> PipelineResult<MediaDescriptor> {
        let context = keywords.join(", ");

        for keyword in keywords.iter().take(PRIMARY_KEYWORDS) {
            debug!(query = %keyword, page, "Searching single keyword");
            if let Some(found) = self.find_usable(keyword, page, page, format, &context).await? {
                return Ok(found);
            }
        }

        let combined: Vec<&str> = keywords
            .iter()
            .map(String::as_str)
            .filter(|k| k.chars().count() > MIN_COMBINED_KEYWORD_LEN)
            .take(COMBINED_KEYWORDS)
            .collect();
        if !combined.is_empty() {
            let query = combined.join(" OR ");
            debug!(query = %query, page, "Searching combined keywords");
            if let Some(found) = self.find_usable(&query, page, page, format, &context).await? {
                return Ok(found);
            }
        }

        for query in FALLBACK_QUERIES {
            let search_page = rand::rng().random_range(1..=FALLBACK_MAX_PAGE);
            debug!(query, search_page, "Searching fallback query");
            if let Some(found) = self
                .find_usable(query, search_page, page, format, &context)
                .await?
            {
                return Ok(found);
            }
        }

        Err(PipelineError::no_usable_resource(format!(
            "no unused footage for '{}'",
            context
        )))
    }

    /// First usable, unclaimed candidate for one query.
    ///
    /// Failed queries count as empty unless the failure is an exhausted rate
    /// limit or a cancellation.
    async fn find_usable(
        &self,
        query: &str,
        search_page: u32,
        result_page: u32,
        format: VideoFormat,
        context: &str,
    ) -> PipelineResult<Option<MediaDescriptor>> {
        let search_query = SearchQuery::new(query, search_page, format.orientation());
        let candidates = match self
            .executor
            .execute_with_retry("media_search", || self.search.search(&search_query))
            .await
        {
            Ok(candidates) => candidates,
            Err(e) if e.is_cancelled() || matches!(e, PipelineError::RateLimitExceeded { .. }) => {
                return Err(e)
            }
            Err(e) => {
                warn!(query, "Footage search failed: {}", e);
                return Ok(None);
            }
        };

        for candidate in candidates {
            if !candidate.has_usable_duration() {
                continue;
            }
            let Some(descriptor) = candidate.to_descriptor(result_page) else {
                continue;
            };
            self.ensure_running()?;
            if self.registry.claim(&descriptor.id, context).await? {
                info!(query, resource_id = %descriptor.id, "Footage selected");
                return Ok(Some(descriptor));
            }
        }

        Ok(None)
    }

    /// Keywords and footage for one sentence, retrying once with alternative
    /// keywords. `None` when nothing usable was found.
    pub async fn plan_sentence(
        &self,
        index: usize,
        sentence: &str,
        format: VideoFormat,
    ) -> PipelineResult<Option<ContentUnit>> {
        let keywords = self.translate_keywords(sentence).await?;
        debug!(index, keywords = %keywords.join(", "), "Keywords extracted");

        let first_error = match self.search_media(&keywords, 1, format).await {
            Ok(media) => return Ok(Some(ContentUnit::new(index, sentence, keywords, media))),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => e,
        };
        warn!(index, "Footage search failed, trying alternative keywords: {}", first_error);

        let alternatives = match self.alternative_keywords(sentence).await {
            Ok(alternatives) => alternatives,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(index, "Alternative keywords failed: {}", e);
                return Ok(None);
            }
        };

        match self.search_media(&alternatives, 1, format).await {
            Ok(media) => Ok(Some(ContentUnit::new(index, sentence, alternatives, media))),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(index, "Alternative keyword search failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Script a topic and plan every sentence. Sentences without footage are
    /// skipped; an empty plan is not an error.
    pub async fn build_content_plan(
        &self,
        topic: &str,
        format: VideoFormat,
    ) -> PipelineResult<Vec<ContentUnit>> {
        self.ensure_running()?;
        let script = self.generate_script(topic).await?;
        let sentences = self.split_sentences(&script);
        info!(topic, sentences = sentences.len(), "Script generated");

        let mut plan = Vec::with_capacity(sentences.len());
        for (index, sentence) in sentences.iter().enumerate() {
            self.ensure_running()?;
            match self.plan_sentence(index, sentence, format).await? {
                Some(unit) => plan.push(unit),
                None => warn!(index, sentence = %sentence, "No footage found, skipping sentence"),
            }
        }

        info!(
            topic,
            units = plan.len(),
            skipped = sentences.len() - plan.len(),
            "Content plan ready"
        );
        Ok(plan)
    }
}
