//! Operator review of a content plan.

use async_trait::async_trait;
use tracing::{info, warn};
use vshort_models::{ContentUnit, VideoFormat};

use crate::content::ContentService;
use crate::error::{PipelineError, PipelineResult};

/// What the operator wants done with one content unit.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    Approve,
    /// Replace the narration and redo keywords and footage
    EditSentence(String),
    /// Replace the keywords and redo footage
    EditKeywords(Vec<String>),
    /// Look for footage on the next search page
    Research,
    Skip,
    Cancel,
}

/// Source of review decisions, usually the console.
#[async_trait]
pub trait ReviewSource: Send {
    async fn decide(&mut self, unit: &ContentUnit) -> PipelineResult<ReviewDecision>;

    /// Asked after an edit failed. `false` aborts the review.
    async fn continue_after_error(&mut self, error: &PipelineError) -> PipelineResult<bool>;

    /// Final go/no-go on the approved units.
    async fn confirm_plan(&mut self, plan: &[ContentUnit]) -> PipelineResult<bool>;
}

/// Walk the plan unit by unit until each is approved or skipped.
///
/// Edits re-present the same unit. A failed edit drops the unit if the
/// operator chooses to continue. Declining to continue, cancelling, or
/// rejecting the final confirmation ends with [`PipelineError::Cancelled`].
pub async fn review_plan(
    content: &ContentService,
    source: &mut dyn ReviewSource,
    plan: Vec<ContentUnit>,
    format: VideoFormat,
) -> PipelineResult<Vec<ContentUnit>> {
    let total = plan.len();
    let mut reviewed = Vec::with_capacity(total);

    for mut unit in plan {
        loop {
            match source.decide(&unit).await? {
                ReviewDecision::Approve => {
                    info!(index = unit.index, "Unit approved");
                    reviewed.push(unit);
                    break;
                }
                ReviewDecision::Skip => {
                    info!(index = unit.index, "Unit skipped");
                    break;
                }
                ReviewDecision::Cancel => return Err(PipelineError::Cancelled),
                edit => match apply_edit(content, &mut unit, edit, format).await {
                    Ok(()) => continue,
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        warn!(index = unit.index, "Edit failed: {}", e);
                        if !source.continue_after_error(&e).await? {
                            return Err(PipelineError::Cancelled);
                        }
                        break;
                    }
                },
            }
        }
    }

    if reviewed.is_empty() {
        return Err(PipelineError::no_usable_resource("no content was approved"));
    }

    info!(approved = reviewed.len(), total, "Review finished");
    if !source.confirm_plan(&reviewed).await? {
        return Err(PipelineError::Cancelled);
    }
    Ok(reviewed)
}

/// The unit is only updated when the whole edit succeeds.
async fn apply_edit(
    content: &ContentService,
    unit: &mut ContentUnit,
    edit: ReviewDecision,
    format: VideoFormat,
) -> PipelineResult<()> {
    match edit {
        ReviewDecision::EditSentence(sentence) => {
            let keywords = content.translate_keywords(&sentence).await?;
            let media = content.search_media(&keywords, 1, format).await?;
            unit.sentence = sentence.trim().to_string();
            unit.keywords = keywords;
            unit.media = media;
        }
        ReviewDecision::EditKeywords(keywords) => {
            let media = content.search_media(&keywords, 1, format).await?;
            unit.keywords = keywords;
            unit.media = media;
        }
        ReviewDecision::Research => {
            unit.media = content
                .search_media(&unit.keywords, unit.media.page + 1, format)
                .await?;
        }
        ReviewDecision::Approve | ReviewDecision::Skip | ReviewDecision::Cancel => {}
    }
    Ok(())
}

/// Unattended review: keep every unit that has a footage URL.
pub fn auto_review(plan: Vec<ContentUnit>) -> PipelineResult<Vec<ContentUnit>> {
    let total = plan.len();
    let reviewed: Vec<ContentUnit> = plan
        .into_iter()
        .filter(|unit| !unit.media.source_url.trim().is_empty())
        .collect();

    info!(approved = reviewed.len(), total, "Automatic review finished");
    if reviewed.is_empty() {
        return Err(PipelineError::no_usable_resource(
            "no content left after automatic review",
        ));
    }
    Ok(reviewed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use vshort_models::{MediaCandidate, MediaDescriptor, MediaFileVariant};

    use crate::providers::{GenerationProvider, GenerationRequest, SearchProvider, SearchQuery};
    use crate::registry::UsedResourceRegistry;
    use crate::retry::{RateLimitedExecutor, RetryPolicy};

    struct EchoKeywords;

    #[async_trait]
    impl GenerationProvider for EchoKeywords {
        async fn generate(&self, request: &GenerationRequest) -> PipelineResult<String> {
            Ok(request.prompt.trim_end_matches('.').to_lowercase())
        }
    }

    /// Results keyed by `query@page`.
    struct PagedSearch(HashMap<String, Vec<MediaCandidate>>);

    #[async_trait]
    impl SearchProvider for PagedSearch {
        async fn search(&self, query: &SearchQuery) -> PipelineResult<Vec<MediaCandidate>> {
            let key = format!("{}@{}", query.query, query.page);
            Ok(self.0.get(&key).cloned().unwrap_or_default())
        }
    }

    struct Scripted {
        decisions: VecDeque<ReviewDecision>,
        continue_answer: bool,
        confirm_answer: bool,
        errors_seen: usize,
    }

    impl Scripted {
        fn new(decisions: Vec<ReviewDecision>) -> Self {
            Self {
                decisions: decisions.into(),
                continue_answer: true,
                confirm_answer: true,
                errors_seen: 0,
            }
        }
    }

    #[async_trait]
    impl ReviewSource for Scripted {
        async fn decide(&mut self, _unit: &ContentUnit) -> PipelineResult<ReviewDecision> {
            Ok(self.decisions.pop_front().unwrap_or(ReviewDecision::Approve))
        }

        async fn continue_after_error(&mut self, _error: &PipelineError) -> PipelineResult<bool> {
            self.errors_seen += 1;
            Ok(self.continue_answer)
        }

        async fn confirm_plan(&mut self, _plan: &[ContentUnit]) -> PipelineResult<bool> {
            Ok(self.confirm_answer)
        }
    }

    fn candidate(id: &str) -> MediaCandidate {
        MediaCandidate {
            id: id.to_string(),
            duration_secs: 6.0,
            width: 1920,
            height: 1080,
            image: None,
            files: vec![MediaFileVariant {
                link: format!("https://cdn/{}.mp4", id),
                width: Some(1920),
                height: Some(1080),
                file_type: "video/mp4".to_string(),
            }],
            author: None,
        }
    }

    fn service(results: &[(&str, &str)], dir: &tempfile::TempDir) -> ContentService {
        let results = results
            .iter()
            .map(|(key, id)| (key.to_string(), vec![candidate(id)]))
            .collect();
        ContentService::new(
            Arc::new(EchoKeywords),
            Arc::new(EchoKeywords),
            Arc::new(PagedSearch(results)),
            Arc::new(UsedResourceRegistry::new(dir.path().join("used.json"))),
            RateLimitedExecutor::new(RetryPolicy::default().with_max_attempts(1)),
        )
        .unwrap()
    }

    fn unit(index: usize, sentence: &str, keyword: &str) -> ContentUnit {
        ContentUnit::new(
            index,
            sentence,
            vec![keyword.to_string()],
            MediaDescriptor {
                id: format!("orig-{}", index),
                source_url: format!("https://cdn/orig-{}.mp4", index),
                thumbnail_url: None,
                duration_secs: 5.0,
                width: 1920,
                height: 1080,
                page: 1,
                attribution: None,
            },
        )
    }

    #[tokio::test]
    async fn test_approve_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        let content = service(&[], &dir);
        let mut source = Scripted::new(vec![ReviewDecision::Approve, ReviewDecision::Skip]);

        let reviewed = review_plan(
            &content,
            &mut source,
            vec![unit(0, "A.", "a"), unit(1, "B.", "b")],
            VideoFormat::LANDSCAPE,
        )
        .await
        .unwrap();
        assert_eq!(reviewed.len(), 1);
        assert_eq!(reviewed[0].index, 0);
    }

    #[tokio::test]
    async fn test_edits_re_present_unit() {
        let dir = tempfile::tempdir().unwrap();
        let content = service(&[("waves@1", "w1"), ("surf@1", "s1"), ("surf@2", "s2")], &dir);
        let mut source = Scripted::new(vec![
            ReviewDecision::EditSentence("Waves.".to_string()),
            ReviewDecision::EditKeywords(vec!["surf".to_string()]),
            ReviewDecision::Research,
            ReviewDecision::Approve,
        ]);

        let reviewed = review_plan(
            &content,
            &mut source,
            vec![unit(0, "Original.", "orig")],
            VideoFormat::LANDSCAPE,
        )
        .await
        .unwrap();

        let edited = &reviewed[0];
        assert_eq!(edited.sentence, "Waves.");
        assert_eq!(edited.keywords, vec!["surf".to_string()]);
        assert_eq!(edited.media.id, "s2");
        assert_eq!(edited.media.page, 2);
    }

    #[tokio::test]
    async fn test_failed_edit_can_continue() {
        let dir = tempfile::tempdir().unwrap();
        let content = service(&[], &dir);
        let mut source = Scripted::new(vec![
            ReviewDecision::EditKeywords(vec!["nothing".to_string()]),
            ReviewDecision::Approve,
        ]);

        let reviewed = review_plan(
            &content,
            &mut source,
            vec![unit(0, "A.", "a"), unit(1, "B.", "b")],
            VideoFormat::LANDSCAPE,
        )
        .await
        .unwrap();

        assert_eq!(source.errors_seen, 1);
        assert_eq!(reviewed.len(), 1);
        assert_eq!(reviewed[0].index, 1);
    }

    #[tokio::test]
    async fn test_failed_edit_can_abort() {
        let dir = tempfile::tempdir().unwrap();
        let content = service(&[], &dir);
        let mut source = Scripted::new(vec![ReviewDecision::Research]);
        source.continue_answer = false;

        let err = review_plan(
            &content,
            &mut source,
            vec![unit(0, "A.", "a")],
            VideoFormat::LANDSCAPE,
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_and_rejected_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let content = service(&[], &dir);

        let mut cancelling = Scripted::new(vec![ReviewDecision::Cancel]);
        let err = review_plan(
            &content,
            &mut cancelling,
            vec![unit(0, "A.", "a")],
            VideoFormat::LANDSCAPE,
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());

        let mut rejecting = Scripted::new(vec![]);
        rejecting.confirm_answer = false;
        let err = review_plan(
            &content,
            &mut rejecting,
            vec![unit(0, "A.", "a")],
            VideoFormat::LANDSCAPE,
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_nothing_approved() {
        let dir = tempfile::tempdir().unwrap();
        let content = service(&[], &dir);
        let mut source = Scripted::new(vec![ReviewDecision::Skip]);

        let err = review_plan(
            &content,
            &mut source,
            vec![unit(0, "A.", "a")],
            VideoFormat::LANDSCAPE,
        )
        .await
        .unwrap_err();
        assert!(err.is_no_usable_resource());
    }

    #[test]
    fn test_auto_review() {
        let mut missing = unit(1, "B.", "b");
        missing.media.source_url = String::new();

        let reviewed = auto_review(vec![unit(0, "A.", "a"), missing]).unwrap();
        assert_eq!(reviewed.len(), 1);

        let mut empty = unit(2, "C.", "c");
        empty.media.source_url = " ".to_string();
        assert!(auto_review(vec![empty]).unwrap_err().is_no_usable_resource());
    }
}
