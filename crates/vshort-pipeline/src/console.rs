//! Interactive console prompts.

use async_trait::async_trait;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use vshort_models::{ContentUnit, VideoFormat};

use crate::error::{PipelineError, PipelineResult};
use crate::review::{ReviewDecision, ReviewSource};
use crate::stages::RunMode;

/// Where the topics of a run come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSource {
    /// Ask for suggestions on a seed keyword
    Suggest(String),
    Direct(String),
}

/// Line-oriented operator console. `0` or end of input cancels a choice.
pub struct Console<R, W> {
    lines: Lines<R>,
    out: W,
}

impl Console<BufReader<Stdin>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, out: W) -> Self {
        Self {
            lines: input.lines(),
            out,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    async fn say(&mut self, text: &str) -> PipelineResult<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }

    /// One trimmed line; end of input is a cancellation.
    async fn ask(&mut self, prompt: &str) -> PipelineResult<String> {
        self.out.write_all(prompt.as_bytes()).await?;
        self.out.flush().await?;
        match self.lines.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(PipelineError::Cancelled),
        }
    }

    /// Zero-based index of the chosen option.
    async fn choose(&mut self, title: &str, options: &[&str]) -> PipelineResult<usize> {
        self.say(&format!("\n{}", title)).await?;
        for (i, option) in options.iter().enumerate() {
            self.say(&format!("  [{}] {}", i + 1, option)).await?;
        }
        self.say("  [0] Cancel").await?;

        loop {
            let answer = self.ask("> ").await?;
            match answer.parse::<usize>() {
                Ok(0) => return Err(PipelineError::Cancelled),
                Ok(n) if n <= options.len() => return Ok(n - 1),
                _ => self.say(&format!("Enter a number from 0 to {}", options.len())).await?,
            }
        }
    }

    /// Yes/no question. End of input counts as no.
    pub async fn confirm(&mut self, question: &str) -> PipelineResult<bool> {
        loop {
            let answer = match self.ask(&format!("{} [y/n]: ", question)).await {
                Ok(answer) => answer.to_lowercase(),
                Err(PipelineError::Cancelled) => return Ok(false),
                Err(e) => return Err(e),
            };
            match answer.as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("Please answer y or n").await?,
            }
        }
    }

    pub async fn select_format(&mut self) -> PipelineResult<VideoFormat> {
        let choice = self
            .choose("Select the video format", &["Vertical (Shorts)", "Horizontal"])
            .await?;
        Ok(if choice == 0 {
            VideoFormat::SHORTS
        } else {
            VideoFormat::LANDSCAPE
        })
    }

    pub async fn select_mode(&mut self) -> PipelineResult<RunMode> {
        let choice = self
            .choose("Select the run mode", &["Manual", "Automatic", "Fully automatic"])
            .await?;
        Ok(match choice {
            0 => RunMode::Manual,
            1 => RunMode::Auto,
            _ => RunMode::FullAuto,
        })
    }

    /// Ask for a seed keyword or a topic. Blank input cancels.
    pub async fn select_topic_source(&mut self) -> PipelineResult<TopicSource> {
        let choice = self
            .choose(
                "How should topics be chosen?",
                &["Suggest topics from a keyword", "Enter a topic"],
            )
            .await?;
        if choice == 0 {
            let keyword = self.ask("Keyword: ").await?;
            if keyword.is_empty() {
                return Err(PipelineError::Cancelled);
            }
            Ok(TopicSource::Suggest(keyword))
        } else {
            let topic = self.ask("Topic: ").await?;
            if topic.is_empty() {
                return Err(PipelineError::Cancelled);
            }
            Ok(TopicSource::Direct(topic))
        }
    }

    pub async fn show_topics(&mut self, topics: &[String]) -> PipelineResult<()> {
        self.say("\nSuggested topics:").await?;
        for (i, topic) in topics.iter().enumerate() {
            self.say(&format!("  {}. {}", i + 1, topic)).await?;
        }
        Ok(())
    }

    /// Pick one topic when there is a choice to make.
    pub async fn select_topic(&mut self, topics: Vec<String>) -> PipelineResult<String> {
        if topics.len() == 1 {
            return topics
                .into_iter()
                .next()
                .ok_or_else(|| PipelineError::no_usable_resource("no topics"));
        }
        let options: Vec<&str> = topics.iter().map(String::as_str).collect();
        let choice = self.choose("Select a topic", &options).await?;
        Ok(topics[choice].clone())
    }
}

#[async_trait]
impl<R, W> ReviewSource for Console<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn decide(&mut self, unit: &ContentUnit) -> PipelineResult<ReviewDecision> {
        self.say(&format!("\n[Sentence {}]", unit.index + 1)).await?;
        self.say(&format!("  Narration: {}", unit.sentence)).await?;
        self.say(&format!("  Keywords:  {}", unit.keywords_label())).await?;
        self.say(&format!("  Footage:   {}", unit.media.source_url)).await?;

        let choice = self
            .choose(
                "What should happen with this sentence?",
                &[
                    "Approve",
                    "Edit the sentence",
                    "Edit the keywords",
                    "Search for other footage",
                    "Skip this sentence",
                ],
            )
            .await;

        Ok(match choice {
            Ok(0) => ReviewDecision::Approve,
            Ok(1) => ReviewDecision::EditSentence(self.ask("New sentence: ").await?),
            Ok(2) => {
                let raw = self.ask("New keywords (comma separated): ").await?;
                ReviewDecision::EditKeywords(crate::content::parse_keywords(&raw))
            }
            Ok(3) => ReviewDecision::Research,
            Ok(_) => ReviewDecision::Skip,
            Err(PipelineError::Cancelled) => ReviewDecision::Cancel,
            Err(e) => return Err(e),
        })
    }

    async fn continue_after_error(&mut self, error: &PipelineError) -> PipelineResult<bool> {
        self.say(&format!("Error: {}", error)).await?;
        self.confirm("Continue reviewing?").await
    }

    async fn confirm_plan(&mut self, plan: &[ContentUnit]) -> PipelineResult<bool> {
        self.say("\nFinal content:").await?;
        for (i, unit) in plan.iter().enumerate() {
            self.say(&format!("  [{}] {}", i + 1, unit.sentence)).await?;
        }
        self.confirm("Produce the video with this content?").await
    }
}
