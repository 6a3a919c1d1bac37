//! Investigation orchestration: submit an external research job, poll it to a
//! terminal state, and post a reply composed from its findings.

use chrono::{DateTime, Utc};
use social_agent_types::{
    Action, InvestigationFindings, InvestigationInput, InvestigationJob, JobSpec, JobStatus,
    PostedMessage, ReplyChunk, ScrapedArticle,
};
use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::{
    Clock, GenerationContext, InvestigationLog, Scraper, TaskDispatcher, TextGenerator,
};
use crate::config::InvestigationConfig;
use crate::media::first_article_url;
use crate::reply::ReplyDispatcher;

pub const JOB_KIND: &str = "investigation";

/// A completed investigation and the reply it produced
#[derive(Debug, Clone, PartialEq)]
pub struct InvestigationResult {
    pub job_id: String,
    pub findings: InvestigationFindings,
    pub chunks: Vec<ReplyChunk>,
}

pub struct Investigator {
    dispatcher: Arc<dyn TaskDispatcher>,
    scraper: Option<Arc<dyn Scraper>>,
    generator: Arc<dyn TextGenerator>,
    reply: Arc<ReplyDispatcher>,
    log: Arc<dyn InvestigationLog>,
    clock: Arc<dyn Clock>,
    config: InvestigationConfig,
}

impl Investigator {
    pub fn new(
        dispatcher: Arc<dyn TaskDispatcher>,
        generator: Arc<dyn TextGenerator>,
        reply: Arc<ReplyDispatcher>,
        log: Arc<dyn InvestigationLog>,
        clock: Arc<dyn Clock>,
        mut config: InvestigationConfig,
    ) -> Self {
        config.max_attempts = config.max_attempts.max(1);
        Self {
            dispatcher,
            scraper: None,
            generator,
            reply,
            log,
            clock,
            config,
        }
    }

    pub fn with_scraper(mut self, scraper: Arc<dyn Scraper>) -> Self {
        self.scraper = Some(scraper);
        self
    }

    /// Run one investigation for the post in `context`.
    ///
    /// Returns `None` on any failure: submission error, timeout, failed or empty
    /// job, or a reply that could not be posted. Failures are logged, never raised.
    pub async fn investigate(
        &self,
        context: &GenerationContext,
        room_id: &str,
    ) -> Option<InvestigationResult> {
        let post = &context.post;
        log::info!("[INVESTIGATION] Starting for post {}", post.id);

        let article = self.scrape_article(context).await;
        let input = InvestigationInput {
            thread: context.thread.clone(),
            article: article.clone(),
            post: post.clone(),
        };

        let job = self.run_job(input).await?;
        let findings = job.result.clone()?;
        if findings.conversation_entry.trim().is_empty() && findings.reply_text.trim().is_empty() {
            log::warn!("[INVESTIGATION] Job {} completed with an empty result", job.id);
            return None;
        }

        let (text, action) = self.compose_reply(context, article, &findings).await?;

        let chunks = match self.reply.post(&text, &post.id, action, room_id).await {
            Ok(chunks) => chunks,
            Err(e) => {
                log::error!("[INVESTIGATION] Reply for job {} failed: {}", job.id, e);
                self.link(&job.id, &post.id, &e.posted).await;
                return None;
            }
        };

        self.link(&job.id, &post.id, &chunks).await;

        log::info!(
            "[INVESTIGATION] Job {} answered post {} with {} chunk(s)",
            job.id,
            post.id,
            chunks.len()
        );

        Some(InvestigationResult {
            job_id: job.id,
            findings,
            chunks,
        })
    }

    async fn scrape_article(&self, context: &GenerationContext) -> Option<ScrapedArticle> {
        if let Some(article) = &context.article {
            return Some(article.clone());
        }
        let scraper = self.scraper.as_ref()?;
        let url = first_article_url(&context.post, &context.thread)?;

        match scraper.scrape(&url).await {
            Ok(article) => {
                log::debug!("[INVESTIGATION] Scraped {} ({})", url, article.title);
                Some(article)
            }
            Err(e) => {
                log::warn!("[INVESTIGATION] Scrape of {} failed, continuing without it: {}", url, e);
                None
            }
        }
    }

    /// Submit and poll until the job completes, fails for good, or the deadline passes.
    ///
    /// Submissions are bounded by `max_attempts`; a failed job or a submit error
    /// is resubmitted only while attempts and time remain. A timeout is final.
    async fn run_job(&self, input: InvestigationInput) -> Option<InvestigationJob> {
        let started = self.clock.now();
        let deadline = started + chrono::Duration::milliseconds(self.config.max_duration_ms as i64);
        let spec = JobSpec {
            kind: JOB_KIND.to_string(),
            input,
            poll_interval_ms: self.config.poll_interval_ms,
            max_attempts: self.config.max_attempts,
            max_duration_ms: self.config.max_duration_ms,
        };

        for attempt in 1..=self.config.max_attempts {
            let job_id = match self.dispatcher.submit(&spec).await {
                Ok(id) => id,
                Err(e) => {
                    log::warn!(
                        "[INVESTIGATION] Submit attempt {}/{} failed: {}",
                        attempt,
                        self.config.max_attempts,
                        e
                    );
                    if self.clock.now() >= deadline {
                        break;
                    }
                    continue;
                }
            };

            log::info!("[INVESTIGATION] Submitted job {} (attempt {})", job_id, attempt);
            let mut job = InvestigationJob::new(job_id, spec.input.clone(), self.clock.now());
            self.await_job(&mut job, started, deadline).await;

            match job.status {
                JobStatus::Completed => return Some(job),
                JobStatus::Failed => {
                    log::warn!(
                        "[INVESTIGATION] Job {} failed: {}",
                        job.id,
                        job.error.as_deref().unwrap_or("unknown error")
                    );
                    if self.clock.now() >= deadline {
                        break;
                    }
                }
                _ => {
                    log::warn!(
                        "[INVESTIGATION] Job {} abandoned: {}",
                        job.id,
                        job.error.as_deref().unwrap_or("timed out")
                    );
                    return None;
                }
            }
        }

        None
    }

    /// Poll one job at the configured interval. Poll errors are logged and retried.
    async fn await_job(&self, job: &mut InvestigationJob, started: DateTime<Utc>, deadline: DateTime<Utc>) {
        let interval = chrono::Duration::milliseconds(self.config.poll_interval_ms as i64);

        loop {
            match self.dispatcher.poll(&job.id).await {
                Ok(poll) => match poll.status {
                    JobStatus::Completed => {
                        match poll.result {
                            Some(findings) => job.mark_completed(findings, self.clock.now()),
                            None => job.mark_failed(
                                "Job completed without a result".to_string(),
                                self.clock.now(),
                            ),
                        }
                        return;
                    }
                    JobStatus::Failed => {
                        job.mark_failed(
                            poll.error.unwrap_or_else(|| "Job failed".to_string()),
                            self.clock.now(),
                        );
                        return;
                    }
                    JobStatus::TimedOut => {
                        let now = self.clock.now();
                        job.mark_timed_out(waited_ms(started, now), now);
                        return;
                    }
                    JobStatus::Running => {
                        if job.status != JobStatus::Running {
                            log::debug!("[INVESTIGATION] Job {} is running", job.id);
                        }
                        job.mark_running();
                    }
                    JobStatus::Pending => {}
                },
                Err(e) => {
                    log::warn!("[INVESTIGATION] Poll of job {} failed: {}", job.id, e);
                }
            }

            let now = self.clock.now();
            if now >= deadline {
                job.mark_timed_out(waited_ms(started, now), now);
                return;
            }

            let remaining = deadline - now;
            let wait = if remaining < interval { remaining } else { interval };
            self.clock
                .sleep(wait.to_std().unwrap_or(Duration::ZERO))
                .await;
        }
    }

    /// Generate the final reply with the findings as primary context.
    /// Falls back to the job's own reply text when generation fails or is empty.
    async fn compose_reply(
        &self,
        context: &GenerationContext,
        article: Option<ScrapedArticle>,
        findings: &InvestigationFindings,
    ) -> Option<(String, Option<Action>)> {
        let mut context = context.clone();
        context.article = article;
        context.primary_context = Some(findings.conversation_entry.clone());

        match self.generator.generate(&context).await {
            Ok(reply) if !reply.text.trim().is_empty() => {
                let action = reply.action.filter(|a| *a != Action::Investigate);
                return Some((reply.text, action));
            }
            Ok(_) => {
                log::warn!("[INVESTIGATION] Generation returned no text, using job reply");
            }
            Err(e) => {
                log::warn!("[INVESTIGATION] Generation failed, using job reply: {}", e);
            }
        }

        if findings.reply_text.trim().is_empty() {
            log::warn!("[INVESTIGATION] No reply text available for post {}", context.post.id);
            None
        } else {
            Some((findings.reply_text.clone(), None))
        }
    }

    /// Record job -> first posted chunk; nothing is linked before a post succeeds
    async fn link(&self, job_id: &str, post_id: &str, chunks: &[ReplyChunk]) {
        let Some(first) = chunks.first() else {
            return;
        };
        let (Some(id), Some(url)) = (first.message_id.clone(), first.url.clone()) else {
            return;
        };
        let message = PostedMessage { id, url };
        if let Err(e) = self.log.link_reply(job_id, post_id, &message).await {
            log::error!("[INVESTIGATION] {}", e);
        }
    }
}

fn waited_ms(started: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - started).num_milliseconds().max(0) as u64
}
