//! Analysis job execution: plan, fan out one task per section, join, augment,
//! compile.
//!
//! The job state lives on this task's stack. Section tasks never touch it;
//! they hand their result back through the `JoinSet` and the loop below
//! merges it, so results need no lock. Cancellation comes from the event
//! consumer going away (or an explicit cancel) and aborts whatever is still
//! running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::events::{EventPublisher, JobEvent, TaskLog};
use super::types::{AnalysisJob, JobOptions, JobState, SectionResult};
use crate::core::analysis::{AnalyzerSettings, SectionAnalyzer};
use crate::core::config::Settings;
use crate::core::document::Document;
use crate::core::error::PlanningError;
use crate::core::llm::providers::OpenAiProvider;
use crate::core::llm::{LlmClient, LlmProvider};
use crate::core::plan::{CatalogPlanner, Planner};
use crate::core::report;
use crate::core::retrieval::RetrievalService;
use crate::core::store::Store;
use crate::core::websearch::{TavilySearch, WebSearchAugmenter};

pub struct AnalysisEngine {
    planner: Arc<dyn Planner>,
    analyzer: Arc<SectionAnalyzer>,
    augmenter: Option<Arc<WebSearchAugmenter>>,
    plan_timeout: Duration,
}

/// A running job as seen by its single consumer.
pub struct JobHandle {
    job_id: String,
    events: mpsc::UnboundedReceiver<JobEvent>,
    cancel: CancellationToken,
    task: JoinHandle<AnalysisJob>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Hands the event stream to a transport. Dropping the stream cancels
    /// the job.
    pub fn into_event_stream(self) -> UnboundedReceiverStream<JobEvent> {
        UnboundedReceiverStream::new(self.events)
    }

    /// Drops the event receiver the way a disconnecting transport would and
    /// returns the job task.
    #[cfg(test)]
    pub(crate) fn disconnect(self) -> JoinHandle<AnalysisJob> {
        drop(self.events);
        self.task
    }

    /// Drains remaining events and returns the final job state.
    pub async fn finish(mut self) -> Result<(AnalysisJob, Vec<JobEvent>)> {
        let mut rest = Vec::new();
        while let Some(event) = self.events.recv().await {
            rest.push(event);
        }
        let job = self.task.await?;
        Ok((job, rest))
    }
}

impl AnalysisEngine {
    pub fn new(
        planner: Arc<dyn Planner>,
        analyzer: Arc<SectionAnalyzer>,
        augmenter: Option<Arc<WebSearchAugmenter>>,
        plan_timeout: Duration,
    ) -> Self {
        Self {
            planner,
            analyzer,
            augmenter,
            plan_timeout,
        }
    }

    /// Wires the HTTP-backed collaborators described by `settings`.
    pub fn from_settings(settings: &Settings, store: Store) -> Self {
        if settings.llm.api_key.is_none() {
            warn!("No LLM API key configured; requests go out unauthenticated");
        }
        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(
            settings.llm.base_url.clone(),
            settings.llm.api_key.clone(),
        ));
        let llm = LlmClient::new(provider, settings.llm.model.clone())
            .with_timeout(settings.llm.timeout())
            .with_temperature(settings.llm.temperature)
            .with_schema_retries(settings.llm.schema_retries);

        let retrieval = Arc::new(RetrievalService::from_settings(settings, store));
        let analyzer = Arc::new(SectionAnalyzer::new(
            llm.clone(),
            retrieval,
            AnalyzerSettings::from(&settings.retrieval),
        ));

        let augmenter = match &settings.web_search.api_key {
            Some(key) if settings.web_search_enabled() => {
                let search = Arc::new(TavilySearch::new(
                    settings.web_search.base_url.clone(),
                    key.clone(),
                ));
                Some(Arc::new(WebSearchAugmenter::new(
                    llm,
                    search,
                    &settings.web_search,
                )))
            }
            _ => {
                info!("Web search augmentation disabled");
                None
            }
        };

        Self::new(
            Arc::new(CatalogPlanner::new(&settings.plan)),
            analyzer,
            augmenter,
            settings.plan.timeout(),
        )
    }

    pub fn start(self: &Arc<Self>, document: Document) -> JobHandle {
        self.start_with(document, JobOptions::default())
    }

    pub fn start_with(self: &Arc<Self>, document: Document, options: JobOptions) -> JobHandle {
        let job = AnalysisJob::new(document.id.clone());
        let job_id = job.job_id.clone();
        let (publisher, events) = EventPublisher::channel(&job_id);
        let cancel = publisher.cancellation();

        let done = CancellationToken::new();
        {
            let publisher = publisher.clone();
            let cancel = cancel.clone();
            let done = done.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = publisher.closed() => cancel.cancel(),
                    _ = cancel.cancelled() => {}
                    _ = done.cancelled() => {}
                }
            });
        }

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let job = engine.run(job, document, options, publisher).await;
            done.cancel();
            job
        });

        JobHandle {
            job_id,
            events,
            cancel,
            task,
        }
    }

    pub async fn run(
        &self,
        mut job: AnalysisJob,
        document: Document,
        options: JobOptions,
        publisher: EventPublisher,
    ) -> AnalysisJob {
        let cancel = publisher.cancellation();
        let analyzer = match options.strategy {
            Some(strategy) if strategy != self.analyzer.strategy() => {
                Arc::new(self.analyzer.with_strategy(strategy))
            }
            _ => Arc::clone(&self.analyzer),
        };
        info!(
            job_id = %job.job_id,
            document_id = %job.document_id,
            strategy = analyzer.strategy().as_str(),
            "Analysis job started"
        );

        job.advance(JobState::Planning);
        publisher.status(format!("Starting analysis of {}", document.title));
        publisher.status("Planning analysis sections");

        let planned = tokio::select! {
            biased;
            _ = cancel.cancelled() => return canceled(job),
            r = tokio::time::timeout(self.plan_timeout, self.planner.plan(&document)) => match r {
                Ok(plan) => plan,
                Err(_) => Err(PlanningError::Timeout { secs: self.plan_timeout.as_secs() }),
            },
        };
        let plan = match planned {
            Ok(plan) if !plan.is_empty() => plan,
            Ok(_) => {
                return failed(
                    job,
                    &publisher,
                    PlanningError::Planner("no sections planned".to_string()),
                );
            }
            Err(e) => return failed(job, &publisher, e),
        };

        let total = plan.len();
        job.set_plan(plan.clone());
        record(
            &mut job,
            &publisher,
            format!("Generated analysis plan with {} sections", total),
        );
        record(
            &mut job,
            &publisher,
            format!("Retrieval strategy: {}", analyzer.strategy()),
        );
        job.advance(JobState::Analyzing);
        publisher.status(format!("Analyzing {} sections", total));

        let document = Arc::new(document);
        let mut set = JoinSet::new();
        let mut names_by_task = HashMap::new();
        for spec in plan {
            let analyzer = Arc::clone(&analyzer);
            let document = Arc::clone(&document);
            let mut log = TaskLog::new(publisher.clone());
            let name = spec.name.clone();
            let handle = set.spawn(async move {
                let result = analyzer.analyze(&spec, &document, &mut log).await;
                (result, log.into_entries())
            });
            names_by_task.insert(handle.id(), name);
        }

        let mut completed = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    return canceled(job);
                }
                next = set.join_next() => next,
            };
            let Some(joined) = next else { break };
            let (result, entries) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    let name = names_by_task.get(&e.id()).cloned().unwrap_or_default();
                    warn!(job_id = %job.job_id, "Section task for {} aborted: {}", name, e);
                    (
                        SectionResult::degraded(&name, "analysis task aborted", Vec::new()),
                        Vec::new(),
                    )
                }
            };
            job.extend_logs(entries);
            let name = result.name.clone();
            let event = JobEvent::section(&result);
            if let Err(e) = job.merge(result) {
                warn!(job_id = %job.job_id, "Discarding section result: {}", e);
                continue;
            }
            completed += 1;
            publisher.publish(event);
            record(
                &mut job,
                &publisher,
                format!("Completed analysis for {} ({}/{})", name, completed, total),
            );
        }

        publisher.status("Section analysis complete");
        job.advance(JobState::Augmenting);

        let web = match &self.augmenter {
            None => {
                job.push_log("Web search disabled");
                None
            }
            Some(augmenter) => {
                publisher.status("Searching the web for market context");
                let sections: Vec<SectionResult> = job
                    .plan()
                    .iter()
                    .filter_map(|s| job.results().get(&s.name).cloned())
                    .collect();
                let mut log = TaskLog::new(publisher.clone());
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return canceled(job),
                    w = augmenter.augment(&document, &sections, &mut log) => w,
                };
                job.extend_logs(log.into_entries());
                outcome
            }
        };

        job.advance(JobState::Compiling);
        publisher.status("Compiling final report");
        let report = report::compile(&document.title, job.plan(), job.results(), web.as_ref());
        let aggregate = report.aggregate_score;
        let event = JobEvent::final_report(&report);
        job.set_report(report);
        job.advance(JobState::Completed);
        publisher.publish(event);

        info!(
            job_id = %job.job_id,
            sections = total,
            aggregate_score = aggregate,
            log_entries = job.logs().len(),
            "Analysis job completed"
        );
        job
    }
}

fn record(job: &mut AnalysisJob, publisher: &EventPublisher, message: String) {
    info!(job_id = %job.job_id, "{}", message);
    publisher.log(message.clone());
    job.push_log(message);
}

fn failed(mut job: AnalysisJob, publisher: &EventPublisher, err: PlanningError) -> AnalysisJob {
    warn!(job_id = %job.job_id, "Planning failed: {}", err);
    let message = format!("Analysis failed: {}", err);
    job.fail(message.clone());
    publisher.publish(JobEvent::error(message));
    job
}

fn canceled(mut job: AnalysisJob) -> AnalysisJob {
    info!(job_id = %job.job_id, state = job.state().as_str(), "Analysis job canceled");
    job.cancel();
    job
}
