// src/pipeline/plan.rs

//! Turn a validated configuration into recurring jobs.
//!
//! Each enabled technology scope is classified; isolated sources become one
//! recurring job each on their own interval, and the dependency-linked set
//! becomes a single recurring group job. A cyclic scope is logged and
//! skipped entirely. Job failures are caught at the job boundary so the
//! host tick loop survives them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{Config, SourceConfig, TechnologyConfig};
use crate::pipeline::classify::classify;
use crate::pipeline::group::run_linked_group;
use crate::pipeline::process::{SourceContext, run_isolated_source};
use crate::pipeline::topo::topo_sort;
use crate::schedule::Scheduler;
use crate::services::Fetcher;
use crate::sink::RecordSink;
use crate::utils::time::{resolve_query, warn_on_expiry};

/// Fallback interval for a linked group whose members declare none.
const DEFAULT_GROUP_INTERVAL: u64 = 300;

/// What one recurring job will do.
#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    /// Poll a single isolated source
    Isolated { source: String },

    /// Execute one dependency-linked group in topological order
    LinkedGroup { order: Vec<String> },
}

/// One planned recurring job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    pub entity: String,
    pub technology: String,
    pub interval: u64,
    pub kind: JobKind,
}

impl JobPlan {
    /// Display name used for logging and the `plan` subcommand.
    pub fn name(&self) -> String {
        match &self.kind {
            JobKind::Isolated { source } => {
                format!("{}.{}.{}", self.entity, self.technology, source)
            }
            JobKind::LinkedGroup { order } => format!(
                "{}.{} group [{}]",
                self.entity,
                self.technology,
                order.join(" -> ")
            ),
        }
    }
}

/// Plan the recurring jobs for every enabled scope.
///
/// Scope-local failures (malformed extract paths, cycles) are logged and
/// skip that scope only; other scopes are unaffected.
pub fn plan_jobs(config: &Config) -> Vec<JobPlan> {
    let mut plans = Vec::new();

    for (entity_name, entity) in &config.entities {
        log::info!("Processing entity: {entity_name}");

        for (tech_name, tech) in &entity.technologies {
            let scope = format!("{entity_name}.{tech_name}");
            if !tech.enabled {
                log::info!("Technology disabled: {scope}");
                continue;
            }
            log::info!("Processing technology: {scope}");
            warn_on_expiry(&scope, tech.token_expires);

            match plan_scope(entity_name, tech_name, tech) {
                Ok(mut scope_plans) => plans.append(&mut scope_plans),
                Err(error) => {
                    log::error!("Skipping technology {scope}: {error}");
                }
            }
        }
    }
    plans
}

fn plan_scope(
    entity_name: &str,
    tech_name: &str,
    tech: &TechnologyConfig,
) -> Result<Vec<JobPlan>> {
    for (name, source) in &tech.sources {
        if !source.enabled {
            log::info!("Source disabled: {entity_name}.{tech_name}.{name}");
        }
    }

    let classification = classify(&tech.sources)?;
    let mut plans = Vec::new();

    // Order the linked set first: a cyclic scope schedules nothing at all.
    let order = if classification.linked.is_empty() {
        Vec::new()
    } else {
        topo_sort(&classification.linked, &classification.edges)?
    };

    for name in &classification.isolated {
        let source = &tech.sources[name];
        let interval = source.interval.ok_or_else(|| {
            AppError::validation(format!("isolated source '{name}' has no interval"))
        })?;
        plans.push(JobPlan {
            entity: entity_name.to_string(),
            technology: tech_name.to_string(),
            interval,
            kind: JobKind::Isolated {
                source: name.clone(),
            },
        });
    }

    if !order.is_empty() {
        let interval = order
            .iter()
            .filter_map(|name| tech.sources[name].interval)
            .min()
            .unwrap_or(DEFAULT_GROUP_INTERVAL);
        plans.push(JobPlan {
            entity: entity_name.to_string(),
            technology: tech_name.to_string(),
            interval,
            kind: JobKind::LinkedGroup { order },
        });
    }

    Ok(plans)
}

/// Shared state captured by one job callback.
struct JobEnv {
    entity: String,
    technology: String,
    tech: TechnologyConfig,
    fetcher: Fetcher,
    sink: Arc<dyn RecordSink>,
}

impl JobEnv {
    fn context(&self) -> SourceContext<'_> {
        SourceContext {
            entity: &self.entity,
            technology: &self.technology,
            tech: &self.tech,
            fetcher: &self.fetcher,
            sink: self.sink.as_ref(),
        }
    }
}

struct IsolatedJob {
    env: JobEnv,
    source_name: String,
    source: SourceConfig,
    query: Vec<(String, String)>,
}

impl IsolatedJob {
    async fn run(&self) {
        let scope = format!("{}.{}", self.env.entity, self.env.technology);
        warn_on_expiry(&scope, self.env.tech.token_expires);

        let ctx = self.env.context();
        if let Err(error) =
            run_isolated_source(&ctx, &self.source_name, &self.source, &self.query).await
        {
            log::error!("Job {} failed: {error}", ctx.qualified(&self.source_name));
        }
    }
}

struct GroupJob {
    env: JobEnv,
    sources: BTreeMap<String, SourceConfig>,
    queries: BTreeMap<String, Vec<(String, String)>>,
}

impl GroupJob {
    /// One group pass. The dependency graph is rebuilt from the (immutable)
    /// configuration each pass; the result store lives and dies with the
    /// pass.
    async fn run(&self) {
        let scope = format!("{}.{}", self.env.entity, self.env.technology);
        warn_on_expiry(&scope, self.env.tech.token_expires);

        let order = match classify(&self.sources).and_then(|c| {
            topo_sort(&c.linked, &c.edges)
        }) {
            Ok(order) => order,
            Err(error) => {
                log::error!("Skipping group pass for {scope}: {error}");
                return;
            }
        };

        let ctx = self.env.context();
        match run_linked_group(&ctx, &order, &self.sources, &self.queries).await {
            Ok(store) => {
                log::debug!(
                    "Group pass for {scope} completed with {} stored results",
                    store.len()
                );
            }
            Err(error) => {
                log::error!("Group pass for {scope} failed: {error}");
            }
        }
    }
}

/// Register all planned jobs on the scheduler.
///
/// Relative-time query parameters are resolved here, at schedule time.
pub fn register_jobs(
    scheduler: &mut Scheduler,
    config: &Config,
    fetcher: &Fetcher,
    sink: &Arc<dyn RecordSink>,
) -> Vec<JobPlan> {
    let plans = plan_jobs(config);

    for plan in &plans {
        let tech = &config.entities[&plan.entity].technologies[&plan.technology];
        let env = JobEnv {
            entity: plan.entity.clone(),
            technology: plan.technology.clone(),
            tech: tech.clone(),
            fetcher: fetcher.clone(),
            sink: Arc::clone(sink),
        };
        let interval = Duration::from_secs(plan.interval);

        match &plan.kind {
            JobKind::Isolated { source } => {
                let source_config = tech.sources[source].clone();
                let job = Arc::new(IsolatedJob {
                    env,
                    source_name: source.clone(),
                    query: resolve_query(&source_config.query),
                    source: source_config,
                });
                scheduler.every(
                    interval,
                    plan.name(),
                    Box::new(move || {
                        let job = Arc::clone(&job);
                        Box::pin(async move { job.run().await })
                    }),
                );
            }
            JobKind::LinkedGroup { order } => {
                let sources: BTreeMap<String, SourceConfig> = order
                    .iter()
                    .map(|name| (name.clone(), tech.sources[name].clone()))
                    .collect();
                let queries = sources
                    .iter()
                    .map(|(name, source)| (name.clone(), resolve_query(&source.query)))
                    .collect();
                let job = Arc::new(GroupJob {
                    env,
                    sources,
                    queries,
                });
                scheduler.every(
                    interval,
                    plan.name(),
                    Box::new(move || {
                        let job = Arc::clone(&job);
                        Box::pin(async move { job.run().await })
                    }),
                );
            }
        }
    }
    plans
}
