//! # state
//!
//! Shared application state injected into every Axum handler.
//!
//! * `ConfigStore` hands out an `Arc<DecisionConfig>` snapshot per request,
//!   so a reload never changes the thresholds under an in-flight decision.
//! * `PerformanceMonitor` and `TraceStore` live for the whole process;
//!   pipelines built per request only borrow them through `Arc`.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use crate::auth::ApiKey;
use crate::config::ConfigStore;
use crate::engine::arbitration::RationaleGenerator;
use crate::engine::{DecisionPipeline, ExitPipeline};
use crate::monitor::{PerformanceMonitor, TraceStore};
use crate::predictor::PredictorPort;

pub struct AppState {
    pub config:    Arc<ConfigStore>,
    pub perf:      Arc<PerformanceMonitor>,
    pub traces:    Arc<TraceStore>,
    pub predictor: Arc<dyn PredictorPort>,
    pub rationale: Option<Arc<dyn RationaleGenerator>>,
    pub api_key:   ApiKey,

    pub started_at: Instant,
    /// Entry decisions served this session
    pub entry_count: AtomicU64,
    /// Entry decisions that came back `allow = true`
    pub approval_count: AtomicU64,
    /// Exit decisions served this session
    pub exit_count:  AtomicU64,
}

impl AppState {
    pub fn new(
        config:    ConfigStore,
        predictor: Arc<dyn PredictorPort>,
        rationale: Option<Arc<dyn RationaleGenerator>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            perf: Arc::new(PerformanceMonitor::new()),
            traces: Arc::new(TraceStore::new()),
            predictor,
            rationale,
            api_key: ApiKey::from_env(),
            started_at: Instant::now(),
            entry_count: AtomicU64::new(0),
            approval_count: AtomicU64::new(0),
            exit_count: AtomicU64::new(0),
        }
    }

    pub fn with_api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = api_key;
        self
    }

    /// Pipeline bound to the config snapshot active right now.
    pub fn entry_pipeline(&self) -> DecisionPipeline {
        DecisionPipeline::new(
            self.config.snapshot(),
            Arc::clone(&self.perf),
            Arc::clone(&self.predictor),
            self.rationale.clone(),
        )
    }

    /// Same collaborators, scratch monitor: canned scenario runs stay out of
    /// the live latency stats.
    pub fn scenario_pipeline(&self) -> DecisionPipeline {
        DecisionPipeline::new(
            self.config.snapshot(),
            Arc::new(PerformanceMonitor::new()),
            Arc::clone(&self.predictor),
            self.rationale.clone(),
        )
    }

    pub fn exit_pipeline(&self) -> ExitPipeline {
        ExitPipeline::new(self.config.snapshot(), Arc::clone(&self.perf))
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_state(
    config:    ConfigStore,
    predictor: Arc<dyn PredictorPort>,
    rationale: Option<Arc<dyn RationaleGenerator>>,
) -> SharedState {
    Arc::new(AppState::new(config, predictor, rationale))
}
