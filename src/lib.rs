//! # decision_engine
//!
//! Latency-bounded entry/exit decisions for leveraged crypto positions.
//!
//! ```text
//!                 ┌──────────── ConfigStore (ArcSwap snapshot) ───────────┐
//!                 │                                                       │
//!  POST /decide/enter ─▶ DecisionPipeline ─▶ gates → predictor → fragility │
//!                 │                         → arbitration → allocation    │
//!                 │                         → reason chain                │
//!  POST /decide/exit  ─▶ ExitPipeline ─────▶ signal fusion → action rules  │
//!                 │                                                       │
//!                 └──── PerformanceMonitor (p50/p95/p99 per operation) ───┘
//! ```

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod monitor;
pub mod predictor;
pub mod rationale;
pub mod routes;
pub mod state;
