//! # engine
//!
//! ```text
//! entry: gates → predictor → fragility → arbitration → allocation → reason chain
//! exit:  signal fusion → action rules
//! ```

pub mod allocation;
pub mod arbitration;
pub mod exit;
pub mod fragility;
pub mod gates;
pub mod pipeline;
pub mod reason_chain;

pub use exit::ExitPipeline;
pub use pipeline::{DecisionOutcome, DecisionPipeline};
