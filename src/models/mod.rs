//! Domain models shared across the decision engine.

pub mod decision;
pub mod examples;
pub mod features;
pub mod position;
pub mod risk;

pub use decision::{EntryDecision, ExecutionMode, ExitAction, ExitDecision, RiskMetrics};
pub use features::{
    EntryRequest, FeatureSnapshot, MarketMicro, OnChain, OrderFlow, Side, Timeframe, VisionTokens,
};
pub use position::{ExitRequest, ExitUpdate, Position};
pub use risk::{Factor, RiskEstimate, TemporalContext};
