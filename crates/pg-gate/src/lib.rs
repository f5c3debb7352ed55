//! PayGate's metering and policy core: `Gate` evaluates and settles
//! individual and batched tool calls against every admission policy;
//! `UpstreamForwarder` runs the cache/breaker/canary/retry chain around a
//! single upstream round trip; `CallPipeline` strings both together with
//! request/response transforms; `BackgroundTasks` drives the periodic
//! webhook and revocation housekeeping none of the above can do inline.

pub mod background;
pub mod concurrency;
pub mod config;
pub mod decision;
pub mod forwarder;
pub mod gate;
pub mod pipeline;

pub use background::BackgroundTasks;
pub use concurrency::ConcurrencyGuard;
pub use config::{ChargePolicy, ForwarderConfig, GateConfig, ToolPricing};
pub use decision::{BatchOutcome, Call, CallContext, Decision, SettlementInput, SettlementOutcome};
pub use forwarder::{ForwardError, ForwardOutcome, UpstreamBackend, UpstreamError, UpstreamForwarder};
pub use gate::Gate;
pub use pipeline::{CallPipeline, PipelineOutcome};
