//! `CallPipeline` — wires `Gate`, `TransformPipeline`, and
//! `UpstreamForwarder` into the single path a transport actually drives:
//! evaluate, transform the request, forward upstream (cache/breaker/
//! canary/retry), transform the response, settle.
//!
//! `TransformPipeline` sits outside `Gate::evaluate`'s own chain of
//! checks, so nothing in `gate.rs` calls it; this is the thin seam that
//! puts the three back together for a caller that wants one entry point
//! instead of driving each component by hand.

use std::collections::HashMap;
use std::sync::Arc;

use pg_transform::{Direction, TransformPipeline};
use serde_json::Value;

use crate::decision::{Call, CallContext, Decision, SettlementInput, SettlementOutcome};
use crate::forwarder::{ForwardError, ForwardOutcome, UpstreamBackend, UpstreamForwarder};
use crate::gate::Gate;

/// The full result of driving one call through the pipeline. `forwarded`
/// and `settlement` are `None` when the gate denied the call outright —
/// nothing downstream of `evaluate` ever ran.
pub struct PipelineOutcome {
    pub decision: Decision,
    pub forwarded: Option<Result<ForwardOutcome, ForwardError>>,
    pub settlement: Option<SettlementOutcome>,
}

pub struct CallPipeline {
    gate: Arc<Gate>,
    transform: Arc<TransformPipeline>,
    forwarder: Arc<UpstreamForwarder>,
}

impl CallPipeline {
    pub fn new(gate: Arc<Gate>, transform: Arc<TransformPipeline>, forwarder: Arc<UpstreamForwarder>) -> Self {
        Self { gate, transform, forwarder }
    }

    pub async fn call(
        &self,
        credential: &str,
        call: &Call,
        ctx: &CallContext,
        transform_context: &HashMap<String, String>,
        backend_impl: &dyn UpstreamBackend,
    ) -> PipelineOutcome {
        let decision = self.gate.evaluate(credential, call, ctx);
        if !decision.allowed {
            return PipelineOutcome { decision, forwarded: None, settlement: None };
        }

        let request_payload = call.args.clone().unwrap_or(Value::Null);
        let (transformed_request, _) =
            self.transform.apply(&call.tool, Direction::Request, &request_payload, transform_context);

        let forward_result = self.forwarder.forward(&call.tool, Some(&transformed_request), backend_impl).await;

        let settlement_input = match &forward_result {
            Ok(outcome) => SettlementInput {
                success: true,
                response_bytes: outcome.response_bytes,
                from_cache: outcome.from_cache,
            },
            Err(_) => SettlementInput { success: false, response_bytes: None, from_cache: false },
        };
        let settlement = self.gate.settle(&decision, settlement_input);

        let transformed_result = forward_result.map(|mut outcome| {
            let (transformed, _) =
                self.transform.apply(&call.tool, Direction::Response, &outcome.result, transform_context);
            outcome.result = transformed;
            outcome
        });

        PipelineOutcome { decision, forwarded: Some(transformed_result), settlement: Some(settlement) }
    }
}
