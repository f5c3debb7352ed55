//! Batched, signed webhook delivery for usage and admin lifecycle events.

pub mod emitter;

pub use emitter::{
    mask_url, verify_signature, DeadLetterEntry, DeliveryLogEntry, SendOutcome, WebhookBatch,
    WebhookConfig, WebhookEmitter,
};
