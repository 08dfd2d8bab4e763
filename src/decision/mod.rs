pub mod client;
pub mod types;

pub use client::{decode_action, decode_decision, DecisionService, HttpDecisionClient};
pub use types::{ActionDescriptor, ActionKind, DecisionRequest, DecisionResponse};
