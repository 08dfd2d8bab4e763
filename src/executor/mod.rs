pub mod dispatcher;
pub mod safety;

pub use dispatcher::{ActionDispatcher, DispatchOutcome};
