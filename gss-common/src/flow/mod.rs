//! Survey flow: block positions, answer payloads and the transition function

pub mod answers;
pub mod state;
pub mod transition;

pub use answers::*;
pub use state::{Block, FlowState, TerminationReason};
pub use transition::{next, FlowContext, Transition};
