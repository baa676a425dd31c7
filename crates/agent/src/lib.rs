//! The datalyst control loop.
//!
//! A run alternates two steps until the model stops asking for tools:
//!
//! 1. **Decide**: send the directive, the history and the tool descriptors
//!    to the reasoning backend; get back one assistant message
//! 2. **Dispatch**: execute every requested tool and append one correlated
//!    result per request
//!
//! The loop ends with the content of the first assistant message that
//! requests no tools, or fails once the recursion ceiling is reached.

pub mod decision;
pub mod directive;
pub mod dispatch;
pub mod loop_runner;
pub mod policy;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use decision::{Decision, DecisionStep};
pub use directive::Directive;
pub use dispatch::{DispatchRecord, Dispatcher};
pub use loop_runner::{AgentLoop, Phase, RunOutcome, Transition};
pub use policy::RepeatedFailureGuard;
