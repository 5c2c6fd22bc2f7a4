//! The composition tree — declarative configs to runnable pipelines.
//!
//! A pipeline is built once, at startup:
//!
//! 1. **Registry** maps each agent-kind tag to a node constructor and
//!    recursively builds the tree, turning remote-URL references into
//!    proxy nodes along the way.
//! 2. **LlmNode** is the model-backed leaf: instructions, resolved
//!    input, a bounded tool loop against its gateway toolsets.
//! 3. **SequentialNode** runs children strictly in declared order,
//!    threading results through the session state store.
//! 4. **Runner** owns the root and the session service, and turns one
//!    query into a stream of events.

pub mod llm;
pub mod registry;
pub mod runner;
pub mod sequential;
pub mod test_helpers;

pub use llm::LlmNode;
pub use registry::{NodeBuilder, Registry};
pub use runner::Runner;
pub use sequential::SequentialNode;
