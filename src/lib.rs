//! Sandboxed code-execution tooling for LLM assistants.
//!
//! The core is the [`sandbox`] engine: it provisions an ephemeral Docker
//! container per request, injects the code as a tar archive, runs it
//! under a hard deadline, harvests generated images, and guarantees the
//! container is removed whatever happens. The [`skills`] layer wraps the
//! engine as a tool the LLM host can invoke.

pub mod config;
pub mod sandbox;
pub mod skills;
