//! Bridge Runtime
//!
//! A bridge pairs one PostgreSQL notification channel with one RabbitMQ
//! exchange. The runner drives a single bridge's poll/drain/republish loop;
//! the supervisor launches every configured bridge as an isolated task and
//! waits for all of them.

mod runner;
mod supervisor;

pub use runner::{run, run_loop, BridgeError, POLL_TIMEOUT};
pub use supervisor::BridgeSupervisor;
