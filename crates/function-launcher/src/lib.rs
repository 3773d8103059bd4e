// ABOUTME: Function launcher library.
// ABOUTME: Catalog, broker session, outbound messages, executor client and the dispatch loop.

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod function;
pub mod launcher;
pub mod message;
pub mod session;

pub use catalog::{FunctionDescription, FunctionMode};
pub use config::{BrokerConfig, LoopSettings};
pub use error::{CallError, LauncherError, StartFailure};
pub use executor::{Executor, HttpExecutor};
pub use function::Function;
pub use launcher::{connect_with_retry, Launcher, LauncherHandle, LauncherState};
pub use message::{CallOutcome, OutgoingMessage};
pub use session::{BrokerSession, GrpcSessionFactory, SessionFactory};
