pub mod completion;
pub mod config;
pub mod error;
pub mod export;
pub mod gaps;
pub mod import;
pub mod keys;
pub mod languages;
pub mod migration;
pub mod model;
pub mod notify;
pub mod retry;
pub mod storage;
pub mod store;
pub mod timeline;
pub mod translate;
pub mod worker;
pub mod xliff;

pub use config::Config;
pub use error::{EngineError, EngineResult, MutationOutcome};
pub use store::Store;
pub use worker::{QueueEvent, Worker};
