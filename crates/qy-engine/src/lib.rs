//! qy-engine - the Quarry transformation engine
//!
//! Wires discovery, the dependency graph, and run orchestration over the
//! database, state store, renderer, and parser seams. The typical session
//! is `load_seeds` then `discover` then `run` (or `run_select`).

pub mod discovery;
pub mod engine;
pub mod error;
pub mod materialize;
pub mod parser;
pub mod runner;
pub mod seeds;

pub use discovery::{DiscoveryIssue, DiscoveryOptions, DiscoveryReport};
pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use parser::{ModelParser, SqlModelParser};
pub use runner::{ModelOutcome, RunReport};
pub use seeds::SeedReport;
