pub mod archive;
pub mod cli;
pub mod config;
pub mod errors;
pub mod extract;
pub mod ingest;
pub mod log;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod safety;
pub mod server;
pub mod template;
pub mod ux;
pub mod wire;
