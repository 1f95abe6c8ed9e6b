pub mod analysis;
pub mod config;
pub mod document;
pub mod error;
pub mod lifecycle;
pub mod llm;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod retrieval;
pub mod store;
pub mod terminal;
pub mod websearch;

#[cfg(test)]
pub mod testing;
