pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod stage;
pub mod tools;
pub mod types;
pub mod workspace;
