//! `kais`: Kubernetes-native orchestration platform for populations of
//! LLM-powered Cell agents (§1, §2). This crate just re-exports the
//! subsystem crates the two binaries assemble; all of the actual data model,
//! runtime, and control-plane logic lives in `crates/`.

pub use kais_agent as agent;
pub use kais_blueprint as blueprint;
pub use kais_bus as bus;
pub use kais_controllers as controllers;
pub use kais_core as core;
pub use kais_events as events;
pub use kais_experiment as experiment;
pub use kais_llm as llm;
pub use kais_protocol as protocol;
pub use kais_tools as tools;
pub use kais_topology as topology;
