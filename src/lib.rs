//! MOGA-driven automated repair of smart contract vulnerabilities: breeds,
//! scores, and selects among candidate patches until one satisfies the
//! configured repair target or the search budget runs out.

pub mod analyzer;
pub mod archive;
pub mod cli;
pub mod dynamic_runner;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod fault;
pub mod fault_localization;
pub mod gas_ranker;
pub mod location;
pub mod logging;
pub mod mutation_engine;
pub mod orchestrator;
pub mod patch;
pub mod repair_target;
pub mod sandbox;
pub mod score;
pub mod selection;
pub mod stats;
pub mod vulnerability;
