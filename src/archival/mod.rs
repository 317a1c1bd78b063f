pub mod audit;
pub mod config;
pub mod detector;
pub mod engine;
pub mod fsops;
pub mod index;
pub mod lock;
pub mod orchestrator;
pub mod paths;
pub mod tasks;
pub mod warn;
