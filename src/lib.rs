pub mod arrivals;
pub mod cli;
pub mod clients;
pub mod clock;
pub mod config;
pub mod counsellor;
pub mod distributions;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod output;
pub mod queue;
pub mod rng;
pub mod roster;
pub mod runner;
pub mod state;
pub mod summary;
