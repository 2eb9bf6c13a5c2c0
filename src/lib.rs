pub mod cli;
pub mod clock;
pub mod daemon;
pub mod errors;
pub mod idgen;
pub mod models;
pub mod queue;
pub mod server;
pub mod storage;
pub mod tools;
