pub mod battle;
pub mod boss;
pub mod commands;
pub mod config;
pub mod constants;
pub mod damage;
pub mod error;
pub mod registry;
pub mod rewards;
pub mod rng;
pub mod session;
pub mod teleport;
pub mod types;
pub mod world;
