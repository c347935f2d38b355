pub mod codes;
pub mod config;
pub mod db;
pub mod models;
pub mod pubsub;
pub mod services;
pub mod trivia;
pub mod utils;
