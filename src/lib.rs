pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod intake;
pub mod ledger;
pub mod models;
pub mod shell;

pub use error::{Error, Result};
