pub mod app;
pub mod call;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod global;
pub mod history;
pub mod recording;
pub mod settings;
pub mod upload;
