// Library root for the crimewatch access core

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod crime;
pub mod infra;
pub mod runtime;
pub mod state;
