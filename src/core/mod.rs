// Core domain types shared by every layer

pub mod errors;
pub mod events;
pub mod models;
pub mod notice;
pub mod resilience;
