// Core domain types: errors, models, resilience helpers

pub mod errors;
pub mod models;
pub mod resilience;
