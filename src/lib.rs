// Library root for the KYC gateway

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod infra;
pub mod kyc;
pub mod store;
