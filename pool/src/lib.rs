pub mod address;
pub mod api;
pub mod bech32m;
pub mod config;
pub mod difficulty;
pub mod logging;
pub mod metrics;
pub mod policy;
pub mod stratum;
pub mod work;
