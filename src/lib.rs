pub mod actors;
pub mod alerts;
pub mod api;
pub mod check;
pub mod config;
pub mod error;
pub mod probe;
pub mod status;
pub mod store;
pub mod util;
