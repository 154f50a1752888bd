// Library for tests to access modules

pub mod aggregation;
pub mod backend;
pub mod config;
pub mod coordinator;
pub mod export;
pub mod fingerprint;
pub mod models;
pub mod monitor;
pub mod routes;
pub mod view;
pub mod worker;
