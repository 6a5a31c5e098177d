// Library for tests to access modules

pub mod broadcaster;
pub mod config;
pub mod models;
pub mod monitor;
pub mod routes;
pub mod sampler;
pub mod version;
pub mod worker;
