pub mod api_defaults;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod io;
pub mod query;
pub mod sync;
pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;

#[macro_use]
extern crate log;

#[macro_use]
extern crate derive_builder;
