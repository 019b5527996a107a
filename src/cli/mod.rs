pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod detect;
pub mod dispatch;
pub mod env;
pub mod runtime;
pub mod workflow;

pub use app::run;
