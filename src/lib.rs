pub mod catalog;
pub mod chart;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod executor;
pub mod filters;
pub mod metric;
pub mod server;
pub mod sql_template;
pub mod warehouse;

pub use dashboard::DashboardProcessor;
pub use server::DashboardServer;
