pub mod health;
pub mod permits;
pub mod reports;

#[cfg(test)]
mod health_http_tests;


#[cfg(test)]
mod reports_http_tests;

pub use health::{healthz, metrics};
pub use permits::configure_permit_routes;
pub use reports::configure_report_routes;
