pub mod admin_http;
pub mod errors;
pub mod handlers;
pub mod observability;
pub mod routes;
pub mod startup;
pub mod state;

pub use startup::run;
