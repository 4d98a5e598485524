pub mod dtos;
pub mod handlers;
pub mod routes;

pub use routes::{protected_routes, public_routes};
