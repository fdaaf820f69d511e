pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod sessions;

pub use routes::create_router;
