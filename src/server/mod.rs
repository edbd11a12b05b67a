pub mod handlers;
pub mod middleware;
pub mod runtime;

pub use handlers::AppState;
pub use runtime::{create_router, start_server};
