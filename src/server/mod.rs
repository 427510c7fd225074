//! HTTP surface for a front-end process.

mod routes;

pub use routes::{create_router, serve, NodeState};
