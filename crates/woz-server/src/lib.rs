pub mod client;
pub mod config;
pub mod http;
pub mod router;
pub mod rpc;
pub mod server;
pub mod wire;

pub use config::ServerConfig;
pub use router::RouterState;
pub use server::{build_router, start, AppState, ServerHandle};
