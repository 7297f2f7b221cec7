//! HTTP and HTTPS listeners.
//!
//! Both listeners serve the same router: the static file service wrapped by
//! the private key guard. The server provides:
//! - HTTPS with a loaded or generated certificate
//! - Graceful shutdown on SIGTERM/SIGINT

mod server;
mod shutdown;
mod static_files;

pub use server::{RunningServer, Server};
pub use shutdown::{setup_shutdown_handler, ShutdownHandle};
pub use static_files::{create_router, create_static_service};
