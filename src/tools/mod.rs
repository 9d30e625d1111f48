pub mod handlers;
pub mod history;
pub mod protocol;
pub mod server;

pub use handlers::HaloTools;
