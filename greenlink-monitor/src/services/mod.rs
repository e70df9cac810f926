mod command_service;
mod connection_service;
mod event_bus;
mod monitor_service;
mod polling_service;
mod state;
mod transport;

pub use command_service::*;
pub use connection_service::*;
pub use event_bus::*;
pub use monitor_service::*;
pub use polling_service::*;
pub use state::*;
pub use transport::*;
