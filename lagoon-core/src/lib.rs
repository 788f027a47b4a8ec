mod error;
pub use error::{AnyError, AnyResult, DispatchFault, TransportError};

pub mod config;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod gauge;
pub mod handoff;
pub mod listener;
pub mod session;
