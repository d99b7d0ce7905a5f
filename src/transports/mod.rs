//! Built-in transports

pub mod channel;
pub mod replay;

pub use channel::{ChannelTransport, ChannelTransportHandle};
pub use replay::ReplayTransport;
