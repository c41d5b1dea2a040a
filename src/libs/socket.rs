pub mod channel;
pub mod codec;
pub mod driver;
pub mod events;
pub mod manager;
