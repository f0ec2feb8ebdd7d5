//! Message transport abstractions and channel building blocks
pub mod channel;
pub mod messages;
pub mod registration;

pub use channel::{ClientChannel, MessageConnection, SendCompletion, TransportClient};
pub use messages::OutboundMessage;
pub use registration::{RegistrationChannel, RegistrationState};
