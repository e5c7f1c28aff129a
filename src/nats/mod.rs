pub mod client;
pub mod messages;

pub use client::{result_subject, NatsResultPublisher};
pub use messages::SessionResultMessage;
