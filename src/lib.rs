//! Remote pointer
//!
//! Turns a device's orientation sensor (or a mouse) into a normalized,
//! screen-independent cursor position and streams it to a broadcast relay
//! at a fixed frame rate.
//!
//! Data flows one way: feed → [`session::SignalPipeline`] → position cell →
//! [`publish::PublishLoop`] → [`transport::Transport`].

pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod normalize;
pub mod paths;
pub mod permission;
pub mod position;
pub mod publish;
pub mod session;
pub mod transport;

pub use error::{AccessError, Rejection};
pub use position::Position;
