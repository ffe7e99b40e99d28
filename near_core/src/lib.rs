//! Session/channel state machine, message reassembler, and session registry
//! for the Near Share receiver core (spec.md §2 items 4-8).
//!
//! This crate knows the CDP handshake (Connect/Control) and how messages are
//! multiplexed onto channels; it knows nothing about what a channel
//! application actually does with its payloads — that is `nearshare`'s job,
//! plugged in through [`channel::AppFactory`].

pub mod channel;
pub mod connect;
pub mod control;
pub mod device;
pub mod error;
pub mod outbound;
pub mod reassembly;
pub mod registry;
pub mod session;

pub use channel::{AppFactory, Channel, ChannelApplication, ChannelOutcome, ChannelRegistry};
pub use device::DeviceAddress;
pub use error::{Result, SessionError};
pub use outbound::SessionOutbound;
pub use reassembly::Reassembler;
pub use registry::SessionRegistry;
pub use session::{Dispatch, Session, SessionState};
