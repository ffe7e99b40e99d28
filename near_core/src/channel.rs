use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::outbound::SessionOutbound;

/// What a channel application wants to happen after handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
	/// Keep the channel open, awaiting further messages.
	Continue,
	/// The application is done with this channel; remove it from the
	/// session's registry.
	CloseChannel,
	/// The application is done with the whole session (spec.md §9's Open
	/// Question: Near Share is single-shot per session).
	CloseSession,
}

/// The contract every application instance hosted on a channel implements
/// (spec.md §4.5, §6: "the channel-application contract
/// `{HandleMessageAsync(channel, message)}`").
///
/// Implementations run on the background task the reader hands reassembled
/// Session messages to (spec.md §5) — `handle_message` is free to `.await`
/// on user acceptance or disk I/O without blocking the reader.
#[async_trait]
pub trait ChannelApplication: Send {
	async fn handle_message(&mut self, outbound: &Arc<SessionOutbound>, channel_id: u64, payload: Vec<u8>) -> Result<ChannelOutcome>;
}

/// Creates application instances by id (spec.md §6: "Application factory").
/// Implementations register the well-known ids they support; an unknown id
/// must fail channel open (spec.md §6).
pub trait AppFactory: Send + Sync {
	fn create(&self, app_id: &str, app_name: &str) -> Option<Box<dyn ChannelApplication>>;
}

/// One multiplexed application instance inside a session (spec.md §3:
/// "Channel"). The `Mutex` around the application is a `tokio::sync::Mutex`
/// conceptually — this core uses a plain `std::sync::Mutex` around
/// `Option<Box<dyn ChannelApplication>>` and takes it out only for the
/// duration of one `handle_message` call from the background task (spec.md
/// §5: at most one application task runs per channel at a time because the
/// reassembler serializes delivery by sequence number), re-inserting it
/// afterward.
pub struct Channel {
	pub id: u64,
	app: Mutex<Option<Box<dyn ChannelApplication>>>,
}

impl Channel {
	fn new(id: u64, app: Box<dyn ChannelApplication>) -> Self {
		Self { id, app: Mutex::new(Some(app)) }
	}

	/// Take the application out of the channel to run one message through
	/// it off the lock, then put it back. Panics if called re-entrantly
	/// (the reassembler guarantees only one in-flight message per channel
	/// at a time, so this never happens in practice).
	pub async fn handle_message(&self, outbound: &Arc<SessionOutbound>, payload: Vec<u8>) -> Result<ChannelOutcome> {
		let mut app = self.app.lock().expect("channel app mutex is not poisoned").take().expect("channel application is not already in use");

		let result = app.handle_message(outbound, self.id, payload).await;

		*self.app.lock().expect("channel app mutex is not poisoned") = Some(app);
		result
	}
}

/// A session's channel table, keyed by the session-local channel id
/// allocated monotonically starting from 1 (spec.md §6).
#[derive(Default)]
pub struct ChannelRegistry {
	next_id: u64,
	channels: HashMap<u64, Arc<Channel>>,
}

impl ChannelRegistry {
	pub fn new() -> Self {
		Self { next_id: 1, channels: HashMap::new() }
	}

	/// Allocate the next channel id, install the given application under
	/// it, and return the new channel.
	pub fn start(&mut self, app: Box<dyn ChannelApplication>) -> Arc<Channel> {
		let id = self.next_id;
		self.next_id += 1;

		let channel = Arc::new(Channel::new(id, app));
		self.channels.insert(id, channel.clone());
		channel
	}

	pub fn get(&self, id: u64) -> Option<Arc<Channel>> {
		self.channels.get(&id).cloned()
	}

	pub fn remove(&mut self, id: u64) {
		self.channels.remove(&id);
	}

	/// Remove and return every channel, used when the owning session is
	/// disposed (spec.md §3: "destruction cascades to all channels").
	pub fn drain(&mut self) -> Vec<Arc<Channel>> {
		self.channels.drain().map(|(_, c)| c).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Noop;

	#[async_trait]
	impl ChannelApplication for Noop {
		async fn handle_message(&mut self, _outbound: &Arc<SessionOutbound>, _channel_id: u64, _payload: Vec<u8>) -> Result<ChannelOutcome> {
			Ok(ChannelOutcome::Continue)
		}
	}

	#[test]
	fn channel_ids_start_at_one_and_increment() {
		let mut reg = ChannelRegistry::new();
		let a = reg.start(Box::new(Noop));
		let b = reg.start(Box::new(Noop));
		assert_eq!(a.id, 1);
		assert_eq!(b.id, 2);
		assert!(reg.get(1).is_some());
		assert!(reg.get(99).is_none());
	}

	#[test]
	fn drain_empties_the_registry() {
		let mut reg = ChannelRegistry::new();
		reg.start(Box::new(Noop));
		reg.start(Box::new(Noop));
		assert_eq!(reg.drain().len(), 2);
		assert!(reg.get(1).is_none());
	}
}
