use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::rngs::OsRng;
use tokio::sync::mpsc;
use wire::CommonHeader;

use crate::channel::AppFactory;
use crate::device::DeviceAddress;
use crate::error::{Result, SessionError};
use crate::session::Session;

/// Process-wide (or, per spec.md §9's Open Question resolution, per-test)
/// map from local session id to session, with collision-free id allocation
/// (spec.md §4.4). Constructed explicitly and threaded through the
/// transport acceptor rather than held as ambient state, so independent
/// registries can coexist in one process — e.g. one per test.
pub struct SessionRegistry {
	next_local_id: u32,
	sessions: HashMap<u32, Arc<Mutex<Session>>>,
}

impl Default for SessionRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl SessionRegistry {
	pub fn new() -> Self {
		Self { next_local_id: 0x0e, sessions: HashMap::new() }
	}

	/// Look up the session named by `header.session_id.local`, or allocate a
	/// fresh one if it is `0` (spec.md §4.4).
	pub fn get_or_create(&mut self, device: DeviceAddress, header: &CommonHeader, raw_sink: mpsc::UnboundedSender<Vec<u8>>, local_certificate: Vec<u8>, app_factory: Arc<dyn AppFactory>) -> Result<Arc<Mutex<Session>>> {
		if header.session_id.local == 0 {
			let local_id = self.next_local_id;
			self.next_local_id += 1;

			let remote_id = header.session_id.remote_id();
			let local_key = crypto::LocalKeyMaterial::generate(&mut OsRng);
			let session = Arc::new(Mutex::new(Session::new(local_id, remote_id, device, local_key, raw_sink, local_certificate, app_factory)));

			self.sessions.insert(local_id, session.clone());
			tracing::debug!(local_id, remote_id, "allocated new session");
			return Ok(session);
		}

		let local_id = header.session_id.local;
		let session_arc = self.sessions.get(&local_id).cloned().ok_or(SessionError::UnknownSession(local_id))?;

		{
			let session = session_arc.lock().expect("session mutex is not poisoned");
			if session.is_disposed() {
				return Err(SessionError::Disposed(local_id));
			}
			let expected_remote = session.remote_id();
			let got_remote = header.session_id.remote_id();
			if expected_remote != got_remote {
				return Err(SessionError::WrongRemote { session: local_id, expected: expected_remote, got: got_remote });
			}
			if session.device() != &device {
				return Err(SessionError::WrongDevice);
			}
		}

		Ok(session_arc)
	}

	/// Remove a session, e.g. after it disposes itself due to a fatal error
	/// or transfer completion (spec.md §4.4, §5).
	pub fn remove(&mut self, local_id: u32) {
		self.sessions.remove(&local_id);
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use wire::{MessageType, SessionId};

	use super::*;
	use crate::channel::ChannelApplication;

	struct NoApps;
	impl AppFactory for NoApps {
		fn create(&self, _app_id: &str, _app_name: &str) -> Option<Box<dyn ChannelApplication>> {
			None
		}
	}

	fn connect_request_header(local: u32, remote: u32) -> CommonHeader {
		CommonHeader::new(MessageType::Connect, SessionId::new(local, remote))
	}

	#[test]
	fn fresh_connects_allocate_a_contiguous_id_sequence() {
		let mut registry = SessionRegistry::new();
		let (tx, _rx) = mpsc::unbounded_channel();

		let mut ids = Vec::new();
		for i in 0..3u32 {
			let header = connect_request_header(0, i);
			let session = registry.get_or_create(DeviceAddress::from("device-a"), &header, tx.clone(), Vec::new(), Arc::new(NoApps)).unwrap();
			ids.push(session.lock().unwrap().local_id());
		}

		assert_eq!(ids, vec![0x0e, 0x0f, 0x10]);
		assert_eq!(registry.len(), 3);
	}

	#[test]
	fn wrong_remote_id_is_rejected() {
		let mut registry = SessionRegistry::new();
		let (tx, _rx) = mpsc::unbounded_channel();

		let header = connect_request_header(0, 5);
		let session = registry.get_or_create(DeviceAddress::from("device-a"), &header, tx.clone(), Vec::new(), Arc::new(NoApps)).unwrap();
		let local_id = session.lock().unwrap().local_id();

		let mismatched = CommonHeader::new(MessageType::Connect, SessionId::new(local_id, 6));
		let err = registry.get_or_create(DeviceAddress::from("device-a"), &mismatched, tx, Vec::new(), Arc::new(NoApps)).unwrap_err();
		assert!(matches!(err, SessionError::WrongRemote { .. }));
	}

	#[test]
	fn unknown_local_id_is_rejected() {
		let mut registry = SessionRegistry::new();
		let (tx, _rx) = mpsc::unbounded_channel();

		let header = CommonHeader::new(MessageType::Control, SessionId::new(0xff, 1));
		let err = registry.get_or_create(DeviceAddress::from("device-a"), &header, tx, Vec::new(), Arc::new(NoApps)).unwrap_err();
		assert!(matches!(err, SessionError::UnknownSession(0xff)));
	}
}
