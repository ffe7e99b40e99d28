//! Tunables for the Near Share application and its file-transfer data path
//! (spec.md §6's Configuration supplement).

/// Size, in bytes, of each `FetchDataRequest` partition a file transfer is
/// split into. Chosen to match the wire protocol's observed chunking; the
/// final partition of a transfer is usually smaller.
pub const PARTITION_SIZE: u64 = 102_400;

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;

/// Runtime knobs for a [`crate::app::NearShareApp`] instance. `Default`
/// matches the values the wire protocol itself assumes (spec.md §4.1's
/// `hmac_size`/`fragment_size` fields, §6's partition size).
#[derive(Debug, Clone)]
pub struct Config {
	pub partition_size: u64,
	pub hmac_size: u16,
	pub fragment_size: u16,
}

impl Default for Config {
	fn default() -> Self {
		Self { partition_size: PARTITION_SIZE, hmac_size: 32, fragment_size: 4096 }
	}
}

/// Render a byte count the way a user-facing progress indicator would
/// (spec.md §6: "KB/MB/GB thresholds with two-decimal rounding").
pub fn format_size(bytes: u64) -> String {
	let bytes_f = bytes as f64;
	if bytes_f >= GB {
		format!("{:.2} GB", bytes_f / GB)
	} else if bytes_f >= MB {
		format!("{:.2} MB", bytes_f / MB)
	} else if bytes_f >= KB {
		format!("{:.2} KB", bytes_f / KB)
	} else {
		format!("{} B", bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_at_each_threshold() {
		assert_eq!(format_size(512), "512 B");
		assert_eq!(format_size(2048), "2.00 KB");
		assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
		assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
	}

	#[test]
	fn default_matches_wire_assumptions() {
		let cfg = Config::default();
		assert_eq!(cfg.partition_size, PARTITION_SIZE);
		assert_eq!(cfg.hmac_size, 32);
	}
}
