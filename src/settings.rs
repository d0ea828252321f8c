//! Configuration loading: JSON config file discovery and parsing

/*
 *   Mattermost Push Proxy
 *
 *   This program is free software: you can redistribute it and/or modify
 *   it under the terms of the GNU Affero General Public License as
 *   published by the Free Software Foundation, either version 3 of the
 *   License, or (at your option) any later version.
 *
 *   This program is distributed in the hope that it will be useful,
 *   but WITHOUT ANY WARRANTY; without even the implied warranty of
 *   MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *   GNU Affero General Public License for more details.
 *
 *   You should have received a copy of the GNU Affero General Public License
 *   along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::path::{Path, PathBuf};

use config::{Config as RawConfig, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::info;

fn default_send_timeout_sec() -> u64 {
	30
}

fn default_retry_timeout_sec() -> u64 {
	8
}

/// Top-level configuration, loaded once at startup and held for the process
/// lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	#[serde(rename = "ListenAddress")]
	pub listen_address: String,
	#[serde(rename = "ThrottlePerSec")]
	pub throttle_per_sec: u32,
	#[serde(rename = "ThrottleMemoryStoreSize")]
	pub throttle_memory_store_size: usize,
	#[serde(rename = "ThrottleVaryByHeader", default)]
	pub throttle_vary_by_header: String,
	#[serde(rename = "EnableMetrics", default)]
	pub enable_metrics: bool,
	#[serde(rename = "SendTimeoutSec", default = "default_send_timeout_sec")]
	pub send_timeout_sec: u64,
	#[serde(rename = "RetryTimeoutSec", default = "default_retry_timeout_sec")]
	pub retry_timeout_sec: u64,
	#[serde(rename = "ApplePushSettings", default)]
	pub apple_push_settings: Vec<AppleTenant>,
	#[serde(rename = "AndroidPushSettings", default)]
	pub android_push_settings: Vec<AndroidTenant>,
	#[serde(rename = "Log", default)]
	pub log: Log,
}

/// Logging configuration, out of core scope for this proxy — parsed purely so
/// unknown fields in a shared config file don't break deserialization.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Log {
	#[serde(default = "default_log_level")]
	pub level: String,
}

fn default_log_level() -> String {
	"INFO".to_owned()
}

/// An Apple (APNs) tenant, identified by `type` and routed to by a matching
/// `platform` field on incoming messages.
#[derive(Debug, Clone, Deserialize)]
pub struct AppleTenant {
	#[serde(rename = "Type")]
	pub r#type: String,
	#[serde(rename = "ApplePushCertPrivate", default)]
	pub push_cert_private: String,
	#[serde(rename = "ApplePushCertPassword", default)]
	pub push_cert_password: String,
	#[serde(rename = "ApplePushTopic", default)]
	pub push_topic: String,
	#[serde(rename = "AppleAuthKeyFile", default)]
	pub auth_key_file: String,
	#[serde(rename = "AppleAuthKeyID", default)]
	pub auth_key_id: String,
	#[serde(rename = "AppleTeamID", default)]
	pub team_id: String,
	#[serde(rename = "ApplePushUseDevelopment", default)]
	pub use_development: bool,
}

/// An Android (FCM) tenant, identified by `type`.
#[derive(Debug, Clone, Deserialize)]
pub struct AndroidTenant {
	#[serde(rename = "Type")]
	pub r#type: String,
	/// legacy field, ignored
	#[serde(rename = "AndroidApiKey", default)]
	pub android_api_key: String,
	#[serde(rename = "ServiceFileLocation", default)]
	pub service_file_location: String,
}

impl Settings {
	/// Search, in order, `/tmp/<name>`, `./config/<name>`, `../config/<name>`,
	/// then `<name>` literally, returning the first that exists.
	pub fn find_config_file(name: &str) -> PathBuf {
		let candidates = [
			PathBuf::from("/tmp").join(name),
			PathBuf::from("./config").join(name),
			PathBuf::from("../config").join(name),
			PathBuf::from(name),
		];

		for candidate in &candidates {
			if candidate.exists() {
				return candidate.clone();
			}
		}

		PathBuf::from(name)
	}

	/// Load settings from a JSON config file, applying `MMPP_`-prefixed
	/// environment variable overrides on top (e.g. `MMPP_LISTEN_ADDRESS`).
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		info!("Loading config from {}", path.display());

		let raw = RawConfig::builder()
			.add_source(File::from(path.to_path_buf()).format(FileFormat::Json))
			.add_source(Environment::with_prefix("MMPP").separator("_"))
			.build()?;

		raw.try_deserialize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn find_config_file_falls_back_to_the_literal_name() {
		let found = Settings::find_config_file("definitely-does-not-exist.json");
		assert_eq!(found, PathBuf::from("definitely-does-not-exist.json"));
	}
}
