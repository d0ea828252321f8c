//! Dispatch table: tenant type → transport client

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

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::{error, info};

use crate::{
	apns::ApnsTransport,
	fcm::FcmTransport,
	metrics::Metrics,
	models::PushNotification,
	settings::Settings,
};

/// A tenant-scoped transport client. One instance per `Type` entry in the
/// config's Apple/Android tenant lists.
#[async_trait]
pub trait Transport: Send + Sync {
	/// Render the vendor payload, send with retry, and interpret the result
	/// into a `PushResponse`. Never returns an `Err` — every failure mode is
	/// represented as `PushResponse::Fail`/`PushResponse::Remove`.
	async fn send_notification(&self, notification: &PushNotification) -> crate::models::PushResponse;
}

/// Maps a tenant `Type` to its initialised transport. Built once at startup
/// and never mutated afterwards, so lookups need no locking.
pub struct Router {
	transports: HashMap<String, Box<dyn Transport>>,
}

impl Router {
	/// Initialise every Apple then Android tenant. A tenant whose
	/// initialisation fails is logged and skipped; this never aborts startup.
	pub async fn build(settings: &Settings, metrics: Option<Arc<Metrics>>) -> Self {
		let mut transports: HashMap<String, Box<dyn Transport>> = HashMap::new();

		for tenant in &settings.apple_push_settings {
			match ApnsTransport::initialize(tenant, settings, metrics.clone()) {
				Ok(transport) => {
					info!("Initialized APNs tenant type={}", tenant.r#type);
					transports.insert(tenant.r#type.clone(), Box::new(transport));
				}
				Err(err) => {
					error!("Failed to initialize APNs tenant type={}: {}", tenant.r#type, err);
				}
			}
		}

		for tenant in &settings.android_push_settings {
			match FcmTransport::initialize(tenant, settings, metrics.clone()).await {
				Ok(transport) => {
					info!("Initialized FCM tenant type={}", tenant.r#type);
					transports.insert(tenant.r#type.clone(), Box::new(transport));
				}
				Err(err) => {
					error!("Failed to initialize FCM tenant type={}: {}", tenant.r#type, err);
				}
			}
		}

		Self { transports }
	}

	/// Look up the transport registered for `platform`.
	pub fn lookup(&self, platform: &str) -> Option<&dyn Transport> {
		self.transports.get(platform).map(AsRef::as_ref)
	}

	/// A router with no tenants registered; every lookup misses. Used by
	/// handler tests that exercise validation paths never reaching a transport.
	#[must_use]
	pub fn empty() -> Self {
		Self { transports: HashMap::new() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn build_skips_tenants_with_no_credentials_configured() {
		let settings = Settings {
			listen_address: ":8066".to_owned(),
			throttle_per_sec: 10,
			throttle_memory_store_size: 1024,
			throttle_vary_by_header: String::new(),
			enable_metrics: false,
			send_timeout_sec: 30,
			retry_timeout_sec: 8,
			apple_push_settings: vec![crate::settings::AppleTenant {
				r#type: "apple".to_owned(),
				push_cert_private: String::new(),
				push_cert_password: String::new(),
				push_topic: String::new(),
				auth_key_file: String::new(),
				auth_key_id: String::new(),
				team_id: String::new(),
				use_development: false,
			}],
			android_push_settings: vec![crate::settings::AndroidTenant {
				r#type: "android".to_owned(),
				android_api_key: String::new(),
				service_file_location: String::new(),
			}],
			log: crate::settings::Log::default(),
		};
		let metrics = Some(Arc::new(Metrics::new().expect("metrics construction")));
		let router = Router::build(&settings, metrics).await;

		assert!(router.lookup("apple").is_none());
		assert!(router.lookup("android").is_none());
	}

	#[tokio::test]
	async fn lookup_of_unknown_platform_is_none() {
		let settings = Settings {
			listen_address: ":8066".to_owned(),
			throttle_per_sec: 10,
			throttle_memory_store_size: 1024,
			throttle_vary_by_header: String::new(),
			enable_metrics: false,
			send_timeout_sec: 30,
			retry_timeout_sec: 8,
			apple_push_settings: Vec::new(),
			android_push_settings: Vec::new(),
			log: crate::settings::Log::default(),
		};
		let metrics = Some(Arc::new(Metrics::new().expect("metrics construction")));
		let router = Router::build(&settings, metrics).await;
		assert!(router.lookup("anything").is_none());
	}
}
