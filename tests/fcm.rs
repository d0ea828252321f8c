//! Tests for FCM tenant initialisation.

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
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use mattermost_push_proxy::{
	error::ErrCode,
	fcm::FcmTransport,
	metrics::Metrics,
	settings::{AndroidTenant, Log, Settings},
};

fn base_settings() -> Settings {
	Settings {
		listen_address: ":8066".to_owned(),
		throttle_per_sec: 10,
		throttle_memory_store_size: 1024,
		throttle_vary_by_header: String::new(),
		enable_metrics: false,
		send_timeout_sec: 30,
		retry_timeout_sec: 8,
		apple_push_settings: Vec::new(),
		android_push_settings: Vec::new(),
		log: Log::default(),
	}
}

#[tokio::test]
async fn initialize_fails_with_no_service_file_configured() {
	let metrics = Some(Arc::new(Metrics::new().unwrap()));
	let tenant = AndroidTenant { r#type: "android".to_owned(), android_api_key: String::new(), service_file_location: String::new() };

	let result = FcmTransport::initialize(&tenant, &base_settings(), metrics).await;

	assert!(result.is_err());
	assert_eq!(result.unwrap_err().errcode, ErrCode::FcmInitFailed);
}

#[tokio::test]
async fn initialize_fails_when_service_file_is_missing() {
	let metrics = Some(Arc::new(Metrics::new().unwrap()));
	let tenant = AndroidTenant {
		r#type: "android".to_owned(),
		android_api_key: String::new(),
		service_file_location: "nonexistent-service-account.json".to_owned(),
	};

	let result = FcmTransport::initialize(&tenant, &base_settings(), metrics).await;

	assert!(result.is_err());
	assert_eq!(result.unwrap_err().errcode, ErrCode::FcmInitFailed);
}
