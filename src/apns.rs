//! APNs transport client: one per Apple tenant

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

use std::{
	env,
	fs::File,
	sync::Arc,
	time::{Duration, Instant},
};

use a2::{Client, ClientConfig, Endpoint, ErrorReason};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
	apns_notification::build_payload,
	error::{ErrCode, ProxyError},
	metrics::Metrics,
	models::{PushNotification, PushResponse},
	retry::send_with_retry,
	router::Transport,
	settings::{AppleTenant, Settings},
};

/// The device-token-invalid reasons APNs reports that should be surfaced as
/// `PushResponse::Remove` instead of `PushResponse::Fail`.
const REMOVAL_REASONS: [ErrorReason; 4] = [
	ErrorReason::BadDeviceToken,
	ErrorReason::Unregistered,
	ErrorReason::MissingDeviceToken,
	ErrorReason::DeviceTokenNotForTopic,
];

/// One APNs tenant: a pooled HTTP/2 client plus the bits of tenant config
/// needed at send time.
pub struct ApnsTransport {
	client: Client,
	topic: String,
	tenant_type: String,
	send_timeout: Duration,
	retry_timeout: Duration,
	metrics: Option<Arc<Metrics>>,
}

impl ApnsTransport {
	/// Initialise a client for `tenant`. Prefers p8/JWT auth when
	/// `AuthKeyFile`/`AuthKeyID`/`TeamID` are all present, else falls back to
	/// a PEM certificate. Neither present is an error, not a panic — the
	/// caller logs and skips this tenant.
	pub fn initialize(tenant: &AppleTenant, settings: &Settings, metrics: Option<Arc<Metrics>>) -> Result<Self, ProxyError> {
		let endpoint = if tenant.use_development { Endpoint::Sandbox } else { Endpoint::Production };
		let client_config = ClientConfig::new(endpoint);

		if let Some(proxy_uri) = proxy_uri_from_env() {
			warn!(
				"APNs tenant type={} found a configured proxy ({}), but the a2 client does not expose proxy configuration; sending unproxied",
				tenant.r#type, proxy_uri
			);
		}

		let client = if !tenant.auth_key_file.is_empty() && !tenant.auth_key_id.is_empty() && !tenant.team_id.is_empty()
		{
			let mut key_file = File::open(&tenant.auth_key_file)
				.map_err(|err| ProxyError::new(ErrCode::ApnsInitFailed, format!("failed to open auth key file: {err}")))?;
			Client::token(&mut key_file, tenant.auth_key_id.clone(), tenant.team_id.clone(), client_config)
				.map_err(|err| ProxyError::new(ErrCode::ApnsInitFailed, format!("failed to build token client: {err}")))?
		} else if !tenant.push_cert_private.is_empty() {
			let mut cert_file = File::open(&tenant.push_cert_private)
				.map_err(|err| ProxyError::new(ErrCode::ApnsInitFailed, format!("failed to open cert file: {err}")))?;
			let password = if tenant.push_cert_password.is_empty() { None } else { Some(tenant.push_cert_password.as_str()) };
			Client::certificate(&mut cert_file, password, client_config)
				.map_err(|err| ProxyError::new(ErrCode::ApnsInitFailed, format!("failed to build certificate client: {err}")))?
		} else {
			return Err(ProxyError::new(
				ErrCode::ApnsInitFailed,
				format!("tenant type={} has neither AuthKeyFile nor ApplePushCertPrivate configured", tenant.r#type),
			));
		};

		Ok(Self {
			client,
			topic: tenant.push_topic.clone(),
			tenant_type: tenant.r#type.clone(),
			send_timeout: Duration::from_secs(settings.send_timeout_sec),
			retry_timeout: Duration::from_secs(settings.retry_timeout_sec.min(settings.send_timeout_sec)),
			metrics,
		})
	}
}

/// Reads `HTTPS_PROXY` (higher priority) then `HTTP_PROXY` from the process
/// environment.
fn proxy_uri_from_env() -> Option<String> {
	env::var("HTTPS_PROXY").ok().filter(|v| !v.is_empty()).or_else(|| env::var("HTTP_PROXY").ok().filter(|v| !v.is_empty()))
}

#[async_trait]
impl Transport for ApnsTransport {
	async fn send_notification(&self, notification: &PushNotification) -> PushResponse {
		let push_type = notification.r#type.map_or("", crate::models::PushType::as_wire_str);

		if let Some(metrics) = &self.metrics {
			metrics.record_attempt("apple", push_type);
		}
		let notification_start = Instant::now();

		// Built fresh per attempt rather than cloned, since a2's `Payload` borrows
		// from `notification` and carries no meaningful per-attempt state.
		let result = send_with_retry(
			self.send_timeout,
			self.retry_timeout,
			|| async {
				let payload = build_payload(notification, &self.topic)?;
				let attempt_start = Instant::now();
				let response = self
					.client
					.send(payload)
					.await
					.map_err(|err| ProxyError::new(ErrCode::ApnsTransport, err.to_string()));
				if let Some(metrics) = &self.metrics {
					metrics.observe_apns_request(attempt_start.elapsed().as_secs_f64());
				}
				response
			},
			|_err| true,
		)
		.await;

		if let Some(metrics) = &self.metrics {
			metrics.observe_notification("apple", notification_start.elapsed().as_secs_f64());
		}

		match result {
			Ok(response) => {
				if let Some(error) = response.error {
					if REMOVAL_REASONS.contains(&error.reason) {
						let reason = format!("{:?}", error.reason);
						if let Some(metrics) = &self.metrics {
							metrics.record_removal("apple", push_type, &reason);
						}
						info!(
							"APNs rejected device token for tenant type={} reason={}",
							self.tenant_type, reason
						);
						PushResponse::Remove
					} else {
						let reason = format!("{:?}", error.reason);
						if let Some(metrics) = &self.metrics {
							metrics.record_failure("apple", push_type, Some(&reason));
						}
						PushResponse::fail("unknown send response error")
					}
				} else {
					if let Some(metrics) = &self.metrics {
						metrics.record_success("apple", push_type, !notification.ack_id.is_empty());
					}
					PushResponse::Ok
				}
			}
			Err(_err) => {
				if let Some(metrics) = &self.metrics {
					metrics.record_failure("apple", push_type, Some("RequestError"));
				}
				PushResponse::fail("unknown transport error")
			}
		}
	}
}
