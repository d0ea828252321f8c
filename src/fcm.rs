//! FCM transport client: one per Android tenant

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
	env::set_var,
	fmt::{self, Debug},
	path::PathBuf,
	sync::Arc,
	time::{Duration, Instant},
};

use async_trait::async_trait;
use firebae_cm::{AndroidConfig, AndroidMessagePriority, Message, MessageBody, Receiver};
use gcp_auth::TokenProvider;
use tracing::{info, warn};

use crate::{
	error::{ErrCode, ProxyError},
	fcm_notification::build_data,
	metrics::Metrics,
	models::{PushNotification, PushResponse},
	retry::send_with_retry,
	router::Transport,
	settings::{AndroidTenant, Settings},
};

/// Seam for actually sending a built FCM message, so tests can substitute a
/// fake sender without touching real credentials.
#[async_trait]
pub trait FcmSender: Debug + Send + Sync {
	/// Send `body` to FCM, returning the vendor message id on success.
	async fn send(&self, body: MessageBody) -> Result<String, ProxyError>;
}

/// Default `FcmSender`, backed by a real OAuth2 service-account token and the
/// `firebae_cm` HTTP client.
pub struct FcmSenderImpl {
	/// The authentication manager for refreshing tokens when needed
	provider: Arc<dyn TokenProvider>,
	/// The project id of the fcm project
	project_id: String,
}

impl Debug for FcmSenderImpl {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FcmSenderImpl").field("project_id", &self.project_id).finish()
	}
}

impl FcmSenderImpl {
	/// Build a sender from a service-account JSON key file.
	pub async fn new(credentials_file_path: &PathBuf) -> Result<Self, ProxyError> {
		// gcp_auth reads this env var to locate the service-account key.
		set_var("GOOGLE_APPLICATION_CREDENTIALS", credentials_file_path);
		let provider = gcp_auth::provider()
			.await
			.map_err(|err| ProxyError::new(ErrCode::FcmInitFailed, format!("failed to authenticate with fcm: {err}")))?;
		let project_id = provider
			.project_id()
			.await
			.map_err(|err| ProxyError::new(ErrCode::FcmInitFailed, format!("failed to resolve fcm project id: {err}")))?
			.to_string();

		Ok(Self { provider, project_id })
	}
}

#[async_trait]
impl FcmSender for FcmSenderImpl {
	async fn send(&self, body: MessageBody) -> Result<String, ProxyError> {
		let client = firebae_cm::Client::new();
		let token = self
			.provider
			.token(&["https://www.googleapis.com/auth/firebase.messaging"])
			.await
			.map(|token| token.as_str().to_owned())
			.map_err(|err| ProxyError::new(ErrCode::FcmAuthFailed, format!("failed to refresh fcm oauth2 token: {err}")))?;

		let message = Message::new(self.project_id.clone(), token, body);
		client.send(message).await.map_err(|err| ProxyError::new(ErrCode::FcmRejected, err.to_string()))
	}
}

/// The FCM reason classes that indicate the device token is permanently
/// invalid. Always recorded under the single `"UNREGISTERED"` metric label,
/// regardless of which specific reason was reported.
const REMOVAL_REASONS: [&str; 2] = ["UNREGISTERED", "SENDER_ID_MISMATCH"];

/// Reason classes the retry loop treats as transient, beyond a deadline.
const RETRYABLE_REASONS: [&str; 2] = ["INTERNAL", "QUOTA_EXCEEDED"];

/// The reason buckets recorded in `service_failure_with_reason_total` for a
/// vendor-rejected (non-removal) push.
const KNOWN_REASONS: [&str; 5] = ["INTERNAL", "INVALID_ARGUMENT", "QUOTA_EXCEEDED", "THIRD_PARTY_AUTH_ERROR", "UNAVAILABLE"];

/// Collapse a vendor error message down to one of the known reason
/// buckets, by matching the FCM v1 status code embedded in it.
fn classify_reason(message: &str) -> &'static str {
	KNOWN_REASONS.into_iter().find(|code| message.contains(code)).unwrap_or("unknown transport error")
}

fn is_removal(message: &str) -> bool {
	REMOVAL_REASONS.iter().any(|reason| message.contains(reason))
}

/// One FCM tenant: an OAuth2-authenticated sender plus the bits of tenant
/// config needed at send time.
pub struct FcmTransport {
	sender: Box<dyn FcmSender>,
	send_timeout: Duration,
	retry_timeout: Duration,
	metrics: Option<Arc<Metrics>>,
}

impl FcmTransport {
	/// Initialise from `tenant`'s service-account JSON file. A configured but
	/// ignored `AndroidApiKey` only logs a warning.
	pub async fn initialize(
		tenant: &AndroidTenant,
		settings: &Settings,
		metrics: Option<Arc<Metrics>>,
	) -> Result<Self, ProxyError> {
		if !tenant.android_api_key.is_empty() {
			warn!("Android tenant type={} has a legacy AndroidApiKey configured; it is ignored", tenant.r#type);
		}
		if tenant.service_file_location.is_empty() {
			return Err(ProxyError::new(
				ErrCode::FcmInitFailed,
				format!("tenant type={} has no ServiceFileLocation configured", tenant.r#type),
			));
		}

		let path = PathBuf::from(&tenant.service_file_location);
		let sender = FcmSenderImpl::new(&path).await?;

		Ok(Self::with_sender(
			Box::new(sender),
			Duration::from_secs(settings.send_timeout_sec),
			Duration::from_secs(settings.retry_timeout_sec.min(settings.send_timeout_sec)),
			metrics,
		))
	}

	/// Build directly from an already-constructed sender; used by tests to
	/// substitute a fake transport without real credentials.
	#[must_use]
	pub fn with_sender(
		sender: Box<dyn FcmSender>,
		send_timeout: Duration,
		retry_timeout: Duration,
		metrics: Option<Arc<Metrics>>,
	) -> Self {
		Self { sender, send_timeout, retry_timeout, metrics }
	}
}

#[async_trait]
impl Transport for FcmTransport {
	async fn send_notification(&self, notification: &PushNotification) -> PushResponse {
		let push_type = notification.r#type.map_or("", crate::models::PushType::as_wire_str);

		if let Some(metrics) = &self.metrics {
			metrics.record_attempt("android", push_type);
		}
		let notification_start = Instant::now();

		let result = send_with_retry(
			self.send_timeout,
			self.retry_timeout,
			|| async {
				let data = build_data(notification);
				let mut body = MessageBody::new(Receiver::Token(notification.device_id.clone()));
				body.data(&data).map_err(|err| ProxyError::new(ErrCode::FcmTransport, err.to_string()))?;
				let mut android_config = AndroidConfig::new();
				android_config.priority(AndroidMessagePriority::High);
				body.android(android_config);

				let attempt_start = Instant::now();
				let response = self.sender.send(body).await;
				if let Some(metrics) = &self.metrics {
					metrics.observe_fcm_request(attempt_start.elapsed().as_secs_f64());
				}
				response
			},
			|err| err.errcode == ErrCode::DeadlineExceeded || RETRYABLE_REASONS.iter().any(|reason| err.error.contains(reason)),
		)
		.await;

		if let Some(metrics) = &self.metrics {
			metrics.observe_notification("android", notification_start.elapsed().as_secs_f64());
		}

		match result {
			Ok(_message_id) => {
				if let Some(metrics) = &self.metrics {
					metrics.record_success("android", push_type, !notification.ack_id.is_empty());
				}
				PushResponse::Ok
			}
			Err(err) if is_removal(&err.error) => {
				if let Some(metrics) = &self.metrics {
					metrics.record_removal("android", push_type, "UNREGISTERED");
				}
				info!("FCM reported an invalid device token: {}", err.error);
				PushResponse::Remove
			}
			Err(err) if err.errcode == ErrCode::FcmRejected => {
				let reason = classify_reason(&err.error);
				if let Some(metrics) = &self.metrics {
					metrics.record_failure("android", push_type, Some(reason));
				}
				PushResponse::fail("unknown send response error")
			}
			Err(_err) => {
				if let Some(metrics) = &self.metrics {
					metrics.record_failure("android", push_type, Some("unknown transport error"));
				}
				PushResponse::fail("unknown transport error")
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use super::*;

	#[derive(Debug)]
	struct FakeSender {
		result: Result<String, ProxyError>,
		calls: AtomicU32,
	}

	impl FakeSender {
		fn ok() -> Self {
			Self { result: Ok("message-id".to_owned()), calls: AtomicU32::new(0) }
		}

		fn err(code: ErrCode, message: impl Into<String>) -> Self {
			Self { result: Err(ProxyError::new(code, message)), calls: AtomicU32::new(0) }
		}
	}

	#[async_trait]
	impl FcmSender for FakeSender {
		async fn send(&self, _body: MessageBody) -> Result<String, ProxyError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.result.clone()
		}
	}

	fn base_notification() -> PushNotification {
		PushNotification {
			id: String::new(),
			ack_id: String::new(),
			server_id: "server".to_owned(),
			device_id: "device-token".to_owned(),
			platform: "android".to_owned(),
			app_version: 2,
			r#type: Some(crate::models::PushType::Message),
			sub_type: String::new(),
			category: String::new(),
			sound: String::new(),
			message: "hi".to_owned(),
			team_id: String::new(),
			channel_id: String::new(),
			channel_name: String::new(),
			post_id: String::new(),
			root_id: String::new(),
			sender_id: String::new(),
			sender_name: String::new(),
			override_username: String::new(),
			override_icon_url: String::new(),
			from_webhook: String::new(),
			version: String::new(),
			signature: String::new(),
			badge: -1,
			is_crt_enabled: false,
			is_id_loaded: false,
		}
	}

	#[tokio::test]
	async fn successful_send_returns_ok() {
		let metrics = Some(Arc::new(Metrics::new().expect("metrics construction")));
		let transport = FcmTransport::with_sender(
			Box::new(FakeSender::ok()),
			Duration::from_secs(5),
			Duration::from_secs(1),
			metrics,
		);
		let response = transport.send_notification(&base_notification()).await;
		assert_eq!(response, PushResponse::Ok);
	}

	#[tokio::test]
	async fn unregistered_reason_yields_remove() {
		let metrics = Some(Arc::new(Metrics::new().expect("metrics construction")));
		let transport = FcmTransport::with_sender(
			Box::new(FakeSender::err(ErrCode::FcmRejected, "UNREGISTERED: token is gone")),
			Duration::from_secs(5),
			Duration::from_secs(1),
			metrics,
		);
		let response = transport.send_notification(&base_notification()).await;
		assert_eq!(response, PushResponse::Remove);
	}

	#[tokio::test]
	async fn invalid_argument_yields_fail() {
		let metrics = Some(Arc::new(Metrics::new().expect("metrics construction")));
		let transport = FcmTransport::with_sender(
			Box::new(FakeSender::err(ErrCode::FcmRejected, "INVALID_ARGUMENT: bad payload")),
			Duration::from_secs(5),
			Duration::from_secs(1),
			metrics,
		);
		let response = transport.send_notification(&base_notification()).await;
		assert_eq!(response, PushResponse::fail("unknown send response error"));
	}
}
