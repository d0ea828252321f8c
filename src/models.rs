//! Wire types for the push proxy: request/ack payloads and the response model

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

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum length of `PushNotification::message`, after truncation.
pub const MAX_MESSAGE_LEN: usize = 2047;
/// Maximum length of `PushNotification::channel_name`, after truncation.
pub const MAX_CHANNEL_NAME_LEN: usize = 64;

/// Sentinel value for `badge` meaning "do not set a badge".
pub const BADGE_OMIT: i32 = -1;

/// The kind of push being sent, drives payload shaping in both transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushType {
	/// a regular chat message
	Message,
	/// clear badge / dismiss notifications
	Clear,
	/// update the badge count only
	UpdateBadge,
	/// a session-related event (e.g. login elsewhere)
	Session,
	/// a connectivity test push
	Test,
}

/// A notification-send request as received on `POST /api/v1/send_push`.
///
/// Deserialised directly from the request body; fields not present in the
/// JSON default to their empty/zero value so that optional fields genuinely
/// are optional.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushNotification {
	/// legacy idempotency hint, ignored by the proxy
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub ack_id: String,
	#[serde(default)]
	pub server_id: String,
	#[serde(default)]
	pub device_id: String,
	#[serde(default)]
	pub platform: String,
	#[serde(default = "default_app_version")]
	pub app_version: i32,
	#[serde(default)]
	pub r#type: Option<PushType>,
	#[serde(default)]
	pub sub_type: String,
	#[serde(default)]
	pub category: String,
	#[serde(default)]
	pub sound: String,
	#[serde(default)]
	pub message: String,
	#[serde(default)]
	pub team_id: String,
	#[serde(default)]
	pub channel_id: String,
	#[serde(default)]
	pub channel_name: String,
	#[serde(default)]
	pub post_id: String,
	#[serde(default)]
	pub root_id: String,
	#[serde(default)]
	pub sender_id: String,
	#[serde(default)]
	pub sender_name: String,
	#[serde(default)]
	pub override_username: String,
	#[serde(default)]
	pub override_icon_url: String,
	#[serde(default)]
	pub from_webhook: String,
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub signature: String,
	#[serde(default = "default_badge")]
	pub badge: i32,
	#[serde(default)]
	pub is_crt_enabled: bool,
	#[serde(default)]
	pub is_id_loaded: bool,
}

fn default_app_version() -> i32 {
	1
}

fn default_badge() -> i32 {
	BADGE_OMIT
}

impl PushNotification {
	/// Truncate `message`/`channel_name`, parse the `"-v<N>"` platform suffix
	/// and apply the clear-badge rewrite. Call once, right after decoding.
	pub fn normalize(&mut self) {
		if self.message.chars().count() > MAX_MESSAGE_LEN {
			self.message = self.message.chars().take(MAX_MESSAGE_LEN).collect();
		}
		if self.channel_name.chars().count() > MAX_CHANNEL_NAME_LEN {
			self.channel_name = self.channel_name.chars().take(MAX_CHANNEL_NAME_LEN).collect();
		}
		self.parse_platform_suffix();
	}

	/// Strip a trailing `"-v<N>"` suffix from `platform`, setting `app_version`
	/// to `N`. A malformed `<N>` logs a warning and leaves `app_version` at its
	/// default of `1`, but the suffix (and the `"-v"` marker) is still removed.
	fn parse_platform_suffix(&mut self) {
		if let Some(idx) = self.platform.find("-v") {
			let suffix = &self.platform[idx + 2..];
			match suffix.parse::<i32>() {
				Ok(version) => self.app_version = version,
				Err(_) => {
					warn!("Failed to parse app version suffix {:?} in platform field", suffix);
				}
			}
			self.platform.truncate(idx);
		}
	}

	/// Whether the actual badge to send to APNs/FCM should be `1` instead of
	/// `0`, per the clear-notification dismissal rule.
	pub fn effective_badge(&self) -> Option<i32> {
		if self.badge == 0 && self.r#type == Some(PushType::Clear) && self.app_version > 1 {
			Some(1)
		} else if self.badge != BADGE_OMIT {
			Some(self.badge)
		} else {
			None
		}
	}

	/// `signature`, or the literal placeholder when none was provided.
	pub fn signature_or_placeholder(&self) -> &str {
		if self.signature.is_empty() {
			"NO_SIGNATURE"
		} else {
			&self.signature
		}
	}
}

/// A delivery-acknowledgement request as received on `POST /api/v1/ack`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushNotificationAck {
	/// legacy idempotency hint, ignored by the proxy
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub platform: String,
	#[serde(default)]
	pub r#type: String,
}

/// The outcome of a dispatch attempt, serialised back to the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResponse {
	/// the vendor acknowledged delivery
	Ok,
	/// the device token is permanently invalid and should be purged
	Remove,
	/// the push failed; `reason` is safe to show upstream
	Fail(String),
}

impl PushResponse {
	/// Build a `Fail` outcome from any `Display`-able reason.
	pub fn fail(reason: impl Into<String>) -> Self {
		Self::Fail(reason.into())
	}
}

impl Serialize for PushResponse {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		use serde::ser::SerializeMap;

		let mut map = serializer.serialize_map(Some(2))?;
		match self {
			PushResponse::Ok => {
				map.serialize_entry("status", "OK")?;
			}
			PushResponse::Remove => {
				map.serialize_entry("status", "REMOVE")?;
			}
			PushResponse::Fail(reason) => {
				map.serialize_entry("status", "FAIL")?;
				map.serialize_entry("error", reason)?;
			}
		}
		map.end()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_notification() -> PushNotification {
		PushNotification {
			id: String::new(),
			ack_id: String::new(),
			server_id: "server".to_owned(),
			device_id: "device".to_owned(),
			platform: "apple".to_owned(),
			app_version: 1,
			r#type: Some(PushType::Message),
			sub_type: String::new(),
			category: String::new(),
			sound: String::new(),
			message: String::new(),
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
			badge: BADGE_OMIT,
			is_crt_enabled: false,
			is_id_loaded: false,
		}
	}

	#[test]
	fn platform_suffix_is_parsed_and_stripped() {
		let mut n = base_notification();
		n.platform = "apple-v2".to_owned();
		n.normalize();
		assert_eq!(n.platform, "apple");
		assert_eq!(n.app_version, 2);
	}

	#[test]
	fn malformed_suffix_leaves_default_version_and_is_still_stripped() {
		let mut n = base_notification();
		n.platform = "apple-vxyz".to_owned();
		n.normalize();
		assert_eq!(n.platform, "apple");
		assert_eq!(n.app_version, 1);
	}

	#[test]
	fn message_is_truncated_to_exactly_2047() {
		let mut n = base_notification();
		n.message = "a".repeat(3000);
		n.channel_name = "b".repeat(100);
		n.normalize();
		assert_eq!(n.message.chars().count(), MAX_MESSAGE_LEN);
		assert_eq!(n.channel_name.chars().count(), MAX_CHANNEL_NAME_LEN);
	}

	#[test]
	fn badge_omit_sentinel_means_no_badge_key() {
		let mut n = base_notification();
		n.badge = BADGE_OMIT;
		assert_eq!(n.effective_badge(), None);
	}

	#[test]
	fn clear_with_zero_badge_on_new_app_becomes_one() {
		let mut n = base_notification();
		n.r#type = Some(PushType::Clear);
		n.badge = 0;
		n.app_version = 2;
		assert_eq!(n.effective_badge(), Some(1));
	}

	#[test]
	fn clear_with_zero_badge_on_old_app_stays_zero() {
		let mut n = base_notification();
		n.r#type = Some(PushType::Clear);
		n.badge = 0;
		n.app_version = 1;
		assert_eq!(n.effective_badge(), Some(0));
	}

	#[test]
	fn signature_placeholder_when_empty() {
		let n = base_notification();
		assert_eq!(n.signature_or_placeholder(), "NO_SIGNATURE");
	}

	#[test]
	fn response_serializes_to_the_documented_shape() {
		assert_eq!(serde_json::to_string(&PushResponse::Ok).unwrap(), r#"{"status":"OK"}"#);
		assert_eq!(serde_json::to_string(&PushResponse::Remove).unwrap(), r#"{"status":"REMOVE"}"#);
		assert_eq!(
			serde_json::to_string(&PushResponse::fail("boom")).unwrap(),
			r#"{"status":"FAIL","error":"boom"}"#
		);
	}
}
