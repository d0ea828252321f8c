//! APNs payload rendering: turns a `PushNotification` into an `a2::Payload`

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

use a2::{
	request::payload::Payload, LocalizedNotificationBuilder, NotificationBuilder, NotificationOptions,
	PlainNotificationBuilder, Priority, SilentNotificationBuilder,
};

use crate::{
	emoji,
	error::{ErrCode, ProxyError},
	models::{PushNotification, PushType},
};

/// Build the full APNs payload for `msg`, including badge, alert, thread id
/// and every always-on custom field.
pub fn build_payload<'a>(msg: &'a PushNotification, topic: &'a str) -> Result<Payload<'a>, ProxyError> {
	let options = NotificationOptions { apns_topic: Some(topic), apns_priority: Some(Priority::High), ..Default::default() };

	let thread_id = if msg.is_crt_enabled && !msg.root_id.is_empty() {
		Some(msg.root_id.as_str())
	} else if !msg.channel_id.is_empty() {
		Some(msg.channel_id.as_str())
	} else {
		None
	};

	let badge = msg.effective_badge().map(|badge| u32::try_from(badge).unwrap_or(0));

	let mut payload = if msg.is_id_loaded {
		let mut builder = PlainNotificationBuilder::new(&msg.message);
		builder.set_sound("default");
		if !msg.category.is_empty() {
			builder.set_category(&msg.category);
		}
		builder.set_mutable_content();
		builder.set_content_available();
		if let Some(badge) = badge {
			builder.set_badge(badge);
		}
		builder.build(&msg.device_id, options)
	} else {
		match msg.r#type {
			Some(PushType::Message | PushType::Session) => {
				let is_message = msg.r#type == Some(PushType::Message);
				let rendered_message = emoji::render(&msg.message);

				if !msg.channel_name.is_empty() && msg.version == "v2" {
					let mut builder = LocalizedNotificationBuilder::new(&msg.channel_name, &rendered_message);
					builder.set_mutable_content();
					if !msg.category.is_empty() {
						builder.set_category(&msg.category);
					}
					builder.set_sound("default");
					if is_message {
						builder.set_content_available();
					}
					if let Some(badge) = badge {
						builder.set_badge(badge);
					}
					builder.build(&msg.device_id, options)
				} else {
					let mut builder = PlainNotificationBuilder::new(&rendered_message);
					builder.set_mutable_content();
					if !msg.category.is_empty() {
						builder.set_category(&msg.category);
					}
					builder.set_sound("default");
					if is_message {
						builder.set_content_available();
					}
					if let Some(badge) = badge {
						builder.set_badge(badge);
					}
					builder.build(&msg.device_id, options)
				}
			}
			Some(PushType::Clear | PushType::Test) | None => {
				let mut builder = SilentNotificationBuilder::new();
				builder.set_content_available();
				if let Some(badge) = badge {
					builder.set_badge(badge);
				}
				builder.build(&msg.device_id, options)
			}
			Some(PushType::UpdateBadge) => {
				let mut builder = SilentNotificationBuilder::new();
				if let Some(badge) = badge {
					builder.set_badge(badge);
				}
				builder.build(&msg.device_id, options)
			}
		}
	};

	if let Some(thread_id) = thread_id {
		payload.set_thread_id(thread_id);
	}

	let push_type = msg.r#type.map_or("", PushType::as_wire_str);
	payload.add_custom_data("type", &push_type).map_custom_data_err()?;
	payload.add_custom_data("sub_type", &msg.sub_type).map_custom_data_err()?;
	payload.add_custom_data("server_id", &msg.server_id).map_custom_data_err()?;
	payload.add_custom_data("is_crt_enabled", &msg.is_crt_enabled).map_custom_data_err()?;
	if msg.is_id_loaded || matches!(msg.r#type, Some(PushType::Message | PushType::Session)) {
		payload.add_custom_data("version", &msg.version).map_custom_data_err()?;
	}
	if msg.is_id_loaded {
		payload.add_custom_data("id_loaded", "true").map_custom_data_err()?;
	}
	if !msg.ack_id.is_empty() {
		payload.add_custom_data("ack_id", &msg.ack_id).map_custom_data_err()?;
	}
	if !msg.channel_id.is_empty() {
		payload.add_custom_data("channel_id", &msg.channel_id).map_custom_data_err()?;
	}
	if !msg.team_id.is_empty() {
		payload.add_custom_data("team_id", &msg.team_id).map_custom_data_err()?;
	}
	if !msg.sender_id.is_empty() {
		payload.add_custom_data("sender_id", &msg.sender_id).map_custom_data_err()?;
	}
	if !msg.sender_name.is_empty() {
		payload.add_custom_data("sender_name", &msg.sender_name).map_custom_data_err()?;
	}
	if !msg.post_id.is_empty() {
		payload.add_custom_data("post_id", &msg.post_id).map_custom_data_err()?;
	}
	if !msg.root_id.is_empty() {
		payload.add_custom_data("root_id", &msg.root_id).map_custom_data_err()?;
	}
	if !msg.override_username.is_empty() {
		payload.add_custom_data("override_username", &msg.override_username).map_custom_data_err()?;
	}
	if !msg.override_icon_url.is_empty() {
		payload.add_custom_data("override_icon_url", &msg.override_icon_url).map_custom_data_err()?;
	}
	if !msg.from_webhook.is_empty() {
		payload.add_custom_data("from_webhook", &msg.from_webhook).map_custom_data_err()?;
	}
	if !msg.is_id_loaded
		&& matches!(msg.r#type, Some(PushType::Message | PushType::Session))
		&& !msg.channel_name.is_empty()
	{
		payload.add_custom_data("channel_name", &msg.channel_name).map_custom_data_err()?;
	}
	payload.add_custom_data("signature", &msg.signature_or_placeholder()).map_custom_data_err()?;

	Ok(payload)
}

impl PushType {
	/// The wire string for this push type, matching `serde`'s `snake_case` rendering.
	pub(crate) fn as_wire_str(self) -> &'static str {
		match self {
			PushType::Message => "message",
			PushType::Clear => "clear",
			PushType::UpdateBadge => "update_badge",
			PushType::Session => "session",
			PushType::Test => "test",
		}
	}
}

/// Adapts `a2`'s custom-data serialisation error into `ProxyError`.
trait CustomDataResultExt<T> {
	fn map_custom_data_err(self) -> Result<T, ProxyError>;
}

impl<T> CustomDataResultExt<T> for Result<T, a2::Error> {
	fn map_custom_data_err(self) -> Result<T, ProxyError> {
		self.map_err(|err| ProxyError::new(ErrCode::ApnsRejected, format!("failed to encode payload field: {err}")))
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
			device_id: "device-token".to_owned(),
			platform: "apple".to_owned(),
			app_version: 2,
			r#type: Some(PushType::Message),
			sub_type: String::new(),
			category: String::new(),
			sound: String::new(),
			message: "hello :+1:".to_owned(),
			team_id: "team".to_owned(),
			channel_id: "channel".to_owned(),
			channel_name: "general".to_owned(),
			post_id: String::new(),
			root_id: String::new(),
			sender_id: String::new(),
			sender_name: String::new(),
			override_username: String::new(),
			override_icon_url: String::new(),
			from_webhook: String::new(),
			version: "v2".to_owned(),
			signature: String::new(),
			badge: 3,
			is_crt_enabled: false,
			is_id_loaded: false,
		}
	}

	#[test]
	fn message_with_v2_and_channel_name_builds_without_error() {
		let msg = base_notification();
		let payload = build_payload(&msg, "com.mattermost.app").expect("payload should build");
		assert_eq!(payload.device_token, "device-token");
	}

	#[test]
	fn clear_type_builds_silent_payload() {
		let mut msg = base_notification();
		msg.r#type = Some(PushType::Clear);
		msg.badge = 0;
		let payload = build_payload(&msg, "com.mattermost.app").expect("payload should build");
		assert_eq!(payload.device_token, "device-token");
	}

	#[test]
	fn id_loaded_overrides_type_branching_and_builds() {
		let mut msg = base_notification();
		msg.is_id_loaded = true;
		msg.r#type = Some(PushType::UpdateBadge);
		let payload = build_payload(&msg, "com.mattermost.app").expect("payload should build");
		assert_eq!(payload.device_token, "device-token");
	}
}
