//! FCM payload rendering: turns a `PushNotification` into the FCM data map

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

use std::collections::HashMap;

use crate::{
	emoji,
	models::{PushNotification, PushType},
};

/// Build the FCM data payload for `msg`. A handful of keys are always
/// present; type-specific fields are layered on top depending on the push
/// type and whether the full post has already been loaded.
pub fn build_data(msg: &PushNotification) -> HashMap<String, String> {
	let push_type = msg.r#type.map_or(String::new(), |t| t.as_wire_str().to_owned());

	let mut data = HashMap::new();
	data.insert("ack_id".to_owned(), msg.ack_id.clone());
	data.insert("type".to_owned(), push_type);
	data.insert("sub_type".to_owned(), msg.sub_type.clone());
	data.insert("version".to_owned(), msg.version.clone());
	data.insert("channel_id".to_owned(), msg.channel_id.clone());
	data.insert("is_crt_enabled".to_owned(), msg.is_crt_enabled.to_string());
	data.insert("server_id".to_owned(), msg.server_id.clone());
	data.insert("category".to_owned(), msg.category.clone());
	data.insert("signature".to_owned(), msg.signature_or_placeholder().to_owned());

	if let Some(badge) = msg.effective_badge() {
		data.insert("badge".to_owned(), badge.to_string());
	}
	if !msg.root_id.is_empty() {
		data.insert("root_id".to_owned(), msg.root_id.clone());
	}

	if msg.is_id_loaded {
		data.insert("post_id".to_owned(), msg.post_id.clone());
		data.insert("message".to_owned(), msg.message.clone());
		data.insert("id_loaded".to_owned(), "true".to_owned());
		data.insert("sender_id".to_owned(), msg.sender_id.clone());
		data.insert("sender_name".to_owned(), "Someone".to_owned());
		data.insert("team_id".to_owned(), msg.team_id.clone());
	} else if matches!(msg.r#type, Some(PushType::Message | PushType::Session)) {
		data.insert("team_id".to_owned(), msg.team_id.clone());
		data.insert("sender_id".to_owned(), msg.sender_id.clone());
		data.insert("sender_name".to_owned(), msg.sender_name.clone());
		data.insert("message".to_owned(), emoji::render(&msg.message));
		data.insert("channel_name".to_owned(), msg.channel_name.clone());
		data.insert("post_id".to_owned(), msg.post_id.clone());
		data.insert("override_username".to_owned(), msg.override_username.clone());
		data.insert("override_icon_url".to_owned(), msg.override_icon_url.clone());
		data.insert("from_webhook".to_owned(), msg.from_webhook.clone());
	}

	data
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_notification() -> PushNotification {
		PushNotification {
			id: String::new(),
			ack_id: "ack-1".to_owned(),
			server_id: "server".to_owned(),
			device_id: "device-token".to_owned(),
			platform: "android".to_owned(),
			app_version: 2,
			r#type: Some(PushType::Message),
			sub_type: String::new(),
			category: "messages".to_owned(),
			sound: String::new(),
			message: "hi :+1:".to_owned(),
			team_id: "team".to_owned(),
			channel_id: "channel".to_owned(),
			channel_name: "general".to_owned(),
			post_id: "post".to_owned(),
			root_id: String::new(),
			sender_id: "sender".to_owned(),
			sender_name: "Alice".to_owned(),
			override_username: String::new(),
			override_icon_url: String::new(),
			from_webhook: String::new(),
			version: String::new(),
			signature: String::new(),
			badge: 3,
			is_crt_enabled: false,
			is_id_loaded: false,
		}
	}

	#[test]
	fn always_present_keys_are_set() {
		let data = build_data(&base_notification());
		for key in
			["ack_id", "type", "sub_type", "version", "channel_id", "is_crt_enabled", "server_id", "category", "signature"]
		{
			assert!(data.contains_key(key), "missing key {key}");
		}
	}

	#[test]
	fn signature_placeholder_when_empty() {
		let data = build_data(&base_notification());
		assert_eq!(data.get("signature").map(String::as_str), Some("NO_SIGNATURE"));
	}

	#[test]
	fn message_type_renders_emoji_and_channel_name() {
		let data = build_data(&base_notification());
		assert_eq!(data.get("message").map(String::as_str), Some("hi 👍"));
		assert_eq!(data.get("channel_name").map(String::as_str), Some("general"));
		assert_eq!(data.get("sender_name").map(String::as_str), Some("Alice"));
	}

	#[test]
	fn id_loaded_branch_uses_someone_sender_name_and_raw_message() {
		let mut msg = base_notification();
		msg.is_id_loaded = true;
		msg.message = "hi :+1:".to_owned();
		let data = build_data(&msg);
		assert_eq!(data.get("sender_name").map(String::as_str), Some("Someone"));
		assert_eq!(data.get("id_loaded").map(String::as_str), Some("true"));
		assert_eq!(data.get("message").map(String::as_str), Some("hi :+1:"));
		assert!(!data.contains_key("channel_name"));
	}

	#[test]
	fn clear_type_has_no_message_fields() {
		let mut msg = base_notification();
		msg.r#type = Some(PushType::Clear);
		let data = build_data(&msg);
		assert!(!data.contains_key("message"));
		assert!(!data.contains_key("sender_name"));
	}
}
