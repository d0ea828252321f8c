//! HTTP handlers: request validation, dispatch, and response shaping

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

use axum::{
	extract::{rejection::JsonRejection, State},
	response::Html,
	Json,
};
use serde::Serialize;
use tracing::info;

use crate::{
	api::AppState,
	models::{PushNotification, PushNotificationAck, PushResponse},
};

/// `GET /`
pub async fn index() -> Html<&'static str> {
	Html("<html><body>Mattermost Push Proxy</body></html>")
}

/// Build metadata surfaced on `GET /version`. Populated at compile time by
/// `vergen-gitcl`; falls back to the crate version when built outside git.
#[derive(Debug, Serialize)]
pub struct VersionInfo {
	/// human-readable git describe output
	pub git_version: &'static str,
	/// full commit sha
	pub build_hash: &'static str,
	/// crate semver
	pub build_version: &'static str,
	/// "clean" or "dirty", depending on the working tree at build time
	pub git_tree_state: &'static str,
	/// build timestamp
	pub build_date: &'static str,
	/// compile-target OS
	pub platform: &'static str,
}

impl VersionInfo {
	/// Build from the `vergen-gitcl`-populated compile-time environment,
	/// falling back to plain crate metadata when built outside a git tree.
	#[must_use]
	pub fn current() -> Self {
		Self {
			git_version: option_env!("VERGEN_GIT_DESCRIBE").unwrap_or(env!("CARGO_PKG_VERSION")),
			build_hash: option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
			build_version: env!("CARGO_PKG_VERSION"),
			git_tree_state: option_env!("VERGEN_GIT_DIRTY").unwrap_or("unknown"),
			build_date: option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
			platform: std::env::consts::OS,
		}
	}
}

/// `GET /version`
pub async fn version() -> Json<VersionInfo> {
	Json(VersionInfo::current())
}

/// `GET /metrics`; only mounted when metrics are enabled.
pub async fn metrics(State(state): State<AppState>) -> String {
	state.gather_metrics()
}

/// `POST /api/v1/send_push`
pub async fn send_push(
	State(state): State<AppState>,
	payload: Result<Json<PushNotification>, JsonRejection>,
) -> Json<PushResponse> {
	let mut notification = match payload {
		Ok(Json(notification)) => notification,
		Err(err) => {
			state.record_bad_request();
			return Json(PushResponse::fail(format!("Failed to read message body: {err}")));
		}
	};

	if notification.server_id.is_empty() {
		state.record_bad_request();
		return Json(PushResponse::fail("Failed because of missing server Id"));
	}
	if notification.device_id.is_empty() {
		state.record_bad_request();
		return Json(PushResponse::fail(format!("missing device Id serverId={}", notification.server_id)));
	}

	notification.normalize();

	let Some(transport) = state.router.lookup(&notification.platform) else {
		state.record_bad_request();
		return Json(PushResponse::fail(format!(
			"missing platform property type={} serverId={}",
			notification.platform, notification.server_id
		)));
	};

	Json(transport.send_notification(&notification).await)
}

/// `POST /api/v1/ack`
pub async fn ack(
	State(state): State<AppState>,
	payload: Result<Json<PushNotificationAck>, JsonRejection>,
) -> Json<PushResponse> {
	let ack = match payload {
		Ok(Json(ack)) => ack,
		Err(err) => {
			state.record_bad_request();
			return Json(PushResponse::fail(format!("Failed to read message body: {err}")));
		}
	};

	if ack.id.is_empty() || ack.platform.is_empty() || ack.r#type.is_empty() {
		state.record_bad_request();
		return Json(PushResponse::fail("missing id, platform or type on acknowledgement"));
	}

	info!("Acknowledge delivery receipt for AckId={}", ack.id);
	state.record_delivered(&ack.platform, &ack.r#type);

	Json(PushResponse::Ok)
}
