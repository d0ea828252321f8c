//! Tests for config file loading.

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

use mattermost_push_proxy::settings::Settings;

#[test]
fn load_settings() {
	let settings = Settings::load("tests/config-sample.json").unwrap();

	assert_eq!(settings.listen_address, ":8066");
	assert_eq!(settings.throttle_per_sec, 10);
	assert!(settings.enable_metrics);
	assert_eq!(settings.apple_push_settings.len(), 1);
	assert_eq!(settings.apple_push_settings[0].push_topic, "com.mattermost.app");
	assert_eq!(settings.android_push_settings.len(), 1);
	assert_eq!(settings.android_push_settings[0].service_file_location, "service-account.json");
	assert_eq!(settings.log.level, "INFO");

	Settings::load("tests/config-bad.json").unwrap_err();
}
