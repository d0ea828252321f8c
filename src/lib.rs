//! Mattermost push notification proxy: dispatches outbound pushes to APNs
//! and FCM on behalf of Mattermost servers, so a server never holds vendor
//! credentials directly.

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

#![deny(
	missing_docs,
	trivial_casts,
	trivial_numeric_casts,
	unused_extern_crates,
	unused_import_braces,
	unused_qualifications
)]
#![warn(missing_debug_implementations, dead_code, clippy::unwrap_used, clippy::expect_used)]

pub mod apns;
pub mod apns_notification;
pub mod api;
pub mod emoji;
pub mod error;
pub mod fcm;
pub mod fcm_notification;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod retry;
pub mod router;
pub mod settings;
