//! Error taxonomy used internally by the dispatch engine

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

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Classification of an internal failure. Never serialised directly; drives
/// metric labels (`service_failure_with_reason_total`) and response shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrCode {
	/// malformed JSON or a missing required field on `/send_push` or `/ack`
	BadRequest,
	/// no transport registered for the message's platform
	RoutingMiss,
	/// the general or per-attempt send deadline elapsed
	DeadlineExceeded,
	/// an Apple tenant's certificate or auth key could not be loaded at startup
	ApnsInitFailed,
	/// network/TLS/HTTP2 failure talking to APNs
	ApnsTransport,
	/// APNs accepted the connection but rejected the push
	ApnsRejected,
	/// an Android tenant's service-account file could not be loaded at startup
	FcmInitFailed,
	/// OAuth2 token acquisition for FCM failed
	FcmAuthFailed,
	/// network/HTTP failure talking to FCM
	FcmTransport,
	/// FCM accepted the connection but rejected the push
	FcmRejected,
}

/// Crate-wide error type: a human-readable message plus a classification code.
#[derive(Debug, Clone)]
pub struct ProxyError {
	/// Human-readable description, safe to log
	pub error: String,
	/// Classification used for metrics and response shaping
	pub errcode: ErrCode,
}

impl ProxyError {
	/// Build a new error from a code and a message
	pub fn new(errcode: ErrCode, error: impl Into<String>) -> Self {
		Self { error: error.into(), errcode }
	}
}

impl Display for ProxyError {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "{:?}: {}", self.errcode, self.error)
	}
}

impl std::error::Error for ProxyError {}
