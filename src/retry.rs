//! Dual-deadline retry: a general deadline for the whole send, plus a
//! per-attempt sub-deadline, with exponential backoff between attempts.

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
	future::Future,
	time::{Duration, Instant},
};

use tracing::debug;

use crate::error::{ErrCode, ProxyError};

/// Hard cap on attempts, independent of how much of the general deadline
/// remains.
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff between attempts; doubles after every retry.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Run `attempt` up to `MAX_RETRIES` times, bounded by a general deadline of
/// `general_timeout` and a per-attempt deadline of `retry_timeout` (clamped to
/// whatever of the general deadline remains). `is_retryable` decides whether a
/// transport-level failure should be retried; a successful or vendor-rejected
/// response from `attempt` is never retried — only the attempt itself (e.g. a
/// connection error, or the per-attempt timeout) triggers a retry.
pub async fn send_with_retry<F, Fut, T>(
	general_timeout: Duration,
	retry_timeout: Duration,
	mut attempt: F,
	is_retryable: impl Fn(&ProxyError) -> bool,
) -> Result<T, ProxyError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, ProxyError>>,
{
	let deadline = Instant::now() + general_timeout;
	let mut backoff = INITIAL_BACKOFF;
	let mut attempts = 0u32;

	loop {
		attempts += 1;
		let remaining = deadline.saturating_duration_since(Instant::now());
		if remaining.is_zero() {
			return Err(ProxyError::new(ErrCode::DeadlineExceeded, "send deadline exceeded"));
		}

		let attempt_timeout = retry_timeout.min(remaining);
		let result = tokio::time::timeout(attempt_timeout, attempt()).await;

		let err = match result {
			Ok(Ok(value)) => return Ok(value),
			Ok(Err(err)) => err,
			Err(_elapsed) => ProxyError::new(ErrCode::DeadlineExceeded, "attempt timed out"),
		};

		let retryable = is_retryable(&err);
		if !retryable || attempts >= MAX_RETRIES {
			return Err(err);
		}

		let remaining = deadline.saturating_duration_since(Instant::now());
		if remaining.is_zero() {
			return Err(err);
		}

		let sleep_for = backoff.min(remaining);
		debug!("Send attempt {} failed ({}), retrying in {:?}", attempts, err, sleep_for);
		tokio::time::sleep(sleep_for).await;
		backoff *= 2;
	}
}
