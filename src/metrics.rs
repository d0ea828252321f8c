//! Prometheus metrics registry and the HTTP middleware that feeds it

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
	sync::Arc,
	task::{Context, Poll},
	time::Instant,
};

use axum::{body::Body, http::Request, response::Response};
use futures::future::BoxFuture;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use tower::Service;

/// Process-wide metrics registry. Constructed once at startup iff
/// `Settings::enable_metrics` is set; held by the `Server` and passed
/// explicitly rather than through a global singleton. When metrics are
/// disabled no `Metrics` is ever built — callers hold `Option<Arc<Metrics>>`
/// and treat `None` as a silent no-op (a nil-handle guard), rather than
/// building a `Metrics` whose counters simply go unscraped.
pub struct Metrics {
	registry: Registry,
	notifications_total: IntCounterVec,
	success_total: IntCounterVec,
	success_with_ack_total: IntCounterVec,
	delivered_total: IntCounterVec,
	failure_total: IntCounterVec,
	failure_with_reason_total: IntCounterVec,
	removal_total: IntCounterVec,
	bad_request_total: IntCounter,
	apns_request_duration_seconds: Histogram,
	fcm_request_duration_seconds: Histogram,
	notification_duration_seconds: HistogramVec,
	request_duration_seconds: Histogram,
}

impl Metrics {
	/// Build and register every collector exposed on `/metrics`.
	pub fn new() -> Result<Self, prometheus::Error> {
		let registry = Registry::new();

		let notifications_total = IntCounterVec::new(
			Opts::new("service_notifications_total", "Dispatch attempts"),
			&["platform", "type"],
		)?;
		let success_total = IntCounterVec::new(
			Opts::new("service_success_total", "Successful vendor acknowledgements"),
			&["platform", "type"],
		)?;
		let success_with_ack_total = IntCounterVec::new(
			Opts::new(
				"service_success_with_ack_total",
				"Successes for messages that carried a non-empty ack id",
			),
			&["platform", "type"],
		)?;
		let delivered_total = IntCounterVec::new(
			Opts::new("service_delivered_total", "Delivery acknowledgements from /ack"),
			&["platform", "type"],
		)?;
		let failure_total = IntCounterVec::new(
			Opts::new("service_failure_total", "Non-success dispatch outcomes"),
			&["platform", "type"],
		)?;
		let failure_with_reason_total = IntCounterVec::new(
			Opts::new("service_failure_with_reason_total", "Non-success outcomes with a vendor reason"),
			&["platform", "type", "reason"],
		)?;
		let removal_total = IntCounterVec::new(
			Opts::new("service_removal_total", "Device-token-invalid signals"),
			&["platform", "reason"],
		)?;
		let bad_request_total =
			IntCounter::new("service_bad_request_total", "Malformed requests rejected pre-dispatch")?;
		let apns_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
			"service_apns_request_duration_seconds",
			"Latency of a single APNs send call",
		))?;
		let fcm_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
			"service_fcm_request_duration_seconds",
			"Latency of a single FCM send call",
		))?;
		let notification_duration_seconds = HistogramVec::new(
			HistogramOpts::new("service_notification_duration_seconds", "Latency of a whole dispatch"),
			&["platform"],
		)?;
		let request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
			"service_request_duration_seconds",
			"Wall time of the /send_push and /ack handlers",
		))?;

		registry.register(Box::new(notifications_total.clone()))?;
		registry.register(Box::new(success_total.clone()))?;
		registry.register(Box::new(success_with_ack_total.clone()))?;
		registry.register(Box::new(delivered_total.clone()))?;
		registry.register(Box::new(failure_total.clone()))?;
		registry.register(Box::new(failure_with_reason_total.clone()))?;
		registry.register(Box::new(removal_total.clone()))?;
		registry.register(Box::new(bad_request_total.clone()))?;
		registry.register(Box::new(apns_request_duration_seconds.clone()))?;
		registry.register(Box::new(fcm_request_duration_seconds.clone()))?;
		registry.register(Box::new(notification_duration_seconds.clone()))?;
		registry.register(Box::new(request_duration_seconds.clone()))?;

		Ok(Self {
			registry,
			notifications_total,
			success_total,
			success_with_ack_total,
			delivered_total,
			failure_total,
			failure_with_reason_total,
			removal_total,
			bad_request_total,
			apns_request_duration_seconds,
			fcm_request_duration_seconds,
			notification_duration_seconds,
			request_duration_seconds,
		})
	}

	/// Record a dispatch attempt, before the send is made.
	pub fn record_attempt(&self, platform: &str, push_type: &str) {
		self.notifications_total.with_label_values(&[platform, push_type]).inc();
	}

	/// Record a successful dispatch. `had_ack` also bumps `success_with_ack_total`.
	pub fn record_success(&self, platform: &str, push_type: &str, had_ack: bool) {
		self.success_total.with_label_values(&[platform, push_type]).inc();
		if had_ack {
			self.success_with_ack_total.with_label_values(&[platform, push_type]).inc();
		}
	}

	/// Record a delivery acknowledgement received on `/ack`.
	pub fn record_delivered(&self, platform: &str, push_type: &str) {
		self.delivered_total.with_label_values(&[platform, push_type]).inc();
	}

	/// Record a non-success outcome. `reason`, if given, also bumps
	/// `failure_with_reason_total`.
	pub fn record_failure(&self, platform: &str, push_type: &str, reason: Option<&str>) {
		self.failure_total.with_label_values(&[platform, push_type]).inc();
		if let Some(reason) = reason {
			self.failure_with_reason_total.with_label_values(&[platform, push_type, reason]).inc();
		}
	}

	/// Record a device-token-invalid signal. This always also
	/// counts as a failure.
	pub fn record_removal(&self, platform: &str, push_type: &str, reason: &str) {
		self.removal_total.with_label_values(&[platform, reason]).inc();
		self.record_failure(platform, push_type, Some(reason));
	}

	/// Record a pre-dispatch rejection (malformed body or missing field).
	pub fn record_bad_request(&self) {
		self.bad_request_total.inc();
	}

	/// Observe the latency of a single APNs send call.
	pub fn observe_apns_request(&self, seconds: f64) {
		self.apns_request_duration_seconds.observe(seconds);
	}

	/// Observe the latency of a single FCM send call.
	pub fn observe_fcm_request(&self, seconds: f64) {
		self.fcm_request_duration_seconds.observe(seconds);
	}

	/// Observe the latency of a whole dispatch, including retries.
	pub fn observe_notification(&self, platform: &str, seconds: f64) {
		self.notification_duration_seconds.with_label_values(&[platform]).observe(seconds);
	}

	/// Observe the wall time of a `/send_push` or `/ack` handler.
	pub fn observe_request(&self, seconds: f64) {
		self.request_duration_seconds.observe(seconds);
	}

	/// Render the current state in Prometheus text exposition format.
	pub fn gather(&self) -> String {
		use prometheus::{Encoder, TextEncoder};

		let encoder = TextEncoder::new();
		let metric_families = self.registry.gather();
		let mut buffer = Vec::new();
		encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
		String::from_utf8(buffer).unwrap_or_default()
	}

	/// Drop this registry's collectors. Each `Metrics` owns a private
	/// `Registry::new()` rather than the process-wide default registry, so
	/// there is nothing to unregister from a shared namespace; dropping the
	/// last `Arc<Metrics>` is sufficient for a test to build a fresh one on
	/// the same collector names without a "duplicate metric" registration
	/// error.
	pub fn shutdown(&self) {}
}

/// Records `service_request_duration_seconds` around the handler it wraps.
/// Mounted only on `/send_push` and `/ack`, and only when metrics are enabled.
#[derive(Clone)]
pub struct ResponseTimeLayer {
	metrics: Arc<Metrics>,
}

impl ResponseTimeLayer {
	/// Build a layer that records handler latency into `metrics`.
	#[must_use]
	pub fn new(metrics: Arc<Metrics>) -> Self {
		Self { metrics }
	}
}

impl<S> tower::Layer<S> for ResponseTimeLayer {
	type Service = ResponseTimeService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		ResponseTimeService { inner, metrics: self.metrics.clone() }
	}
}

/// `tower::Service` produced by [`ResponseTimeLayer`].
#[derive(Clone)]
pub struct ResponseTimeService<S> {
	inner: S,
	metrics: Arc<Metrics>,
}

impl<S> Service<Request<Body>> for ResponseTimeService<S>
where
	S: Service<Request<Body>, Response = Response> + Send + 'static,
	S::Future: Send + 'static,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, req: Request<Body>) -> Self::Future {
		let start = Instant::now();
		let future = self.inner.call(req);
		let metrics = self.metrics.clone();

		Box::pin(async move {
			let resp = future.await?;
			metrics.observe_request(start.elapsed().as_secs_f64());
			Ok(resp)
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn success_with_ack_also_counts_as_success() {
		let metrics = Metrics::new().expect("metrics construction");
		metrics.record_success("apple", "message", true);
		assert_eq!(metrics.success_total.with_label_values(&["apple", "message"]).get(), 1);
		assert_eq!(metrics.success_with_ack_total.with_label_values(&["apple", "message"]).get(), 1);
	}

	#[test]
	fn removal_also_counts_as_failure() {
		let metrics = Metrics::new().expect("metrics construction");
		metrics.record_removal("apple", "message", "Unregistered");
		assert_eq!(metrics.removal_total.with_label_values(&["apple", "Unregistered"]).get(), 1);
		assert_eq!(metrics.failure_total.with_label_values(&["apple", "message"]).get(), 1);
	}
}
