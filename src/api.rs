//! HTTP front-end and server lifecycle: route table, rate limiting, panic
//! recovery, and the startup/shutdown sequence described by the server
//! lifecycle component.

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
	backtrace::Backtrace,
	net::SocketAddr,
	num::NonZeroU32,
	sync::{Arc, Once},
	task::{Context, Poll},
	time::{Duration, Instant},
};

use axum::{
	body::Body,
	extract::Request,
	http::{HeaderName, StatusCode},
	response::Response,
	routing::{get, post},
	Router as AxumRouter,
};
use color_eyre::{
	eyre::{eyre, WrapErr},
	Report,
};
use futures::future::BoxFuture;
use tokio::{net::TcpListener, signal, time::sleep};
use tower::Service;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::KeyExtractor, GovernorError, GovernorLayer};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};
use tracing::{error, info, warn};

use crate::{
	handlers,
	metrics::{Metrics, ResponseTimeLayer},
	router::Router as Dispatcher,
	settings::Settings,
};

/// How long shutdown waits for in-flight handlers before forcing an exit.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Read/write timeout applied to every connection.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared state handed to every HTTP handler.
#[derive(Clone)]
pub struct AppState {
	/// the dispatch table, frozen before the listener binds
	pub router: Arc<Dispatcher>,
	/// the process-wide metrics registry; `None` when `Settings::enable_metrics`
	/// is unset, per spec's nil-handle guard — no registry is built and every
	/// increment call is skipped rather than recorded into an unscraped one
	pub metrics: Option<Arc<Metrics>>,
}

impl AppState {
	/// Whether `/metrics` and the response-time middleware should be mounted.
	#[must_use]
	pub fn metrics_enabled(&self) -> bool {
		self.metrics.is_some()
	}

	/// Nil-guarded `Metrics::record_bad_request`.
	pub fn record_bad_request(&self) {
		if let Some(metrics) = &self.metrics {
			metrics.record_bad_request();
		}
	}

	/// Nil-guarded `Metrics::record_delivered`.
	pub fn record_delivered(&self, platform: &str, push_type: &str) {
		if let Some(metrics) = &self.metrics {
			metrics.record_delivered(platform, push_type);
		}
	}

	/// Renders the current metrics snapshot, or an empty body when disabled.
	#[must_use]
	pub fn gather_metrics(&self) -> String {
		self.metrics.as_ref().map(|metrics| metrics.gather()).unwrap_or_default()
	}
}

/// Extracts the rate-limit bucket key from the headers named in
/// `Settings::throttle_vary_by_header`. Remote-address keying is never used,
/// per spec: requests with none of the configured headers all share one
/// bucket rather than falling back to the peer address.
#[derive(Clone)]
pub struct HeaderKeyExtractor {
	headers: Arc<Vec<HeaderName>>,
}

impl HeaderKeyExtractor {
	/// Build from the config's space-separated header list.
	#[must_use]
	pub fn new(vary_by_header: &str) -> Self {
		let headers = vary_by_header.split_whitespace().filter_map(|name| HeaderName::try_from(name).ok()).collect();
		Self { headers: Arc::new(headers) }
	}
}

impl KeyExtractor for HeaderKeyExtractor {
	type Key = String;

	fn extract<T>(&self, req: &axum::http::Request<T>) -> Result<Self::Key, GovernorError> {
		let key = self
			.headers
			.iter()
			.filter_map(|name| req.headers().get(name))
			.filter_map(|value| value.to_str().ok())
			.collect::<Vec<_>>()
			.join("\u{1f}");
		Ok(if key.is_empty() { "__global__".to_owned() } else { key })
	}
}

/// Logs `code=429 ip=<client>` for requests the rate limiter rejects.
/// Wraps the whole router, outside `GovernorLayer`, so it only needs to
/// inspect the response status the limiter already produced.
#[derive(Clone)]
struct ThrottleLogLayer;

impl<S> tower::Layer<S> for ThrottleLogLayer {
	type Service = ThrottleLogService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		ThrottleLogService { inner }
	}
}

#[derive(Clone)]
struct ThrottleLogService<S> {
	inner: S,
}

impl<S> Service<Request<Body>> for ThrottleLogService<S>
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
		let client = client_address(&req);
		let future = self.inner.call(req);

		Box::pin(async move {
			let response = future.await?;
			if response.status() == StatusCode::TOO_MANY_REQUESTS {
				warn!("code=429 ip={}", client);
			}
			Ok(response)
		})
	}
}

/// `X-Forwarded-For`, else `X-Real-IP`, else the TCP peer address.
fn client_address<B>(req: &Request<B>) -> String {
	req.headers()
		.get("x-forwarded-for")
		.and_then(|value| value.to_str().ok())
		.or_else(|| req.headers().get("x-real-ip").and_then(|value| value.to_str().ok()))
		.map(str::to_owned)
		.or_else(|| {
			req.extensions().get::<axum::extract::ConnectInfo<SocketAddr>>().map(|info| info.0.to_string())
		})
		.unwrap_or_else(|| "unknown".to_owned())
}

/// Installs a panic hook that logs the panic payload, its source location
/// and a captured stack trace via `tracing`, before `CatchPanicLayer` catches
/// the unwind and turns it into an HTTP 500. Idempotent: later calls are
/// no-ops, since `axum::serve` may be exercised by more than one test in the
/// same process.
fn install_panic_logging_hook() {
	static INSTALLED: Once = Once::new();
	INSTALLED.call_once(|| {
		let previous = std::panic::take_hook();
		std::panic::set_hook(Box::new(move |panic_info| {
			let backtrace = Backtrace::force_capture();
			error!("panic in request handler: {panic_info}\n{backtrace}");
			previous(panic_info);
		}));
	});
}

/// Build the full route table: public routes, the two dispatch endpoints
/// (optionally timed), and the cross-cutting layers (rate limit, panic
/// recovery, connection timeout).
pub fn create_router(state: AppState, settings: &Settings) -> Result<AxumRouter, Report> {
	install_panic_logging_hook();

	let burst_size = NonZeroU32::new(settings.throttle_per_sec).unwrap_or(NonZeroU32::MIN);
	let governor_conf = Arc::new(
		GovernorConfigBuilder::default()
			.period(Duration::from_secs(1) / burst_size.get())
			.burst_size(burst_size.get())
			.key_extractor(HeaderKeyExtractor::new(&settings.throttle_vary_by_header))
			.finish()
			.ok_or_else(|| eyre!("failed to build rate limiter configuration"))?,
	);

	// governor's keyed state has no built-in cardinality cap; approximate
	// `ThrottleMemoryStoreSize` by periodically evicting idle buckets instead.
	let cleanup_limiter = governor_conf.limiter().clone();
	let cleanup_interval = Duration::from_secs(60);
	tokio::spawn(async move {
		loop {
			sleep(cleanup_interval).await;
			cleanup_limiter.retain_recent();
		}
	});

	let mut send_push_route = post(handlers::send_push);
	let mut ack_route = post(handlers::ack);
	if let Some(metrics) = state.metrics.clone() {
		send_push_route = send_push_route.layer(ResponseTimeLayer::new(metrics.clone()));
		ack_route = ack_route.layer(ResponseTimeLayer::new(metrics));
	}

	let mut router = AxumRouter::new()
		.route("/", get(handlers::index))
		.route("/version", get(handlers::version))
		.route("/api/v1/send_push", send_push_route)
		.route("/api/v1/ack", ack_route);

	if state.metrics_enabled() {
		router = router.route("/metrics", get(handlers::metrics));
	}

	Ok(router
		.with_state(state)
		.layer(GovernorLayer { config: governor_conf })
		.layer(ThrottleLogLayer)
		.layer(CatchPanicLayer::new())
		.layer(TimeoutLayer::new(CONNECTION_TIMEOUT)))
}

/// Resolve a Go-style `":8066"` listen address (bind-all-interfaces) or a
/// fully qualified `host:port` into a `SocketAddr`.
fn parse_listen_address(listen_address: &str) -> Result<SocketAddr, Report> {
	let normalized =
		if let Some(port) = listen_address.strip_prefix(':') { format!("0.0.0.0:{port}") } else { listen_address.to_owned() };
	normalized.parse::<SocketAddr>().map_err(|err| eyre!("invalid listen address {listen_address:?}: {err}"))
}

/// Resolves once Ctrl+C or `SIGTERM` is received, then schedules a forced
/// exit after [`SHUTDOWN_GRACE_PERIOD`] in case in-flight handlers never
/// drain.
async fn shutdown_signal() {
	let ctrl_c = async {
		let _ = signal::ctrl_c().await;
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(err) => warn!("failed to install SIGTERM handler: {err}"),
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}

	info!("shutdown signal received, draining in-flight requests (up to {:?})", SHUTDOWN_GRACE_PERIOD);
	tokio::spawn(async move {
		sleep(SHUTDOWN_GRACE_PERIOD).await;
		warn!("graceful shutdown exceeded its deadline, forcing exit");
		std::process::exit(0);
	});
}

/// Construct every component from `settings`, bind the listener, and serve
/// until a shutdown signal is received. Never returns on a clean shutdown;
/// returns an error only if startup itself fails.
pub async fn run_server(settings: Settings) -> Result<(), Report> {
	let metrics = if settings.enable_metrics {
		Some(Arc::new(Metrics::new().wrap_err("failed to construct metrics registry")?))
	} else {
		None
	};
	let dispatcher = Arc::new(Dispatcher::build(&settings, metrics.clone()).await);

	let state = AppState { router: dispatcher, metrics: metrics.clone() };
	let router = create_router(state, &settings)?;

	let addr = parse_listen_address(&settings.listen_address)?;
	let listener = TcpListener::bind(addr).await.wrap_err_with(|| format!("failed to bind {addr}"))?;
	info!("Listening on {addr}");

	axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(shutdown_signal())
		.await
		.wrap_err("server error")?;

	if let Some(metrics) = metrics {
		metrics.shutdown();
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::time::Duration as StdDuration;

	use tokio::time;

	use super::*;
	use crate::settings::Log;

	fn test_settings(port: u16) -> Settings {
		Settings {
			listen_address: format!("127.0.0.1:{port}"),
			throttle_per_sec: 1000,
			throttle_memory_store_size: 1024,
			throttle_vary_by_header: String::new(),
			enable_metrics: true,
			send_timeout_sec: 30,
			retry_timeout_sec: 8,
			apple_push_settings: Vec::new(),
			android_push_settings: Vec::new(),
			log: Log::default(),
		}
	}

	#[tokio::test]
	async fn server_starts_and_stays_up() {
		let settings = test_settings(0);
		let server = tokio::spawn(run_server(settings));

		time::sleep(StdDuration::from_millis(200)).await;
		assert!(!server.is_finished());

		server.abort();
	}

	#[test]
	fn parse_listen_address_expands_go_style_colon_port() {
		let addr = parse_listen_address(":8066").expect("should parse");
		assert_eq!(addr, "0.0.0.0:8066".parse::<SocketAddr>().expect("literal parses"));
	}

	#[test]
	fn header_key_extractor_falls_back_to_global_bucket() {
		let extractor = HeaderKeyExtractor::new("x-tenant-id");
		let req = axum::http::Request::builder().body(()).expect("request builds");
		assert_eq!(extractor.extract(&req).expect("extraction succeeds"), "__global__");
	}

	#[test]
	fn header_key_extractor_reads_configured_header() {
		let extractor = HeaderKeyExtractor::new("x-tenant-id");
		let req = axum::http::Request::builder().header("x-tenant-id", "acme").body(()).expect("request builds");
		assert_eq!(extractor.extract(&req).expect("extraction succeeds"), "acme");
	}
}
