//! Process entry point: CLI parsing, logger construction, config loading,
//! and handing off to the server lifecycle in [`mattermost_push_proxy::api`].

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

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use mattermost_push_proxy::{api::run_server, handlers::VersionInfo, settings::Settings};
use tracing_subscriber::{fmt, EnvFilter};

/// Mattermost push notification proxy: dispatches outbound pushes to APNs
/// and FCM on behalf of Mattermost servers.
#[derive(Debug, Parser)]
#[command(name = "mattermost-push-proxy", about, disable_version_flag = true)]
struct Cli {
	/// Path to the JSON configuration file
	#[arg(long, default_value = "mattermost-push-proxy.json")]
	config: String,

	/// Print build/version information and exit
	#[arg(long)]
	version: bool,
}

#[allow(clippy::print_stdout)]
#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	let cli = Cli::parse();

	if cli.version {
		println!("{}", serde_json::to_string_pretty(&VersionInfo::current())?);
		return Ok(());
	}

	let config_path = Settings::find_config_file(&cli.config);
	let settings = Settings::load(&config_path)
		.wrap_err_with(|| format!("failed to load config from {}", config_path.display()))?;

	let filter = EnvFilter::try_new(&settings.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
	fmt().with_env_filter(filter).init();

	run_server(settings).await
}
