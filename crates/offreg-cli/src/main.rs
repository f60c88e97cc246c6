use std::sync::Arc;

use clap::{CommandFactory, Parser};
use cli::Args;
use error::{OffregError, OffregResult};
use logging::setup_logging;
use npm::{install_with_registry, Installer};
use offreg_config::config::{self, generate_default_config, get_config};
use offreg_core::{DirectoryBackend, Registry, TarballBackend};
use offreg_server::{Service, ServiceConfig};
use register::register_sources;
use tracing::info;

mod cli;
mod error;
mod logging;
mod npm;
mod register;
mod utils;

async fn handle_cli() -> OffregResult<()> {
    let mut args = Args::parse();
    if args.lift_own_flags() {
        return Args::command().print_help().map_err(|source| {
            OffregError::IoError {
                action: "printing help".into(),
                source,
            }
        });
    }

    if args.no_color {
        utils::disable_color();
    }

    setup_logging(&args);

    if let Some(ref c) = args.config {
        config::set_config_path(c)?;
    }

    if args.defconfig {
        let path = generate_default_config()?;
        info!("Default configuration written to {}", path.display());
        return Ok(());
    }

    config::init()?;
    let config = get_config();

    let mut registry = Registry::new(config.latest_policy());
    registry.add_backend(Arc::new(TarballBackend));
    registry.add_backend(Arc::new(DirectoryBackend));
    let registry = Arc::new(registry);

    let passthrough =
        register_sources(Arc::clone(&registry), args.args, config.concurrency()).await?;
    info!("Serving {} packages", registry.package_count());

    let service = Service::new(ServiceConfig::from(&config));
    let binding = service.run(Arc::clone(&registry)).await?;

    let result = if args.debug {
        info!("Registry listening on {}, press Ctrl-C to stop", binding.url);
        tokio::signal::ctrl_c()
            .await
            .map_err(|source| {
                OffregError::IoError {
                    action: "waiting for Ctrl-C".into(),
                    source,
                }
            })
    } else {
        let installer = Installer::new(config.installer());
        let result = install_with_registry(&installer, binding.url.as_str(), &passthrough).await;
        info!("{} done. Shutting down registry", config.installer());
        result
    };

    service.stop().await?;
    result
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
