//
// Copyright (c) The Rove Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod northbound;

use std::sync::Arc;

use clap::{App, Arg};
use config::{Config, LoggingFmtStyle};
use northbound::{Northbound, Reply, Request, RequestSender};
use rove_utils::fp::NetFp;
use rove_utils::task::Task;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = rolling::never(&config.file.dir, &config.file.name);

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("rove=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

// Creates the instances described by the startup configuration through the
// same service surface a transport would use, then starts the RIP loops.
async fn bootstrap(api: &RequestSender, config: &Config, filename: &str) {
    let request = Request::ControlPlane(
        northbound::control_plane::CpRequest::CreateFromConfig {
            filename: filename.to_owned(),
        },
    );
    match call(api, request).await {
        Ok(Reply::Created { instance_id }) => {
            info!(%instance_id, "control plane instance created");
        }
        Ok(_) => unreachable!(),
        Err(error) => {
            error!(%error, "failed to create control plane instance");
            return;
        }
    }

    if config.rp_rip1.enabled {
        let request = Request::Rip1(northbound::rip1::Rip1Request::Run {
            id: "latest".to_owned(),
        });
        if let Err(error) = call(api, request).await {
            error!(%error, "failed to start RIP loops");
        }
    }

    if config.rp_sla.enabled {
        let request =
            Request::ControlPlane(northbound::control_plane::CpRequest::RpSlaEvaluate {
                id: "latest".to_owned(),
            });
        if let Err(error) = call(api, request).await {
            error!(%error, "initial SLA evaluation failed");
        }
    }
}

async fn call(
    api: &RequestSender,
    request: Request,
) -> Result<Reply, northbound::ApiError> {
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    api.send((request, reply_tx)).await.expect("service surface is gone");
    reply_rx.await.expect("service surface dropped the request")
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("Rove routing daemon")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config").unwrap_or(Config::DFLT_FILEPATH);
    let (config, config_loaded) = match Config::load(config_file) {
        Ok(config) => (config, true),
        Err(error) => {
            eprintln!("{error}");
            eprintln!("Falling back to default configuration...");
            (Config::default(), false)
        }
    };

    // Initialize tracing.
    init_tracing(&config.logging);

    // Set panic handler to abort the process if any child task panics.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    // We're ready to go!
    info!("starting up");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(async {
            let fp = Arc::new(NetFp::new());
            let nb = Arc::new(Northbound::new(fp));

            // Serve the request surface; a transport binds to `api`.
            let (api, requests) = Northbound::channel();
            let _server = Task::spawn(nb.clone().serve(requests));

            if config_loaded {
                bootstrap(&api, &config, config_file).await;
            }

            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for shutdown signal");
            info!("shutting down");
        });
}
