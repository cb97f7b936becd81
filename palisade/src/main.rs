// Copyright 2026 The Palisade Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use palisade::config;
use palisade::proxy;

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "palisade", about = "Inline data-masking filter for LLM chat traffic")]
struct Cli {
    /// Path to the palisade.json config file
    #[arg(long, default_value = "palisade.json", env = "PALISADE_CONFIG")]
    config: String,

    /// Port to listen on
    #[arg(long, default_value_t = 9810, env = "PALISADE_PORT")]
    port: u16,

    /// Base URL of the upstream completion API
    #[arg(long, env = "PALISADE_UPSTREAM")]
    upstream: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource {
        path: std::path::PathBuf::from(cli.config),
    };
    let config = match config::ReloadingConfig::new(Box::new(source)) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let upstream = Arc::new(proxy::ReqwestUpstream::new(cli.upstream.clone()));
    let app = proxy::build_router(upstream, config);

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    tracing::info!(%addr, upstream = %cli.upstream, "palisade starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "palisade listening");

    axum::serve(listener, app).await.expect("server error");
}
