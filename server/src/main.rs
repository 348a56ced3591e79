use std::{process, sync::Arc};

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use clap::{Parser, ValueEnum};
use server::{
    app::{self, RouterCtx},
    conf::Conf,
    init::{self, ContractInit, DeployError},
    logger::setup_tracing,
    registry::{GasSettings, Registry},
};
use tracing::{error, info};
use woningpas::client::{ArtifactResolver, HttpChainClient, SolcCompiler};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum Mode {
    /// Deploy the contract and record its address
    Deploy,
    /// Serve the REST API against the recorded contract
    #[default]
    Serve,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(value_enum, default_value_t = Mode::Serve)]
    pub mode: Mode,

    #[arg(long, default_value = "config.toml")]
    pub config_file: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Conf::new(args.config_file).context("reading config file")?;

    setup_tracing(&config.log_format, config.id.clone()).context("setting up tracing")?;

    info!("Starting app with config: {:?}", &config);

    let client = Arc::new(HttpChainClient::new(&config.node_url).context("build node client")?);
    let artifacts = ArtifactResolver::new(
        &config.contract_directory,
        &config.contract_name,
        Arc::new(SolcCompiler::new(&config.solc_path)),
    );
    let address = init::load_deployed_address(&artifacts.address_path())?;
    let registry = Registry::new(client, artifacts, address, GasSettings::from(&config));

    match args.mode {
        Mode::Deploy => {
            let init = ContractInit {
                constructor_args: vec![config.constructor_argument.clone()],
                gas_limit: config.deploy_gas_limit,
            };
            match init::deploy_contract(&registry, init).await {
                Ok(_) => Ok(()),
                Err(DeployError::NoAccounts) => process::exit(1),
                Err(e) => {
                    error!("{e}");
                    Err(e.into())
                }
            }
        }
        Mode::Serve => serve(config, registry).await,
    }
}

async fn serve(config: Conf, registry: Registry) -> Result<()> {
    let router = app::router(RouterCtx {
        registry: Arc::new(registry),
        contract_name: config.contract_name.clone(),
    })
    .layer(DefaultBodyLimit::max(config.rest_server_max_body_size));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.rest_server_port))
        .await
        .with_context(|| format!("binding port {}", config.rest_server_port))?;
    info!("📡 Listening on port {}", config.rest_server_port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received, shutting down");
        })
        .await
        .context("running REST server")
}
