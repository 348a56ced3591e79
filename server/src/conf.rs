use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Conf {
    pub id: String,
    /// The log format to use - "json", "node" or "full" (default)
    pub log_format: String,
    /// JSON-RPC endpoint of the Ethereum node
    pub node_url: String,

    /// Name of the contract, and stem of its `.sol`, `.bin` and `.address` files
    pub contract_name: String,
    /// Directory holding the contract source, compiled cache and deployed address
    pub contract_directory: PathBuf,
    pub solc_path: PathBuf,

    pub rest_server_port: u16,
    pub rest_server_max_body_size: usize,

    /// Argument passed to the contract constructor on deployment
    pub constructor_argument: String,
    pub deploy_gas_limit: u64,
    /// Gas allowance of read-only calls
    pub call_gas: u64,
    pub verification_gas: u64,
    pub transaction_gas: u64,
}

impl Conf {
    pub fn new(config_files: Vec<String>) -> Result<Self, anyhow::Error> {
        let mut builder = Config::builder().add_source(File::from_str(
            include_str!("conf_defaults.toml"),
            config::FileFormat::Toml,
        ));
        // Later files override earlier ones; WONINGPAS_* variables override them all.
        for path in config_files {
            builder = builder.add_source(File::with_name(&path).required(false));
        }
        let conf: Self = builder
            .add_source(
                Environment::with_prefix("woningpas")
                    .separator("__")
                    .prefix_separator("_"),
            )
            .build()?
            .try_deserialize()?;
        Ok(conf)
    }
}
