use alloy::{
    consensus::TxEnvelope,
    network::ReceiptResponse,
    primitives::{Address, Bytes, B256},
    providers::{PendingTransactionError, Provider, ProviderBuilder},
    rpc::types::eth::{Log, TransactionReceipt, TransactionRequest},
    transports::TransportError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ClientError {
    /// RPC error
    #[error(transparent)]
    RpcError(#[from] TransportError),

    /// The transaction was submitted but its receipt could not be obtained
    #[error(transparent)]
    PendingTransactionError(#[from] PendingTransactionError),

    /// URL parsing error
    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    /// The node answered, but not with what was asked for
    #[error("{0}")]
    NodeError(String),
}

/// Values the node has to provide before a transaction can be signed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionParams {
    pub nonce: u64,
    pub chain_id: u64,
    pub gas_price: u128,
}

/// Inclusion receipt of a transaction, with its emitted logs.
///
/// Bloom filter, effective gas price and blob fields are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub status: bool,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub logs: Vec<Log>,
}

impl From<TransactionReceipt> for Receipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_hash: receipt.block_hash,
            block_number: receipt.block_number,
            from: receipt.from,
            to: receipt.to,
            contract_address: receipt.contract_address,
            status: receipt.status(),
            gas_used: receipt.gas_used,
            cumulative_gas_used: receipt.cumulative_gas_used(),
            logs: receipt.inner.logs().to_vec(),
        }
    }
}

/// The node RPCs used by the registry.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Accounts managed (and unlocked) by the node itself.
    async fn get_accounts(&self) -> Result<Vec<Address>, ClientError>;

    /// Executes a read-only call and returns the raw return data.
    async fn call(&self, tx: TransactionRequest) -> Result<Bytes, ClientError>;

    /// Nonce of `from`, chain id and current gas price.
    async fn transaction_params(&self, from: Address) -> Result<TransactionParams, ClientError>;

    /// Submits a locally signed transaction and waits until it is included.
    async fn send_signed_transaction(&self, tx: TxEnvelope) -> Result<Receipt, ClientError>;

    /// Asks the node to sign and submit `tx` with one of its own accounts,
    /// then waits until it is included.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<Receipt, ClientError>;
}

/// A node reached over HTTP JSON-RPC.
pub struct HttpChainClient {
    pub url: Url,
    provider: Box<dyn Provider>,
}

impl HttpChainClient {
    /// Creates a client for the node at `url`. No request is made until the first call.
    pub fn new(url: &str) -> Result<Self, ClientError> {
        let url = Url::parse(url)?;
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(url.clone());
        Ok(Self {
            url,
            provider: Box::new(provider),
        })
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn get_accounts(&self) -> Result<Vec<Address>, ClientError> {
        Ok(self.provider.get_accounts().await?)
    }

    async fn call(&self, tx: TransactionRequest) -> Result<Bytes, ClientError> {
        Ok(self.provider.call(tx).await?)
    }

    async fn transaction_params(&self, from: Address) -> Result<TransactionParams, ClientError> {
        let nonce = self.provider.get_transaction_count(from).await?;
        let chain_id = self.provider.get_chain_id().await?;
        let gas_price = self.provider.get_gas_price().await?;
        Ok(TransactionParams {
            nonce,
            chain_id,
            gas_price,
        })
    }

    async fn send_signed_transaction(&self, tx: TxEnvelope) -> Result<Receipt, ClientError> {
        let pending = self.provider.send_tx_envelope(tx).await?;
        Ok(pending.get_receipt().await?.into())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<Receipt, ClientError> {
        let pending = self.provider.send_transaction(tx).await?;
        Ok(pending.get_receipt().await?.into())
    }
}
