use std::{str::FromStr, sync::Arc};

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, B256},
    rpc::types::eth::TransactionRequest,
    signers::local::{LocalSignerError, PrivateKeySigner},
};
use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};
use woningpas::{
    client::{
        handle::HandleError, ArtifactResolver, ChainClient, ClientError, ContractArtifact,
        ContractHandle, Receipt,
    },
    is_missing_record, methods, parse_result, MapperError, Record, DOCUMENT_FIELDS, HOUSE_FIELDS,
};

use crate::conf::Conf;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No item for this id")]
    NotFound,

    #[error("invalid private key: {0}")]
    InvalidKey(#[source] LocalSignerError),

    #[error("invalid argument: {0}")]
    InvalidArgument(#[source] HandleError),

    #[error("contract artifact unavailable: {0:#}")]
    Artifact(anyhow::Error),

    /// Node or contract failure. Only the operation name reaches the caller,
    /// the detail is logged.
    #[error("Error with {operation}")]
    Operation {
        operation: &'static str,
        #[source]
        source: OperationFailure,
    },
}

#[derive(Debug, Error)]
pub enum OperationFailure {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error(transparent)]
    Mapping(#[from] MapperError),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("transaction {0} reverted")]
    Reverted(B256),

    #[error("unexpected output: {0}")]
    UnexpectedOutput(String),
}

fn fail(operation: &'static str, source: impl Into<OperationFailure>) -> RegistryError {
    let source = source.into();
    error!(operation, "{source}");
    RegistryError::Operation { operation, source }
}

fn argument_error(operation: &'static str, err: HandleError) -> RegistryError {
    match err {
        HandleError::InvalidArgument { .. } | HandleError::ArgumentCount { .. } => {
            RegistryError::InvalidArgument(err)
        }
        err => fail(operation, err),
    }
}

fn account_from_key(private_key: &str) -> Result<PrivateKeySigner, RegistryError> {
    PrivateKeySigner::from_str(private_key.trim()).map_err(RegistryError::InvalidKey)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    /// Allowance of read-only calls
    pub call: u64,
    /// Limit of `setVerification` transactions
    pub verification: u64,
    /// Limit of every other transaction
    pub transaction: u64,
}

impl From<&Conf> for GasSettings {
    fn from(conf: &Conf) -> Self {
        Self {
            call: conf.call_gas,
            verification: conf.verification_gas,
            transaction: conf.transaction_gas,
        }
    }
}

impl Default for GasSettings {
    fn default() -> Self {
        Self {
            call: 5_000_000,
            verification: 500_000,
            transaction: 5_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgement {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentAdded {
    pub id: String,
}

/// Everything an operation needs to reach the contract.
///
/// The context never changes once built: a deployment hands out a new
/// context bound to the new address instead.
#[derive(Clone)]
pub struct Registry {
    client: Arc<dyn ChainClient>,
    artifacts: ArtifactResolver,
    address: Option<Address>,
    gas: GasSettings,
}

impl Registry {
    pub fn new(
        client: Arc<dyn ChainClient>,
        artifacts: ArtifactResolver,
        address: Option<Address>,
        gas: GasSettings,
    ) -> Self {
        Self {
            client,
            artifacts,
            address,
            gas,
        }
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn with_address(&self, address: Option<Address>) -> Self {
        Self {
            address,
            ..self.clone()
        }
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    pub fn artifacts(&self) -> &ArtifactResolver {
        &self.artifacts
    }

    /// Resolves the contract artifact, compiling it if needed, on a blocking thread.
    pub async fn artifact(&self) -> anyhow::Result<ContractArtifact> {
        let artifacts = self.artifacts.clone();
        tokio::task::spawn_blocking(move || artifacts.resolve())
            .await
            .context("joining artifact resolution")?
    }

    async fn handle(&self) -> Result<ContractHandle, RegistryError> {
        let artifact = self.artifact().await.map_err(RegistryError::Artifact)?;
        Ok(ContractHandle::at(artifact, self.address))
    }

    async fn read<S: AsRef<str>>(
        &self,
        operation: &'static str,
        method: &str,
        args: &[S],
        private_key: &str,
    ) -> Result<Vec<Value>, RegistryError> {
        info!(operation, "Calling {method}");
        let account = account_from_key(private_key)?;
        let handle = self.handle().await?;
        let address = handle.address().map_err(|e| fail(operation, e))?;
        let data = handle
            .encode_call(method, args)
            .map_err(|e| argument_error(operation, e))?;

        let tx = TransactionRequest::default()
            .with_from(account.address())
            .with_to(address)
            .with_input(data)
            .with_gas_limit(self.gas.call);
        let output = self.client.call(tx).await.map_err(|e| fail(operation, e))?;

        let values = handle
            .decode_output(method, &output)
            .map_err(|e| fail(operation, e))?;
        debug!(operation, ?values, "Call result");
        Ok(values)
    }

    /// Signs the call locally with `private_key` and waits for its inclusion.
    async fn write<S: AsRef<str>>(
        &self,
        operation: &'static str,
        method: &str,
        args: &[S],
        gas_limit: u64,
        private_key: &str,
    ) -> Result<Receipt, RegistryError> {
        info!(operation, "Sending {method}");
        let signer = account_from_key(private_key)?;
        let handle = self.handle().await?;
        let address = handle.address().map_err(|e| fail(operation, e))?;
        let data = handle
            .encode_call(method, args)
            .map_err(|e| argument_error(operation, e))?;

        let from = signer.address();
        let params = self
            .client
            .transaction_params(from)
            .await
            .map_err(|e| fail(operation, e))?;
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(address)
            .with_input(data)
            .with_gas_limit(gas_limit)
            .with_nonce(params.nonce)
            .with_chain_id(params.chain_id)
            .with_gas_price(params.gas_price);

        let wallet = EthereumWallet::from(signer);
        let envelope = tx
            .build(&wallet)
            .await
            .map_err(|e| fail(operation, OperationFailure::Signing(e.to_string())))?;
        debug!(operation, tx = %envelope.tx_hash(), "Submitting signed transaction");

        let receipt = self
            .client
            .send_signed_transaction(envelope)
            .await
            .map_err(|e| fail(operation, e))?;
        if !receipt.status {
            return Err(fail(
                operation,
                OperationFailure::Reverted(receipt.transaction_hash),
            ));
        }
        debug!(operation, ?receipt, "Transaction included");
        Ok(receipt)
    }

    async fn read_count<S: AsRef<str>>(
        &self,
        operation: &'static str,
        method: &str,
        args: &[S],
        private_key: &str,
    ) -> Result<Value, RegistryError> {
        let values = self.read(operation, method, args, private_key).await?;
        values.into_iter().next().ok_or_else(|| {
            fail(
                operation,
                OperationFailure::UnexpectedOutput(format!("{method} returned nothing")),
            )
        })
    }

    async fn read_record<S: AsRef<str>>(
        &self,
        operation: &'static str,
        method: &str,
        args: &[S],
        fields: &[&str],
        private_key: &str,
    ) -> Result<Record, RegistryError> {
        let values = self.read(operation, method, args, private_key).await?;
        if is_missing_record(&values) {
            return Err(RegistryError::NotFound);
        }
        parse_result(&values, fields).map_err(|e| fail(operation, e))
    }

    /// Whether document `file_id` of house `house_id` has been verified.
    pub async fn is_verified(
        &self,
        file_id: &str,
        house_id: &str,
        private_key: &str,
    ) -> Result<Verification, RegistryError> {
        const OPERATION: &str = "isVerified";
        let values = self
            .read(OPERATION, methods::IS_VERIFIED, &[file_id, house_id], private_key)
            .await?;
        match values.first() {
            Some(Value::Bool(validated)) => Ok(Verification {
                validated: *validated,
            }),
            other => Err(fail(
                OPERATION,
                OperationFailure::UnexpectedOutput(format!("{other:?}")),
            )),
        }
    }

    /// Marks document `file_id` of `owner`'s house as verified.
    pub async fn set_verification(
        &self,
        owner: &str,
        file_id: &str,
        house_id: &str,
        private_key: &str,
    ) -> Result<Verification, RegistryError> {
        self.write(
            "setVerification",
            methods::SET_VERIFICATION,
            &[owner, file_id, house_id],
            self.gas.verification,
            private_key,
        )
        .await?;
        Ok(Verification { validated: true })
    }

    pub async fn add_house(
        &self,
        street: &str,
        zip_code: &str,
        city: &str,
        country: &str,
        house_id: &str,
        private_key: &str,
    ) -> Result<Acknowledgement, RegistryError> {
        self.write(
            "addHouse",
            methods::ADD_HOUSE,
            &[street, zip_code, city, country, house_id],
            self.gas.transaction,
            private_key,
        )
        .await?;
        Ok(Acknowledgement {
            message: "Success".to_string(),
        })
    }

    /// Registers a document, unverified, with `time` as its `addedAt` timestamp.
    pub async fn add_document(
        &self,
        hash: &str,
        private_key: &str,
        file_id: &str,
        house_id: &str,
        time: u64,
    ) -> Result<DocumentAdded, RegistryError> {
        let time = time.to_string();
        self.write(
            "addDocument",
            methods::ADD_DOCUMENT,
            &[file_id, "false", hash, house_id, time.as_str()],
            self.gas.transaction,
            private_key,
        )
        .await?;
        Ok(DocumentAdded {
            id: file_id.to_string(),
        })
    }

    /// The `index`-th house of the caller, as returned by the contract.
    pub async fn get_house(&self, index: u64, private_key: &str) -> Result<Vec<Value>, RegistryError> {
        self.read(
            "getHouse",
            methods::GET_HOUSE,
            &[index.to_string()],
            private_key,
        )
        .await
    }

    /// Number of houses owned by the caller.
    pub async fn get_nb_houses(&self, private_key: &str) -> Result<Value, RegistryError> {
        self.read_count::<&str>("getNbHouses", methods::GET_HOUSE_NUMBER, &[], private_key)
            .await
    }

    /// Number of documents attached to `house_id`.
    pub async fn get_nb_doc(&self, private_key: &str, house_id: &str) -> Result<Value, RegistryError> {
        self.read_count(
            "getNbDoc",
            methods::GET_DOCUMENT_NUMBER,
            &[house_id],
            private_key,
        )
        .await
    }

    /// The `index`-th document of `house_id`, as returned by the contract.
    pub async fn get_document(
        &self,
        index: u64,
        private_key: &str,
        house_id: &str,
    ) -> Result<Vec<Value>, RegistryError> {
        self.read(
            "getDocument",
            methods::GET_DOCUMENT,
            &[house_id.to_string(), index.to_string()],
            private_key,
        )
        .await
    }

    pub async fn get_house_with_id(
        &self,
        house_id: &str,
        private_key: &str,
    ) -> Result<Record, RegistryError> {
        self.read_record(
            "getHouseWithId",
            methods::GET_HOUSE_WITH_ID,
            &[house_id],
            &HOUSE_FIELDS,
            private_key,
        )
        .await
    }

    pub async fn get_document_with_id(
        &self,
        owner: &str,
        house_id: &str,
        document_id: &str,
        private_key: &str,
    ) -> Result<Record, RegistryError> {
        self.read_record(
            "getDocumentWithId",
            methods::GET_DOCUMENT_WITH_ID,
            &[owner, document_id, house_id],
            &DOCUMENT_FIELDS,
            private_key,
        )
        .await
    }

    /// Hands `house_id` over from `from` to `to`. Returns the inclusion receipt.
    pub async fn transfer_ownership(
        &self,
        from: &str,
        to: &str,
        house_id: &str,
        private_key: &str,
    ) -> Result<Receipt, RegistryError> {
        debug!(from, to, house_id, "Transferring ownership");
        self.write(
            "transferOwnership",
            methods::TRANSFER_OWNERSHIP,
            &[from, to, house_id],
            self.gas.transaction,
            private_key,
        )
        .await
    }
}

/// A freshly generated key pair. Nothing is registered on the node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub address: Address,
    pub private_key: B256,
}

pub fn create_account() -> NewAccount {
    let signer = PrivateKeySigner::random();
    NewAccount {
        address: signer.address(),
        private_key: signer.to_bytes(),
    }
}
