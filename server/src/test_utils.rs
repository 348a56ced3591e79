use std::{
    collections::HashMap,
    fs::File,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use alloy::{
    consensus::{Transaction, TxEnvelope},
    dyn_abi::DynSolValue,
    primitives::{keccak256, Address, Bytes, B256},
    rpc::types::eth::TransactionRequest,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use woningpas::{
    client::{
        ArtifactResolver, ChainClient, ClientError, Compiler, CompilerOutput, Receipt,
        TransactionParams,
    },
    CONTRACT_NAME,
};

use crate::registry::{GasSettings, Registry};

/// First well-known development key and its address.
pub const PRIVATE_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const KEY_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const OTHER_ADDRESS: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

pub const ABI: &str = include_str!("../../contracts/woningpas/Woningpas.abi.json");
pub const BYTECODE: &str = "6080604052";

pub fn contract_address() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn deployed_address() -> Address {
    Address::repeat_byte(0xd1)
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature);
    [hash[0], hash[1], hash[2], hash[3]]
}

/// A node answering from a script and recording what it is sent.
pub struct MockNode {
    accounts: Vec<Address>,
    call_results: HashMap<[u8; 4], Bytes>,
    fail_params: bool,
    fail_sends: bool,
    revert: bool,
    receipt_gate: Option<Semaphore>,
    calls: Mutex<Vec<TransactionRequest>>,
    signed: Mutex<Vec<TxEnvelope>>,
    sent: Mutex<Vec<TransactionRequest>>,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            accounts: vec![KEY_ADDRESS.parse().unwrap()],
            call_results: HashMap::new(),
            fail_params: false,
            fail_sends: false,
            revert: false,
            receipt_gate: None,
            calls: Mutex::new(vec![]),
            signed: Mutex::new(vec![]),
            sent: Mutex::new(vec![]),
        }
    }

    /// Answers calls to `signature` with `outputs`, a tuple of return values.
    pub fn with_call_result(mut self, signature: &str, outputs: DynSolValue) -> Self {
        self.call_results
            .insert(selector(signature), outputs.abi_encode_params().into());
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn failing_params(mut self) -> Self {
        self.fail_params = true;
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn reverting(mut self) -> Self {
        self.revert = true;
        self
    }

    /// Receipts of signed transactions are held back until [`Self::release_receipt`].
    pub fn holding_receipts(mut self) -> Self {
        self.receipt_gate = Some(Semaphore::new(0));
        self
    }

    pub fn release_receipt(&self) {
        if let Some(gate) = &self.receipt_gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> Vec<TransactionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn signed(&self) -> Vec<TxEnvelope> {
        self.signed.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }

    fn receipt(
        &self,
        transaction_hash: B256,
        from: Address,
        to: Option<Address>,
        contract_address: Option<Address>,
    ) -> Receipt {
        Receipt {
            transaction_hash,
            block_hash: Some(B256::repeat_byte(0xbb)),
            block_number: Some(1),
            from,
            to,
            contract_address,
            status: !self.revert,
            gas_used: 21_000,
            cumulative_gas_used: 21_000,
            logs: vec![],
        }
    }
}

#[async_trait]
impl ChainClient for MockNode {
    async fn get_accounts(&self) -> Result<Vec<Address>, ClientError> {
        Ok(self.accounts.clone())
    }

    async fn call(&self, tx: TransactionRequest) -> Result<Bytes, ClientError> {
        self.calls.lock().unwrap().push(tx.clone());
        let input = tx.input.input().cloned().unwrap_or_default();
        if input.len() < 4 {
            return Err(ClientError::NodeError("empty call data".to_string()));
        }
        let selector = [input[0], input[1], input[2], input[3]];
        self.call_results
            .get(&selector)
            .cloned()
            .ok_or_else(|| ClientError::NodeError("execution reverted".to_string()))
    }

    async fn transaction_params(&self, _from: Address) -> Result<TransactionParams, ClientError> {
        if self.fail_params {
            return Err(ClientError::NodeError("connection refused".to_string()));
        }
        Ok(TransactionParams {
            nonce: 7,
            chain_id: 1337,
            gas_price: 1_000_000_000,
        })
    }

    async fn send_signed_transaction(&self, tx: TxEnvelope) -> Result<Receipt, ClientError> {
        let hash = *tx.tx_hash();
        let to = tx.to();
        self.signed.lock().unwrap().push(tx);
        if let Some(gate) = &self.receipt_gate {
            gate.acquire()
                .await
                .map_err(|e| ClientError::NodeError(e.to_string()))?
                .forget();
        }
        // Every signed transaction in tests comes from PRIVATE_KEY.
        Ok(self.receipt(hash, KEY_ADDRESS.parse().unwrap(), to, None))
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<Receipt, ClientError> {
        let from = tx.from.unwrap_or_default();
        self.sent.lock().unwrap().push(tx);
        if self.fail_sends {
            return Err(ClientError::NodeError("sender account not recognized".to_string()));
        }
        Ok(self.receipt(
            B256::repeat_byte(0xab),
            from,
            None,
            Some(deployed_address()),
        ))
    }
}

struct NoCompiler;

impl Compiler for NoCompiler {
    fn compile(&self, _file_name: &str, _source: &str) -> anyhow::Result<CompilerOutput> {
        anyhow::bail!("no compiler in tests")
    }
}

/// What solc would produce for the contract.
pub fn compiler_output() -> CompilerOutput {
    let abi: Value = serde_json::from_str(ABI).unwrap();
    serde_json::from_value(json!({
        "contracts": {
            format!("{CONTRACT_NAME}.sol"): {
                CONTRACT_NAME: {
                    "abi": abi,
                    "evm": { "bytecode": { "object": BYTECODE } }
                }
            }
        }
    }))
    .unwrap()
}

/// A contract directory holding a source and an up-to-date compiled cache.
pub fn contract_directory() -> (TempDir, ArtifactResolver) {
    let dir = tempfile::tempdir().unwrap();
    let resolver = ArtifactResolver::new(dir.path(), CONTRACT_NAME, Arc::new(NoCompiler));

    std::fs::write(resolver.source_path(), "contract Woningpas {}").unwrap();
    File::options()
        .write(true)
        .open(resolver.source_path())
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(60))
        .unwrap();

    std::fs::write(
        resolver.cache_path(),
        serde_json::to_vec(&compiler_output()).unwrap(),
    )
    .unwrap();

    (dir, resolver)
}

/// A registry bound to [`contract_address`] on `node`.
pub fn registry(node: Arc<MockNode>) -> (TempDir, Registry) {
    let (dir, resolver) = contract_directory();
    let registry = Registry::new(
        node,
        resolver,
        Some(contract_address()),
        GasSettings::default(),
    );
    (dir, registry)
}
