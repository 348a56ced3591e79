use std::{
    fs, io,
    path::{Path, PathBuf},
};

use alloy::{
    network::TransactionBuilder, primitives::Address, rpc::types::eth::TransactionRequest,
};
use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{error, info};
use woningpas::client::ContractHandle;

use crate::registry::Registry;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Can't find accounts in the target node")]
    NoAccounts,

    #[error("contract artifact unavailable: {0:#}")]
    Artifact(anyhow::Error),

    #[error("Failed to deploy the smart contract. Error: {0}")]
    Failed(String),

    #[error("writing contract address to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct ContractInit {
    pub constructor_args: Vec<String>,
    pub gas_limit: u64,
}

/// Reads the address of a previous deployment, if there was one.
pub fn load_deployed_address(path: &Path) -> Result<Option<Address>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let address = content
                .trim()
                .parse::<Address>()
                .with_context(|| format!("parsing contract address in {}", path.display()))?;
            info!("Using contract at address {address}");
            Ok(Some(address))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No contract address yet");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// Deploys the contract from the node's first account, records its address
/// next to the source and returns a registry bound to it.
pub async fn deploy_contract(registry: &Registry, init: ContractInit) -> Result<Registry, DeployError> {
    let client = registry.client();
    let accounts = client
        .get_accounts()
        .await
        .map_err(|e| DeployError::Failed(e.to_string()))?;
    let Some(account) = accounts.first().copied() else {
        error!("Can't find accounts in the target node");
        return Err(DeployError::NoAccounts);
    };
    info!("Found account in the target node: {account}");

    let artifact = registry.artifact().await.map_err(DeployError::Artifact)?;
    let code = ContractHandle::for_deployment(artifact, init.constructor_args)
        .deploy_code()
        .map_err(|e| DeployError::Failed(e.to_string()))?;

    let tx = TransactionRequest::default()
        .with_from(account)
        .with_gas_price(0)
        .with_gas_limit(init.gas_limit)
        .with_deploy_code(code);

    info!("🚀 Deploying {} contract", registry.artifacts().contract_name());
    let receipt = client.send_transaction(tx).await.map_err(|e| {
        error!("Failed to deploy the smart contract. Error: {e}");
        DeployError::Failed(e.to_string())
    })?;
    if !receipt.status {
        return Err(DeployError::Failed(format!(
            "deployment transaction {} reverted",
            receipt.transaction_hash
        )));
    }
    let address = receipt
        .contract_address
        .ok_or_else(|| DeployError::Failed("the receipt carries no contract address".to_string()))?;

    let path = registry.artifacts().address_path();
    fs::write(&path, address.to_checksum(None))
        .map_err(|source| DeployError::Persist { path, source })?;
    info!("✅ Smart contract deployed, ready to take calls at \"{address}\"");

    Ok(registry.with_address(Some(address)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::{
        dyn_abi::DynSolValue,
        primitives::{TxKind, U256},
    };

    use super::*;
    use crate::test_utils::{
        contract_address, contract_directory, deployed_address, registry, MockNode, BYTECODE,
        PRIVATE_KEY,
    };

    fn init() -> ContractInit {
        ContractInit {
            constructor_args: vec!["10".to_string()],
            gas_limit: 5_000_000,
        }
    }

    #[tokio::test]
    async fn test_deploy_contract() {
        let node = Arc::new(MockNode::new().with_call_result(
            "getHouseNumber()",
            DynSolValue::Tuple(vec![DynSolValue::Uint(U256::from(0), 256)]),
        ));
        let (_dir, registry) = registry(node.clone());

        let deployed = deploy_contract(&registry, init()).await.unwrap();
        assert_eq!(deployed.address(), Some(deployed_address()));
        assert_eq!(registry.address(), Some(contract_address()));

        let content = fs::read_to_string(registry.artifacts().address_path()).unwrap();
        assert_eq!(content, deployed_address().to_checksum(None));

        let sent = node.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, Some(node_account()));
        assert_eq!(sent[0].gas_price, Some(0));
        assert_eq!(sent[0].gas, Some(5_000_000));
        assert_eq!(sent[0].to, Some(TxKind::Create));

        let mut expected = hex::decode(BYTECODE).unwrap();
        expected.extend(U256::from(10).to_be_bytes::<32>());
        assert_eq!(sent[0].input.input().unwrap().to_vec(), expected);

        deployed.get_nb_houses(PRIVATE_KEY).await.unwrap();
        assert_eq!(
            node.calls()[0].to,
            Some(TxKind::Call(deployed_address()))
        );
    }

    fn node_account() -> Address {
        crate::test_utils::KEY_ADDRESS.parse().unwrap()
    }

    #[tokio::test]
    async fn test_deploy_without_accounts() {
        let node = Arc::new(MockNode::new().with_accounts(vec![]));
        let (_dir, registry) = registry(node.clone());

        let err = deploy_contract(&registry, init()).await.err().unwrap();
        assert!(matches!(err, DeployError::NoAccounts));
        assert!(node.sent().is_empty());
        assert!(!registry.artifacts().address_path().exists());
    }

    #[tokio::test]
    async fn test_failed_deployment() {
        let node = Arc::new(MockNode::new().failing_sends());
        let (_dir, registry) = registry(node.clone());

        let err = deploy_contract(&registry, init()).await.err().unwrap();
        assert!(err
            .to_string()
            .starts_with("Failed to deploy the smart contract. Error: "));
        assert!(!registry.artifacts().address_path().exists());
    }

    #[test]
    fn test_load_deployed_address() {
        let (_dir, resolver) = contract_directory();
        let path = resolver.address_path();
        assert_eq!(load_deployed_address(&path).unwrap(), None);

        fs::write(&path, format!("{}\n", deployed_address().to_checksum(None))).unwrap();
        assert_eq!(
            load_deployed_address(&path).unwrap(),
            Some(deployed_address())
        );

        fs::write(&path, "not an address").unwrap();
        assert!(load_deployed_address(&path).is_err());
    }
}
