use alloy::{
    dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
    primitives::{Address, Bytes},
};
use serde_json::Value;
use thiserror::Error;

use super::artifact::ContractArtifact;

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("the contract is not deployed yet")]
    NotDeployed,

    #[error("this handle can only deploy the contract")]
    DeploymentOnly,

    #[error("this handle is bound to {0}, not to a deployment")]
    AlreadyDeployed(Address),

    #[error("unknown contract method {0}")]
    UnknownMethod(String),

    #[error("{method} expects {expected} arguments, got {got}")]
    ArgumentCount {
        method: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid value {value:?} for argument {name}: {source}")]
    InvalidArgument {
        name: String,
        value: String,
        source: alloy::dyn_abi::Error,
    },

    #[error(transparent)]
    Abi(#[from] alloy::dyn_abi::Error),
}

#[derive(Debug, Clone)]
enum Target {
    Address(Option<Address>),
    Deployment {
        bytecode: Bytes,
        constructor_args: Vec<String>,
    },
}

/// Builds calls against the contract interface, bound either to a deployed
/// address or to the bytecode of a deployment that has yet to happen.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    abi: JsonAbi,
    target: Target,
}

impl ContractHandle {
    /// A handle on the contract at `address`. Calls fail when there is no address yet.
    pub fn at(artifact: ContractArtifact, address: Option<Address>) -> Self {
        Self {
            abi: artifact.abi,
            target: Target::Address(address),
        }
    }

    /// A handle that can only produce the deployment code of the contract.
    pub fn for_deployment(artifact: ContractArtifact, constructor_args: Vec<String>) -> Self {
        Self {
            abi: artifact.abi,
            target: Target::Deployment {
                bytecode: artifact.bytecode,
                constructor_args,
            },
        }
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn address(&self) -> Result<Address, HandleError> {
        match &self.target {
            Target::Address(Some(address)) => Ok(*address),
            Target::Address(None) => Err(HandleError::NotDeployed),
            Target::Deployment { .. } => Err(HandleError::DeploymentOnly),
        }
    }

    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    pub fn deploy_code(&self) -> Result<Bytes, HandleError> {
        let Target::Deployment {
            bytecode,
            constructor_args,
        } = &self.target
        else {
            return Err(match self.target {
                Target::Address(Some(address)) => HandleError::AlreadyDeployed(address),
                _ => HandleError::NotDeployed,
            });
        };

        let mut code = bytecode.to_vec();
        match &self.abi.constructor {
            Some(constructor) => {
                let values = coerce_args("constructor", &constructor.inputs, constructor_args)?;
                code.extend(constructor.abi_encode_input(&values)?);
            }
            None if constructor_args.is_empty() => {}
            None => {
                return Err(HandleError::ArgumentCount {
                    method: "constructor".to_string(),
                    expected: 0,
                    got: constructor_args.len(),
                })
            }
        }
        Ok(code.into())
    }

    /// ABI-encodes a call, coercing each argument to the declared parameter type.
    pub fn encode_call<S: AsRef<str>>(&self, method: &str, args: &[S]) -> Result<Bytes, HandleError> {
        if let Target::Deployment { .. } = self.target {
            return Err(HandleError::DeploymentOnly);
        }
        let function = self.function(method, args.len())?;
        let values = coerce_args(method, &function.inputs, args)?;
        Ok(function.abi_encode_input(&values)?.into())
    }

    /// Decodes the return data of `method` into its positional values.
    pub fn decode_output(&self, method: &str, data: &[u8]) -> Result<Vec<Value>, HandleError> {
        let function = self
            .abi
            .function(method)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| HandleError::UnknownMethod(method.to_string()))?;
        let values = function.abi_decode_output(data)?;
        Ok(values.iter().map(to_json).collect())
    }

    fn function(&self, method: &str, arity: usize) -> Result<&Function, HandleError> {
        let overloads = self
            .abi
            .function(method)
            .ok_or_else(|| HandleError::UnknownMethod(method.to_string()))?;
        overloads
            .iter()
            .find(|f| f.inputs.len() == arity)
            .or_else(|| overloads.first())
            .ok_or_else(|| HandleError::UnknownMethod(method.to_string()))
    }
}

fn coerce_args<S: AsRef<str>>(
    method: &str,
    params: &[Param],
    args: &[S],
) -> Result<Vec<DynSolValue>, HandleError> {
    if params.len() != args.len() {
        return Err(HandleError::ArgumentCount {
            method: method.to_string(),
            expected: params.len(),
            got: args.len(),
        });
    }
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty: DynSolType = param.resolve()?;
            ty.coerce_str(arg.as_ref())
                .map_err(|source| HandleError::InvalidArgument {
                    name: param.name.clone(),
                    value: arg.as_ref().to_string(),
                    source,
                })
        })
        .collect()
}

/// Renders a decoded value the way JSON-RPC web clients hand them out:
/// integers as decimal strings, addresses checksummed, bytes as 0x-hex.
pub fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Address(address) => Value::String(address.to_checksum(None)),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(values)
        | DynSolValue::FixedArray(values)
        | DynSolValue::Tuple(values) => Value::Array(values.iter().map(to_json).collect()),
        other => Value::String(format!("{other:?}")),
    }
}
