pub mod artifact;
pub mod handle;
pub mod node;

pub use artifact::{ArtifactResolver, Compiler, ContractArtifact, SolcCompiler};
pub use foundry_compilers::artifacts::CompilerOutput;
pub use handle::ContractHandle;
pub use node::{ChainClient, ClientError, HttpChainClient, Receipt, TransactionParams};
