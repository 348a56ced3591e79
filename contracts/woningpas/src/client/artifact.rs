use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use alloy::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::{anyhow, bail, Context, Result};
use foundry_compilers::{
    artifacts::{CompilerOutput, Settings, SolcInput, SolcLanguage, Source, Sources},
    solc::Solc,
};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Compiled contract: its interface description and creation bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractArtifact {
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Looks `contract_name` up in a compiler output.
    pub fn from_output(output: &CompilerOutput, contract_name: &str) -> Result<Self> {
        let contract = output
            .find(contract_name)
            .with_context(|| format!("contract {contract_name} not found in compiler output"))?;

        let abi = contract
            .abi
            .cloned()
            .with_context(|| format!("missing ABI for {contract_name}"))?;
        let bytecode = contract
            .bin
            .with_context(|| format!("missing bytecode for {contract_name}"))?
            .as_bytes()
            .cloned()
            .with_context(|| format!("bytecode of {contract_name} has unlinked libraries"))?;

        Ok(Self { abi, bytecode })
    }
}

/// Turns a Solidity source into the compiler's multi-contract output.
pub trait Compiler: Send + Sync {
    fn compile(&self, file_name: &str, source: &str) -> Result<CompilerOutput>;
}

/// Runs a local `solc` binary.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    pub solc: PathBuf,
}

impl SolcCompiler {
    pub fn new(solc: impl Into<PathBuf>) -> Self {
        Self { solc: solc.into() }
    }

    fn input(file_name: &str, source: &str) -> SolcInput {
        let mut sources = Sources::new();
        sources.insert(PathBuf::from(file_name), Source::new(source));

        let mut settings = Settings::default();
        settings.optimizer.enabled = Some(true);
        settings.optimizer.runs = Some(200);
        SolcInput::new(SolcLanguage::Solidity, sources, settings)
    }
}

impl Compiler for SolcCompiler {
    fn compile(&self, file_name: &str, source: &str) -> Result<CompilerOutput> {
        let solc = Solc::new(&self.solc)
            .with_context(|| format!("loading solc at {}", self.solc.display()))?;
        debug!("Compiling {file_name} with solc {}", solc.version);

        let output = solc
            .compile_exact(&Self::input(file_name, source))
            .map_err(|e| anyhow!("running solc: {e}"))?;
        if let Some(error) = output.errors.iter().find(|e| e.severity.is_error()) {
            bail!("solc compilation error: {error}");
        }
        Ok(output)
    }
}

/// Locates `<name>.sol` and its compiled cache `<name>.bin` in a directory,
/// recompiling the cache when the source changed.
#[derive(Clone)]
pub struct ArtifactResolver {
    directory: PathBuf,
    contract_name: String,
    compiler: Arc<dyn Compiler>,
}

impl ArtifactResolver {
    pub fn new(
        directory: impl Into<PathBuf>,
        contract_name: impl Into<String>,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        Self {
            directory: directory.into(),
            contract_name: contract_name.into(),
            compiler,
        }
    }

    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    pub fn source_file_name(&self) -> String {
        format!("{}.sol", self.contract_name)
    }

    pub fn source_path(&self) -> PathBuf {
        self.directory.join(self.source_file_name())
    }

    pub fn cache_path(&self) -> PathBuf {
        self.directory.join(format!("{}.bin", self.contract_name))
    }

    pub fn address_path(&self) -> PathBuf {
        self.directory.join(format!("{}.address", self.contract_name))
    }

    /// Returns the artifact, from the cache when it is at least as recent as the source.
    ///
    /// Blocking: async callers should run it on a blocking thread.
    pub fn resolve(&self) -> Result<ContractArtifact> {
        let source_path = self.source_path();
        let cache_path = self.cache_path();

        let source_modified = fs::metadata(&source_path)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading {}", source_path.display()))?;
        let cache_modified = fs::metadata(&cache_path).and_then(|m| m.modified()).ok();

        let output = match cache_modified {
            Some(cache_modified) if source_modified <= cache_modified => {
                debug!("Using compiled contract at {}", cache_path.display());
                read_output(&cache_path)?
            }
            Some(_) => {
                info!("{} changed since the last compilation", source_path.display());
                self.compile(&source_path, &cache_path)?
            }
            None => {
                info!("Compiled contract does not exist. Will be generated.");
                self.compile(&source_path, &cache_path)?
            }
        };

        ContractArtifact::from_output(&output, &self.contract_name)
    }

    fn compile(&self, source_path: &Path, cache_path: &Path) -> Result<CompilerOutput> {
        let source = fs::read_to_string(source_path)
            .with_context(|| format!("reading {}", source_path.display()))?;
        let output = self
            .compiler
            .compile(&self.source_file_name(), &source)
            .with_context(|| format!("compiling {}", source_path.display()))?;
        write_output(&self.directory, cache_path, &output)?;
        Ok(output)
    }
}

/// Replaces the cache in one rename, so readers never see a partial file.
fn write_output(directory: &Path, cache_path: &Path, output: &CompilerOutput) -> Result<()> {
    let mut file = NamedTempFile::new_in(directory)
        .with_context(|| format!("creating a temporary file in {}", directory.display()))?;
    file.write_all(&serde_json::to_vec(output)?)
        .with_context(|| format!("writing {}", file.path().display()))?;
    file.persist(cache_path)
        .with_context(|| format!("writing {}", cache_path.display()))?;
    Ok(())
}

fn read_output(path: &Path) -> Result<CompilerOutput> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))
}
