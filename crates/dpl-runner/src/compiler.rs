use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use dpl_core::{canonical_hash, CompiledContract, Compiler};
use serde_json::{json, Value};

use crate::CompilerConfig;

/// Reads pre-built contract artifacts (`<root>/**/<Contract>.json` with `abi`
/// and `bytecode`), the shape common Solidity toolchains emit.
pub struct BuildArtifactsCompiler {
    root: PathBuf,
    settings: CompilerConfig,
}

impl BuildArtifactsCompiler {
    pub fn new(root: PathBuf, settings: CompilerConfig) -> Self {
        Self { root, settings }
    }

    pub fn artifact_path(&self, contract: &str) -> Result<PathBuf> {
        let file_name = format!("{contract}.json");
        let mut found = vec![];
        find_files(&self.root, &file_name, &mut found)?;
        found.sort();
        match found.len() {
            0 => Err(anyhow!("no {file_name} under {}", self.root.display())),
            1 => Ok(found.remove(0)),
            _ => Err(anyhow!(
                "{file_name} is ambiguous: {}",
                found.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

fn find_files(dir: &Path, file_name: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        bail!("artifacts dir {} does not exist", dir.display());
    }
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|n| n == "build-info") {
                continue;
            }
            find_files(&path, file_name, out)?;
        } else if path.file_name().is_some_and(|n| n == file_name) {
            out.push(path);
        }
    }
    Ok(())
}

fn bytecode_hex(artifact: &Value) -> Option<&str> {
    match artifact.get("bytecode")? {
        Value::String(s) => Some(s),
        Value::Object(o) => o.get("object")?.as_str(),
        _ => None,
    }
}

impl Compiler for BuildArtifactsCompiler {
    fn compile(&self, contract: &str) -> Result<CompiledContract> {
        let path = self.artifact_path(contract)?;
        let bytes = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let artifact: Value = serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;

        let abi = artifact.get("abi").filter(|a| a.is_array()).cloned().ok_or_else(|| anyhow!("{} has no abi array", path.display()))?;
        let code = bytecode_hex(&artifact).ok_or_else(|| anyhow!("{} has no bytecode", path.display()))?;
        let code = code.strip_prefix("0x").unwrap_or(code);
        if code.is_empty() {
            bail!("{} has empty bytecode (abstract contract or interface?)", path.display());
        }
        let bytecode = hex::decode(code).with_context(|| format!("decode bytecode in {}", path.display()))?;

        let bytecode_hash = canonical_hash(&json!({
            "bytecode": hex::encode(&bytecode),
            "compiler": {
                "version": self.settings.version,
                "optimizer": self.settings.optimizer,
                "runs": self.settings.runs,
            }
        }));
        tracing::debug!(contract, path = %path.display(), %bytecode_hash, "loaded build artifact");
        Ok(CompiledContract { name: contract.to_string(), bytecode, abi, bytecode_hash })
    }
}
