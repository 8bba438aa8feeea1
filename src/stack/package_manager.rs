//! Node package manager selection and `package.json` inspection

use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Bun,
}

impl PackageManager {
    /// Picks the package manager whose lockfile is present, npm otherwise
    pub fn detect(source_dir: &Path) -> Self {
        if source_dir.join("pnpm-lock.yaml").is_file() {
            PackageManager::Pnpm
        } else if source_dir.join("yarn.lock").is_file() {
            PackageManager::Yarn
        } else if source_dir.join("bun.lockb").is_file() || source_dir.join("bun.lock").is_file() {
            PackageManager::Bun
        } else {
            PackageManager::Npm
        }
    }

    pub fn binary(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Bun => "bun",
        }
    }

    /// Reproducible install when a lockfile pins versions
    pub fn install_command(&self, source_dir: &Path) -> String {
        match self {
            PackageManager::Npm if source_dir.join("package-lock.json").is_file() => {
                "npm ci".to_string()
            }
            PackageManager::Npm => "npm install".to_string(),
            PackageManager::Yarn => "yarn install --frozen-lockfile".to_string(),
            PackageManager::Pnpm => "pnpm install --frozen-lockfile".to_string(),
            PackageManager::Bun => "bun install --frozen-lockfile".to_string(),
        }
    }

    pub fn run_script(&self, script: &str) -> String {
        format!("{} run {}", self.binary(), script)
    }
}

/// Parsed `package.json`
#[derive(Debug, Clone)]
pub struct PackageManifest {
    value: Value,
}

impl PackageManifest {
    /// Reads `package.json` from `source_dir`; missing or unparsable yields `None`
    pub fn read(source_dir: &Path) -> Option<Self> {
        let content = fs::read_to_string(source_dir.join("package.json")).ok()?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(content).ok()?;
        value.is_object().then_some(Self { value })
    }

    pub fn name(&self) -> Option<&str> {
        self.value["name"].as_str()
    }

    pub fn has_script(&self, script: &str) -> bool {
        self.value["scripts"][script].is_string()
    }

    /// Checks `dependencies` and `devDependencies`
    pub fn has_dependency(&self, name: &str) -> bool {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| self.value[*section].get(name).is_some())
    }
}
