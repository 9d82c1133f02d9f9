//! RunConfig - `ipcq run` の設定
//!
//! JSON ファイル（任意）を読み、コマンドラインで指定された値だけ上書きします。

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use clap::ValueEnum;
use ipcq_core::LoopConfig;
use serde::{Deserialize, Serialize};

/// Which bundled event loop drains the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Thread,
    Tokio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub backend: Backend,
    pub producers: usize,
    /// Actions pushed by each producer.
    pub actions: usize,
    /// Upper bound of the random pause between two pushes.
    pub jitter_us: u64,
    pub timeout_ms: u64,
    pub event_loop: LoopConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Thread,
            producers: 4,
            actions: 1_000,
            jitter_us: 0,
            timeout_ms: 10_000,
            event_loop: LoopConfig::default(),
        }
    }
}

/// Values given on the command line; `None` keeps the file/default value.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub backend: Option<Backend>,
    pub producers: Option<usize>,
    pub actions: Option<usize>,
    pub jitter_us: Option<u64>,
    pub timeout_ms: Option<u64>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if let Some(producers) = overrides.producers {
            self.producers = producers;
        }
        if let Some(actions) = overrides.actions {
            self.actions = actions;
        }
        if let Some(jitter_us) = overrides.jitter_us {
            self.jitter_us = jitter_us;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.producers > 0, "producers must be at least 1");
        ensure!(self.timeout_ms > 0, "timeout_ms must be positive");
        ensure!(
            self.producers.checked_mul(self.actions).is_some(),
            "producers * actions overflows ({} * {})",
            self.producers,
            self.actions
        );
        Ok(())
    }

    /// Call after [`validate`](Self::validate), which rules out overflow.
    pub fn total_actions(&self) -> usize {
        self.producers * self.actions
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
