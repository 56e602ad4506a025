// Copyright (C) 2025 The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Identity
//!
//! Resolves the security context of a session owner from procfs.

use crate::common::IdentityResolver;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;

/// Reads `/proc/<pid>/attr/current` for owners given as process ids.
#[derive(Clone, Debug)]
pub struct ProcAttrResolver {
    proc_path: PathBuf,
}

impl ProcAttrResolver {
    /// Creates a resolver reading the system's `/proc`.
    pub fn new() -> Self {
        Self::with_root_path(PathBuf::from("/"))
    }

    /// Creates a resolver reading `proc` under `root`.
    pub fn with_root_path(root: PathBuf) -> Self {
        Self { proc_path: root.join("proc") }
    }
}

impl Default for ProcAttrResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityResolver for ProcAttrResolver {
    async fn resolve(&self, owner: &str) -> Result<Vec<u8>> {
        let pid: u32 = owner.parse().map_err(|_| anyhow!("owner {:?} is not a process id", owner))?;
        let path = self.proc_path.join(pid.to_string()).join("attr/current");
        debug!("Reading security context of {} from {:?}", owner, path);
        tokio::fs::read(&path).await.with_context(|| format!("Failed to read {:?}", path))
    }
}
