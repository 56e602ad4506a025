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

use crate::error::{PolicyError, Result};
use log::info;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

const DEFAULT_STORAGE_ROOT: &str = "/var/lib/connman";
const POLICY_SUBDIR: &str = "session_policy_local";
/// Suffix a file needs to be considered a policy file.
pub const POLICY_SUFFIX: &str = ".policy";
/// rwxr-xr-x
const POLICY_DIR_MODE: u32 = 0o755;

/// `PolicyDirConfig` struct.
/// It holds the location of the watched policy directory.
#[derive(Clone, Debug)]
pub struct PolicyDirConfig {
    policy_dir: PathBuf,
}

impl PolicyDirConfig {
    /// Creates a new `PolicyDirConfig` under the default storage root.
    pub fn new() -> Self {
        Self::with_root_path(PathBuf::from(DEFAULT_STORAGE_ROOT))
    }

    /// Creates a `PolicyDirConfig` whose policy directory lives under `root`.
    pub fn with_root_path(root: PathBuf) -> Self {
        PolicyDirConfig { policy_dir: root.join(POLICY_SUBDIR) }
    }

    /// The watched policy directory.
    pub fn policy_dir(&self) -> &Path {
        &self.policy_dir
    }

    /// Full path of `filename` inside the policy directory.
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.policy_dir.join(filename)
    }

    /// Hidden files and files without the policy suffix are not policies.
    pub fn is_filename_valid(filename: &str) -> bool {
        !filename.starts_with('.') && filename.ends_with(POLICY_SUFFIX)
    }

    /// Creates the policy directory if it doesn't exist.
    pub fn ensure_directory(&self) -> Result<()> {
        if self.policy_dir.is_dir() {
            return Ok(());
        }
        match DirBuilder::new().mode(POLICY_DIR_MODE).create(&self.policy_dir) {
            Ok(()) => {
                info!("Created policy directory {:?}", self.policy_dir);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(source) => Err(PolicyError::Io { path: self.policy_dir.clone(), source }),
        }
    }
}

impl Default for PolicyDirConfig {
    fn default() -> Self {
        Self::new()
    }
}
