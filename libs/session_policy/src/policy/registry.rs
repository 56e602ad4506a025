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

//! # Policy Registry
//!
//! Owns the loaded policy files, their groups and the identity index used to
//! match sessions to groups.
//!
//! Groups live in an arena keyed by [`GroupId`]. Files and the index only hold
//! ids, so a removed group can never be reached through a stale reference.

use crate::config::PolicyDirConfig;
use crate::error::{PolicyError, Result};
use crate::parser::{self, PolicyGroup};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fs;

/// Stable handle of a loaded policy group.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct GroupId(u64);

/// A loaded policy file. Owns its groups.
#[derive(Debug, Default)]
struct PolicyFile {
    groups: Vec<GroupId>,
}

/// Loaded policies indexed by filename and by identity.
pub struct PolicyRegistry {
    config: PolicyDirConfig,
    files: HashMap<String, PolicyFile>,
    groups: HashMap<GroupId, PolicyGroup>,
    /// identity -> most recently loaded group for it
    index: HashMap<String, GroupId>,
    next_group_id: u64,
}

impl PolicyRegistry {
    /// Creates an empty registry for the policy directory in `config`.
    pub fn new(config: PolicyDirConfig) -> Self {
        Self {
            config,
            files: HashMap::new(),
            groups: HashMap::new(),
            index: HashMap::new(),
            next_group_id: 0,
        }
    }

    /// The policy directory configuration.
    pub fn config(&self) -> &PolicyDirConfig {
        &self.config
    }

    /// Parses `filename` from the policy directory and indexes its groups.
    ///
    /// The file must not be loaded already; callers reloading a file remove it
    /// first. On error nothing from the file is kept.
    pub fn load_file(&mut self, filename: &str) -> Result<()> {
        if self.files.contains_key(filename) {
            return Err(PolicyError::AlreadyLoaded(filename.to_string()));
        }
        let groups = parser::parse_file(&self.config.file_path(filename))?;
        self.insert_file(filename, groups);
        Ok(())
    }

    fn insert_file(&mut self, filename: &str, groups: Vec<PolicyGroup>) {
        let mut file = PolicyFile::default();
        for group in groups {
            let id = GroupId(self.next_group_id);
            self.next_group_id += 1;

            if let Some(previous) = self.index.insert(group.identity.clone(), id) {
                info!(
                    "{}: group [{}] replaces {:?} for {}",
                    filename, group.name, previous, group.identity
                );
            }
            debug!("{}: group [{}] loaded as {:?}", filename, group.name, id);
            self.groups.insert(id, group);
            file.groups.push(id);
        }
        self.files.insert(filename.to_string(), file);
    }

    /// Removes `filename` and all of its groups. Returns the removed groups
    /// together with the sessions still bound to them, which the caller must
    /// detach. Removing a file that isn't loaded does nothing.
    pub fn remove_file(&mut self, filename: &str) -> Vec<(GroupId, PolicyGroup)> {
        let Some(file) = self.files.remove(filename) else {
            return Vec::new();
        };
        debug!("Removing {} with {} groups", filename, file.groups.len());

        let mut removed = Vec::with_capacity(file.groups.len());
        for id in file.groups {
            if let Some(group) = self.groups.remove(&id) {
                self.unindex(id, &group.identity);
                removed.push((id, group));
            }
        }
        removed
    }

    /// Drops `id` from the index. A group of another file shadowed by `id`
    /// becomes reachable again.
    fn unindex(&mut self, id: GroupId, identity: &str) {
        if self.index.get(identity) != Some(&id) {
            return;
        }
        self.index.remove(identity);

        let shadowed =
            self.groups.iter().filter(|(_, g)| g.identity == identity).map(|(gid, _)| *gid).max();
        if let Some(next) = shadowed {
            info!("{:?} serves {} again", next, identity);
            self.index.insert(identity.to_string(), next);
        }
    }

    /// Removes every loaded file.
    pub fn clear(&mut self) -> Vec<(GroupId, PolicyGroup)> {
        let filenames: Vec<String> = self.files.keys().cloned().collect();
        filenames.iter().flat_map(|f| self.remove_file(f)).collect()
    }

    /// Finds the group currently serving `identity`.
    pub fn lookup(&self, identity: &str) -> Option<GroupId> {
        self.index.get(identity).copied()
    }

    /// Returns the group with `id`, if it is still loaded.
    pub fn group(&self, id: GroupId) -> Option<&PolicyGroup> {
        self.groups.get(&id)
    }

    pub(crate) fn group_mut(&mut self, id: GroupId) -> Option<&mut PolicyGroup> {
        self.groups.get_mut(&id)
    }

    /// Whether `filename` is currently loaded.
    pub fn is_loaded(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    /// Ids of the groups loaded from `filename`, in section order.
    pub fn file_groups(&self, filename: &str) -> Option<&[GroupId]> {
        self.files.get(filename).map(|f| f.groups.as_slice())
    }

    /// Number of loaded files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Loads every valid policy file in the policy directory. Files that fail
    /// to load are logged and skipped. Returns the number of files loaded.
    pub fn scan_directory(&mut self) -> usize {
        let dir = self.config.policy_dir().to_path_buf();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to read policy directory {:?}: {}", dir, e);
                return 0;
            }
        };

        let mut loaded = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to read entry of {:?}: {}", dir, e);
                    continue;
                }
            };
            let Some(filename) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !PolicyDirConfig::is_filename_valid(&filename) {
                continue;
            }
            match self.load_file(&filename) {
                Ok(()) => loaded += 1,
                Err(e) => error!("Skipping policy file {}: {}", filename, e),
            }
        }
        info!("Loaded {} policy files from {:?}", loaded, dir);
        loaded
    }
}
