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

//! # Policy Parser
//!
//! Turns a policy file into [`PolicyGroup`]s. Parsing is all or nothing: a
//! single bad section rejects the whole file.

use crate::common::{Bearer, Config, ConnectionType, RoamingPolicy, SessionId};
use crate::error::{PolicyError, Result};
use crate::keyfile::KeyFile;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::path::Path;

const KEY_IDENTITY: &str = "selinux";
const KEY_PRIORITY: &str = "Priority";
const KEY_ROAMING_POLICY: &str = "RoamingPolicy";
const KEY_CONNECTION_TYPE: &str = "ConnectionType";
const KEY_EMERGENCY_CALL: &str = "EmergencyCall";
const KEY_ALLOWED_BEARERS: &str = "AllowedBearers";

/// One named section of a policy file.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyGroup {
    /// Section name.
    pub name: String,
    /// SELinux type this group applies to.
    pub identity: String,
    /// Configuration handed to matching sessions.
    pub config: Config,
    pub(crate) bound_sessions: BTreeSet<SessionId>,
}

impl PolicyGroup {
    /// Sessions currently running with this group's configuration.
    pub fn bound_sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.bound_sessions.iter().copied()
    }
}

/// Extracts the type field from a security context such as
/// `unconfined_u:object_r:app_t:s0`, which yields `app_t`.
///
/// The type of a process label identifies the application after domain
/// transition, so it is used as the identity.
pub fn parse_selinux_type(context: &str) -> Result<String> {
    let context = context.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    let fields: Vec<&str> = context.split(':').collect();
    match fields.get(2) {
        Some(ty) if !ty.is_empty() => Ok(ty.to_string()),
        _ => Err(PolicyError::InvalidIdentity(context.to_string())),
    }
}

/// Policy files may name either a bare type or a full context.
fn normalize_identity(file: &str, group: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(PolicyError::parse(
            file,
            format!("group [{}] has an empty {}", group, KEY_IDENTITY),
        ));
    }
    if !value.contains(':') {
        return Ok(value.to_string());
    }
    parse_selinux_type(value)
        .map_err(|e| PolicyError::parse(file, format!("group [{}]: {}", group, e)))
}

fn parse_group(file: &str, keyfile: &KeyFile, group: &str) -> Result<PolicyGroup> {
    let value = keyfile.get_string(group, KEY_IDENTITY).ok_or_else(|| {
        PolicyError::parse(file, format!("group [{}] has no {} key", group, KEY_IDENTITY))
    })?;
    let identity = normalize_identity(file, group, value)?;

    let mut config = Config::default();
    config.priority = keyfile.get_bool(group, KEY_PRIORITY).unwrap_or(false);

    if let Some(s) = keyfile.get_string(group, KEY_ROAMING_POLICY) {
        match RoamingPolicy::parse(s) {
            Some(policy) => config.roaming_policy = policy,
            None => {
                warn!("{}: ignoring unknown {} {:?} in [{}]", file, KEY_ROAMING_POLICY, s, group)
            }
        }
    }

    if let Some(s) = keyfile.get_string(group, KEY_CONNECTION_TYPE) {
        match ConnectionType::parse(s) {
            Some(ty) => config.connection_type = ty,
            None => {
                warn!("{}: ignoring unknown {} {:?} in [{}]", file, KEY_CONNECTION_TYPE, s, group)
            }
        }
    }

    config.ecall = keyfile.get_bool(group, KEY_EMERGENCY_CALL).unwrap_or(false);

    if let Some(tokens) = keyfile.get_string_list(group, KEY_ALLOWED_BEARERS) {
        config.allowed_bearers.clear();
        for token in tokens {
            let bearer = Bearer::parse(token).ok_or_else(|| {
                let reason = format!("group [{}] has unknown bearer {:?}", group, token);
                PolicyError::parse(file, reason)
            })?;
            config.allow_bearer(bearer);
        }
    }

    debug!("{}: group [{}] identity {}", file, group, identity);

    Ok(PolicyGroup { name: group.to_string(), identity, config, bound_sessions: BTreeSet::new() })
}

fn parse_groups(file: &str, keyfile: &KeyFile) -> Result<Vec<PolicyGroup>> {
    keyfile.groups().map(|group| parse_group(file, keyfile, group)).collect()
}

/// Parses policy file `contents`. `file` names the source in errors.
pub fn parse_str(file: &str, contents: &str) -> Result<Vec<PolicyGroup>> {
    parse_groups(file, &KeyFile::parse(file, contents)?)
}

/// Reads and parses the policy file at `path`.
pub fn parse_file(path: &Path) -> Result<Vec<PolicyGroup>> {
    let keyfile = KeyFile::load(path)?;
    let file = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    parse_groups(&file, &keyfile)
}
