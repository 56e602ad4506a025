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

//! # Common
//!
//! This module contains the session configuration model and the traits at the
//! boundary between the policy engine and its host.

use crate::error::PolicyError;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::oneshot;

/// Identifier of a session owned by the host runtime.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A bearer technology a session may be allowed to use.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Bearer {
    /// Wildcard, any bearer.
    Any,
    Ethernet,
    Wifi,
    Bluetooth,
    Cellular,
    Vpn,
    Gadget,
}

impl Bearer {
    /// Parses a single bearer token as written in a policy file.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "*" => Some(Bearer::Any),
            "ethernet" => Some(Bearer::Ethernet),
            "wifi" => Some(Bearer::Wifi),
            "bluetooth" => Some(Bearer::Bluetooth),
            "cellular" => Some(Bearer::Cellular),
            "vpn" => Some(Bearer::Vpn),
            "gadget" => Some(Bearer::Gadget),
            _ => None,
        }
    }
}

/// Which kind of connectivity a session asks for.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnectionType {
    Any,
    Local,
    Internet,
}

impl ConnectionType {
    /// Parses a connection type string. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "any" => Some(ConnectionType::Any),
            "local" => Some(ConnectionType::Local),
            "internet" => Some(ConnectionType::Internet),
            _ => None,
        }
    }
}

/// Whether a session may use roaming bearers.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RoamingPolicy {
    Default,
    Always,
    Forbidden,
    National,
    International,
}

impl RoamingPolicy {
    /// Parses a roaming policy string. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(RoamingPolicy::Default),
            "always" => Some(RoamingPolicy::Always),
            "forbidden" => Some(RoamingPolicy::Forbidden),
            "national" => Some(RoamingPolicy::National),
            "international" => Some(RoamingPolicy::International),
            _ => None,
        }
    }
}

/// The effective network configuration of a session or a policy group.
///
/// Every session and every group owns its own `Config`; applying a group to a
/// session copies the values, nothing is shared.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Config {
    /// Allowed bearers in order of preference, without duplicates.
    pub allowed_bearers: Vec<Bearer>,
    pub connection_type: ConnectionType,
    pub roaming_policy: RoamingPolicy,
    pub priority: bool,
    /// Emergency call session.
    pub ecall: bool,
}

impl Config {
    /// Overwrites every field of `self` with the values of `src`.
    pub fn copy_from(&mut self, src: &Config) {
        self.allowed_bearers.clone_from(&src.allowed_bearers);
        self.connection_type = src.connection_type;
        self.roaming_policy = src.roaming_policy;
        self.priority = src.priority;
        self.ecall = src.ecall;
    }

    /// Appends `bearer` unless it is already allowed.
    pub fn allow_bearer(&mut self, bearer: Bearer) {
        if !self.allowed_bearers.contains(&bearer) {
            self.allowed_bearers.push(bearer);
        }
    }
}

impl Default for Config {
    /// The built-in default: any bearer, any connection, default roaming.
    fn default() -> Self {
        Self {
            allowed_bearers: vec![Bearer::Any],
            connection_type: ConnectionType::Any,
            roaming_policy: RoamingPolicy::Default,
            priority: false,
            ecall: false,
        }
    }
}

/// Result of a session policy creation request.
#[derive(Debug)]
pub struct CreateReply {
    /// The configuration the session should run with.
    pub config: Config,
    /// Set when the owner's identity could not be determined. The session still
    /// runs with `config`, which is then the default configuration.
    pub error: Option<PolicyError>,
}

/// Operations the policy engine needs from the host's session runtime.
#[async_trait]
pub trait SessionRuntime: Send + Sync {
    /// Returns the owner of `session`, used as the key for identity resolution.
    fn get_owner(&self, session: SessionId) -> Option<String>;

    /// Pushes an updated configuration to `session`. An error means the session
    /// cannot run with `config` and will be destroyed.
    async fn config_update(&self, session: SessionId, config: &Config) -> Result<()>;

    /// Tears down `session`.
    fn destroy(&self, session: SessionId);

    /// The configuration applied to sessions without a matching policy.
    fn create_default_config(&self) -> Config {
        Config::default()
    }
}

/// Resolves the security context of a session owner.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Returns the raw security context of `owner`.
    async fn resolve(&self, owner: &str) -> Result<Vec<u8>>;
}

/// The policy provider contract exposed to the host.
pub trait SessionPolicy {
    /// Requests the policy configuration of a new session. The reply is delivered
    /// once the owner's identity has been resolved.
    fn create(&mut self, session: SessionId) -> oneshot::Receiver<CreateReply>;

    /// Forgets `session`. Safe to call while its creation is still pending.
    fn destroy(&mut self, session: SessionId);
}
