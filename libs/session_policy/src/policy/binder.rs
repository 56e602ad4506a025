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

//! # Session Binder
//!
//! Tracks the policy configuration of every live session and keeps the
//! session <-> group references consistent. Both sides of a binding are always
//! updated together.

use crate::common::{Config, CreateReply, SessionId};
use crate::error::PolicyError;
use crate::parser::{parse_selinux_type, PolicyGroup};
use crate::registry::{GroupId, PolicyRegistry};
use log::{debug, info};
use std::collections::HashMap;

/// A configuration that has to be pushed to a session.
#[derive(Debug, PartialEq, Clone)]
pub struct SessionUpdate {
    pub session: SessionId,
    pub config: Config,
}

/// Policy state of one session.
#[derive(Debug)]
struct SessionBinding {
    config: Config,
    /// `None` when the owner's identity couldn't be determined. Such sessions
    /// are never rebound automatically.
    identity: Option<String>,
    group: Option<GroupId>,
}

/// The session -> policy configuration table.
pub struct SessionBinder {
    sessions: HashMap<SessionId, SessionBinding>,
    default_config: Config,
}

impl SessionBinder {
    /// Creates an empty binder. Unmatched sessions run with `default_config`.
    pub fn new(default_config: Config) -> Self {
        Self { sessions: HashMap::new(), default_config }
    }

    /// The configuration of sessions without a policy group.
    pub fn default_config(&self) -> &Config {
        &self.default_config
    }

    /// Copies the group's configuration into the binding and records the back
    /// reference in the group.
    fn bind(
        registry: &mut PolicyRegistry,
        session: SessionId,
        binding: &mut SessionBinding,
        id: GroupId,
    ) -> bool {
        let Some(group) = registry.group_mut(id) else {
            return false;
        };
        debug!("session {} group [{}]", session, group.name);
        group.bound_sessions.insert(session);
        binding.group = Some(id);
        binding.config.copy_from(&group.config);
        true
    }

    /// Records `session` once its owner's security context is known and returns
    /// the configuration it should start with.
    ///
    /// A failed resolution or a malformed context leaves the session on the
    /// default configuration and reports the error in the reply.
    pub fn attach(
        &mut self,
        registry: &mut PolicyRegistry,
        session: SessionId,
        context: Result<Vec<u8>, PolicyError>,
    ) -> CreateReply {
        if self.sessions.contains_key(&session) {
            debug!("session {} created again, dropping previous binding", session);
            self.destroy_session(registry, session);
        }

        let identity =
            context.and_then(|bytes| parse_selinux_type(&String::from_utf8_lossy(&bytes)));
        let mut binding = SessionBinding {
            config: self.default_config.clone(),
            identity: None,
            group: None,
        };

        let error = match identity {
            Ok(identity) => {
                debug!("session {} identity {}", session, identity);
                if let Some(id) = registry.lookup(&identity) {
                    Self::bind(registry, session, &mut binding, id);
                }
                binding.identity = Some(identity);
                None
            }
            Err(e) => {
                info!("session {} runs with the default policy: {}", session, e);
                Some(e)
            }
        };

        let config = binding.config.clone();
        self.sessions.insert(session, binding);
        CreateReply { config, error }
    }

    /// Forgets `session` and removes it from its group. Unknown sessions are
    /// ignored. Returns whether the session was known.
    pub fn destroy_session(&mut self, registry: &mut PolicyRegistry, session: SessionId) -> bool {
        let Some(binding) = self.sessions.remove(&session) else {
            return false;
        };
        debug!("session {} destroyed", session);
        if let Some(group) = binding.group.and_then(|id| registry.group_mut(id)) {
            group.bound_sessions.remove(&session);
        }
        true
    }

    /// Moves every session bound to one of the removed `groups` back to the
    /// default configuration. Returns the updates to push, one per session.
    pub fn detach(&mut self, groups: Vec<(GroupId, PolicyGroup)>) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        for (id, group) in groups {
            for session in group.bound_sessions {
                let Some(binding) = self.sessions.get_mut(&session) else {
                    continue;
                };
                if binding.group != Some(id) {
                    continue;
                }
                debug!("session {} detached from [{}]", session, group.name);
                binding.group = None;
                binding.config.copy_from(&self.default_config);
                updates.push(SessionUpdate { session, config: binding.config.clone() });
            }
        }
        updates
    }

    /// Binds every unmatched session with a known identity for which a group
    /// is available now. Returns the updates to push.
    pub fn recheck_unmatched(&mut self, registry: &mut PolicyRegistry) -> Vec<SessionUpdate> {
        let mut candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, b)| b.group.is_none() && b.identity.is_some())
            .map(|(session, _)| *session)
            .collect();
        candidates.sort();

        let mut updates = Vec::new();
        for session in candidates {
            let Some(binding) = self.sessions.get_mut(&session) else {
                continue;
            };
            let Some(id) = binding.identity.as_deref().and_then(|i| registry.lookup(i)) else {
                continue;
            };
            if Self::bind(registry, session, binding, id) {
                updates.push(SessionUpdate { session, config: binding.config.clone() });
            }
        }
        updates
    }

    /// Forgets all sessions.
    pub fn clear(&mut self, registry: &mut PolicyRegistry) {
        let sessions: Vec<SessionId> = self.sessions.keys().copied().collect();
        for session in sessions {
            self.destroy_session(registry, session);
        }
    }

    /// Current configuration of `session`.
    pub fn config(&self, session: SessionId) -> Option<&Config> {
        self.sessions.get(&session).map(|b| &b.config)
    }

    /// Identity resolved for `session`.
    pub fn identity(&self, session: SessionId) -> Option<&str> {
        self.sessions.get(&session).and_then(|b| b.identity.as_deref())
    }

    /// Group `session` is bound to, if any.
    pub fn bound_group(&self, session: SessionId) -> Option<GroupId> {
        self.sessions.get(&session).and_then(|b| b.group)
    }

    /// Whether `session` is known.
    pub fn contains(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    /// Number of known sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is known.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
