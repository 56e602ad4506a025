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

//! # Policy Engine
//!
//! This module provides the main public-facing API for the library.
//!
//! The `PolicyEngine` struct is the primary entry point for hosts that don't run
//! a Tokio runtime of their own. It encapsulates the `SessionPolicyLocal`.

use crate::common::{CreateReply, IdentityResolver, SessionId, SessionPolicy, SessionRuntime};
use crate::config::PolicyDirConfig;
use crate::session_policy::SessionPolicyLocal;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

/// The main engine that encapsulates all policy logic.
///
/// This struct is the primary entry point for the library.
pub struct PolicyEngine {
    /// The embedded `SessionPolicyLocal` that handles core logic.
    pub session_policy: SessionPolicyLocal,
    /// The Tokio runtime for the SessionPolicyLocal's async tasks.
    _runtime: Runtime,
}

impl PolicyEngine {
    /// Create a new PolicyEngine watching the policy directory in `config`.
    pub fn new(
        config: PolicyDirConfig,
        session_runtime: Arc<dyn SessionRuntime>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to create Tokio runtime for PolicyEngine")?;
        let session_policy = runtime
            .block_on(async move { SessionPolicyLocal::new(config, session_runtime, resolver) })?;

        Ok(Self { session_policy, _runtime: runtime })
    }
}

impl SessionPolicy for PolicyEngine {
    /// Requests the configuration of a new session.
    fn create(&mut self, session: SessionId) -> oneshot::Receiver<CreateReply> {
        self.session_policy.create(session)
    }

    /// Forgets a session.
    fn destroy(&mut self, session: SessionId) {
        self.session_policy.destroy(session);
    }
}
