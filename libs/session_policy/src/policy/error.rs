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

//! # Errors
//!
//! Error taxonomy for policy loading and session binding.
//!
//! Parse and I/O errors are scoped to a single policy file and never abort a
//! directory scan. Identity errors are reported to the creator of a session,
//! which then runs under the default configuration. A rejected configuration
//! push tears down only the affected session.

use crate::common::SessionId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// Errors reported by the policy engine.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy file is malformed or lacks a required key.
    #[error("failed to parse policy file {file}: {reason}")]
    Parse {
        /// File name or path of the offending policy file.
        file: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A policy file or directory could not be accessed.
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// A policy file is loaded again without being removed first.
    #[error("policy file {0} is already loaded")]
    AlreadyLoaded(String),

    /// The identity service could not resolve the session owner.
    #[error("identity resolution failed: {0}")]
    IdentityResolution(String),

    /// The resolved security context has too few fields to carry a type.
    #[error("invalid security context {0:?}")]
    InvalidIdentity(String),

    /// The session runtime refused an updated configuration.
    #[error("session {0} rejected its configuration update")]
    ConfigPushRejected(SessionId),

    /// The session runtime does not know the owner of a session.
    #[error("session {0} has no owner")]
    UnknownOwner(SessionId),
}

impl PolicyError {
    /// Builds a [`PolicyError::Parse`] for `file`.
    pub fn parse(file: impl Into<String>, reason: impl Into<String>) -> Self {
        PolicyError::Parse { file: file.into(), reason: reason.into() }
    }
}
