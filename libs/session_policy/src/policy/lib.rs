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

//! # Session Policy Engine
//!
//! This crate assigns network configuration to sessions based on the SELinux
//! identity of the process owning them. Policies are key files in a watched
//! directory; adding, changing or removing a file re-evaluates the affected
//! sessions right away.
//!
//! All policy state is owned by a single background task which receives
//! directory events, session requests and the results of asynchronous identity
//! lookups and configuration pushes.
//!
//! The primary entry points are `PolicyEngine` and `SessionPolicyLocal`.

/// Tracks sessions and their bindings to policy groups.
pub mod binder;
/// Defines the configuration model and the host facing traits.
pub mod common;
/// Location of the policy directory.
pub mod config;
/// Applies directory events to the loaded policies.
pub mod coordinator;
/// Error types.
pub mod error;
/// Security context lookup through procfs.
pub mod identity;
/// Key file reader.
pub mod keyfile;
/// Policy file parser.
pub mod parser;
/// Provides the main public-facing API for the library.
pub mod policy_engine;
/// Loaded policy files and the identity index.
pub mod registry;
/// Implements the serialized policy service.
pub mod session_policy;

pub use dirwatch::{AsyncDirWatcher, WatchEvent, WatchEventKind};
