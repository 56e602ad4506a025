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

//! # Key File
//!
//! Minimal reader for the `[group]` / `key=value` key-file format used by policy
//! files. Comments start with `#` or `;`. Repeated groups are merged and a repeated key
//! keeps its last value.

use crate::error::{PolicyError, Result};
use log::warn;
use std::fs;
use std::path::Path;

#[derive(Debug)]
struct Group {
    name: String,
    entries: Vec<(String, String)>,
}

/// A parsed key file.
#[derive(Debug)]
pub struct KeyFile {
    groups: Vec<Group>,
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

impl KeyFile {
    /// Reads and parses the key file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|source| PolicyError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&path.display().to_string(), &contents)
    }

    /// Parses `contents`. `name` is only used in error messages.
    pub fn parse(name: &str, contents: &str) -> Result<Self> {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<usize> = None;

        for (lineno, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(['#', ';']) {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let group_name = header
                    .strip_suffix(']')
                    .filter(|n| !n.is_empty() && !n.contains(|c: char| c == '[' || c == ']'))
                    .ok_or_else(|| {
                        PolicyError::parse(
                            name,
                            format!("line {}: invalid group name {:?}", lineno + 1, line),
                        )
                    })?;
                current = match groups.iter().position(|g| g.name == group_name) {
                    Some(idx) => Some(idx),
                    None => {
                        groups.push(Group { name: group_name.to_string(), entries: Vec::new() });
                        Some(groups.len() - 1)
                    }
                };
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(PolicyError::parse(
                    name,
                    format!("line {}: not a key-value pair, group, or comment", lineno + 1),
                ));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(PolicyError::parse(name, format!("line {}: empty key", lineno + 1)));
            }
            let Some(idx) = current else {
                return Err(PolicyError::parse(name, "key file does not start with a group"));
            };

            let value = unescape(value.trim());
            let entries = &mut groups[idx].entries;
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key.to_string(), value)),
            }
        }

        Ok(Self { groups })
    }

    /// Group names in order of first appearance.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    /// Returns the value of `key` in `group`.
    pub fn get_string(&self, group: &str, key: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.name == group)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `key` in `group` split into whitespace separated items. An empty
    /// value gives an empty list.
    pub fn get_string_list(&self, group: &str, key: &str) -> Option<Vec<&str>> {
        self.get_string(group, key).map(|v| v.split_whitespace().collect())
    }

    /// Returns `key` in `group` as a boolean. Values other than `true`, `false`,
    /// `1` and `0` are logged and treated as missing.
    pub fn get_bool(&self, group: &str, key: &str) -> Option<bool> {
        match self.get_string(group, key)? {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            other => {
                warn!("Invalid boolean {:?} for {} in group [{}]", other, key, group);
                None
            }
        }
    }
}
