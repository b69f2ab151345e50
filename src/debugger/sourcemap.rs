//! Source id canonicalization between the IDE and the VM.
//!
//! VM chunks name files as `@path/to/file.lua`; the IDE speaks client
//! filesystem paths. Both are folded into one normalized form that keys the
//! breakpoint set, and an optional `sourceMap` from the launch arguments
//! rewrites prefixes when the debuggee runs against relocated sources.

use serde_json::Value;

/// Prefix-rewriting converter built from DAP `launch` arguments.
#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    /// `(normalized client prefix, raw vm prefix)`, longest prefix first.
    client_to_vm: Vec<(String, String)>,
    /// `(normalized vm prefix, raw client prefix)`, longest prefix first.
    vm_to_client: Vec<(String, String)>,
    /// Launch-time working directory; VM chunk ids are usually relative
    /// to it while the IDE sends absolute paths.
    workingdir: String,
}

impl SourceMap {
    /// Convention in the launch arguments: key = vm prefix, value = client
    /// prefix. Missing or malformed entries are skipped.
    pub fn from_launch_args(arguments: &Value) -> SourceMap {
        let mut map = SourceMap::default();
        let Some(Value::Object(entries)) = arguments.get("sourceMap") else {
            return map;
        };

        for (vm_prefix, client_prefix) in entries {
            let Some(client_prefix) = client_prefix.as_str() else {
                continue;
            };
            map.vm_to_client
                .push((norm_prefix(vm_prefix), client_prefix.to_string()));
            map.client_to_vm
                .push((norm_prefix(client_prefix), vm_prefix.to_string()));
        }

        // Longest prefix wins.
        map.vm_to_client.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        map.client_to_vm.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        map
    }

    pub fn set_workingdir(&mut self, dir: &str) {
        self.workingdir = normalize(dir).trim_end_matches('/').to_string();
    }

    /// Normalized breakpoint key for a client path.
    pub fn key_for_client(&self, client_path: &str) -> String {
        let key = normalize(&apply(&self.client_to_vm, client_path));
        if !self.workingdir.is_empty() {
            if let Some(relative) = key
                .strip_prefix(&self.workingdir)
                .and_then(|rest| rest.strip_prefix('/'))
            {
                return relative.to_string();
            }
        }
        key
    }

    /// Normalized breakpoint key for a raw VM chunk id.
    pub fn key_for_vm(&self, vm_source: &str) -> String {
        normalize(vm_source)
    }

    /// Client-facing path for a VM chunk id, for stack traces.
    pub fn client_path(&self, vm_source: &str) -> String {
        let path = apply(&self.vm_to_client, &normalize(vm_source));
        if !self.workingdir.is_empty() && is_relative(&path) {
            return format!("{}/{path}", self.workingdir);
        }
        path
    }
}

/// Canonical source id: chunk marker stripped, separators unified.
pub fn normalize(source: &str) -> String {
    source.strip_prefix('@').unwrap_or(source).replace('\\', "/")
}

/// True when the chunk id names a real file the client can open itself.
pub fn is_file_chunk(vm_source: &str) -> bool {
    vm_source.starts_with('@')
}

fn apply(mapping: &[(String, String)], path: &str) -> String {
    let normalized = normalize(path);
    for (from, to) in mapping {
        if let Some(suffix) = normalized.strip_prefix(from.as_str()) {
            let mut out = to.trim_end_matches(['/', '\\']).to_string();
            if !suffix.is_empty() {
                out.push('/');
                out.push_str(suffix);
            }
            return normalize(&out);
        }
    }
    normalized
}

fn is_relative(path: &str) -> bool {
    !path.starts_with('/') && !path.contains(':')
}

fn norm_prefix(prefix: &str) -> String {
    let mut out = normalize(prefix);
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}
