//! Override merging
//!
//! Handlers compute a base list of env vars, volume mounts, volumes and
//! arguments; users customize them through the override lists on their
//! `RbdComponent`. Merging is keyed and order-preserving:
//!
//! - base items keep their position; a base item whose key appears in the
//!   overrides is replaced by the override in place, at the first position
//!   the key occupies in the base (later base items with that key are dropped)
//! - overrides with keys absent from the base are appended in override order
//! - among overrides sharing a key the last one wins, so the result never
//!   holds two items with the same override key
//!
//! Nothing in the override list is ever dropped except an override shadowed
//! by a later one with the same key.

use std::collections::HashMap;
use std::hash::Hash;

use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};

/// Merge `overrides` into `base`, identifying items by `key`
pub fn merge_by_key<T, K, F>(base: Vec<T>, overrides: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    if overrides.is_empty() {
        return base;
    }

    // Index of the winning (last) override for each key
    let mut winners: HashMap<K, usize> = HashMap::with_capacity(overrides.len());
    for (i, item) in overrides.iter().enumerate() {
        winners.insert(key(item), i);
    }

    let mut consumed = vec![false; overrides.len()];
    let mut merged = Vec::with_capacity(base.len() + overrides.len());

    for item in base {
        match winners.get(&key(&item)) {
            // Later base duplicates of an overridden key collapse into the first
            Some(&i) if consumed[i] => {}
            Some(&i) => {
                consumed[i] = true;
                merged.push(overrides[i].clone());
            }
            None => merged.push(item),
        }
    }

    for (i, item) in overrides.iter().enumerate() {
        if consumed[i] || winners.get(&key(item)) != Some(&i) {
            continue;
        }
        merged.push(item.clone());
    }

    merged
}

/// Merge environment variables, keyed by name
pub fn merge_envs(base: Vec<EnvVar>, overrides: &[EnvVar]) -> Vec<EnvVar> {
    merge_by_key(base, overrides, |env| env.name.clone())
}

/// Merge volume mounts, keyed by mount path
pub fn merge_volume_mounts(base: Vec<VolumeMount>, overrides: &[VolumeMount]) -> Vec<VolumeMount> {
    merge_by_key(base, overrides, |mount| mount.mount_path.clone())
}

/// Merge volumes, keyed by name
pub fn merge_volumes(base: Vec<Volume>, overrides: &[Volume]) -> Vec<Volume> {
    merge_by_key(base, overrides, |volume| volume.name.clone())
}

/// Merge command-line arguments, keyed by [`arg_key`]
pub fn merge_args(base: Vec<String>, overrides: &[String]) -> Vec<String> {
    merge_by_key(base, overrides, |arg| arg_key(arg).to_string())
}

/// Key an argument is merged by
///
/// Flag-style arguments (`--name=value`, `-n=value`) are keyed by the flag
/// name so an override can change the value; anything else is keyed by the
/// whole string.
pub fn arg_key(arg: &str) -> &str {
    if !arg.starts_with('-') {
        return arg;
    }
    arg.split_once('=').map_or(arg, |(flag, _)| flag)
}
