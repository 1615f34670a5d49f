//! Assets, plugins and the scoped registry that ties them to fragments

mod asset;
mod plugin;
mod registry;

pub use asset::{hash_source, sha256, Asset, Digest, IncludeKind};
pub use plugin::{Component, EnvFn, EnvValueFn, Hook, HookError, HookFn, Plugin};
pub use registry::{AssetRegistry, Scope};
