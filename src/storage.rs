pub mod manifest;

pub use manifest::{CheckEntry, ComponentEntry, Format, Manifest, ManifestError, RoleEntry, Settings};
