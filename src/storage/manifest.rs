//! Manifest files describing components, roles and checks.
//!
//! A manifest is a TOML (`.toml`) or YAML (`.yaml`, `.yml`) document:
//!
//! ```toml
//! [settings]
//! merge_policy = "merge"
//!
//! [components."profile::base"]
//! params = { ntp = true }
//! includes = ["profile::ntp"]
//!
//! [components."profile::ntp"]
//!
//! [roles."role::web"]
//! includes = ["profile::base", { id = "profile::ntp", params = { servers = 2 } }]
//!
//! [[checks]]
//! role = "role::web"
//! contains = ["profile::ntp"]
//! excludes = ["profile::legacy"]
//!
//! [checks.with."profile::ntp"]
//! servers = 2
//! ```
//!
//! [`Manifest::load`] accepts either a single file or a directory, in which
//! case every manifest file beneath it is loaded and merged.

use std::{
    collections::{BTreeMap, HashSet},
    ffi::OsStr,
    fmt, io,
    path::{Path, PathBuf},
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::domain::{
    ComponentDefinition, ComponentId, ComponentRef, Expectation, ExpectationSet, ExpansionRule,
    MergePolicy, Params, Registry, RegistryError, Role,
    harness::Suite,
    registry::Sealed,
};

/// Global settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// How repeated references to the same component are reconciled.
    #[serde(default)]
    pub merge_policy: MergePolicy,
}

/// A component as written in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentEntry {
    /// Default parameters.
    #[serde(default)]
    pub params: Params,
    /// Components this one contains.
    #[serde(default)]
    pub includes: Vec<ComponentRef>,
}

/// A role as written in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleEntry {
    /// The role's entries, in declaration order.
    #[serde(default)]
    pub includes: Vec<ComponentRef>,
}

/// A set of expectations against one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckEntry {
    /// Name of the role to check.
    pub role: String,
    /// Components that must be present.
    #[serde(default)]
    pub contains: Vec<ComponentId>,
    /// Required parameter values, keyed by component.
    ///
    /// A component listed here but not in `contains` is still expected to
    /// be present. Manifest tables do not keep the order they were written
    /// in, so such components are expected in identity order.
    #[serde(default)]
    pub with: BTreeMap<ComponentId, Params>,
    /// Components that must be absent.
    #[serde(default)]
    pub excludes: Vec<ComponentId>,
}

impl CheckEntry {
    /// Converts the check into an ordered expectation set: `contains` first,
    /// in the order written, then any remaining `with` entries in identity
    /// order, then `excludes` in the order written.
    #[must_use]
    pub fn expectations(&self) -> ExpectationSet {
        let mut with = self.with.clone();
        let mut expectations = ExpectationSet::new();

        for id in &self.contains {
            expectations.push(Expectation::Present {
                id: id.clone(),
                with: with.remove(id).unwrap_or_default(),
            });
        }
        for (id, params) in with {
            expectations.push(Expectation::Present { id, with: params });
        }
        for id in &self.excludes {
            expectations.push(Expectation::Absent { id: id.clone() });
        }

        expectations
    }
}

/// The contents of a single manifest file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    settings: Option<Settings>,
    #[serde(default)]
    components: BTreeMap<ComponentId, ComponentEntry>,
    #[serde(default)]
    roles: BTreeMap<String, RoleEntry>,
    #[serde(default)]
    checks: Vec<CheckEntry>,
}

/// Supported manifest encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// TOML.
    Toml,
    /// YAML.
    Yaml,
}

impl Format {
    /// Determines the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(OsStr::to_str)? {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Errors that can occur when loading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The file or directory could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// The path being read.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// A TOML manifest could not be parsed.
    #[error("failed to parse {}: {source}", .path.display())]
    Toml {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        source: toml::de::Error,
    },

    /// A YAML manifest could not be parsed.
    #[error("failed to parse {}: {source}", .path.display())]
    Yaml {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        source: serde_yaml::Error,
    },

    /// The file extension is not a recognised manifest format.
    #[error("unsupported manifest format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The same role is defined in more than one file.
    #[error("role {0} is defined more than once")]
    DuplicateRole(String),

    /// Two files declare different settings.
    #[error("conflicting settings in {}", .0.display())]
    ConflictingSettings(PathBuf),

    /// A check refers to a role that is not defined.
    #[error("check refers to unknown role {0}")]
    UnknownRole(String),

    /// The components could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Components, roles and checks loaded from one or more manifest files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    settings: Settings,

    /// Components in load order. Identities may repeat across files; that
    /// is reported when the registry is built.
    components: Vec<(ComponentId, ComponentEntry)>,

    roles: BTreeMap<String, RoleEntry>,

    checks: Vec<CheckEntry>,

    /// Files this manifest was loaded from.
    sources: Vec<PathBuf>,
}

impl Manifest {
    /// Loads a manifest from a file, or from every manifest file beneath a
    /// directory.
    ///
    /// Directory contents are merged in path order. Files with other
    /// extensions are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, if a role is
    /// defined twice, or if two files declare different settings.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let metadata = std::fs::metadata(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let paths = if metadata.is_dir() {
            collect_manifest_paths(path)?
        } else {
            vec![path.to_path_buf()]
        };
        tracing::debug!(files = paths.len(), "loading manifest from {}", path.display());

        let files = paths
            .par_iter()
            .map(|path| parse_file(path).map(|file| (path.clone(), file)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut manifest = Self::default();
        let mut settings_source: Option<PathBuf> = None;
        for (path, file) in files {
            manifest.absorb(&path, file, &mut settings_source)?;
        }
        Ok(manifest)
    }

    /// Parses a manifest from a string in the given format.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be parsed.
    pub fn parse(content: &str, format: Format) -> Result<Self, ManifestError> {
        let path = PathBuf::from("<inline>");
        let file = parse_content(&path, content, format)?;

        let mut manifest = Self::default();
        manifest.absorb(&path, file, &mut None)?;
        Ok(manifest)
    }

    fn absorb(
        &mut self,
        path: &Path,
        file: ManifestFile,
        settings_source: &mut Option<PathBuf>,
    ) -> Result<(), ManifestError> {
        if let Some(settings) = file.settings {
            match settings_source {
                Some(_) if settings != self.settings => {
                    return Err(ManifestError::ConflictingSettings(path.to_path_buf()));
                }
                Some(_) => {}
                None => {
                    self.settings = settings;
                    *settings_source = Some(path.to_path_buf());
                }
            }
        }

        self.components.extend(file.components);

        for (name, role) in file.roles {
            if self.roles.contains_key(&name) {
                return Err(ManifestError::DuplicateRole(name));
            }
            self.roles.insert(name, role);
        }

        self.checks.extend(file.checks);
        self.sources.push(path.to_path_buf());
        Ok(())
    }

    /// The effective settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The files this manifest was loaded from, in load order.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Registers every component and seals the registry.
    ///
    /// Files are registered in load order. Within one file components are
    /// registered in identity order, because manifest tables are keyed by
    /// identity and do not keep the order they were written in. That is the
    /// order [`Registry::iter`] and `rolecheck list` report.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if a component is defined in
    /// more than one file.
    pub fn registry(&self) -> Result<Registry<Sealed>, RegistryError> {
        let mut registry = Registry::with_merge_policy(self.settings.merge_policy);

        for (id, entry) in &self.components {
            let rule = if entry.includes.is_empty() {
                ExpansionRule::Leaf
            } else {
                ExpansionRule::Static(entry.includes.clone())
            };
            registry.register(ComponentDefinition::new(
                id.clone(),
                rule,
                entry.params.clone(),
            ))?;
        }

        Ok(registry.seal())
    }

    /// Names of all defined roles, sorted.
    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Builds the named role, if it is defined.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<Role> {
        let entry = self.roles.get(name)?;
        let mut role = Role::new(name);
        role.extend(entry.includes.iter().cloned());
        Some(role)
    }

    /// The checks, in load order.
    #[must_use]
    pub fn checks(&self) -> &[CheckEntry] {
        &self.checks
    }

    /// Builds one suite per check.
    ///
    /// If `only` is non-empty, checks against other roles are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownRole`] if a check names a role that
    /// is not defined.
    pub fn suites(&self, only: &[String]) -> Result<Vec<Suite>, ManifestError> {
        let only: HashSet<&str> = only.iter().map(String::as_str).collect();

        self.checks
            .iter()
            .filter(|check| only.is_empty() || only.contains(check.role.as_str()))
            .map(|check| {
                let role = self
                    .role(&check.role)
                    .ok_or_else(|| ManifestError::UnknownRole(check.role.clone()))?;
                Ok(Suite {
                    role,
                    expectations: check.expectations(),
                })
            })
            .collect()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml => f.write_str("toml"),
            Self::Yaml => f.write_str("yaml"),
        }
    }
}

fn collect_manifest_paths(root: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ManifestError::Io {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && Format::from_path(entry.path()).is_some() {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

fn parse_file(path: &Path) -> Result<ManifestFile, ManifestError> {
    let format =
        Format::from_path(path).ok_or_else(|| ManifestError::UnsupportedFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_content(path, &content, format)
}

fn parse_content(path: &Path, content: &str, format: Format) -> Result<ManifestFile, ManifestError> {
    match format {
        Format::Toml => toml::from_str(content).map_err(|source| ManifestError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        Format::Yaml => serde_yaml::from_str(content).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        }),
    }
}
