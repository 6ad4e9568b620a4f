//! File-system module resolution and loading
//!
//! A module's canonical name is its file path without the `.heta`
//! extension, written relative to the script directory when the file lives
//! under it and absolute otherwise. The main script is named by its file
//! stem, so its errors read `[main line 3]` for `main.heta`.
//!
//! Import names resolve as follows:
//! - `./x` and `../x` are relative to the importing module's directory
//! - bare names are searched in each `[modules] search_paths` entry, then in
//!   the script directory

use heta_runtime::{Configuration, LoadModuleResult};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Extension appended to every module name.
pub const EXTENSION: &str = "heta";

#[derive(Debug, Clone)]
pub struct FileModules {
    /// Directory of the main script; relative module names start here
    root: PathBuf,
    search_paths: Vec<PathBuf>,
}

impl FileModules {
    pub fn new(root: impl Into<PathBuf>, search_paths: Vec<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
            search_paths: search_paths.iter().map(|path| normalize(path)).collect(),
        }
    }

    /// Module name for a script file.
    pub fn module_name(&self, file: &Path) -> String {
        self.name_for(&normalize(&file.with_extension("")))
    }

    /// Map an import written in `importer` to a canonical module name.
    pub fn resolve(&self, importer: &str, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }

        let base = if name.starts_with("./") || name.starts_with("../") {
            let importer_dir = self.path_for(importer).parent()?.to_path_buf();
            importer_dir.join(name)
        } else {
            self.search_paths
                .iter()
                .chain(std::iter::once(&self.root))
                .map(|dir| dir.join(name))
                .find(|candidate| with_extension(candidate).is_file())
                .unwrap_or_else(|| self.root.join(name))
        };

        let resolved = self.name_for(&normalize(&base));
        debug!(importer, import = name, module = %resolved, "resolved import");
        Some(resolved)
    }

    /// Read the source for a canonical module name.
    pub fn load(&self, name: &str) -> LoadModuleResult {
        let file = with_extension(&self.path_for(name));
        match std::fs::read_to_string(&file) {
            Ok(source) => {
                debug!(module = name, file = %file.display(), "loaded module");
                LoadModuleResult::Source(source)
            }
            Err(error) => {
                debug!(module = name, file = %file.display(), %error, "module not loaded");
                LoadModuleResult::NotFound
            }
        }
    }

    /// Wire this loader into a VM configuration.
    pub fn install(self, config: Configuration) -> Configuration {
        let modules = Arc::new(self);
        let resolver = Arc::clone(&modules);
        config
            .with_resolve_module(move |importer: &str, name: &str| resolver.resolve(importer, name))
            .with_load_module(move |name: &str| modules.load(name))
    }

    fn name_for(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(relative) => relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

fn with_extension(path: &Path) -> PathBuf {
    let mut file = path.as_os_str().to_owned();
    file.push(".");
    file.push(EXTENSION);
    PathBuf::from(file)
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}
