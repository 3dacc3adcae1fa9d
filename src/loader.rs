//! Sandboxed modules and the `import` search.
//!
//! A [`Module`] owns an environment seeded from a copy of its [`Globals`],
//! a cache of everything it has imported, and a module-local `import`
//! binding. Resolution walks the module's [`Strategy`] list in order: its
//! own cache, the caches of its parents, then every search path for a
//! compiled artifact, a source file and a native library. The first hit is
//! memoized in the importing module.

use std::{
    cell::RefCell,
    env::{self, consts},
    fmt, fs,
    path::{Path, PathBuf},
    rc::{Rc, Weak},
};

use indexmap::IndexMap;
use libloading::Library;
use log::{debug, info, warn};

use crate::{
    ast::Chunk,
    diagnostics::{BouquetError, Diagnostic, DiagnosticKind, Result},
    environment::{Environment, EnvironmentRef},
    parser,
    runtime::{Completion, Interpreter},
    stdlib::Globals,
    value::{Value, ValueKind},
};

/// Environment variable holding extra search paths.
pub const PATH_ENV: &str = "BOUQUET_PATH";
pub const SOURCE_EXTENSION: &str = "ns";
pub const COMPILED_EXTENSION: &str = "nsc";
const COMPILED_HEADER: &[u8] = b"bouquet-nsc 1\n";

/// Entry point a native library exports as `bouquet_open_<name>`, with dots
/// in the module name replaced by underscores. The library must be built
/// against the same `bouquet` and compiler version as the host.
///
/// A library stays loaded while any module of the tree that opened it is
/// alive. Values it produced must not outlive that tree.
pub type NativeOpen = fn() -> Result<Value>;

/// Native libraries opened anywhere in one module tree.
type Libraries = Rc<RefCell<Vec<Library>>>;

/// Ordered search paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderConfig {
    pub search_paths: Vec<PathBuf>,
}

impl LoaderConfig {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits a semicolon-delimited list, skipping empty entries.
    pub fn parse(list: &str) -> Self {
        Self::new(
            list.split(';')
                .map(str::trim)
                .filter(|entry| !entry.is_empty()),
        )
    }

    /// Reads [`PATH_ENV`]; unset means no search paths.
    pub fn from_env() -> Self {
        env::var(PATH_ENV)
            .map(|list| Self::parse(&list))
            .unwrap_or_default()
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.push(path);
        self
    }

    pub fn extend(&mut self, other: LoaderConfig) {
        self.search_paths.extend(other.search_paths);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Compiled,
    Source,
    Native,
}

impl ArtifactKind {
    /// File name of the last segment of a module name.
    pub fn file_name(self, stem: &str) -> String {
        match self {
            ArtifactKind::Compiled => format!("{stem}.{COMPILED_EXTENSION}"),
            ArtifactKind::Source => format!("{stem}.{SOURCE_EXTENSION}"),
            ArtifactKind::Native => {
                format!("{}{stem}.{}", consts::DLL_PREFIX, consts::DLL_EXTENSION)
            }
        }
    }

    /// Where module `name` would live under `dir`. Dots in the name are
    /// directory separators.
    pub fn candidate(self, dir: &Path, name: &str) -> PathBuf {
        let mut path = dir.to_path_buf();
        let mut segments = name.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                path.push(self.file_name(segment));
            }
        }
        path
    }

    /// Guesses the kind of a file handed over directly, by extension.
    pub fn of_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(COMPILED_EXTENSION) => ArtifactKind::Compiled,
            Some(ext) if ext == consts::DLL_EXTENSION => ArtifactKind::Native,
            _ => ArtifactKind::Source,
        }
    }
}

/// One step of the import search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    LoadedCache,
    ParentCache,
    Artifact(ArtifactKind),
}

impl Strategy {
    pub const DEFAULT: [Strategy; 5] = [
        Strategy::LoadedCache,
        Strategy::ParentCache,
        Strategy::Artifact(ArtifactKind::Compiled),
        Strategy::Artifact(ArtifactKind::Source),
        Strategy::Artifact(ArtifactKind::Native),
    ];
}

/// Handle to a module. Cloning shares it.
#[derive(Clone)]
pub struct Module(Rc<ModuleInner>);

struct ModuleInner {
    name: String,
    root: PathBuf,
    config: LoaderConfig,
    globals: Globals,
    strategies: Vec<Strategy>,
    env: EnvironmentRef,
    loaded: RefCell<IndexMap<String, Value>>,
    loading: RefCell<Vec<PathBuf>>,
    /// Lookup only; a child never keeps its parent alive.
    parent: Option<Weak<ModuleInner>>,
    // Shared with the whole tree; declared last so cached values go first
    // on drop.
    libraries: Libraries,
}

impl Module {
    /// A root module with the standard prelude.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, config: LoaderConfig) -> Self {
        Self::with_globals(name, root, config, Globals::prelude())
    }

    pub fn with_globals(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        config: LoaderConfig,
        globals: Globals,
    ) -> Self {
        Self::build(
            name.into(),
            root.into(),
            config,
            globals,
            Strategy::DEFAULT.to_vec(),
            None,
            Libraries::default(),
        )
    }

    fn build(
        name: String,
        root: PathBuf,
        config: LoaderConfig,
        globals: Globals,
        strategies: Vec<Strategy>,
        parent: Option<Weak<ModuleInner>>,
        libraries: Libraries,
    ) -> Self {
        let env = seed_environment(&globals);
        Module(Rc::new(ModuleInner {
            name,
            root,
            config,
            globals,
            strategies,
            env,
            loaded: RefCell::new(IndexMap::new()),
            loading: RefCell::new(Vec::new()),
            parent,
            libraries,
        }))
    }

    /// Replaces the search order.
    pub fn with_strategies(self, strategies: impl IntoIterator<Item = Strategy>) -> Self {
        let inner = &self.0;
        Self::build(
            inner.name.clone(),
            inner.root.clone(),
            inner.config.clone(),
            inner.globals.clone(),
            strategies.into_iter().collect(),
            inner.parent.clone(),
            Rc::clone(&inner.libraries),
        )
    }

    /// A fresh module sharing this one's configuration, with this module as
    /// its parent.
    pub fn child(&self, name: impl Into<String>) -> Module {
        let inner = &self.0;
        Self::build(
            name.into(),
            inner.root.clone(),
            inner.config.clone(),
            inner.globals.clone(),
            inner.strategies.clone(),
            Some(Rc::downgrade(&self.0)),
            Rc::clone(&inner.libraries),
        )
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn root(&self) -> &Path {
        &self.0.root
    }

    /// The module this one was created from, if it is still alive.
    pub fn parent(&self) -> Option<Module> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(Module)
    }

    pub fn env(&self) -> EnvironmentRef {
        Rc::clone(&self.0.env)
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.0.strategies
    }

    /// Search paths with relative entries resolved against the root.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.0
            .config
            .search_paths
            .iter()
            .map(|path| self.0.root.join(path))
            .collect()
    }

    /// Top-level bindings defined by code run in this module.
    pub fn exports(&self) -> IndexMap<String, Value> {
        self.0.env.borrow().snapshot()
    }

    pub fn loaded(&self, name: &str) -> Option<Value> {
        self.0.loaded.borrow().get(name).cloned()
    }

    pub fn ptr_eq(&self, other: &Module) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Runs `source` in this module's environment and returns its value: a
    /// `return`ed value, else the last expression statement, else unit.
    pub fn eval(&self, source: &str) -> Result<Value> {
        let chunk = parser::parse_chunk(source)?;
        Ok(self.eval_chunk(&chunk)?.into_value())
    }

    pub fn eval_chunk(&self, chunk: &Chunk) -> Result<Completion> {
        Interpreter::new(self, self.env()).run(chunk)
    }

    /// Runs a script or compiled artifact file as this module's own body
    /// and returns its module value.
    pub fn run_file(&self, path: &Path) -> Result<Value> {
        let kind = ArtifactKind::of_path(path);
        if kind == ArtifactKind::Native {
            return self.open_native(path, self.name());
        }
        let chunk = read_chunk(kind, path)?;
        let _guard = Loading::enter(self, path)?;
        self.evaluate_artifact(&chunk, self, path)
    }

    /// Resolves `name`, evaluating a found artifact in a fresh child module.
    pub fn import(&self, name: &str) -> Result<Value> {
        self.resolve(name, None)
    }

    /// Resolves `name`, evaluating a found artifact in `target`'s
    /// environment instead of a fresh child.
    pub fn import_into(&self, name: &str, target: &Module) -> Result<Value> {
        self.resolve(name, Some(target))
    }

    fn resolve(&self, name: &str, target: Option<&Module>) -> Result<Value> {
        let mut attempts = Vec::new();
        for strategy in &self.0.strategies {
            match strategy {
                Strategy::LoadedCache => {
                    if let Some(value) = self.loaded(name) {
                        return Ok(value);
                    }
                }
                Strategy::ParentCache => {
                    let mut ancestor = self.parent();
                    while let Some(module) = ancestor {
                        if let Some(value) = module.loaded(name) {
                            debug!("`{name}` found in the cache of `{}`", module.name());
                            return Ok(value);
                        }
                        ancestor = module.parent();
                    }
                }
                Strategy::Artifact(kind) => {
                    for dir in self.search_paths() {
                        let path = kind.candidate(&dir, name);
                        if !path.is_file() {
                            debug!("no {kind:?} artifact for `{name}` at {}", path.display());
                            attempts.push(path);
                            continue;
                        }
                        let value = self.load_artifact(*kind, name, &path, target)?;
                        info!("loaded `{name}` from {}", path.display());
                        self.0
                            .loaded
                            .borrow_mut()
                            .insert(name.to_string(), value.clone());
                        return Ok(value);
                    }
                }
            }
        }
        Err(BouquetError::ModuleNotFound {
            name: name.to_string(),
            attempts,
        })
    }

    fn load_artifact(
        &self,
        kind: ArtifactKind,
        name: &str,
        path: &Path,
        target: Option<&Module>,
    ) -> Result<Value> {
        let outcome = match kind {
            ArtifactKind::Native => self.open_native(path, name),
            ArtifactKind::Compiled | ArtifactKind::Source => {
                let chunk = read_chunk(kind, path)?;
                let _guard = Loading::enter(self, path)?;
                match target {
                    Some(module) => self.evaluate_artifact(&chunk, module, path),
                    None => self.evaluate_artifact(&chunk, &self.child(name), path),
                }
            }
        };
        outcome.inspect_err(|err| warn!("failed to load `{name}` from {}: {err}", path.display()))
    }

    fn evaluate_artifact(&self, chunk: &Chunk, module: &Module, path: &Path) -> Result<Value> {
        let completion = module.eval_chunk(chunk).map_err(|err| match err {
            BouquetError::Eval(diag) => diag
                .with_note(format!("while loading {}", path.display()))
                .into(),
            other => other,
        })?;
        Ok(match completion {
            Completion::Returned(value) => value,
            Completion::Finished(_) => Value::module(module.name(), module.exports()),
        })
    }

    fn open_native(&self, path: &Path, name: &str) -> Result<Value> {
        let symbol = format!("bouquet_open_{}", name.replace('.', "_"));
        // SAFETY: loading runs the library's initialisers; native modules
        // are trusted code by contract.
        let library = unsafe { Library::new(path) }.map_err(|err| load_error(path, err))?;
        // SAFETY: the exported symbol is declared with the `NativeOpen`
        // signature.
        let open: NativeOpen = unsafe {
            *library
                .get::<NativeOpen>(symbol.as_bytes())
                .map_err(|err| load_error(path, err))?
        };
        let value = open()?;
        self.0.libraries.borrow_mut().push(library);
        Ok(value)
    }

    /// True while `path` is being evaluated by this module or an ancestor.
    fn is_loading(&self, path: &Path) -> bool {
        if self.0.loading.borrow().iter().any(|loading| loading == path) {
            return true;
        }
        self.parent().is_some_and(|parent| parent.is_loading(path))
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.0.name)
            .field("root", &self.0.root)
            .field("loaded", &self.0.loaded.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Marks a path as in-flight for cycle detection until dropped.
struct Loading<'a> {
    module: &'a Module,
}

impl<'a> Loading<'a> {
    fn enter(module: &'a Module, path: &Path) -> Result<Self> {
        if module.is_loading(path) {
            return Err(BouquetError::Load {
                path: path.to_path_buf(),
                reason: "cyclic import".into(),
            });
        }
        module.0.loading.borrow_mut().push(path.to_path_buf());
        Ok(Self { module })
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.module.0.loading.borrow_mut().pop();
    }
}

fn seed_environment(globals: &Globals) -> EnvironmentRef {
    let scope = Environment::new();
    {
        let mut scope = scope.borrow_mut();
        for (name, value) in globals.iter() {
            scope.define(name, value.clone(), false);
        }
        scope.define("import", Value::new(ValueKind::Import), false);
    }
    Environment::with_parent(scope)
}

fn load_error(path: &Path, err: impl fmt::Display) -> BouquetError {
    BouquetError::Load {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn read_chunk(kind: ArtifactKind, path: &Path) -> Result<Chunk> {
    match kind {
        ArtifactKind::Compiled => decode_compiled(&fs::read(path)?),
        _ => Ok(parser::parse_chunk(&fs::read_to_string(path)?)?),
    }
}

/// Parses `source` and serialises the chunk as a compiled artifact.
pub fn compile(source: &str) -> Result<Vec<u8>> {
    let chunk = parser::parse_chunk(source)?;
    let mut bytes = COMPILED_HEADER.to_vec();
    serde_json::to_writer(&mut bytes, &chunk).map_err(|err| artifact_error(err.to_string()))?;
    Ok(bytes)
}

/// Compiles the source file at `input` into `output`.
pub fn compile_file(input: &Path, output: &Path) -> Result<()> {
    let source = fs::read_to_string(input)?;
    let bytes = compile(&source)?;
    fs::write(output, bytes)?;
    info!("compiled {} -> {}", input.display(), output.display());
    Ok(())
}

pub fn decode_compiled(bytes: &[u8]) -> Result<Chunk> {
    let body = bytes
        .strip_prefix(COMPILED_HEADER)
        .ok_or_else(|| artifact_error("missing compiled artifact header".into()))?;
    serde_json::from_slice(body).map_err(|err| artifact_error(err.to_string()))
}

fn artifact_error(message: String) -> BouquetError {
    Diagnostic::new(DiagnosticKind::Artifact, message).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_parsing_skips_empty_entries() {
        let config = LoaderConfig::parse("lib;;vendor/modules; ");
        assert_eq!(
            config.search_paths,
            vec![PathBuf::from("lib"), PathBuf::from("vendor/modules")]
        );
    }

    #[test]
    fn dotted_names_map_to_directories() {
        let path = ArtifactKind::Source.candidate(Path::new("lib"), "geometry.shapes");
        assert_eq!(path, Path::new("lib").join("geometry").join("shapes.ns"));
        let native = ArtifactKind::Native.candidate(Path::new("lib"), "fast");
        let expected = format!("{}fast.{}", consts::DLL_PREFIX, consts::DLL_EXTENSION);
        assert_eq!(native, Path::new("lib").join(expected));
    }

    #[test]
    fn a_module_tree_shares_one_library_registry() {
        let root = Module::new("main", ".", LoaderConfig::default());
        let child = root.child("plugin").with_strategies(Strategy::DEFAULT);
        assert!(Rc::ptr_eq(&root.0.libraries, &child.0.libraries));
        let other = Module::new("other", ".", LoaderConfig::default());
        assert!(!Rc::ptr_eq(&root.0.libraries, &other.0.libraries));
    }

    #[test]
    fn compiled_artifacts_require_the_header() {
        let err = decode_compiled(b"{\"items\":[]}").unwrap_err();
        assert!(matches!(
            err,
            BouquetError::Eval(Diagnostic {
                kind: DiagnosticKind::Artifact,
                ..
            })
        ));
        let bytes = compile("var x = 1").unwrap();
        assert_eq!(decode_compiled(&bytes).unwrap().items.len(), 1);
    }
}
