//! Rhai engine wrapper with a reference-counted script cache

use crate::config::{AssetConfig, ConfigError};
use crate::core::hash::{hash_string64, Hash64};
use crate::core::property::PropertyDefinition;
use crate::core::resource::{ResourceError, ResourceFactory, ResourceHandle};
use crate::scripting::commands::{CallFrame, ScriptState, SharedScriptState};
use crate::scripting::modules::register_all_modules;
use crate::scripting::script::{Callback, CompiledScript, ScriptCallbacks};
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FuncArgs, Scope};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Resource kind of scripts
pub const SCRIPT_RESOURCE: &str = "script";

/// Errors from loading and running scripts
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("Failed to read script {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid script name: {0}")]
    Config(#[from] ConfigError),

    #[error("Compile error in '{script}': {message}")]
    Compile { script: String, message: String },

    #[error("Runtime error in '{script}': {message}")]
    Runtime { script: String, message: String },

    #[error("'{callback}' in '{script}' must be a function taking {arity} parameter(s)")]
    InvalidCallback {
        script: String,
        callback: &'static str,
        arity: usize,
    },

    #[error("Property '{property}' declared twice in '{script}'")]
    DuplicateProperty { script: String, property: String },

    #[error("Script not loaded: {0}")]
    NotLoaded(ResourceHandle),

    #[error("Script callback started while another one was running")]
    Reentrant,

    #[error("No script component on instance {0}")]
    NoInstance(String),

    #[error("Property error: {0}")]
    Property(String),
}

struct CacheEntry {
    script: Arc<CompiledScript>,
    refs: usize,
    // Scripts loaded from source have no file to reload from
    path: Option<PathBuf>,
}

/// Script engine shared by every collection
pub struct ScriptEngine {
    engine: Engine,
    state: SharedScriptState,
    cache: RwLock<HashMap<ResourceHandle, CacheEntry>>,
    asset_config: AssetConfig,
}

impl ScriptEngine {
    /// Create a new script engine with default asset configuration
    pub fn new() -> Self {
        Self::with_config(AssetConfig::default())
    }

    /// Create a new script engine with custom asset configuration
    pub fn with_config(asset_config: AssetConfig) -> Self {
        let mut engine = Engine::new();

        // Configure engine for safety
        engine.set_max_expr_depths(100, 100);
        engine.set_max_call_levels(50);
        engine.set_max_operations(100_000);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(1_000);
        engine.disable_symbol("eval");

        let state: SharedScriptState = Arc::new(RwLock::new(ScriptState::default()));
        register_all_modules(&mut engine, &state);

        Self {
            engine,
            state,
            cache: RwLock::new(HashMap::new()),
            asset_config,
        }
    }

    /// The rhai engine, for registering extra functions before sharing
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn asset_config(&self) -> &AssetConfig {
        &self.asset_config
    }

    /// Handle under which a script name is cached
    pub fn handle_for(name: &str) -> ResourceHandle {
        ResourceHandle::new(SCRIPT_RESOURCE, name)
    }

    /// Compile a script and run its top level
    ///
    /// The top level may only declare properties; callbacks are detected by
    /// name and must have the expected number of parameters.
    pub fn compile(&self, name: &str, source: &str) -> Result<CompiledScript, ScriptError> {
        let ast = self.engine.compile(source).map_err(|e| {
            let error: Box<EvalAltResult> = e.into();
            ScriptError::Compile {
                script: name.to_string(),
                message: describe(&error),
            }
        })?;

        let mut callbacks = ScriptCallbacks::empty();
        for function in ast.iter_functions() {
            let Some(callback) = Callback::from_name(function.name) else {
                continue;
            };
            if function.params.len() != callback.arity() {
                return Err(ScriptError::InvalidCallback {
                    script: name.to_string(),
                    callback: callback.name(),
                    arity: callback.arity(),
                });
            }
            callbacks |= callback.flag();
        }

        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.frame.is_some() || state.load.is_some() {
                return Err(ScriptError::Reentrant);
            }
            state.load = Some(Vec::new());
        }
        let mut scope = Scope::new();
        let result = self.engine.run_ast_with_scope(&mut scope, &ast);
        let properties = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .load
            .take()
            .unwrap_or_default();
        result.map_err(|e| ScriptError::Runtime {
            script: name.to_string(),
            message: describe(&e),
        })?;

        // Callback names are reserved for functions
        for (variable, _, _) in scope.iter() {
            if let Some(callback) = Callback::from_name(variable) {
                return Err(ScriptError::InvalidCallback {
                    script: name.to_string(),
                    callback: callback.name(),
                    arity: callback.arity(),
                });
            }
        }

        for (i, property) in properties.iter().enumerate() {
            if properties[..i].iter().any(|p| p.name == property.name) {
                return Err(ScriptError::DuplicateProperty {
                    script: name.to_string(),
                    property: property.name.clone(),
                });
            }
        }

        debug!(
            script = name,
            callbacks = ?callbacks,
            properties = properties.len(),
            "Compiled script"
        );
        Ok(CompiledScript {
            name: name.to_string(),
            source: source.to_string(),
            ast,
            callbacks,
            properties,
        })
    }

    /// Load a script from source, or add a reference if it is already loaded
    pub fn load_source(&self, name: &str, source: &str) -> Result<ResourceHandle, ScriptError> {
        self.load_with(name, None, || Ok(source.to_string()))
    }

    /// Load a script from the scripts directory, or add a reference
    pub fn load_script(&self, name: &str) -> Result<ResourceHandle, ScriptError> {
        let path = self.asset_config.script_path(name)?;
        let read_path = path.clone();
        self.load_with(name, Some(path), move || read_source(&read_path))
    }

    fn load_with(
        &self,
        name: &str,
        path: Option<PathBuf>,
        source: impl FnOnce() -> Result<String, ScriptError>,
    ) -> Result<ResourceHandle, ScriptError> {
        let handle = Self::handle_for(name);
        if let Some(entry) = self
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&handle)
        {
            entry.refs += 1;
            return Ok(handle);
        }

        let script = self.compile(name, &source()?)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another load may have finished while this one compiled
        cache
            .entry(handle)
            .and_modify(|entry| entry.refs += 1)
            .or_insert_with(|| CacheEntry {
                script: Arc::new(script),
                refs: 1,
                path,
            });
        info!(script = name, "Loaded script");
        Ok(handle)
    }

    /// Replace a loaded script with new source
    ///
    /// The swap only happens if the new source compiles and its top level
    /// runs; on failure the previous script stays in place untouched.
    pub fn reload_source(&self, handle: ResourceHandle, source: &str) -> Result<(), ScriptError> {
        let name = self
            .script(handle)
            .map(|script| script.name.clone())
            .ok_or(ScriptError::NotLoaded(handle))?;
        let script = self.compile(&name, source)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.get_mut(&handle).ok_or(ScriptError::NotLoaded(handle))?;
        entry.script = Arc::new(script);
        info!(script = %name, "Reloaded script");
        Ok(())
    }

    /// Re-read a script from its file
    pub fn reload_script(&self, handle: ResourceHandle) -> Result<(), ScriptError> {
        let path = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .ok_or(ScriptError::NotLoaded(handle))?
            .path
            .clone();
        let Some(path) = path else {
            debug!(script = %handle, "Script has no file to reload from");
            return Ok(());
        };
        let source = read_source(&path)?;
        self.reload_source(handle, &source)
    }

    /// Drop one reference; the script is evicted when none remain
    pub fn release_script(&self, handle: ResourceHandle) -> bool {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = cache.get_mut(&handle) else {
            return false;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            cache.remove(&handle);
            debug!(script = %handle, "Evicted script");
        }
        true
    }

    /// Current version of a loaded script
    pub fn script(&self, handle: ResourceHandle) -> Option<Arc<CompiledScript>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .map(|entry| Arc::clone(&entry.script))
    }

    pub fn property_definitions(&self, handle: ResourceHandle) -> Option<Vec<PropertyDefinition>> {
        self.script(handle).map(|script| script.properties.clone())
    }

    pub fn is_loaded(&self, handle: ResourceHandle) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&handle)
    }

    pub fn ref_count(&self, handle: ResourceHandle) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .map_or(0, |entry| entry.refs)
    }

    pub fn cache_size(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Run one callback with `this` bound to the instance state
    ///
    /// `frame` is installed for the native functions while the callback runs
    /// and handed back with the commands it queued. A script without the
    /// callback is not called.
    pub fn call(
        &self,
        script: &CompiledScript,
        callback: Callback,
        this: &mut Dynamic,
        frame: &mut CallFrame,
        args: impl FuncArgs,
    ) -> Result<Dynamic, ScriptError> {
        if !script.has(callback) {
            return Ok(Dynamic::UNIT);
        }
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.frame.is_some() || state.load.is_some() {
                return Err(ScriptError::Reentrant);
            }
            state.frame = Some(std::mem::take(frame));
        }

        let mut scope = Scope::new();
        let options = CallFnOptions::new()
            .eval_ast(false)
            .rewind_scope(true)
            .bind_this_ptr(this);
        let result = self.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut scope,
            &script.ast,
            callback.name(),
            args,
        );

        if let Some(returned) = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .frame
            .take()
        {
            *frame = returned;
        }
        result.map_err(|e| ScriptError::Runtime {
            script: script.name.clone(),
            message: describe(&e),
        })
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceFactory for ScriptEngine {
    fn get(&self, path: &str) -> Result<ResourceHandle, ResourceError> {
        self.load_script(path).map_err(|err| match err {
            ScriptError::Config(_) => ResourceError::InvalidName(path.to_string()),
            ScriptError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ResourceError::NotFound(path.to_string())
            }
            ScriptError::Io { source, .. } => ResourceError::Io(source),
            other => ResourceError::Load {
                path: path.to_string(),
                message: other.to_string(),
            },
        })
    }

    fn release(&self, handle: ResourceHandle) {
        self.release_script(handle);
    }

    fn reload_type(&self, kind: Hash64) -> Result<Vec<ResourceHandle>, ResourceError> {
        if kind != hash_string64(SCRIPT_RESOURCE) {
            return Ok(Vec::new());
        }
        let handles: Vec<ResourceHandle> = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, entry)| entry.path.is_some())
            .map(|(handle, _)| *handle)
            .collect();
        let mut reloaded = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.reload_script(handle) {
                Ok(()) => reloaded.push(handle),
                Err(err) => warn!(script = %handle, error = %err, "Keeping previous script version"),
            }
        }
        Ok(reloaded)
    }
}

fn read_source(path: &Path) -> Result<String, ScriptError> {
    std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Error text with its script position, `line:column - message`
fn describe(error: &EvalAltResult) -> String {
    let position = error.position();
    match (position.line(), position.position()) {
        (Some(line), Some(column)) => format!("{line}:{column} - {error}"),
        _ => error.to_string(),
    }
}
