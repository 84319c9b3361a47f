//! wasmtime-backed sandbox.
//!
//! Loads a libsodium-style module: an exported linear memory, `malloc` and
//! `free`, an optional start-up export, and one export per primitive taking
//! addresses, lengths and scalars and returning an `i32` status.

use crate::backend::{CallArg, SandboxBackend, SandboxFault};
use crate::config::SandboxConfig;
use sluice_core::{SluiceError, SluiceResult};
use std::path::Path;
use tracing::{debug, warn};
use wasmtime::{
    Config, Engine, Instance, Linker, Memory, Module, Store, StoreLimits, StoreLimitsBuilder,
    TypedFunc, Val,
};
use wasmtime_wasi::preview1::WasiP1Ctx;

/// Host state for the WASM store
pub struct HostState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// Lifecycle of the instance
#[derive(Debug, Clone, PartialEq, Eq)]
enum SandboxState {
    /// Instantiated, start-up not run yet
    Loaded,
    /// Start-up succeeded
    Ready,
    /// Start-up failed; the instance is unusable
    Failed(String),
}

/// A WebAssembly sandbox hosting the primitive module
pub struct WasmSandbox {
    config: SandboxConfig,
    store: Store<HostState>,
    instance: Instance,
    memory: Memory,
    malloc: TypedFunc<u32, u32>,
    free: TypedFunc<u32, ()>,
    state: SandboxState,
}

impl WasmSandbox {
    /// Compile and instantiate a module from its binary
    ///
    /// # Errors
    ///
    /// Returns `Load` if compilation, linking or instantiation fails, or a
    /// required export is missing
    pub fn from_bytes(config: SandboxConfig, wasm: &[u8]) -> SluiceResult<Self> {
        let engine = Self::engine(&config)?;
        let module = Module::new(&engine, wasm).map_err(|e| load_error("module compilation", e))?;
        Self::instantiate(config, &engine, &module)
    }

    /// Compile and instantiate a module from a `.wasm` file
    ///
    /// # Errors
    ///
    /// Returns `Load` if the file cannot be read or instantiated
    pub fn from_file(config: SandboxConfig, path: impl AsRef<Path>) -> SluiceResult<Self> {
        let path = path.as_ref();
        let wasm = std::fs::read(path)
            .map_err(|e| SluiceError::Load(format!("cannot read {}: {e}", path.display())))?;
        debug!(path = %path.display(), bytes = wasm.len(), "loading sandbox module");
        Self::from_bytes(config, &wasm)
    }

    fn engine(config: &SandboxConfig) -> SluiceResult<Engine> {
        let mut engine_config = Config::new();
        if config.max_fuel.is_some() {
            engine_config.consume_fuel(true);
        }
        Engine::new(&engine_config).map_err(|e| load_error("engine creation", e))
    }

    fn instantiate(config: SandboxConfig, engine: &Engine, module: &Module) -> SluiceResult<Self> {
        let host_state = HostState {
            wasi: wasmtime_wasi::WasiCtxBuilder::new().build_p1(),
            limits: StoreLimitsBuilder::new().memory_size(config.max_memory).build(),
        };
        let mut store = Store::new(engine, host_state);
        store.limiter(|state| &mut state.limits);

        let mut linker: Linker<HostState> = Linker::new(engine);
        if config.enable_wasi {
            wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state: &mut HostState| {
                &mut state.wasi
            })
            .map_err(|e| load_error("WASI linking", e))?;
        }

        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| load_error("instantiation", e))?;

        let memory = instance
            .get_memory(&mut store, &config.memory_export)
            .ok_or_else(|| {
                SluiceError::Load(format!("no memory export `{}`", config.memory_export))
            })?;
        let malloc = instance
            .get_typed_func::<u32, u32>(&mut store, &config.malloc_export)
            .map_err(|e| load_error(&format!("export `{}`", config.malloc_export), e))?;
        let free = instance
            .get_typed_func::<u32, ()>(&mut store, &config.free_export)
            .map_err(|e| load_error(&format!("export `{}`", config.free_export), e))?;

        Ok(Self {
            config,
            store,
            instance,
            memory,
            malloc,
            free,
            state: SandboxState::Loaded,
        })
    }

    /// The sandbox configuration
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Whether start-up has completed
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == SandboxState::Ready
    }

    /// Names of exported functions
    pub fn exports(&mut self) -> Vec<String> {
        let names: Vec<String> = self
            .instance
            .exports(&mut self.store)
            .map(|e| e.name().to_string())
            .collect();
        names
            .into_iter()
            .filter(|name| self.instance.get_func(&mut self.store, name).is_some())
            .collect()
    }

    /// Current linear memory size in bytes
    #[must_use]
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    /// Fuel left from the current invocation budget
    #[must_use]
    pub fn remaining_fuel(&self) -> Option<u64> {
        self.config.max_fuel.and_then(|_| self.store.get_fuel().ok())
    }

    fn refuel(&mut self, operation: &str) -> Result<(), SandboxFault> {
        if let Some(fuel) = self.config.max_fuel {
            self.store
                .set_fuel(fuel)
                .map_err(|e| SandboxFault::new(operation, format!("{e:#}")))?;
        }
        Ok(())
    }

    fn ensure_ready(&self, operation: &str) -> Result<(), SandboxFault> {
        match &self.state {
            SandboxState::Ready => Ok(()),
            SandboxState::Loaded => Err(SandboxFault::new(operation, "sandbox not initialized")),
            SandboxState::Failed(reason) => Err(SandboxFault::new(operation, reason)),
        }
    }

    fn run_init(&mut self) -> Result<(), String> {
        // Reactor modules run their constructors here
        if let Ok(ctor) = self.instance.get_typed_func::<(), ()>(&mut self.store, "_initialize") {
            ctor.call(&mut self.store, ()).map_err(|e| format!("_initialize trapped: {e:#}"))?;
        }

        let Some(export) = self.config.init_export.clone() else {
            return Ok(());
        };
        let init = self
            .instance
            .get_typed_func::<(), i32>(&mut self.store, &export)
            .map_err(|e| format!("init export `{export}`: {e:#}"))?;
        let status = init
            .call(&mut self.store, ())
            .map_err(|e| format!("`{export}` trapped: {e:#}"))?;
        // 1 means an earlier call already initialized the library
        if status == 0 || status == 1 {
            Ok(())
        } else {
            Err(format!("`{export}` returned {status}"))
        }
    }
}

impl SandboxBackend for WasmSandbox {
    fn initialize(&mut self) -> SluiceResult<()> {
        match &self.state {
            SandboxState::Ready => return Ok(()),
            SandboxState::Failed(reason) => return Err(SluiceError::NotReady(reason.clone())),
            SandboxState::Loaded => {}
        }

        let started = self
            .refuel("initialize")
            .map_err(|f| f.reason)
            .and_then(|()| self.run_init());
        if let Err(reason) = started {
            warn!(%reason, "sandbox start-up failed");
            self.state = SandboxState::Failed(reason.clone());
            return Err(SluiceError::NotReady(reason));
        }

        self.state = SandboxState::Ready;
        debug!(memory_bytes = self.memory_size(), "sandbox initialized");
        Ok(())
    }

    fn malloc(&mut self, size: u32) -> Result<u32, SandboxFault> {
        self.ensure_ready("malloc")?;
        self.refuel("malloc")?;
        self.malloc
            .call(&mut self.store, size)
            .map_err(|e| SandboxFault::new("malloc", format!("{e:#}")))
    }

    fn free(&mut self, address: u32) -> Result<(), SandboxFault> {
        self.ensure_ready("free")?;
        self.refuel("free")?;
        self.free
            .call(&mut self.store, address)
            .map_err(|e| SandboxFault::new("free", format!("{e:#}")))
    }

    fn invoke(&mut self, export: &str, args: &[CallArg]) -> Result<i32, SandboxFault> {
        let operation = format!("invoke {export}");
        self.ensure_ready(&operation)?;
        let func = self
            .instance
            .get_func(&mut self.store, export)
            .ok_or_else(|| SandboxFault::new(&operation, "export not found"))?;

        let params: Vec<Val> = args
            .iter()
            .map(|arg| match *arg {
                CallArg::Address(address) => Val::I32(address.raw() as i32),
                CallArg::Null => Val::I32(0),
                CallArg::U32(v) => Val::I32(v as i32),
                CallArg::U64(v) => Val::I64(v as i64),
            })
            .collect();
        let result_count = func.ty(&self.store).results().len();
        let mut results = vec![Val::I32(0); result_count];

        self.refuel(&operation)?;
        func.call(&mut self.store, &params, &mut results)
            .map_err(|e| SandboxFault::new(&operation, format!("{e:#}")))?;

        match results.first() {
            None => Ok(0),
            Some(val) => val
                .i32()
                .ok_or_else(|| SandboxFault::new(&operation, "status is not an i32")),
        }
    }

    fn read(&mut self, address: u32, len: usize) -> Result<Vec<u8>, SandboxFault> {
        let mut bytes = vec![0u8; len];
        self.memory
            .read(&self.store, address as usize, &mut bytes)
            .map_err(|e| SandboxFault::new(format!("read {len} bytes at {address:#x}"), e))?;
        Ok(bytes)
    }

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), SandboxFault> {
        self.memory
            .write(&mut self.store, address as usize, bytes)
            .map_err(|e| {
                SandboxFault::new(format!("write {} bytes at {address:#x}", bytes.len()), e)
            })
    }
}

fn load_error(stage: &str, err: wasmtime::Error) -> SluiceError {
    SluiceError::Load(format!("{stage} failed: {err:#}"))
}
