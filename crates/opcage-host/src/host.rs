//! Sandbox host: prepared-program registry plus host function bindings.
//!
//! `prepare` validates and instruments a program; `run` executes a prepared
//! program with a fresh guard bound to that invocation only. The policy is
//! shared read-only; preparations and runs may proceed concurrently on
//! independent threads.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

use opcage_core::error::{OpcageError, Result};
use opcage_core::image::{codec, CallTarget, Instruction, Program};
use opcage_core::policy::{AccessFilter, ApiPolicy};

use crate::engine::{self, Value};
use crate::guard::{RuntimeGuard, RuntimeGuardSettings};
use crate::rewrite;
use crate::validate::Validator;

// If changed to true, preparing a program whose external calls have no
// registered binding fails instead of warning.
const FAIL_FAST_ON_UNBOUND: bool = false;

/// A host function callable from sandboxed code.
pub trait HostFn: Send + Sync {
    /// Full symbol name, e.g. `sys.math.Checked::add`. Field bindings use
    /// the same form; they receive an empty argument slice for a load and a
    /// single-element slice for a store.
    fn symbol(&self) -> &str;
    fn invoke(&self, args: &[Value]) -> Result<Value>;
}

/// Adapter exposing a plain closure as a [`HostFn`].
pub struct FnHost<F> {
    symbol: String,
    f: F,
}

impl<F> FnHost<F>
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync,
{
    pub fn new(symbol: impl Into<String>, f: F) -> Self {
        Self {
            symbol: symbol.into(),
            f,
        }
    }
}

impl<F> HostFn for FnHost<F>
where
    F: Fn(&[Value]) -> Result<Value> + Send + Sync,
{
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn invoke(&self, args: &[Value]) -> Result<Value> {
        (self.f)(args)
    }
}

/// Registry of host bindings, keyed by full symbol name.
#[derive(Default)]
pub struct Bindings {
    map: DashMap<String, Arc<dyn HostFn>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    pub fn register(&self, f: Arc<dyn HostFn>) {
        self.map.insert(f.symbol().to_string(), f);
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<dyn HostFn>> {
        self.map.get(symbol).map(|e| e.value().clone())
    }

    pub fn symbols(&self) -> Vec<String> {
        self.map.iter().map(|e| e.key().clone()).collect()
    }
}

/// One sandbox: a policy, guard settings, host bindings, and the programs
/// prepared under them.
pub struct SandboxHost {
    policy: Arc<ApiPolicy>,
    settings: RuntimeGuardSettings,
    bindings: Bindings,
    programs: DashMap<String, Arc<Program>>,
}

impl SandboxHost {
    pub fn new(policy: Arc<ApiPolicy>, settings: RuntimeGuardSettings) -> Self {
        Self {
            policy,
            settings,
            bindings: Bindings::new(),
            programs: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &ApiPolicy {
        &self.policy
    }

    /// Register a host function callable from sandboxed code.
    pub fn bind(&self, f: Arc<dyn HostFn>) {
        self.bindings.register(f);
    }

    /// Validate, instrument, and store a program under its own name. A
    /// single violation rejects the whole program.
    pub fn prepare(&self, program: Program) -> Result<()> {
        let filter = AccessFilter::new(&self.policy);
        Validator::new(&filter).validate_program(&program)?;
        let guarded = rewrite::instrument(&program, &self.policy)?;
        self.check_bindings(&guarded)?;
        tracing::info!(program = %guarded.name, methods = guarded.methods.len(), "program prepared");
        self.programs.insert(guarded.name.clone(), Arc::new(guarded));
        Ok(())
    }

    /// Decode an image, then prepare it. Returns the program name.
    pub fn prepare_image(&self, image: Bytes) -> Result<String> {
        let program = codec::decode_program(image)?;
        let name = program.name.clone();
        self.prepare(program)?;
        Ok(name)
    }

    /// Execute an entry method of a prepared program. Every invocation gets
    /// a fresh guard; no invocation observes another's counters.
    pub fn run(&self, program: &str, entry: &str, args: Vec<Value>) -> Result<Value> {
        let Some(prepared) = self.programs.get(program).map(|e| e.value().clone()) else {
            return Err(OpcageError::Contract(format!("unknown program: {program}")));
        };
        let mut guard = RuntimeGuard::new(self.settings.clone());
        tracing::debug!(program, entry, "guarded invocation");
        engine::run(&prepared, &self.bindings, &mut guard, entry, args)
    }

    // Allowed-but-unbound external calls would fault at runtime; surface
    // them at preparation time.
    fn check_bindings(&self, program: &Program) -> Result<()> {
        for method in &program.methods {
            for instr in &method.body {
                if let Instruction::Call(CallTarget::External(m)) = instr {
                    let symbol = m.full_name();
                    if self.bindings.get(&symbol).is_none() {
                        tracing::warn!(
                            program = %program.name,
                            %symbol,
                            "external call has no registered host binding"
                        );
                        if FAIL_FAST_ON_UNBOUND {
                            return Err(OpcageError::Contract(format!(
                                "external call {symbol} has no registered host binding"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
