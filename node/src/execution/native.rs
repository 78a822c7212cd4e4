//! Reference [`ContractExecutor`] running contracts written as plain Rust functions.
//!
//! Stamps: a call may spend `stamps * stamp_cost` compute units. Every call pays
//! [`BASE_UNITS`], every read [`READ_UNITS`] and every write [`WRITE_UNITS`]. The stamps
//! used are the spent units divided by `stamp_cost`, rounded up. Running out of units, or
//! the contract returning an error, fails the call: status 1, writes discarded.
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::block::types::output::{STATUS_FAILURE, STATUS_SUCCESS};
use crate::execution::environment::Environment;
use crate::execution::state::{CommittedState, PendingState, StateAccessor};
use crate::execution::{ContractCall, ContractExecutor, ExecutionResult};

pub const BASE_UNITS: u64 = 100;
pub const READ_UNITS: u64 = 10;
pub const WRITE_UNITS: u64 = 25;

pub type ContractFn =
    Arc<dyn Fn(&mut ContractContext<'_>, &Map<String, Value>) -> Result<Value, String> + Send + Sync>;

/// `(contract, function)` → implementation. Cloned into every worker.
#[derive(Clone, Default)]
pub struct ContractRegistry {
    functions: HashMap<(String, String), ContractFn>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, contract: &str, function: &str, f: F)
    where
        F: Fn(&mut ContractContext<'_>, &Map<String, Value>) -> Result<Value, String>
            + Send
            + Sync
            + 'static,
    {
        self.functions
            .insert((contract.to_string(), function.to_string()), Arc::new(f));
    }

    fn get(&self, contract: &str, function: &str) -> Option<ContractFn> {
        self.functions
            .get(&(contract.to_string(), function.to_string()))
            .cloned()
    }
}

/// Handle given to contract code for the duration of one call.
pub struct ContractContext<'a> {
    state: &'a mut PendingState,
    sender: &'a str,
    environment: &'a Environment,
    budget: u64,
    spent: u64,
}

impl<'a> ContractContext<'a> {
    pub fn sender(&self) -> &str {
        self.sender
    }

    pub fn environment(&self) -> &Environment {
        self.environment
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Value>, String> {
        self.charge(READ_UNITS)?;
        Ok(self.state.get(key))
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), String> {
        self.charge(WRITE_UNITS)?;
        self.state.set(key, value);
        Ok(())
    }

    fn charge(&mut self, units: u64) -> Result<(), String> {
        self.spent = self.spent.saturating_add(units);
        if self.spent > self.budget {
            return Err("Out of stamps".to_string());
        }
        Ok(())
    }
}

pub struct NativeExecutor {
    registry: ContractRegistry,
    state: PendingState,
}

impl NativeExecutor {
    pub fn new(registry: ContractRegistry, committed: Arc<dyn CommittedState>) -> Self {
        Self {
            registry,
            state: PendingState::new(committed),
        }
    }

    pub fn pending_keys(&self) -> BTreeSet<String> {
        self.state.pending_keys()
    }
}

impl ContractExecutor for NativeExecutor {
    fn execute(&mut self, call: ContractCall<'_>) -> ExecutionResult {
        let stamp_cost = call.stamp_cost.max(1);
        let Some(function) = self.registry.get(call.contract, call.function) else {
            return ExecutionResult {
                status_code: STATUS_FAILURE,
                result: format!("Unknown function {}.{}", call.contract, call.function),
                stamps_used: 0,
                writes: Default::default(),
                reads: Default::default(),
            };
        };

        let kwargs = call
            .kwargs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Map<String, Value>>();

        let mut ctx = ContractContext {
            state: &mut self.state,
            sender: call.sender,
            environment: call.environment,
            budget: call.stamps.saturating_mul(stamp_cost),
            spent: 0,
        };
        let outcome = ctx.charge(BASE_UNITS).and_then(|_| function(&mut ctx, &kwargs));
        let spent = ctx.spent.min(ctx.budget);
        let stamps_used = spent.div_ceil(stamp_cost).min(call.stamps);

        match outcome {
            Ok(value) => {
                let (reads, writes) = self.state.finish_call();
                ExecutionResult {
                    status_code: STATUS_SUCCESS,
                    result: value.to_string(),
                    stamps_used,
                    writes,
                    reads,
                }
            }
            Err(err) => {
                log::debug!("{}.{} failed: {err}", call.contract, call.function);
                let reads = self.state.abort_call();
                ExecutionResult {
                    status_code: STATUS_FAILURE,
                    result: err,
                    stamps_used,
                    writes: Default::default(),
                    reads,
                }
            }
        }
    }

    fn purge(&mut self, keys: &BTreeSet<String>) {
        self.state.purge(keys);
    }

    fn clear_scratch(&mut self) {
        self.state.clear_scratch();
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use serde_json::json;

    use crate::block::types::transaction::TransactionBatch;
    use crate::execution::state::MemoryState;

    use super::*;

    fn registry() -> ContractRegistry {
        let mut registry = ContractRegistry::new();
        registry.register("counter", "increment", |ctx, kwargs| {
            let key = kwargs["key"].as_str().ok_or("key")?.to_string();
            let current = ctx.get(&key)?.and_then(|v| v.as_u64()).unwrap_or(0);
            ctx.set(&key, json!(current + 1))?;
            Ok(json!(current + 1))
        });
        registry.register("counter", "fail", |ctx, _| {
            ctx.set("x", json!(1))?;
            Err("assertion failed".to_string())
        });
        registry
    }

    fn call<'a>(
        function: &'a str,
        kwargs: &'a BTreeMap<String, Value>,
        environment: &'a Environment,
        stamps: u64,
    ) -> ContractCall<'a> {
        ContractCall {
            sender: "alice",
            contract: "counter",
            function,
            kwargs,
            stamps,
            stamp_cost: 20,
            environment,
            auto_commit: false,
        }
    }

    fn environment() -> Environment {
        Environment::for_batch("00", 1, &TransactionBatch::new(vec![], 0).unwrap())
    }

    #[test]
    fn test_success_keeps_pending_writes() {
        let mut executor = NativeExecutor::new(registry(), Arc::new(MemoryState::new()));
        let env = environment();
        let kwargs = BTreeMap::from([("key".to_string(), json!("k"))]);

        let first = executor.execute(call("increment", &kwargs, &env, 100));
        assert_eq!(first.status_code, STATUS_SUCCESS);
        assert_eq!(first.result, "1");
        assert_eq!(first.writes.get("k"), Some(&json!(1)));
        // (100 + 10 + 25) / 20 rounded up
        assert_eq!(first.stamps_used, 7);

        let second = executor.execute(call("increment", &kwargs, &env, 100));
        assert_eq!(second.result, "2");
    }

    #[test]
    fn test_failure_discards_writes() {
        let mut executor = NativeExecutor::new(registry(), Arc::new(MemoryState::new()));
        let env = environment();
        let kwargs = BTreeMap::new();

        let result = executor.execute(call("fail", &kwargs, &env, 100));
        assert_eq!(result.status_code, STATUS_FAILURE);
        assert_eq!(result.result, "assertion failed");
        assert!(result.writes.is_empty());
        assert!(executor.pending_keys().is_empty());
    }

    #[test]
    fn test_out_of_stamps() {
        let mut executor = NativeExecutor::new(registry(), Arc::new(MemoryState::new()));
        let env = environment();
        let kwargs = BTreeMap::from([("key".to_string(), json!("k"))]);

        // 5 stamps * 20 = 100 units, the base cost alone uses them up
        let result = executor.execute(call("increment", &kwargs, &env, 5));
        assert_eq!(result.status_code, STATUS_FAILURE);
        assert_eq!(result.result, "Out of stamps");
        assert_eq!(result.stamps_used, 5);
        assert!(executor.pending_keys().is_empty());
    }

    #[test]
    fn test_unknown_function() {
        let mut executor = NativeExecutor::new(registry(), Arc::new(MemoryState::new()));
        let env = environment();
        let kwargs = BTreeMap::new();
        let result = executor.execute(call("missing", &kwargs, &env, 100));
        assert_eq!(result.status_code, STATUS_FAILURE);
        assert_eq!(result.stamps_used, 0);
    }
}
