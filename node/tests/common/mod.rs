use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};

use parallax::block::types::transaction::{
    Transaction, TransactionBatch, TransactionPayload,
};
use parallax::config::ExecutionConfiguration;
use parallax::execution::native::{ContractRegistry, NativeExecutor};
use parallax::execution::state::MemoryState;
use parallax::utilities::crypto::{Keypair, NodeKeypair, NodePublicKey};
use parallax::{ContractExecutor, ExecutorFactory};

pub fn balance_key(account: &str) -> String {
    format!("currency.balances:{account}")
}

/// Currency contract that sleeps a random few milliseconds per call so that workers finish
/// in a different order on every run.
pub fn currency() -> ContractRegistry {
    let mut registry = ContractRegistry::new();
    registry.register("currency", "transfer", |ctx, kwargs| {
        let jitter = rand::thread_rng().gen_range(0..3);
        std::thread::sleep(Duration::from_millis(jitter));

        let amount = kwargs.get("amount").and_then(Value::as_u64).ok_or("amount")?;
        let to = kwargs.get("to").and_then(Value::as_str).ok_or("to")?;
        let from_key = balance_key(ctx.sender());
        let to_key = balance_key(to);

        let balance = ctx.get(&from_key)?.and_then(|v| v.as_u64()).unwrap_or(0);
        if balance < amount {
            return Err(format!("Insufficient balance {balance} < {amount}"));
        }
        let to_balance = ctx.get(&to_key)?.and_then(|v| v.as_u64()).unwrap_or(0);
        ctx.set(&from_key, json!(balance - amount))?;
        ctx.set(&to_key, json!(to_balance + amount))?;
        Ok(json!(balance - amount))
    });
    registry
}

pub fn factory(committed: Arc<MemoryState>) -> ExecutorFactory {
    let registry = currency();
    Arc::new(
        move |_: usize| -> anyhow::Result<Box<dyn ContractExecutor>> {
            Ok(Box::new(NativeExecutor::new(
                registry.clone(),
                committed.clone(),
            )))
        },
    )
}

pub struct Account {
    pub keypair: Keypair,
    pub name: String,
}

impl Account {
    pub fn new() -> Self {
        let keypair = Keypair::generate();
        let name = keypair.public_key().to_base58();
        Self { keypair, name }
    }

    pub fn transfer(&self, to: &Account, amount: u64, nonce: u64) -> Transaction {
        let payload = TransactionPayload {
            sender: self.name.clone(),
            processor: "processor".to_string(),
            contract: "currency".to_string(),
            function: "transfer".to_string(),
            kwargs: BTreeMap::from([
                ("to".to_string(), json!(to.name)),
                ("amount".to_string(), json!(amount)),
            ]),
            nonce,
            stamps_supplied: 50,
        };
        Transaction::new_signed(payload, &self.keypair).unwrap()
    }
}

pub fn state_with(balances: &[(&Account, u64)]) -> Arc<MemoryState> {
    let state = Arc::new(MemoryState::new());
    for (account, balance) in balances {
        state.set(&balance_key(&account.name), json!(balance));
    }
    state
}

/// A chain of dependent transfers spread over three batches, plus independent ones.
pub fn batches(accounts: &[Account]) -> Vec<TransactionBatch> {
    let [a, b, c, d, e] = accounts else {
        panic!("expected 5 accounts");
    };
    vec![
        TransactionBatch::new(vec![a.transfer(b, 40, 0), d.transfer(e, 1, 0)], 1_000).unwrap(),
        TransactionBatch::new(vec![b.transfer(c, 30, 0), d.transfer(e, 2, 1)], 1_001).unwrap(),
        TransactionBatch::new(vec![c.transfer(a, 25, 0), e.transfer(d, 3, 0)], 1_002).unwrap(),
    ]
}

pub fn execution_config(workers: usize) -> ExecutionConfiguration {
    let mut config = ExecutionConfiguration::new(workers, 4);
    config.collect_poll_interval_ms = 10;
    config
}
