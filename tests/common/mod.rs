//! Shared fixtures: a small customer directory whose objects count their calls.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use query_chain::{async_trait, Identity, Object, Value};

#[derive(Clone)]
struct Record {
    name: String,
    child: Option<String>,
}

/// In-memory customer store. Calls are counted as `"{id}.{method}"`.
#[derive(Default)]
pub struct Directory {
    records: Mutex<HashMap<String, Record>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
}

impl Directory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Customer A ("Alice") whose child is C1 ("C1").
    pub fn sample() -> Arc<Self> {
        let directory = Self::new();
        directory.insert("A", "Alice", Some("C1"));
        directory.insert("C1", "C1", None);
        directory
    }

    pub fn insert(&self, id: &str, name: &str, child: Option<&str>) {
        self.records.lock().insert(
            id.to_string(),
            Record {
                name: name.to_string(),
                child: child.map(str::to_string),
            },
        );
    }

    pub fn rename(&self, id: &str, name: &str) {
        if let Some(record) = self.records.lock().get_mut(id) {
            record.name = name.to_string();
        }
    }

    /// While offline every call fails, after being counted.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Snapshot of customer `id` as a chain root.
    pub fn customer(self: &Arc<Self>, id: &str) -> Value {
        let name = self
            .records
            .lock()
            .get(id)
            .map(|record| record.name.clone())
            .unwrap_or_default();
        Value::object(Customer {
            id: id.to_string(),
            name,
            directory: self.clone(),
        })
    }

    pub fn calls(&self, call: &str) -> usize {
        self.calls.lock().get(call).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn record_call(&self, id: &str, method: &str) -> anyhow::Result<()> {
        *self
            .calls
            .lock()
            .entry(format!("{id}.{method}"))
            .or_default() += 1;
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("directory offline");
        }
        Ok(())
    }

    fn detailed(self: &Arc<Self>, id: &str) -> Value {
        let record = self.records.lock().get(id).cloned();
        let Some(record) = record else {
            return Value::Null;
        };
        let child = record
            .child
            .map(|child| self.customer(&child))
            .unwrap_or_default();
        Value::object(DetailedCustomer {
            id: id.to_string(),
            name: record.name,
            child,
            directory: self.clone(),
        })
    }
}

pub struct Customer {
    id: String,
    name: String,
    directory: Arc<Directory>,
}

impl fmt::Debug for Customer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Customer({})", self.id)
    }
}

impl Hash for Customer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.name.hash(state);
    }
}

#[async_trait]
impl Object for Customer {
    fn type_name(&self) -> &'static str {
        "Customer"
    }

    fn identity(&self) -> Option<Identity> {
        Some(Identity::new("Customer", &self.id))
    }

    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "id" => Some(self.id.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            _ => None,
        }
    }

    fn is_callable(&self, method: &str) -> bool {
        matches!(method, "getDetailed" | "findDetailed" | "getName")
    }

    async fn call(&self, method: &str, _args: &[Value]) -> anyhow::Result<Value> {
        tokio::task::yield_now().await;
        self.directory.record_call(&self.id, method)?;
        match method {
            "getDetailed" => Ok(self.directory.detailed(&self.id)),
            "findDetailed" => Ok(Value::Null),
            "getName" => Ok(Value::from(format!("Customer {}", self.name))),
            _ => anyhow::bail!("unknown method {method}"),
        }
    }
}

pub struct DetailedCustomer {
    id: String,
    name: String,
    child: Value,
    directory: Arc<Directory>,
}

impl fmt::Debug for DetailedCustomer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DetailedCustomer({})", self.id)
    }
}

impl Hash for DetailedCustomer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.name.hash(state);
        self.child.hash(state);
    }
}

#[async_trait]
impl Object for DetailedCustomer {
    fn type_name(&self) -> &'static str {
        "DetailedCustomer"
    }

    fn identity(&self) -> Option<Identity> {
        Some(Identity::new("DetailedCustomer", &self.id))
    }

    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "name" => Some(self.name.as_str().into()),
            "child" => Some(self.child.clone()),
            _ => None,
        }
    }

    fn is_callable(&self, method: &str) -> bool {
        method == "getName"
    }

    async fn call(&self, method: &str, _args: &[Value]) -> anyhow::Result<Value> {
        tokio::task::yield_now().await;
        self.directory.record_call(&self.id, method)?;
        Ok(Value::from(format!("Customer {}", self.name)))
    }
}
