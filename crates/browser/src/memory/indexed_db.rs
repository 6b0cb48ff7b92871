use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use pagebridge_core::{Error, Result};
use serde_json::Value;

use crate::env::{DatabaseInfo, DatabaseSummary, IdbFactory, IdbKey, ObjectStoreInfo};

/// Options for [`MemoryIdb::create_object_store`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub key_path: Option<String>,
    pub auto_increment: bool,
    pub index_names: Vec<String>,
}

/// Largest key a generator hands out; past it the generator is exhausted.
const MAX_GENERATED_KEY: u64 = 1 << 53;

struct ObjectStore {
    options: StoreOptions,
    /// Next generated key. Above `MAX_GENERATED_KEY` means exhausted.
    next_key: u64,
    records: BTreeMap<IdbKey, Value>,
}

impl ObjectStore {
    fn new(options: StoreOptions) -> Self {
        Self {
            options,
            next_key: 1,
            records: BTreeMap::new(),
        }
    }

    fn generate_key(&mut self) -> Result<IdbKey> {
        if self.next_key > MAX_GENERATED_KEY {
            return Err(Error::Browser(
                "ConstraintError: The key generator has reached its maximum value.".to_string(),
            ));
        }
        let key = self.next_key;
        self.next_key += 1;
        Ok(IdbKey::Number(key as f64))
    }

    /// Explicit numeric keys push the generator past them.
    fn observe_key(&mut self, key: &IdbKey) {
        let IdbKey::Number(n) = key else {
            return;
        };
        if *n < self.next_key as f64 {
            return;
        }
        self.next_key = if *n >= MAX_GENERATED_KEY as f64 {
            MAX_GENERATED_KEY + 1
        } else {
            (n.floor() as u64)
                .checked_add(1)
                .unwrap_or(MAX_GENERATED_KEY + 1)
        };
    }

    fn resolve_key(&mut self, key: Option<IdbKey>, value: &mut Value) -> Result<IdbKey> {
        match self.options.key_path.clone() {
            Some(path) => {
                if key.is_some() {
                    return Err(Error::Browser(
                        "DataError: The object store uses in-line keys and the key parameter was provided."
                            .to_string(),
                    ));
                }
                match lookup_path(value, &path) {
                    Some(inline) => {
                        let key = IdbKey::from_json(inline)?;
                        if self.options.auto_increment {
                            self.observe_key(&key);
                        }
                        Ok(key)
                    }
                    None if self.options.auto_increment => {
                        let key = self.generate_key()?;
                        inject_path(value, &path, key.to_json())?;
                        Ok(key)
                    }
                    None => Err(Error::Browser(format!(
                        "DataError: Evaluating the object store's key path '{}' did not yield a value.",
                        path
                    ))),
                }
            }
            None => match key {
                Some(key) => {
                    if self.options.auto_increment {
                        self.observe_key(&key);
                    }
                    Ok(key)
                }
                None if self.options.auto_increment => self.generate_key(),
                None => Err(Error::Browser(
                    "DataError: The object store uses out-of-line keys and has no key generator and the key parameter was not provided."
                        .to_string(),
                )),
            },
        }
    }
}

fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, part| v.get(part))
}

fn inject_path(value: &mut Value, path: &str, key: Value) -> Result<()> {
    let mut target = value;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let obj = match target {
            Value::Object(map) => map,
            _ => {
                return Err(Error::Browser(format!(
                    "DataError: Cannot assign a generated key to key path '{}'.",
                    path
                )))
            }
        };
        if parts.peek().is_none() {
            obj.insert(part.to_string(), key);
            return Ok(());
        }
        target = obj
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    Ok(())
}

struct Database {
    version: u64,
    stores: BTreeMap<String, ObjectStore>,
}

/// All databases of one origin.
#[derive(Default)]
pub struct MemoryIdb {
    databases: Mutex<BTreeMap<String, Database>>,
}

impl MemoryIdb {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Database>> {
        self.databases.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create `store` in `database`, opening the database at a new version
    /// the way an upgrade transaction would.
    pub fn create_object_store(&self, database: &str, store: &str, options: StoreOptions) -> Result<()> {
        let mut dbs = self.lock();
        let db = dbs.entry(database.to_string()).or_insert_with(|| Database {
            version: 0,
            stores: BTreeMap::new(),
        });
        if db.stores.contains_key(store) {
            return Err(Error::Browser(format!(
                "ConstraintError: An object store with the specified name '{}' already exists.",
                store
            )));
        }
        db.version += 1;
        db.stores.insert(store.to_string(), ObjectStore::new(options));
        Ok(())
    }

    fn with_store<T>(
        &self,
        database: &str,
        store: &str,
        f: impl FnOnce(&mut ObjectStore) -> Result<T>,
    ) -> Result<T> {
        let mut dbs = self.lock();
        let db = dbs.get_mut(database).ok_or_else(|| missing_database(database))?;
        let os = db.stores.get_mut(store).ok_or_else(|| {
            Error::Browser(format!(
                "NotFoundError: Object store '{}' not found in database '{}'.",
                store, database
            ))
        })?;
        f(os)
    }
}

fn missing_database(database: &str) -> Error {
    Error::Browser(format!("NotFoundError: Database '{}' not found.", database))
}

#[async_trait]
impl IdbFactory for MemoryIdb {
    async fn databases(&self) -> Result<Vec<DatabaseSummary>> {
        Ok(self
            .lock()
            .iter()
            .map(|(name, db)| DatabaseSummary {
                name: name.clone(),
                version: db.version,
            })
            .collect())
    }

    async fn info(&self, database: &str) -> Result<DatabaseInfo> {
        let dbs = self.lock();
        let db = dbs.get(database).ok_or_else(|| missing_database(database))?;
        Ok(DatabaseInfo {
            name: database.to_string(),
            version: db.version,
            object_stores: db
                .stores
                .iter()
                .map(|(name, os)| ObjectStoreInfo {
                    name: name.clone(),
                    key_path: os.options.key_path.clone(),
                    auto_increment: os.options.auto_increment,
                    index_names: os.options.index_names.clone(),
                    count: os.records.len(),
                })
                .collect(),
        })
    }

    async fn get_keys(&self, database: &str, store: &str, limit: Option<usize>) -> Result<Vec<IdbKey>> {
        self.with_store(database, store, |os| {
            let keys = os.records.keys().cloned();
            Ok(match limit {
                Some(n) => keys.take(n).collect(),
                None => keys.collect(),
            })
        })
    }

    async fn get(&self, database: &str, store: &str, key: &IdbKey) -> Result<Option<Value>> {
        self.with_store(database, store, |os| Ok(os.records.get(key).cloned()))
    }

    async fn put(&self, database: &str, store: &str, key: Option<IdbKey>, mut value: Value) -> Result<IdbKey> {
        self.with_store(database, store, |os| {
            let key = os.resolve_key(key, &mut value)?;
            os.records.insert(key.clone(), value);
            Ok(key)
        })
    }

    async fn delete(&self, database: &str, store: &str, key: &IdbKey) -> Result<()> {
        self.with_store(database, store, |os| {
            os.records.remove(key);
            Ok(())
        })
    }

    async fn clear(&self, database: &str, store: &str) -> Result<usize> {
        self.with_store(database, store, |os| {
            let count = os.records.len();
            os.records.clear();
            Ok(count)
        })
    }

    async fn delete_database(&self, database: &str) -> Result<()> {
        // Deleting a database that does not exist succeeds.
        self.lock().remove(database);
        Ok(())
    }
}
