use std::sync::Arc;

use async_trait::async_trait;
use pagebridge_core::Result;
use pagebridge_tools::indexed_db::{IndexedDbAction, IndexedDbParams, NAME};
use pagebridge_tools::Params;
use serde_json::{json, Value};

use super::Handler;
use crate::env::{subsystem, IdbKey, PageEnv};

pub struct IndexedDbHandler {
    env: Arc<dyn PageEnv>,
}

impl IndexedDbHandler {
    pub fn new(env: Arc<dyn PageEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Handler for IndexedDbHandler {
    fn name(&self) -> &str {
        NAME
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        use IndexedDbAction::*;

        let params = IndexedDbParams::parse(&params)?;
        let idb = subsystem(self.env.indexed_db(), "indexedDB")?;

        match params.action {
            ListDatabases => {
                let databases = idb.databases().await?;
                Ok(json!({"count": databases.len(), "databases": databases}))
            }
            GetDatabaseInfo => {
                let info = idb.info(params.database()?).await?;
                Ok(serde_json::to_value(info)?)
            }
            GetKeys => {
                let (database, store) = (params.database()?, params.store()?);
                let keys: Vec<Value> = idb
                    .get_keys(database, store, params.limit.map(|n| n as usize))
                    .await?
                    .iter()
                    .map(IdbKey::to_json)
                    .collect();
                Ok(json!({"database": database, "store": store, "count": keys.len(), "keys": keys}))
            }
            GetEntry => {
                let key = IdbKey::from_json(params.key()?)?;
                let found = idb.get(params.database()?, params.store()?, &key).await?;
                Ok(match found {
                    Some(value) => json!({"found": true, "key": key.to_json(), "value": value}),
                    None => json!({"found": false, "key": key.to_json()}),
                })
            }
            SetEntry => {
                let key = params.key.as_ref().map(IdbKey::from_json).transpose()?;
                let value = params.value()?.clone();
                let stored = idb.put(params.database()?, params.store()?, key, value).await?;
                Ok(json!({"success": true, "key": stored.to_json()}))
            }
            DeleteEntry => {
                let key = IdbKey::from_json(params.key()?)?;
                idb.delete(params.database()?, params.store()?, &key).await?;
                Ok(json!({"success": true, "key": key.to_json()}))
            }
            ClearObjectStore => {
                let cleared = idb.clear(params.database()?, params.store()?).await?;
                Ok(json!({"success": true, "cleared": cleared}))
            }
            DeleteDatabase => {
                let database = params.database()?;
                idb.delete_database(database).await?;
                Ok(json!({"success": true, "database": database}))
            }
        }
    }
}
