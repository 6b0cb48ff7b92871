use std::sync::Arc;

use async_trait::async_trait;
use pagebridge_core::Result;
use pagebridge_tools::cache::{CacheAction, CacheParams, NAME};
use pagebridge_tools::{byte_size, Params};
use serde_json::{json, Value};

use super::Handler;
use crate::env::{subsystem, CacheStorage, CachedResponse, PageEnv};

pub struct CacheHandler {
    env: Arc<dyn PageEnv>,
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

impl CacheHandler {
    pub fn new(env: Arc<dyn PageEnv>) -> Self {
        Self { env }
    }

    async fn clear(&self, caches: &dyn CacheStorage, params: &CacheParams) -> Result<Value> {
        match &params.cache_name {
            Some(name) => {
                if !caches.has(name).await? {
                    return Ok(json!({"success": false, "cacheName": name, "cleared": 0}));
                }
                let cache = caches.open(name).await?;
                let keys = cache.keys().await?;
                for request in &keys {
                    cache.delete(&request.url).await?;
                }
                Ok(json!({"success": true, "cacheName": name, "cleared": keys.len()}))
            }
            None => {
                let names = caches.keys().await?;
                for name in &names {
                    caches.delete(name).await?;
                }
                Ok(json!({"success": true, "cleared": names.len()}))
            }
        }
    }
}

#[async_trait]
impl Handler for CacheHandler {
    fn name(&self) -> &str {
        NAME
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let params = CacheParams::parse(&params)?;
        let caches = subsystem(self.env.caches(), "caches")?;

        match params.action {
            CacheAction::List => {
                let names = caches.keys().await?;
                Ok(json!({"count": names.len(), "caches": names}))
            }
            CacheAction::GetKeys => {
                let name = params.cache_name()?;
                if !caches.has(name).await? {
                    return Ok(json!({"cacheName": name, "keys": [], "count": 0}));
                }
                let keys = caches.open(name).await?.keys().await?;
                Ok(json!({"cacheName": name, "count": keys.len(), "keys": keys}))
            }
            CacheAction::GetEntry => {
                let (name, key) = (params.cache_name()?, params.key()?);
                // Reads never create the cache.
                let found = if caches.has(name).await? {
                    caches.open(name).await?.match_request(key).await?
                } else {
                    None
                };
                Ok(match found {
                    Some(resp) => json!({
                        "found": true,
                        "key": key,
                        "response": {
                            "status": resp.status,
                            "statusText": resp.status_text,
                            "headers": resp.headers,
                            "size": byte_size(&resp.body),
                            "body": resp.body,
                        }
                    }),
                    None => json!({"found": false, "key": key}),
                })
            }
            CacheAction::SetEntry => {
                let (name, key, body) = (params.cache_name()?, params.key()?, params.body()?);
                let status = params.status.unwrap_or(200);
                let mut headers = params.headers.clone().unwrap_or_default();
                if !headers.keys().any(|h| h.eq_ignore_ascii_case("content-type")) {
                    headers.insert(
                        "content-type".to_string(),
                        "text/plain;charset=UTF-8".to_string(),
                    );
                }
                let response = CachedResponse {
                    status,
                    status_text: status_text(status).to_string(),
                    headers,
                    body: body.to_string(),
                };
                caches.open(name).await?.put(key, response).await?;
                Ok(json!({"success": true, "cacheName": name, "key": key}))
            }
            CacheAction::DeleteEntry => {
                let (name, key) = (params.cache_name()?, params.key()?);
                let deleted = if caches.has(name).await? {
                    caches.open(name).await?.delete(key).await?
                } else {
                    false
                };
                Ok(json!({"success": deleted, "cacheName": name, "key": key}))
            }
            CacheAction::Delete => {
                let name = params.cache_name()?;
                let deleted = caches.delete(name).await?;
                Ok(json!({"success": deleted, "cacheName": name}))
            }
            CacheAction::Clear => self.clear(caches, &params).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DetachedEnv;
    use crate::memory::MemoryPage;

    fn handler() -> CacheHandler {
        CacheHandler::new(Arc::new(MemoryPage::new().unwrap()))
    }

    #[tokio::test]
    async fn test_v1_set_then_get_entry() {
        let h = handler();
        let out = h
            .execute(json!({"action": "set_entry", "cacheName": "v1", "key": "/a", "body": "hello"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"success": true, "cacheName": "v1", "key": "/a"}));

        let got = h
            .execute(json!({"action": "get_entry", "cacheName": "v1", "key": "/a"}))
            .await
            .unwrap();
        assert_eq!(got["found"], true);
        assert_eq!(got["response"]["body"], "hello");
        assert_eq!(got["response"]["status"], 200);
        assert_eq!(got["response"]["statusText"], "OK");
        assert_eq!(got["response"]["size"], 5);
        assert_eq!(got["response"]["headers"]["content-type"], "text/plain;charset=UTF-8");
    }

    #[tokio::test]
    async fn test_list_and_keys() {
        let h = handler();
        h.execute(json!({"action": "set_entry", "cacheName": "v1", "key": "/a", "body": "1"}))
            .await
            .unwrap();
        h.execute(json!({"action": "set_entry", "cacheName": "v2", "key": "/b", "body": "2", "status": 404}))
            .await
            .unwrap();

        let list = h.execute(json!({"action": "list"})).await.unwrap();
        assert_eq!(list, json!({"caches": ["v1", "v2"], "count": 2}));

        let keys = h.execute(json!({"action": "get_keys", "cacheName": "v2"})).await.unwrap();
        assert_eq!(keys["count"], 1);
        assert_eq!(keys["keys"][0]["url"], "http://localhost:5173/b");
        assert_eq!(keys["keys"][0]["method"], "GET");
    }

    #[tokio::test]
    async fn test_reads_do_not_create_caches() {
        let h = handler();
        let got = h
            .execute(json!({"action": "get_entry", "cacheName": "ghost", "key": "/a"}))
            .await
            .unwrap();
        assert_eq!(got["found"], false);
        h.execute(json!({"action": "get_keys", "cacheName": "ghost"})).await.unwrap();
        let list = h.execute(json!({"action": "list"})).await.unwrap();
        assert_eq!(list["count"], 0);
    }

    #[tokio::test]
    async fn test_delete_entry_and_cache() {
        let h = handler();
        h.execute(json!({"action": "set_entry", "cacheName": "v1", "key": "/a", "body": "1"}))
            .await
            .unwrap();
        let out = h
            .execute(json!({"action": "delete_entry", "cacheName": "v1", "key": "/a"}))
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        let out = h
            .execute(json!({"action": "delete_entry", "cacheName": "v1", "key": "/a"}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);

        assert_eq!(h.execute(json!({"action": "delete", "cacheName": "v1"})).await.unwrap()["success"], true);
        assert_eq!(h.execute(json!({"action": "delete", "cacheName": "v1"})).await.unwrap()["success"], false);
    }

    #[tokio::test]
    async fn test_clear_counts_before() {
        let h = handler();
        for key in ["/a", "/b", "/c"] {
            h.execute(json!({"action": "set_entry", "cacheName": "v1", "key": key, "body": ""}))
                .await
                .unwrap();
        }
        h.execute(json!({"action": "set_entry", "cacheName": "v2", "key": "/a", "body": ""}))
            .await
            .unwrap();

        let one = h.execute(json!({"action": "clear", "cacheName": "v1"})).await.unwrap();
        assert_eq!(one, json!({"success": true, "cacheName": "v1", "cleared": 3}));

        let all = h.execute(json!({"action": "clear"})).await.unwrap();
        assert_eq!(all, json!({"success": true, "cleared": 2}));
        let again = h.execute(json!({"action": "clear"})).await.unwrap();
        assert_eq!(again, json!({"success": true, "cleared": 0}));
    }

    #[tokio::test]
    async fn test_no_cache_storage() {
        let h = CacheHandler::new(Arc::new(DetachedEnv));
        let err = h.execute(json!({"action": "list"})).await.unwrap_err();
        assert_eq!(err.to_string(), "caches is not available in this environment");
    }
}
