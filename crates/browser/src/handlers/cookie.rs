use std::sync::Arc;

use async_trait::async_trait;
use pagebridge_core::Result;
use pagebridge_tools::byte_size;
use pagebridge_tools::cookie::{CookieAction, CookieParams, SameSite, NAME};
use pagebridge_tools::Params;
use serde_json::{json, Value};

use super::Handler;
use crate::env::{subsystem, Document, PageEnv};

pub struct CookieHandler {
    env: Arc<dyn PageEnv>,
}

/// Split `document.cookie` into decoded `(name, value)` pairs.
fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some((name.to_string(), value))
        })
        .collect()
}

fn find_cookie(doc: &dyn Document, name: &str) -> Option<String> {
    parse_cookie_header(&doc.cookie())
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
}

/// Attributes shared by writes and removals so both address the same cookie.
fn scope_attributes(params: &CookieParams) -> String {
    let mut attrs = format!("; path={}", params.path.as_deref().unwrap_or("/"));
    if let Some(domain) = &params.domain {
        attrs.push_str(&format!("; domain={}", domain));
    }
    attrs
}

fn cookie_string(params: &CookieParams, name: &str, value: &str) -> String {
    let mut cookie = format!("{}={}", name, urlencoding::encode(value));
    cookie.push_str(&scope_attributes(params));
    if let Some(max_age) = params.max_age {
        cookie.push_str(&format!("; max-age={}", max_age));
    }
    if let Some(expires) = &params.expires {
        cookie.push_str(&format!("; expires={}", expires));
    }
    if params.secure == Some(true) {
        cookie.push_str("; secure");
    }
    if let Some(same_site) = params.same_site {
        let same_site = match same_site {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        };
        cookie.push_str(&format!("; samesite={}", same_site));
    }
    cookie
}

impl CookieHandler {
    pub fn new(env: Arc<dyn PageEnv>) -> Self {
        Self { env }
    }

    fn write(&self, doc: &dyn Document, params: &CookieParams) -> Result<Value> {
        let name = params.name()?;
        let value = params.value()?;
        doc.set_cookie(&cookie_string(params, name, value))?;
        Ok(json!({"success": true, "name": name, "value": value}))
    }
}

#[async_trait]
impl Handler for CookieHandler {
    fn name(&self) -> &str {
        NAME
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let params = CookieParams::parse(&params)?;
        let doc = subsystem(self.env.document(), "document")?;

        match params.action {
            CookieAction::Read => {
                let cookies: Vec<Value> = parse_cookie_header(&doc.cookie())
                    .into_iter()
                    .map(|(name, value)| json!({"name": name, "size": byte_size(&value), "value": value}))
                    .collect();
                Ok(json!({"count": cookies.len(), "cookies": cookies}))
            }
            CookieAction::Get => {
                let name = params.name()?;
                Ok(match find_cookie(doc, name) {
                    Some(value) => {
                        json!({"found": true, "name": name, "size": byte_size(&value), "value": value})
                    }
                    None => json!({"found": false, "name": name}),
                })
            }
            CookieAction::Set => self.write(doc, &params),
            CookieAction::Edit => {
                let name = params.name()?;
                if find_cookie(doc, name).is_none() {
                    return Ok(json!({
                        "success": false,
                        "name": name,
                        "error": format!("Cookie '{}' not found", name),
                    }));
                }
                self.write(doc, &params)
            }
            CookieAction::Remove => {
                let name = params.name()?;
                if find_cookie(doc, name).is_none() {
                    return Ok(json!({"success": false, "name": name}));
                }
                doc.set_cookie(&format!("{}={}; max-age=0", name, scope_attributes(&params)))?;
                Ok(json!({"success": true, "name": name}))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DetachedEnv;
    use crate::memory::MemoryPage;

    fn handler() -> CookieHandler {
        CookieHandler::new(Arc::new(MemoryPage::new().unwrap()))
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let h = handler();
        let value = "héllo wörld; = & 🙂";
        let out = h
            .execute(json!({"action": "set", "name": "greeting", "value": value}))
            .await
            .unwrap();
        assert_eq!(out["success"], true);

        let got = h.execute(json!({"action": "get", "name": "greeting"})).await.unwrap();
        assert_eq!(got["found"], true);
        assert_eq!(got["value"], value);
        assert_eq!(got["size"], value.len());
    }

    #[tokio::test]
    async fn test_read_lists_decoded_values() {
        let h = handler();
        h.execute(json!({"action": "set", "name": "a", "value": "1"})).await.unwrap();
        h.execute(json!({"action": "set", "name": "b", "value": "日本"})).await.unwrap();
        let out = h.execute(json!({"action": "read"})).await.unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["cookies"][1]["value"], "日本");
        assert_eq!(out["cookies"][1]["size"], 6);
    }

    #[tokio::test]
    async fn test_edit_requires_existing_cookie() {
        let h = handler();
        let out = h
            .execute(json!({"action": "edit", "name": "missing", "value": "x"}))
            .await
            .unwrap();
        assert_eq!(out["success"], false);

        h.execute(json!({"action": "set", "name": "a", "value": "1"})).await.unwrap();
        let out = h.execute(json!({"action": "edit", "name": "a", "value": "2"})).await.unwrap();
        assert_eq!(out["success"], true);
        let got = h.execute(json!({"action": "get", "name": "a"})).await.unwrap();
        assert_eq!(got["value"], "2");
    }

    #[tokio::test]
    async fn test_remove_boundary() {
        let h = handler();
        let out = h.execute(json!({"action": "remove", "name": "nope"})).await.unwrap();
        assert_eq!(out["success"], false);

        h.execute(json!({"action": "set", "name": "a", "value": "1"})).await.unwrap();
        let out = h.execute(json!({"action": "remove", "name": "a"})).await.unwrap();
        assert_eq!(out["success"], true);
        let read = h.execute(json!({"action": "read"})).await.unwrap();
        assert_eq!(read["count"], 0);
    }

    #[tokio::test]
    async fn test_negative_max_age_set_expires_immediately() {
        let h = handler();
        h.execute(json!({"action": "set", "name": "a", "value": "1", "maxAge": -1}))
            .await
            .unwrap();
        let got = h.execute(json!({"action": "get", "name": "a"})).await.unwrap();
        assert_eq!(got["found"], false);
    }

    #[tokio::test]
    async fn test_invalid_params_and_no_document() {
        let h = handler();
        assert!(h.execute(json!({"action": "get"})).await.is_err());

        let detached = CookieHandler::new(Arc::new(DetachedEnv));
        let err = detached.execute(json!({"action": "read"})).await.unwrap_err();
        assert_eq!(err.to_string(), "document is not available in this environment");
    }
}
