use std::sync::Arc;

use async_trait::async_trait;
use pagebridge_core::Result;
use pagebridge_tools::console::{ConsoleParams, ConsoleReadout, NAME};
use pagebridge_tools::Params;
use serde_json::Value;

use super::Handler;
use crate::env::{subsystem, PageEnv};

pub struct ConsoleHandler {
    env: Arc<dyn PageEnv>,
}

impl ConsoleHandler {
    pub fn new(env: Arc<dyn PageEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Handler for ConsoleHandler {
    fn name(&self) -> &str {
        NAME
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let params = ConsoleParams::parse(&params)?;
        let sink = subsystem(self.env.console(), "console")?;

        let mut logs: Vec<_> = sink
            .snapshot()
            .into_iter()
            .filter(|e| params.level.map(|l| e.level == l).unwrap_or(true))
            .collect();
        let total = logs.len();
        if let Some(limit) = params.limit {
            let limit = limit as usize;
            if logs.len() > limit {
                logs.drain(..logs.len() - limit);
            }
        }

        let readout = ConsoleReadout {
            count: logs.len(),
            total,
            logs,
        };
        Ok(serde_json::to_value(readout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DetachedEnv;
    use crate::memory::MemoryPage;
    use serde_json::json;

    fn handler_with_lines() -> ConsoleHandler {
        let page = MemoryPage::new().unwrap();
        let sink = page.console_sink().unwrap();
        sink.log("boot");
        sink.warn("slow");
        sink.error("fail 1");
        sink.log("ready");
        sink.error("fail 2");
        ConsoleHandler::new(Arc::new(page))
    }

    #[tokio::test]
    async fn test_all_entries() {
        let out = handler_with_lines().execute(json!({})).await.unwrap();
        assert_eq!(out["count"], 5);
        assert_eq!(out["total"], 5);
        assert_eq!(out["logs"][0]["type"], "log");
        assert_eq!(out["logs"][0]["message"], "boot");
    }

    #[tokio::test]
    async fn test_filter_then_tail() {
        let out = handler_with_lines()
            .execute(json!({"type": "error", "limit": 1}))
            .await
            .unwrap();
        assert_eq!(out["total"], 2);
        assert_eq!(out["count"], 1);
        assert_eq!(out["logs"][0]["message"], "fail 2");
    }

    #[tokio::test]
    async fn test_read_is_idempotent() {
        let handler = handler_with_lines();
        let first = handler.execute(json!({"limit": 3})).await.unwrap();
        let second = handler.execute(json!({"limit": 3})).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unavailable_without_console() {
        let handler = ConsoleHandler::new(Arc::new(DetachedEnv));
        let err = handler.execute(json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "console is not available in this environment");
    }
}
