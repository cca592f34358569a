//! Scripted collaborators for integration tests.
//!
//! [`MockConnectionFactory`] counts connects and can be told to fail or stall;
//! every handle it opens shares one "tool server is broken" switch.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content, Tool};

use crate::sessions::{ConnectionFactory, Credential, ToolHandle, ToolList};

/// Tool definition with a permissive object schema.
#[must_use]
pub fn sample_tool(name: &str) -> Tool {
    let input_schema = serde_json::json!({
        "type": "object",
        "properties": {
            "account_id": { "type": "string" }
        },
    });
    let map = input_schema.as_object().cloned().unwrap_or_default();
    Tool {
        name: name.to_string().into(),
        title: Some(name.to_string().into()),
        description: Some(format!("Mock {name} tool").into()),
        input_schema: Arc::new(map),
        output_schema: None,
        annotations: None,
        execution: None,
        icons: None,
        meta: None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle returned by [`MockConnectionFactory`].
pub struct MockToolHandle {
    id: usize,
    credential: String,
    tools: ToolList,
    fail_list: Arc<AtomicBool>,
    list_calls: AtomicUsize,
    tool_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MockToolHandle {
    /// 1-based connect number that produced this handle.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }

    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn tool_calls(&self) -> usize {
        self.tool_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHandle for MockToolHandle {
    async fn list_tools(&self) -> Result<ToolList> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            bail!("mock tools/list failure on handle {}", self.id);
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        _arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        self.tool_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            bail!("mock tools/call failure on handle {}", self.id);
        }
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{name} ok for {}",
            self.credential
        ))]))
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory with scripted failures and a record of every handle it opened.
pub struct MockConnectionFactory {
    tools: ToolList,
    connects: AtomicUsize,
    fail_connect: AtomicBool,
    fail_next_connects: AtomicU32,
    fail_list: Arc<AtomicBool>,
    connect_delay: Mutex<Duration>,
    handles: Mutex<Vec<Arc<MockToolHandle>>>,
}

impl Default for MockConnectionFactory {
    fn default() -> Self {
        Self::with_tools(vec![sample_tool("get_balance")])
    }
}

impl MockConnectionFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tools(tools: ToolList) -> Self {
        Self {
            tools,
            connects: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            fail_next_connects: AtomicU32::new(0),
            fail_list: Arc::new(AtomicBool::new(false)),
            connect_delay: Mutex::new(Duration::ZERO),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Connect attempts seen so far, failed ones included.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Fail every connect until switched back.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Fail only the next `count` connects.
    pub fn fail_next_connects(&self, count: u32) {
        self.fail_next_connects.store(count, Ordering::SeqCst);
    }

    /// Make `list_tools` and `call_tool` fail on every handle, open or future.
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Stall each connect for `delay` (tokio time, so paused clocks apply).
    pub fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.connect_delay) = delay;
    }

    #[must_use]
    pub fn handles(&self) -> Vec<Arc<MockToolHandle>> {
        lock(&self.handles).clone()
    }

    #[must_use]
    pub fn last_handle(&self) -> Option<Arc<MockToolHandle>> {
        lock(&self.handles).last().cloned()
    }

    /// Sum of `close` calls across every handle opened.
    #[must_use]
    pub fn total_closes(&self) -> usize {
        lock(&self.handles)
            .iter()
            .map(|handle| handle.close_calls())
            .sum()
    }

    fn should_fail(&self) -> bool {
        if self.fail_connect.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn connect(
        &self,
        server_url: &str,
        credential: &Credential,
    ) -> Result<Arc<dyn ToolHandle>> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *lock(&self.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail() {
            bail!("mock connect failure #{id} to {server_url}");
        }
        let handle = Arc::new(MockToolHandle {
            id,
            credential: credential.expose().to_string(),
            tools: self.tools.clone(),
            fail_list: Arc::clone(&self.fail_list),
            list_calls: AtomicUsize::new(0),
            tool_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        });
        lock(&self.handles).push(Arc::clone(&handle));
        Ok(handle)
    }
}
