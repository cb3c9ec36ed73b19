//! Page renderer capability
//!
//! A renderer opens one page in a fresh browser context and hands back a
//! session that answers requests one at a time. Sessions must be closed
//! with [`PageSession::close`]; implementations also release their
//! resources on drop so a cancelled capture never leaks a browser.

use async_trait::async_trait;

use crate::error::CaptureResult;

/// Opens pages in fresh renderer contexts
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Start navigating to `url` and return the session driving it
    async fn open(&self, url: &str) -> CaptureResult<Box<dyn PageSession>>;
}

/// One open page
#[async_trait]
pub trait PageSession: Send {
    /// Wait until the document has finished loading
    async fn wait_until_loaded(&mut self) -> CaptureResult<()>;

    /// Scroll to the bottom of the page to trigger lazy content
    async fn scroll_to_end(&mut self) -> CaptureResult<()>;

    /// Full-page screenshot as PNG bytes
    async fn screenshot(&mut self) -> CaptureResult<Vec<u8>>;

    /// Serialized rendered DOM
    async fn html(&mut self) -> CaptureResult<String>;

    /// Console messages emitted since navigation, as `LEVEL - message`
    async fn console_log(&mut self) -> CaptureResult<Vec<String>>;

    async fn close(self: Box<Self>) -> CaptureResult<()>;
}
