//! Hand-off of open endpoints to the fingerprinting/reporting side
//!
//! A task only builds an [`EndpointTransfer`] for each open endpoint and
//! passes it to its [`Dispatch`]. Protocol identification, banner grabbing
//! and result upload all live behind that trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::config::TaskOption;
use crate::network::protocol::tcp_service_hint;
use crate::network::OpenEndpoint;
use crate::ScanError;

/// One open endpoint plus the options of the task that found it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointTransfer {
    pub entry: OpenEndpoint,
    pub param: TaskOption,
}

/// HTTP details gathered by a web fingerprinter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpInfo {
    pub status_code: u16,
    pub content_length: i64,
    pub url: String,
    pub location: String,
    pub title: String,
    pub server: String,
    pub body: String,
    pub header: String,
    pub favicon_mh3: String,
    pub favicon_md5: String,
    pub screenshot_url: String,
    pub fingerprints: Vec<String>,
    pub tls_common_name: String,
    pub tls_dns_names: Vec<String>,
}

/// Fingerprinting result for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub ip: IpAddr,
    pub port: u16,
    pub tls: bool,
    pub protocol: String,
    pub transport: String,
    pub version: String,
    pub banner: Option<serde_json::Value>,
    pub http_info: Option<HttpInfo>,
}

impl Service {
    /// Service record carrying only the well-known-port guess
    pub fn from_endpoint(entry: &OpenEndpoint) -> Self {
        let protocol = tcp_service_hint(entry.port).unwrap_or("unknown");
        Self {
            ip: entry.ip,
            port: entry.port,
            tls: matches!(protocol, "https" | "imaps" | "pop3s"),
            protocol: protocol.to_string(),
            transport: "tcp".to_string(),
            version: String::new(),
            banner: None,
            http_info: None,
        }
    }
}

/// Consumer of a task's results.
///
/// `callback` runs on the fingerprint pool, once per open endpoint. `end` is
/// called exactly once when the task reaches a terminal state. `on_error` is
/// called before `end` when the task fails.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn callback(&self, tx: EndpointTransfer);

    async fn end(&self);

    async fn on_error(&self, err: &ScanError) {
        log::error!("task failed: {}", err);
    }
}

/// Logs every endpoint as a JSON service record
#[derive(Debug, Default)]
pub struct LogDispatch;

#[async_trait]
impl Dispatch for LogDispatch {
    async fn callback(&self, tx: EndpointTransfer) {
        let service = Service::from_endpoint(&tx.entry);
        match serde_json::to_string(&service) {
            Ok(json) => log::info!("{}", json),
            Err(e) => log::warn!("{}: {}", tx.entry, e),
        }
    }

    async fn end(&self) {
        log::debug!("dispatch closed");
    }
}
