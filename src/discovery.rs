//! Robot discovery
//!
//! A [`ServiceBrowser`] yields service announcements as they arrive (from an
//! mDNS listener, a static list, ...). [`discover`] takes the first
//! announcement of the wanted service type within a bounded wait, then stops
//! the browser.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{CentoError, Result};

fn default_service_type() -> String {
    "CentoBot".to_string()
}

/// A resolved network service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    #[serde(default = "default_service_type")]
    pub service_type: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl ServiceRecord {
    /// `host:port`, preferring the first resolved address over the host name
    pub fn endpoint(&self) -> String {
        let host = self.addresses.first().unwrap_or(&self.host);
        format!("{}:{}", host, self.port)
    }

    /// Zenoh locator for [`ServiceRecord::endpoint`]
    pub fn locator(&self) -> String {
        format!("tcp/{}", self.endpoint())
    }
}

#[async_trait]
pub trait ServiceBrowser: Send {
    /// Wait for the next announcement; `None` once browsing has ended
    async fn next_service(&mut self) -> Option<ServiceRecord>;

    /// Stop browsing
    async fn stop(&mut self) {}
}

/// Browser over a fixed list of known services
#[derive(Debug, Clone, Default)]
pub struct StaticBrowser {
    records: VecDeque<ServiceRecord>,
}

impl StaticBrowser {
    pub fn new(records: Vec<ServiceRecord>) -> Self {
        Self { records: records.into() }
    }
}

#[async_trait]
impl ServiceBrowser for StaticBrowser {
    async fn next_service(&mut self) -> Option<ServiceRecord> {
        self.records.pop_front()
    }
}

/// Browser fed by an external announcement source
pub struct ChannelBrowser {
    receiver: mpsc::Receiver<ServiceRecord>,
}

impl ChannelBrowser {
    /// Create a browser and the sender its announcement source writes to
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<ServiceRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { receiver }, sender)
    }
}

#[async_trait]
impl ServiceBrowser for ChannelBrowser {
    async fn next_service(&mut self) -> Option<ServiceRecord> {
        self.receiver.recv().await
    }

    async fn stop(&mut self) {
        self.receiver.close();
    }
}

/// Resolve the first service of `service_type` announced within `wait`
pub async fn discover(
    browser: &mut dyn ServiceBrowser,
    service_type: &str,
    wait: Duration,
) -> Result<ServiceRecord> {
    info!("Browsing for {} services ({}ms)", service_type, wait.as_millis());

    let search = async {
        while let Some(record) = browser.next_service().await {
            if record.service_type == service_type {
                return Some(record);
            }
            debug!("Ignoring {} service {}", record.service_type, record.name);
        }
        None
    };
    let found = tokio::time::timeout(wait, search).await;
    browser.stop().await;

    match found {
        Ok(Some(record)) => {
            info!("Found service: {} at {}", record.name, record.endpoint());
            Ok(record)
        }
        Ok(None) | Err(_) => {
            warn!("No {} service found", service_type);
            Err(CentoError::NotFound(format!("no {} service found", service_type)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, service_type: &str) -> ServiceRecord {
        ServiceRecord {
            name: name.to_string(),
            service_type: service_type.to_string(),
            host: format!("{}.local", name),
            port: 9090,
            addresses: vec![],
        }
    }

    #[tokio::test]
    async fn test_first_matching_service_wins() {
        let mut browser = StaticBrowser::new(vec![
            record("printer", "ipp"),
            record("c20000002", "CentoBot"),
            record("c20000003", "CentoBot"),
        ]);
        let found = discover(&mut browser, "CentoBot", Duration::from_secs(5)).await.unwrap();
        assert_eq!(found.name, "c20000002");
        assert_eq!(found.endpoint(), "c20000002.local:9090");
        assert_eq!(found.locator(), "tcp/c20000002.local:9090");
    }

    #[tokio::test]
    async fn test_exhausted_browser_is_not_found() {
        let mut browser = StaticBrowser::new(vec![record("printer", "ipp")]);
        let result = discover(&mut browser, "CentoBot", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(CentoError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_network_times_out() {
        let (mut browser, _sender) = ChannelBrowser::new(4);
        let started = tokio::time::Instant::now();
        let result = discover(&mut browser, "CentoBot", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(CentoError::NotFound(_))));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_late_announcement() {
        let (mut browser, sender) = ChannelBrowser::new(4);
        tokio::spawn(async move {
            let mut bot = record("c20000002", "CentoBot");
            bot.addresses.push("192.168.1.20".to_string());
            sender.send(bot).await.unwrap();
        });
        let found = discover(&mut browser, "CentoBot", Duration::from_secs(5)).await.unwrap();
        assert_eq!(found.endpoint(), "192.168.1.20:9090");
    }
}
