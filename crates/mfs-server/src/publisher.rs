//! Event delivery to an HTTP messaging service

use mfs::core::config::MessagingConfig;
use mfs::{Event, EventPublisher, MfsError, Result};
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

/// Pushes write events to a message queue endpoint
///
/// Each event is sent as a JSON `POST <endpoint>?action=PushMessage&queue=<queue>`
/// on a detached task; delivery failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: reqwest::Client,
    url: Url,
    access: String,
    secret: String,
}

impl HttpPublisher {
    pub fn new(config: &MessagingConfig) -> Result<Self> {
        let mut url = Url::parse(&config.endpoint).map_err(|e| {
            MfsError::Configuration(format!("Invalid messaging endpoint '{}': {}", config.endpoint, e))
        })?;
        url.query_pairs_mut()
            .append_pair("action", "PushMessage")
            .append_pair("queue", &config.queue);

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MfsError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(HttpPublisher {
            client,
            url,
            access: config.access.clone(),
            secret: config.secret.clone(),
        })
    }

    /// Full push URL, including the query
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl EventPublisher for HttpPublisher {
    fn publish(&self, event: &Event) -> Result<()> {
        if !event.is_write() {
            return Ok(());
        }

        let handle = Handle::try_current()
            .map_err(|_| MfsError::Publish("no async runtime to deliver events".to_string()))?;

        let request = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.access, Some(&self.secret))
            .json(event);
        let action = event.action.clone();
        let resource = event.resource.clone();

        handle.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("Published {} on {}", action, resource);
                }
                Ok(response) => {
                    warn!(
                        "Messaging service rejected {} on {}: {}",
                        action,
                        resource,
                        response.status()
                    );
                }
                Err(e) => warn!("Failed to publish {} on {}: {}", action, resource, e),
            }
        });

        Ok(())
    }
}
