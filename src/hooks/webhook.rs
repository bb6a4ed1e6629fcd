//! Webhook delivery.

use std::time::Duration;

use thiserror::Error;

use crate::hooks::event::{Event, EventKind};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook {id}: {source}")]
    Http {
        id: String,
        #[source]
        source: reqwest::Error,
    },
}

/// An HTTP endpoint notified of player events.
#[derive(Debug, Clone)]
pub struct Webhook {
    pub id: String,
    pub url: String,
    pub events: Vec<EventKind>,
    client: reqwest::Client,
}

impl Webhook {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        events: Vec<EventKind>,
        timeout: Duration,
    ) -> Result<Self, WebhookError> {
        let id = id.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| WebhookError::Http {
                id: id.clone(),
                source,
            })?;
        Ok(Self {
            id,
            url: url.into(),
            events,
            client,
        })
    }

    pub fn accepts(&self, kind: EventKind) -> bool {
        self.events.contains(&kind)
    }

    /// POST the event as JSON. Non-2xx responses are errors.
    pub async fn deliver(&self, event: &Event<'_>) -> Result<(), WebhookError> {
        let err = |source| WebhookError::Http {
            id: self.id.clone(),
            source,
        };
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(err)?
            .error_for_status()
            .map_err(err)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Minimal HTTP endpoint answering every request with `status`.
    ///
    /// Yields each request body on the returned channel.
    pub async fn http_sink(status: u16) -> (String, mpsc::UnboundedReceiver<serde_json::Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    let body = loop {
                        let n = stream.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        let text = String::from_utf8_lossy(&buf).to_string();
                        if let Some(head_end) = text.find("\r\n\r\n") {
                            let len = text[..head_end]
                                .lines()
                                .find_map(|l| {
                                    let (k, v) = l.split_once(':')?;
                                    k.eq_ignore_ascii_case("content-length")
                                        .then(|| v.trim().parse::<usize>().ok())
                                        .flatten()
                                })
                                .unwrap_or(0);
                            if buf.len() >= head_end + 4 + len {
                                break buf[head_end + 4..head_end + 4 + len].to_vec();
                            }
                        }
                    };
                    let response = format!(
                        "HTTP/1.1 {} X\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        status
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    if let Ok(value) = serde_json::from_slice(&body) {
                        let _ = tx.send(value);
                    }
                });
            }
        });

        (url, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::http_sink;
    use super::*;
    use crate::hooks::event::test_player;

    #[tokio::test]
    async fn delivers_json_body() {
        let (url, mut bodies) = http_sink(204).await;
        let hook = Webhook::new("audit", url, vec![EventKind::PlayerJoin], Duration::from_secs(2)).unwrap();
        assert!(hook.accepts(EventKind::PlayerJoin));
        assert!(!hook.accepts(EventKind::PlayerLeave));

        let player = test_player();
        hook.deliver(&Event::new(EventKind::PlayerJoin, &player))
            .await
            .unwrap();

        let body = bodies.recv().await.unwrap();
        assert_eq!(body["type"], "PlayerJoin");
        assert_eq!(body["data"]["serverId"], "lobby");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let (url, _bodies) = http_sink(500).await;
        let hook = Webhook::new("audit", url, vec![EventKind::PlayerJoin], Duration::from_secs(2)).unwrap();
        let player = test_player();
        let err = hook
            .deliver(&Event::new(EventKind::PlayerJoin, &player))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("webhook audit:"));
    }
}
