//! Fan player events out to plugins and webhooks.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::hooks::event::{Event, EventKind, Player};
use crate::hooks::plugin::PluginRegistry;
use crate::hooks::webhook::Webhook;
use crate::routing::index::ServerDescriptor;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("server {server_id} references unknown webhook {webhook_id}")]
    UnknownWebhook {
        server_id: String,
        webhook_id: String,
    },
}

/// Routes events to plugins and the webhooks of the server involved.
#[derive(Debug, Default)]
pub struct HookDispatcher {
    plugins: PluginRegistry,
    /// Server id to its webhooks.
    webhooks: HashMap<String, Vec<Arc<Webhook>>>,
}

impl HookDispatcher {
    /// Resolve each server's webhook ids.
    pub fn new(
        plugins: PluginRegistry,
        webhooks: Vec<Webhook>,
        servers: &[ServerDescriptor],
    ) -> Result<Self, HookError> {
        let by_id: HashMap<String, Arc<Webhook>> = webhooks
            .into_iter()
            .map(|w| (w.id.clone(), Arc::new(w)))
            .collect();

        let mut per_server = HashMap::new();
        for server in servers {
            let hooks = server
                .webhook_ids
                .iter()
                .map(|id| {
                    by_id.get(id).cloned().ok_or_else(|| HookError::UnknownWebhook {
                        server_id: server.id.clone(),
                        webhook_id: id.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if !hooks.is_empty() {
                per_server.insert(server.id.clone(), hooks);
            }
        }

        Ok(Self {
            plugins,
            webhooks: per_server,
        })
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn player_join(&self, player: &Player) {
        self.dispatch(EventKind::PlayerJoin, player);
    }

    pub fn player_leave(&self, player: &Player) {
        self.dispatch(EventKind::PlayerLeave, player);
    }

    fn dispatch(&self, kind: EventKind, player: &Player) {
        for plugin in self.plugins.plugins() {
            let res = match kind {
                EventKind::PlayerJoin => plugin.on_player_join(player),
                EventKind::PlayerLeave => plugin.on_player_leave(player),
            };
            if let Err(e) = res {
                tracing::warn!(plugin = plugin.name(), event = %kind, error = %e, "Plugin hook failed");
            }
        }

        let Some(hooks) = self.webhooks.get(&player.server_id) else {
            return;
        };
        for hook in hooks.iter().filter(|h| h.accepts(kind)) {
            let hook = Arc::clone(hook);
            let player = player.clone();
            tokio::spawn(async move {
                let event = Event::new(kind, &player);
                if let Err(e) = hook.deliver(&event).await {
                    tracing::warn!(webhook_id = %hook.id, event = %kind, error = %e, "Webhook delivery failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::event::test_player;
    use crate::hooks::plugin::testing::RecordingPlugin;
    use crate::hooks::webhook::testing::http_sink;
    use std::time::Duration;

    fn server(id: &str, webhooks: &[&str]) -> ServerDescriptor {
        ServerDescriptor {
            id: id.into(),
            domains: vec!["play.example.com".into()],
            address: "127.0.0.1:1".into(),
            dial_timeout: Duration::from_secs(1),
            disconnect_message: String::new(),
            send_proxy_protocol: false,
            webhook_ids: webhooks.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn unknown_webhook_reference_fails() {
        let err = HookDispatcher::new(PluginRegistry::new(), Vec::new(), &[server("lobby", &["ghost"])])
            .unwrap_err();
        assert_eq!(
            err,
            HookError::UnknownWebhook {
                server_id: "lobby".into(),
                webhook_id: "ghost".into(),
            }
        );
    }

    #[tokio::test]
    async fn plugins_and_matching_webhooks_receive_events() {
        let plugin = Arc::new(RecordingPlugin::default());
        let mut plugins = PluginRegistry::new();
        plugins.register(plugin.clone());

        let (url, mut bodies) = http_sink(200).await;
        let hook = Webhook::new("audit", url, vec![EventKind::PlayerLeave], Duration::from_secs(2)).unwrap();
        let dispatcher = HookDispatcher::new(plugins, vec![hook], &[server("lobby", &["audit"])]).unwrap();

        let player = test_player();
        dispatcher.player_join(&player);
        dispatcher.player_leave(&player);
        assert_eq!(plugin.calls(), ["join:Steve", "leave:Steve"]);

        let body = tokio::time::timeout(Duration::from_secs(2), bodies.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body["type"], "PlayerLeave");
        assert!(bodies.try_recv().is_err());
    }
}
