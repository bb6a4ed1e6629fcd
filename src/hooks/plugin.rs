//! Statically linked plugins.
//!
//! # Responsibilities
//! - Define the hook contract a plugin implements
//! - Resolve configured plugin names to built-in implementations
//! - Load and unload plugins, skipping the ones that fail to load

use std::fmt;
use std::sync::Arc;

use crate::hooks::event::Player;

/// Error returned from plugin callbacks.
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// Callbacks invoked around a player's session.
///
/// Callbacks run on the pipeline tasks and should return quickly.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn unload(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_player_join(&self, player: &Player) -> Result<(), PluginError>;

    fn on_player_leave(&self, player: &Player) -> Result<(), PluginError>;
}

/// Logs every join and leave.
#[derive(Debug, Default)]
pub struct PlayerLogPlugin;

impl Plugin for PlayerLogPlugin {
    fn name(&self) -> &str {
        PlayerLogPlugin::NAME
    }

    fn on_player_join(&self, player: &Player) -> Result<(), PluginError> {
        tracing::info!(
            username = %player.username,
            server_id = %player.server_id,
            remote_address = %player.remote_address,
            "Player joined"
        );
        Ok(())
    }

    fn on_player_leave(&self, player: &Player) -> Result<(), PluginError> {
        tracing::info!(
            username = %player.username,
            server_id = %player.server_id,
            remote_address = %player.remote_address,
            "Player left"
        );
        Ok(())
    }
}

impl PlayerLogPlugin {
    pub const NAME: &'static str = "player_log";
}

/// Names accepted in the `plugins.enabled` config list.
pub const BUILTIN_PLUGINS: &[&str] = &[PlayerLogPlugin::NAME];

/// The set of plugins the proxy calls.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.name().to_string()))
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve built-in plugins by name.
    ///
    /// Returns the first unknown name on failure.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut registry = Self::new();
        for name in names {
            let plugin: Arc<dyn Plugin> = match name.as_ref() {
                PlayerLogPlugin::NAME => Arc::new(PlayerLogPlugin),
                other => return Err(other.to_string()),
            };
            registry.register(plugin);
        }
        Ok(registry)
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    /// Load every plugin, dropping those whose `load` fails.
    pub fn load(self) -> Self {
        let plugins = self
            .plugins
            .into_iter()
            .filter(|plugin| match plugin.load() {
                Ok(()) => {
                    tracing::info!(plugin = plugin.name(), "Plugin loaded");
                    true
                }
                Err(e) => {
                    tracing::error!(plugin = plugin.name(), error = %e, "Plugin failed to load, skipping");
                    false
                }
            })
            .collect();
        Self { plugins }
    }

    pub fn unload(&self) {
        for plugin in &self.plugins {
            if let Err(e) = plugin.unload() {
                tracing::warn!(plugin = plugin.name(), error = %e, "Plugin failed to unload");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every callback it receives.
    #[derive(Default)]
    pub struct RecordingPlugin {
        pub fail_load: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl RecordingPlugin {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Plugin for RecordingPlugin {
        fn name(&self) -> &str {
            "recording"
        }

        fn load(&self) -> Result<(), PluginError> {
            if self.fail_load {
                return Err("refused".into());
            }
            self.calls.lock().unwrap().push("load".into());
            Ok(())
        }

        fn unload(&self) -> Result<(), PluginError> {
            self.calls.lock().unwrap().push("unload".into());
            Ok(())
        }

        fn on_player_join(&self, player: &Player) -> Result<(), PluginError> {
            self.calls.lock().unwrap().push(format!("join:{}", player.username));
            Ok(())
        }

        fn on_player_leave(&self, player: &Player) -> Result<(), PluginError> {
            self.calls.lock().unwrap().push(format!("leave:{}", player.username));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingPlugin;
    use super::*;

    #[test]
    fn resolves_builtin_names() {
        let registry = PluginRegistry::from_names(&["player_log"]).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.plugins()[0].name(), "player_log");
        assert_eq!(PluginRegistry::from_names(&["nope"]).unwrap_err(), "nope");
    }

    #[test]
    fn failed_load_is_skipped() {
        let good = Arc::new(RecordingPlugin::default());
        let bad = Arc::new(RecordingPlugin {
            fail_load: true,
            ..Default::default()
        });

        let mut registry = PluginRegistry::new();
        registry.register(good.clone());
        registry.register(bad.clone());
        let loaded = registry.load();
        assert_eq!(loaded.len(), 1);

        loaded.unload();
        assert_eq!(good.calls(), ["load", "unload"]);
        assert!(bad.calls().is_empty());
    }
}
