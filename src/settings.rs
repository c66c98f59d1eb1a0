use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::{Config, ProxyConfig};

/// The values a network operation needs, read once at the start of the
/// operation. Changing settings mid-flight does not affect an in-progress
/// call.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub api_token: String,
    pub proxy: ProxyConfig,
}

impl From<&Config> for Settings {
    fn from(cfg: &Config) -> Self {
        Self {
            api_token: cfg.api.token.clone(),
            proxy: cfg.proxy.clone(),
        }
    }
}

struct Shared {
    current: RwLock<Settings>,
    watchers: Mutex<Vec<Sender<Settings>>>,
}

/// Shared handle to the live settings. Callers take a snapshot per
/// operation; interested parties subscribe for change notifications over a
/// channel instead of registering callbacks.
#[derive(Clone)]
pub struct SettingsHandle {
    shared: Arc<Shared>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            shared: Arc::new(Shared {
                current: RwLock::new(settings),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn snapshot(&self) -> Settings {
        self.shared.current.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<Settings> {
        let (tx, rx) = unbounded();
        self.shared.watchers.lock().push(tx);
        rx
    }

    pub fn update(&self, apply: impl FnOnce(&mut Settings)) {
        let snapshot = {
            let mut current = self.shared.current.write();
            apply(&mut current);
            current.clone()
        };
        // Dropped receivers are pruned as sends fail.
        self.shared
            .watchers
            .lock()
            .retain(|watcher| watcher.send(snapshot.clone()).is_ok());
    }
}
