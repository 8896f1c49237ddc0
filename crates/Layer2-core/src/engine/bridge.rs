//! Engine Bridges - 레지스트리/플러그인을 이벤트 버스에 연결

use crate::registry::{RegistryEvent, RegistryListener};
use async_trait::async_trait;
use plugrun_foundation::{
    event_kinds, Event, EventBus, EventHandler, Plugin, PluginContext, Result,
};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 플러그인 `handle_event`를 버스 핸들러로 감싼다
pub(crate) struct PluginEventBridge {
    plugin_id: String,
    plugin: Arc<dyn Plugin>,
    root: CancellationToken,
}

impl PluginEventBridge {
    pub(crate) fn new(plugin_id: String, plugin: Arc<dyn Plugin>, root: &CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            plugin_id,
            plugin,
            root: root.clone(),
        })
    }
}

#[async_trait]
impl EventHandler for PluginEventBridge {
    fn name(&self) -> &str {
        &self.plugin_id
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let ctx = PluginContext::with_parent(&self.plugin_id, &self.root)
            .with_value("eventId", json!(event.id));
        self.plugin.handle_event(&ctx, event).await
    }
}

/// 레지스트리 상태 변경을 `plugin.state_changed` 이벤트로 발행
pub(crate) struct StateChangeBridge {
    bus: Arc<EventBus>,
}

impl StateChangeBridge {
    pub(crate) fn new(bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self { bus })
    }
}

#[async_trait]
impl RegistryListener for StateChangeBridge {
    fn name(&self) -> &str {
        "engine.state-change"
    }

    async fn on_registry_event(&self, event: &RegistryEvent) {
        let RegistryEvent::Updated { plugin_id, status } = event else {
            return;
        };

        let bus_event = Event::new(
            event_kinds::PLUGIN_STATE_CHANGED,
            "registry",
            json!({ "pluginId": plugin_id, "status": status }),
        );
        if let Err(e) = self.bus.publish(bus_event).await {
            debug!(plugin_id = %plugin_id, error = %e, "State change not published");
        }
    }
}
