//! Fixed-interval exploration

use aftershock_api::{Action, Event};
use aftershock_store::HistoryStorage;
use aftershock_util::EntityId;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    dispatch_accept, ExplorePolicy, PolicyError, PolicyResult, DECISION_CHANNEL_CAPACITY,
};

pub const DUMB_POLICY_NAME: &str = "dumb";

#[derive(Debug, Default, Deserialize)]
struct RawDumbParam {
    #[serde(default)]
    interval: u64,
}

/// Validated parameters of [`DumbPolicy`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumbParam {
    pub interval: Duration,
}

impl DumbParam {
    pub fn from_params(params: &Map<String, Value>) -> PolicyResult<Self> {
        let raw: RawDumbParam = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| PolicyError::Configuration(e.to_string()))?;
        Ok(Self {
            interval: Duration::from_millis(raw.interval),
        })
    }
}

/// Accepts every occurrence after the same fixed interval
pub struct DumbPolicy {
    param: DumbParam,
    action_tx: mpsc::Sender<Action>,
    action_rx: Option<mpsc::Receiver<Action>>,
}

impl DumbPolicy {
    pub fn new() -> Self {
        let (action_tx, action_rx) = mpsc::channel(DECISION_CHANNEL_CAPACITY);
        Self {
            param: DumbParam::default(),
            action_tx,
            action_rx: Some(action_rx),
        }
    }
}

impl Default for DumbPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorePolicy for DumbPolicy {
    fn init(
        &mut self,
        _storage: Arc<dyn HistoryStorage>,
        params: &Map<String, Value>,
    ) -> PolicyResult<()> {
        self.param = DumbParam::from_params(params)?;
        info!(
            interval_ms = self.param.interval.as_millis() as u64,
            "Dumb policy initialized"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        DUMB_POLICY_NAME
    }

    fn queue_next_event(&self, entity_id: &EntityId, event: Event) {
        debug!(entity_id = %entity_id, event_id = %event.event_id, "Event queued");
        dispatch_accept(self.action_tx.clone(), event, self.param.interval);
    }

    fn take_action_receiver(&mut self) -> Option<mpsc::Receiver<Action>> {
        self.action_rx.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aftershock_store::SqliteHistoryStorage;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_interval_param() {
        assert_eq!(DumbParam::from_params(&Map::new()).unwrap().interval, Duration::ZERO);

        let Value::Object(params) = json!({"interval": 25}) else {
            unreachable!()
        };
        assert_eq!(
            DumbParam::from_params(&params).unwrap().interval,
            Duration::from_millis(25)
        );

        let Value::Object(bad) = json!({"interval": -1}) else {
            unreachable!()
        };
        assert!(matches!(
            DumbParam::from_params(&bad),
            Err(PolicyError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_accepts_in_order() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(SqliteHistoryStorage::open(dir.path()).unwrap());
        let mut policy = DumbPolicy::new();
        policy.init(storage, &Map::new()).unwrap();
        let mut rx = policy.take_action_receiver().unwrap();

        let entity = EntityId::new("client");
        let event = Event::func_return(entity.clone(), "bar");
        let event_id = event.event_id.clone();
        policy.queue_next_event(&entity, event);

        let action = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(action.is_accept());
        assert_eq!(action.entity_id, entity);
        assert_eq!(action.event.unwrap().event_id, event_id);
    }
}
