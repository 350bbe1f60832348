//! Random-delay exploration

use aftershock_api::{Action, Event};
use aftershock_store::HistoryStorage;
use aftershock_util::EntityId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    dispatch_accept, ExplorePolicy, PolicyError, PolicyResult, DECISION_CHANNEL_CAPACITY,
};

pub const RANDOM_POLICY_NAME: &str = "random";

const DEFAULT_MIN_BOUND_MS: u64 = 0;
const DEFAULT_MAX_BOUND_MS: u64 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRandomParam {
    min_bound: Option<u64>,
    max_bound: Option<u64>,
    #[serde(default)]
    kill_rate_per_entity: HashMap<String, u32>,
    #[serde(default)]
    shutdown_rate_per_entity: HashMap<String, u32>,
    seed: Option<u64>,
}

/// Validated parameters of [`RandomPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomParam {
    pub min_bound: Duration,
    pub max_bound: Duration,
    /// Percentage (0..=100) per entity
    pub kill_rate: HashMap<EntityId, u8>,
    /// Percentage (0..=100) per entity
    pub shutdown_rate: HashMap<EntityId, u8>,
    pub seed: Option<u64>,
}

impl Default for RandomParam {
    fn default() -> Self {
        Self {
            min_bound: Duration::from_millis(DEFAULT_MIN_BOUND_MS),
            max_bound: Duration::from_millis(DEFAULT_MAX_BOUND_MS),
            kill_rate: HashMap::new(),
            shutdown_rate: HashMap::new(),
            seed: None,
        }
    }
}

impl RandomParam {
    pub fn from_params(params: &Map<String, Value>) -> PolicyResult<Self> {
        let raw: RawRandomParam = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| PolicyError::Configuration(e.to_string()))?;

        let min_ms = raw.min_bound.unwrap_or(DEFAULT_MIN_BOUND_MS);
        let max_ms = raw.max_bound.unwrap_or(DEFAULT_MAX_BOUND_MS);
        if max_ms < min_ms {
            return Err(PolicyError::Configuration(format!(
                "maxBound ({}) must not be smaller than minBound ({})",
                max_ms, min_ms
            )));
        }

        Ok(Self {
            min_bound: Duration::from_millis(min_ms),
            max_bound: Duration::from_millis(max_ms),
            kill_rate: parse_rates("killRatePerEntity", raw.kill_rate_per_entity)?,
            shutdown_rate: parse_rates("shutdownRatePerEntity", raw.shutdown_rate_per_entity)?,
            seed: raw.seed,
        })
    }
}

fn parse_rates(key: &str, raw: HashMap<String, u32>) -> PolicyResult<HashMap<EntityId, u8>> {
    raw.into_iter()
        .map(|(entity, rate)| match u8::try_from(rate) {
            Ok(rate) if rate <= 100 => Ok((EntityId::new(entity), rate)),
            _ => Err(PolicyError::Configuration(format!(
                "{}.{}: rate {} is outside 0..=100",
                key, entity, rate
            ))),
        })
        .collect()
}

/// Accepts every occurrence after a uniformly drawn delay
pub struct RandomPolicy {
    param: RandomParam,
    rng: Mutex<StdRng>,
    storage: Option<Arc<dyn HistoryStorage>>,
    action_tx: mpsc::Sender<Action>,
    action_rx: Option<mpsc::Receiver<Action>>,
}

impl RandomPolicy {
    pub fn new() -> Self {
        let (action_tx, action_rx) = mpsc::channel(DECISION_CHANNEL_CAPACITY);
        Self {
            param: RandomParam::default(),
            rng: Mutex::new(StdRng::from_entropy()),
            storage: None,
            action_tx,
            action_rx: Some(action_rx),
        }
    }

    /// Draw the delay for the next occurrence, uniform in `[min, max)`.
    /// Equal bounds yield exactly `min`.
    pub fn next_delay(&self) -> Duration {
        let min = self.param.min_bound.as_millis() as u64;
        let max = self.param.max_bound.as_millis() as u64;
        if min >= max {
            return self.param.min_bound;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        Duration::from_millis(rng.gen_range(min..max))
    }

    /// Whether a fault should be injected into `entity_id` now, according to
    /// its kill rate. Not consulted by the scheduling path.
    pub fn should_inject_fault(&self, entity_id: &EntityId) -> bool {
        let Some(&rate) = self.param.kill_rate.get(entity_id) else {
            return false;
        };
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0..100u8) < rate
    }

    /// Runs already recorded in the attached history
    pub fn known_histories(&self) -> usize {
        self.storage
            .as_ref()
            .and_then(|s| s.nr_stored_histories().ok())
            .unwrap_or(0)
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExplorePolicy for RandomPolicy {
    fn init(
        &mut self,
        storage: Arc<dyn HistoryStorage>,
        params: &Map<String, Value>,
    ) -> PolicyResult<()> {
        self.param = RandomParam::from_params(params)?;
        if let Some(seed) = self.param.seed {
            self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        }
        self.storage = Some(storage);

        info!(
            min_bound_ms = self.param.min_bound.as_millis() as u64,
            max_bound_ms = self.param.max_bound.as_millis() as u64,
            seed = ?self.param.seed,
            histories = self.known_histories(),
            "Random policy initialized"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        RANDOM_POLICY_NAME
    }

    fn queue_next_event(&self, entity_id: &EntityId, event: Event) {
        let delay = self.next_delay();
        debug!(
            entity_id = %entity_id,
            event_id = %event.event_id,
            delay_ms = delay.as_millis() as u64,
            "Event queued"
        );
        dispatch_accept(self.action_tx.clone(), event, delay);
    }

    fn take_action_receiver(&mut self) -> Option<mpsc::Receiver<Action>> {
        self.action_rx.take()
    }
}
