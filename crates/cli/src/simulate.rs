//! Scroll script replay
//!
//! A script lists the initial feed page, any further pages, and a sequence
//! of host events. Each event is applied to a `VisibilityCoordinator` backed
//! by the in-memory decoder, and the outcome of every step is reported.

use anyhow::{bail, Context, Result};
use clipfeed_cache::CacheConfig;
use clipfeed_core::sim::{DecoderEvent, EventLog, SimulatedFactory, SimulatedSession, StaticFeed};
use clipfeed_core::{
    ActivationOutcome, ActivationTicket, CompletionOutcome, CoordinatorConfig, FeedProvider,
    MemoryPressure, PendingActivation, ResourceError, ResourceKey, VisibilityCoordinator,
};
use serde::{Deserialize, Serialize};
use tracing::info;

type Coordinator = VisibilityCoordinator<SimulatedSession, StaticFeed, SimulatedFactory>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Keys of the first page
    pub items: Vec<String>,

    /// Further pages, delivered in order
    #[serde(default)]
    pub more_pages: Vec<Vec<String>>,

    /// Deliver a page as soon as it is requested
    #[serde(default)]
    pub auto_deliver: bool,

    /// Keys whose decoder sessions fail to open
    #[serde(default)]
    pub fail: Vec<String>,

    #[serde(default)]
    pub trailing_window: Option<usize>,

    #[serde(default)]
    pub prefetch_ahead: Option<usize>,

    #[serde(default)]
    pub start_muted: bool,

    pub events: Vec<ScriptEvent>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptEvent {
    Activate(usize),
    Deactivate,
    Invalidate(String),
    MemoryPressure,
    PressureLevel(Level),
    Mute(bool),
    /// Start an activation whose session is opened later
    Begin(usize),
    /// Finish the activation started by the `ticket`-th `begin`
    Complete {
        ticket: usize,
        #[serde(default)]
        fail: bool,
    },
    DeliverPage,
    /// Drop an item from the feed and invalidate its resource
    Remove(String),
    Teardown,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Moderate,
    High,
    Critical,
}

impl From<Level> for MemoryPressure {
    fn from(level: Level) -> Self {
        match level {
            Level::Low => MemoryPressure::Low,
            Level::Moderate => MemoryPressure::Moderate,
            Level::High => MemoryPressure::High,
            Level::Critical => MemoryPressure::Critical,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Activated {
        key: ResourceKey,
        index: usize,
        cache_hit: bool,
    },
    Unchanged,
    Pending {
        ticket: usize,
        request: u64,
    },
    Stale {
        key: ResourceKey,
    },
    Deactivated {
        was_active: bool,
    },
    Invalidated {
        torn_down: bool,
    },
    Evicted {
        count: usize,
    },
    Muted {
        muted: bool,
    },
    PageDelivered {
        added: usize,
    },
    TornDown,
    Failed {
        error: String,
    },
}

#[derive(Debug, Serialize)]
pub struct Step {
    pub step: usize,
    pub event: ScriptEvent,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Serialize)]
pub struct FinalState {
    pub active_key: Option<ResourceKey>,
    pub active_index: Option<usize>,
    pub muted: bool,
    pub pending_request: Option<u64>,
    pub known_items: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub capacity: usize,
    pub resident: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub forced_evictions: u64,
    pub removals: u64,
    pub teardown_failures: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub steps: Vec<Step>,
    pub decoder_events: Vec<DecoderEvent>,
    pub max_concurrent_playing: usize,
    pub final_state: FinalState,
    pub resident_keys: Vec<ResourceKey>,
    pub stats: StatsReport,
    pub page_requests: usize,
}

/// Replay `script` against a coordinator built from `cache_config`
pub fn run_script(script: Script, cache_config: &CacheConfig) -> Result<Report> {
    let log = EventLog::new();

    let mut feed = StaticFeed::from_keys(script.items).with_auto_deliver(script.auto_deliver);
    for page in script.more_pages {
        feed = feed.with_page(page);
    }
    let factory = SimulatedFactory::new(log.clone()).failing_on(script.fail);

    let defaults = CoordinatorConfig::default();
    let config = CoordinatorConfig {
        trailing_window: script.trailing_window.unwrap_or(defaults.trailing_window),
        prefetch_ahead: script.prefetch_ahead.unwrap_or(defaults.prefetch_ahead),
        start_muted: script.start_muted,
    };

    let mut coordinator = Coordinator::from_config(cache_config, config, feed, factory.clone());
    let mut tickets: Vec<Option<PendingActivation>> = Vec::new();
    let mut steps = Vec::with_capacity(script.events.len());

    for (step, event) in script.events.into_iter().enumerate() {
        let outcome = apply(&mut coordinator, &factory, &mut tickets, &event)
            .with_context(|| format!("step {step} ({event:?}) is not valid"))?;
        steps.push(Step {
            step,
            event,
            outcome,
        });
    }

    info!(steps = steps.len(), "script finished");

    let stats = coordinator.cache().stats();
    Ok(Report {
        steps,
        decoder_events: log.events(),
        max_concurrent_playing: log.max_concurrent_playing(),
        final_state: FinalState {
            active_key: coordinator.active_key().cloned(),
            active_index: coordinator.active_index(),
            muted: coordinator.is_muted(),
            pending_request: coordinator.pending_request(),
            known_items: coordinator.feed().item_count(),
        },
        resident_keys: coordinator.cache().resident_keys(),
        stats: StatsReport {
            capacity: stats.capacity,
            resident: stats.resident,
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            forced_evictions: stats.forced_evictions,
            removals: stats.removals,
            teardown_failures: stats.teardown_failures,
            hit_rate: stats.hit_rate(),
        },
        page_requests: coordinator.feed().page_requests(),
    })
}

fn apply(
    coordinator: &mut Coordinator,
    opener: &SimulatedFactory,
    tickets: &mut Vec<Option<PendingActivation>>,
    event: &ScriptEvent,
) -> Result<StepOutcome> {
    let outcome = match event {
        ScriptEvent::Activate(index) => match coordinator.activate(*index) {
            Ok(outcome) => activation(outcome),
            Err(err) => failed(err),
        },
        ScriptEvent::Deactivate => StepOutcome::Deactivated {
            was_active: coordinator.deactivate(),
        },
        ScriptEvent::Invalidate(key) => StepOutcome::Invalidated {
            torn_down: coordinator.invalidate(&ResourceKey::new(key.as_str())),
        },
        ScriptEvent::MemoryPressure => StepOutcome::Evicted {
            count: coordinator.on_memory_pressure(),
        },
        ScriptEvent::PressureLevel(level) => StepOutcome::Evicted {
            count: coordinator.on_pressure_level((*level).into()),
        },
        ScriptEvent::Mute(muted) => {
            coordinator.set_muted(*muted);
            StepOutcome::Muted { muted: *muted }
        }
        ScriptEvent::Begin(index) => match coordinator.begin_activation(*index) {
            Ok(ActivationTicket::Ready(outcome)) => {
                tickets.push(None);
                activation(outcome)
            }
            Ok(ActivationTicket::Pending(pending)) => {
                let request = pending.token().id();
                tickets.push(Some(pending));
                StepOutcome::Pending {
                    ticket: tickets.len() - 1,
                    request,
                }
            }
            Err(err) => {
                tickets.push(None);
                failed(err)
            }
        },
        ScriptEvent::Complete { ticket, fail } => {
            let Some(slot) = tickets.get_mut(*ticket) else {
                bail!("no begin event issued ticket {ticket}");
            };
            let Some(pending) = slot.take() else {
                bail!("ticket {ticket} has nothing to complete");
            };

            let session = if *fail {
                Err(ResourceError::construction(&pending.item().key, "scripted failure"))
            } else {
                opener.open(pending.item())
            };

            match coordinator.complete_activation(pending, session) {
                Ok(CompletionOutcome::Activated { key, index }) => StepOutcome::Activated {
                    key,
                    index,
                    cache_hit: false,
                },
                Ok(CompletionOutcome::Stale { key }) => StepOutcome::Stale { key },
                Err(err) => failed(err),
            }
        }
        ScriptEvent::DeliverPage => StepOutcome::PageDelivered {
            added: coordinator.feed_mut().deliver_next_page(),
        },
        ScriptEvent::Remove(key) => {
            let key = ResourceKey::new(key.as_str());
            if coordinator.feed_mut().remove(&key).is_none() {
                bail!("item {key} is not in the feed");
            }
            StepOutcome::Invalidated {
                torn_down: coordinator.invalidate(&key),
            }
        }
        ScriptEvent::Teardown => {
            coordinator.teardown();
            StepOutcome::TornDown
        }
    };

    Ok(outcome)
}

fn activation(outcome: ActivationOutcome) -> StepOutcome {
    match outcome {
        ActivationOutcome::Unchanged => StepOutcome::Unchanged,
        ActivationOutcome::Activated {
            key,
            index,
            cache_hit,
        } => StepOutcome::Activated {
            key,
            index,
            cache_hit,
        },
    }
}

fn failed(err: impl std::fmt::Display) -> StepOutcome {
    StepOutcome::Failed {
        error: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(json: &str) -> Script {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_events_parse_from_compact_json() {
        let parsed = script(
            r#"{
                "items": ["a", "b"],
                "events": [
                    {"activate": 1},
                    "deactivate",
                    {"invalidate": "a"},
                    "memory_pressure",
                    {"pressure_level": "critical"},
                    {"mute": true},
                    {"begin": 0},
                    {"complete": {"ticket": 0}},
                    "deliver_page",
                    "teardown"
                ]
            }"#,
        );
        assert_eq!(parsed.events.len(), 10);
        assert!(matches!(
            parsed.events[7],
            ScriptEvent::Complete {
                ticket: 0,
                fail: false
            }
        ));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result: Result<Script, _> =
            serde_json::from_str(r#"{"items": [], "events": [], "speed": 2}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_script_switches_items() {
        let report = run_script(
            script(r#"{"items": ["a", "b", "c"], "events": [{"activate": 0}, {"activate": 1}, {"activate": 0}]}"#),
            &CacheConfig::new(2),
        )
        .unwrap();

        assert_eq!(report.max_concurrent_playing, 1);
        assert_eq!(report.final_state.active_key, Some(ResourceKey::new("a")));
        assert_eq!(
            report.resident_keys,
            vec![ResourceKey::new("a"), ResourceKey::new("b")]
        );
        assert_eq!(report.stats.hits, 1);
        assert!(matches!(
            report.steps[2].outcome,
            StepOutcome::Activated {
                cache_hit: true,
                ..
            }
        ));
    }

    #[test]
    fn test_run_script_stale_completion() {
        let report = run_script(
            script(
                r#"{"items": ["a", "b"], "events": [
                    {"begin": 0}, {"begin": 1},
                    {"complete": {"ticket": 1}}, {"complete": {"ticket": 0}}
                ]}"#,
            ),
            &CacheConfig::default(),
        )
        .unwrap();

        assert!(matches!(report.steps[3].outcome, StepOutcome::Stale { .. }));
        assert!(!report
            .decoder_events
            .contains(&DecoderEvent::Play { key: ResourceKey::new("a") }));
    }

    #[test]
    fn test_run_script_failure_is_reported() {
        let report = run_script(
            script(r#"{"items": ["a", "b"], "fail": ["b"], "events": [{"activate": 0}, {"activate": 1}, {"activate": 9}]}"#),
            &CacheConfig::default(),
        )
        .unwrap();

        assert!(matches!(report.steps[1].outcome, StepOutcome::Failed { .. }));
        assert!(matches!(report.steps[2].outcome, StepOutcome::Failed { .. }));
        assert_eq!(report.final_state.active_key, Some(ResourceKey::new("a")));
    }

    #[test]
    fn test_complete_without_begin_fails() {
        let err = run_script(
            script(r#"{"items": ["a"], "events": [{"complete": {"ticket": 0}}]}"#),
            &CacheConfig::default(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("no begin event issued ticket 0"));
    }

    #[test]
    fn test_auto_delivered_pages() {
        let report = run_script(
            script(
                r#"{"items": ["a", "b"], "more_pages": [["c", "d"]], "auto_deliver": true,
                    "events": [{"activate": 1}, {"activate": 3}]}"#,
            ),
            &CacheConfig::default(),
        )
        .unwrap();

        assert_eq!(report.page_requests, 1);
        assert_eq!(report.final_state.known_items, 4);
        assert_eq!(report.final_state.active_index, Some(3));
    }
}
