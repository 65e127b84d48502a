//! Plugin lifecycle runner
//!
//! 모든 URL을 단계별 목적지까지 구동하고 상태 변화를 출력합니다.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use feature_core::{
    PluginSubsystem, ProtocolBackend, StateId, StateMachine, SubsystemConfig, TransitionResult,
};
use feature_foundation::{EventFilter, EventListener, FeatureConfig, FeatureEvent};
use tracing::{debug, warn};

// ============================================================================
// Plan
// ============================================================================

/// 실행 계획: 선택적 준비 단계 → 최종 목적지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    prepare: Option<StateId>,
    destination: StateId,
}

impl Plan {
    pub fn to(destination: StateId) -> Self {
        Self {
            prepare: None,
            destination,
        }
    }

    pub fn via(prepare: StateId, destination: StateId) -> Self {
        Self {
            prepare: Some(prepare),
            destination,
        }
    }

    pub fn phases(&self) -> Vec<StateId> {
        self.prepare
            .into_iter()
            .chain(std::iter::once(self.destination))
            .collect()
    }
}

// ============================================================================
// 상태 변화 출력
// ============================================================================

struct StatePrinter;

impl EventListener for StatePrinter {
    fn name(&self) -> &str {
        "featurectl-printer"
    }

    fn on_event(&self, event: &FeatureEvent) {
        let url = event.data["url"].as_str().unwrap_or("?");
        let state = event.data["state"].as_str().unwrap_or("?");
        println!("  {} → {}", url, state);
    }
}

// ============================================================================
// Runner
// ============================================================================

type Outcomes = Rc<RefCell<BTreeMap<String, TransitionResult>>>;

/// 계획 실행. 모든 플러그인이 성공하면 true
pub async fn run(config: &FeatureConfig, plan: Plan, urls: &[String]) -> anyhow::Result<bool> {
    let backend = ProtocolBackend::from_config(config).await?;
    let subsystem = PluginSubsystem::new(Arc::new(backend), SubsystemConfig::from(config));

    subsystem.event_bus().subscribe_with_filter(
        Arc::new(StatePrinter),
        Some(EventFilter::new().with_event_types(vec!["plugin.state_changed".to_string()])),
    );

    let outcomes: Outcomes = Rc::new(RefCell::new(BTreeMap::new()));
    let mut active: Vec<String> = urls.to_vec();

    for phase in plan.phases() {
        println!("→ {}", phase);
        for url in &active {
            outcomes.borrow_mut().remove(url);
            let sink = Rc::clone(&outcomes);
            let key = url.clone();
            let requested = subsystem.change_plugin_state(
                url,
                phase,
                move |_: &StateMachine, result: TransitionResult| {
                    sink.borrow_mut().insert(key, result);
                },
            );
            if let Err(e) = requested {
                warn!(url = %url, error = %e, "Rejected plugin request");
                outcomes
                    .borrow_mut()
                    .insert(url.clone(), Err(e.into()));
            }
        }

        subsystem.run_until_idle().await;
        debug!(phase = %phase, summary = ?subsystem.summary(), "Phase finished");

        // 실패한 플러그인은 다음 단계에서 제외
        let outcomes = outcomes.borrow();
        active.retain(|url| matches!(outcomes.get(url), Some(Ok(()))));
    }

    let result = report(&subsystem, urls, &outcomes.borrow());
    Ok(result)
}

fn report(
    subsystem: &PluginSubsystem,
    urls: &[String],
    outcomes: &BTreeMap<String, TransitionResult>,
) -> bool {
    println!();
    let mut all_ok = true;
    for url in urls {
        let state = subsystem
            .plugin_state(url)
            .map(|state| state.to_string())
            .unwrap_or_else(|| "-".to_string());
        match outcomes.get(url) {
            Some(Ok(())) => println!("✓ {} [{}]", url, state),
            Some(Err(e)) => {
                all_ok = false;
                println!("✗ {} [{}]: {}", url, state, e);
            }
            None => {
                all_ok = false;
                println!("✗ {} [{}]: no result", url, state);
            }
        }
    }
    all_ok
}
