//! Plugin State - 상태 식별자와 State 트레이트
//!
//! 19개의 상태는 전체 순서를 가지며, 순서 비교만으로 방향(전진/후진)이
//! 결정됩니다. 그중 6개만 목적지(destination)가 될 수 있습니다.
//!
//! ```text
//! Uninitialized → UnknownStatus* → CheckingStatus → StatusKnown*
//!   → Downloading → Installed* → Mounting → WaitingForDependencies
//!   → Registering → Registered* → Loading → Loaded* → Activating → Active*
//!
//! (후진) Active* → Deactivating → Loaded* → Unloading → Registered*
//!   → Unregistering → Unmounting → Installed* → Uninstalling → StatusKnown*
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::ContextCell;
use super::result::{TransitionError, TransitionResult};

// ============================================================================
// StateId
// ============================================================================

/// 플러그인 라이프사이클 상태
///
/// 선언 순서가 곧 진행 순서입니다 (`Ord` 파생).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StateId {
    Uninitialized,
    UnknownStatus,
    CheckingStatus,
    StatusKnown,
    Uninstalling,
    Downloading,
    Installed,
    Unmounting,
    Mounting,
    WaitingForDependencies,
    Unregistering,
    Registering,
    Registered,
    Unloading,
    Loading,
    Loaded,
    Deactivating,
    Activating,
    Active,
}

impl StateId {
    /// 전체 상태 수
    pub const COUNT: usize = 19;

    /// 순서대로 나열된 모든 상태
    pub const ALL: [StateId; Self::COUNT] = [
        StateId::Uninitialized,
        StateId::UnknownStatus,
        StateId::CheckingStatus,
        StateId::StatusKnown,
        StateId::Uninstalling,
        StateId::Downloading,
        StateId::Installed,
        StateId::Unmounting,
        StateId::Mounting,
        StateId::WaitingForDependencies,
        StateId::Unregistering,
        StateId::Registering,
        StateId::Registered,
        StateId::Unloading,
        StateId::Loading,
        StateId::Loaded,
        StateId::Deactivating,
        StateId::Activating,
        StateId::Active,
    ];

    /// 상태 테이블 인덱스
    pub fn index(self) -> usize {
        self as usize
    }

    /// 목적지가 될 수 있는 상태인지 (plateau)
    pub fn can_be_destination(self) -> bool {
        matches!(
            self,
            StateId::UnknownStatus
                | StateId::StatusKnown
                | StateId::Installed
                | StateId::Registered
                | StateId::Loaded
                | StateId::Active
        )
    }

    /// 전이 상태가 이미 약속한 진행 방향
    ///
    /// 목적지 가능 상태(와 Uninitialized)는 `None`을 반환하며,
    /// 이때 방향은 현재/목적지 비교로 정해집니다.
    pub fn committed_direction(self) -> Option<Direction> {
        match self {
            StateId::CheckingStatus
            | StateId::Downloading
            | StateId::Mounting
            | StateId::WaitingForDependencies
            | StateId::Registering
            | StateId::Loading
            | StateId::Activating => Some(Direction::Forward),
            StateId::Uninstalling
            | StateId::Unmounting
            | StateId::Unregistering
            | StateId::Unloading
            | StateId::Deactivating => Some(Direction::Backward),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StateId::Uninitialized => "Uninitialized",
            StateId::UnknownStatus => "UnknownStatus",
            StateId::CheckingStatus => "CheckingStatus",
            StateId::StatusKnown => "StatusKnown",
            StateId::Uninstalling => "Uninstalling",
            StateId::Downloading => "Downloading",
            StateId::Installed => "Installed",
            StateId::Unmounting => "Unmounting",
            StateId::Mounting => "Mounting",
            StateId::WaitingForDependencies => "WaitingForDependencies",
            StateId::Unregistering => "Unregistering",
            StateId::Registering => "Registering",
            StateId::Registered => "Registered",
            StateId::Unloading => "Unloading",
            StateId::Loading => "Loading",
            StateId::Loaded => "Loaded",
            StateId::Deactivating => "Deactivating",
            StateId::Activating => "Activating",
            StateId::Active => "Active",
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Direction
// ============================================================================

/// 목적지를 향한 진행 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    /// 이미 목적지에 도달
    Arrived,
}

impl Direction {
    pub fn between(current: StateId, destination: StateId) -> Self {
        match current.cmp(&destination) {
            std::cmp::Ordering::Less => Direction::Forward,
            std::cmp::Ordering::Greater => Direction::Backward,
            std::cmp::Ordering::Equal => Direction::Arrived,
        }
    }
}

// ============================================================================
// StateInfo / StateStatus
// ============================================================================

/// 현재 상태와 진행률 (0.0 ~ 1.0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateInfo {
    pub state: StateId,
    pub progress: f32,
}

impl StateInfo {
    pub fn new(state: StateId) -> Self {
        Self {
            state,
            progress: if state.can_be_destination() { 1.0 } else { 0.0 },
        }
    }

    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = progress.clamp(0.0, 1.0);
        self
    }
}

/// `update_state` 한 번의 결과
#[derive(Debug, Clone, PartialEq)]
pub struct StateStatus {
    /// 다음 상태 (`None`이면 머무름)
    pub transition_to: Option<StateId>,
    /// 이번 단계의 결과. 실패는 다음 목적지 가능 상태에서 보고됨
    pub result: TransitionResult,
}

impl StateStatus {
    /// 머무름 (비동기 작업 대기 등)
    pub fn stay() -> Self {
        Self {
            transition_to: None,
            result: Ok(()),
        }
    }

    pub fn transition(to: StateId) -> Self {
        Self {
            transition_to: Some(to),
            result: Ok(()),
        }
    }

    /// 실패와 함께 복구 상태로 이동
    pub fn fail(to: StateId, error: TransitionError) -> Self {
        Self {
            transition_to: Some(to),
            result: Err(error),
        }
    }

    /// 실패했지만 현재 상태에 머무름
    pub fn fail_in_place(error: TransitionError) -> Self {
        Self {
            transition_to: None,
            result: Err(error),
        }
    }
}

// ============================================================================
// State trait
// ============================================================================

/// 상태 하나의 동작
///
/// 머신은 상태마다 하나의 객체를 소유하며, 진입/이탈 시 `begin_state` /
/// `end_state`를, 구동 중에는 `update_state`를 호출합니다.
/// 구현체는 `ContextCell`을 짧게만 빌려야 합니다 (형제 머신 호출 중 대여 금지).
pub trait State {
    fn id(&self) -> StateId;

    fn begin_state(&mut self, _ctx: &ContextCell) {}

    fn update_state(&mut self, ctx: &ContextCell, direction: Direction) -> StateStatus;

    fn end_state(&mut self, _ctx: &ContextCell) {}

    fn can_be_destination_state(&self) -> bool {
        self.id().can_be_destination()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for pair in StateId::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should precede {}", pair[0], pair[1]);
        }
        for (i, state) in StateId::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
    }

    #[test]
    fn test_exactly_six_destinations() {
        let destinations: Vec<_> = StateId::ALL
            .iter()
            .copied()
            .filter(|s| s.can_be_destination())
            .collect();
        assert_eq!(
            destinations,
            vec![
                StateId::UnknownStatus,
                StateId::StatusKnown,
                StateId::Installed,
                StateId::Registered,
                StateId::Loaded,
                StateId::Active,
            ]
        );
    }

    #[test]
    fn test_committed_direction() {
        assert_eq!(StateId::Mounting.committed_direction(), Some(Direction::Forward));
        assert_eq!(StateId::Unmounting.committed_direction(), Some(Direction::Backward));
        assert_eq!(StateId::Installed.committed_direction(), None);
        assert_eq!(StateId::Uninitialized.committed_direction(), None);
    }

    #[test]
    fn test_direction_between() {
        assert_eq!(
            Direction::between(StateId::Installed, StateId::Active),
            Direction::Forward
        );
        assert_eq!(
            Direction::between(StateId::Active, StateId::Installed),
            Direction::Backward
        );
        assert_eq!(
            Direction::between(StateId::Loaded, StateId::Loaded),
            Direction::Arrived
        );
    }

    #[test]
    fn test_state_info_progress() {
        assert_eq!(StateInfo::new(StateId::Installed).progress, 1.0);
        assert_eq!(StateInfo::new(StateId::Downloading).progress, 0.0);
        assert_eq!(
            StateInfo::new(StateId::Downloading).with_progress(1.5).progress,
            1.0
        );
    }
}
