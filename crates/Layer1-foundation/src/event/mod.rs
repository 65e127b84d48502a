//! Event System - 이벤트 발행/구독 시스템
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EventBus                              │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │  publish(event) ──────────────────────────────────┐ │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │         │                                                   │
//! │         ▼                                                   │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │  Listener 1  │  │  Receiver    │  │  History     │      │
//! │  │  (CLI 출력)  │  │  (broadcast) │  │  (최근 N개)  │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusConfig, EventFilter, EventListener, ListenerId};

pub use types::{EventCategory, EventId, EventSeverity, FeatureEvent};
