//! Actor-based check scheduling
//!
//! Each live check is probed by its own monitor task. The generation manager
//! owns the set of monitors and swaps it wholesale whenever the configuration
//! store reports a change.
//!
//! ## Architecture Overview
//!
//! ```text
//!        config store ──watch──▶ reload loop
//!                                    │ reload(tree)
//!                                    ▼
//!                          ┌───────────────────┐
//!                          │ GenerationManager │──publish──▶ CurrentGeneration ◀── status API
//!                          └─────────┬─────────┘
//!                                    │ spawns / drains
//!                  ┌─────────────────┼─────────────────┐
//!                  ▼                 ▼                 ▼
//!            ┌──────────┐      ┌──────────┐      ┌──────────┐
//!            │ Monitor a│      │ Monitor b│      │ Monitor n│
//!            └────┬─────┘      └────┬─────┘      └────┬─────┘
//!                 │ CheckEvent      │                 │
//!                 ├─────────────────┴─────────────────┤
//!                 ▼                                   ▼
//!           StatusSnapshot                        AlertSink
//! ```
//!
//! ## Actor Types
//!
//! - **MonitorActor**: Sleeps, probes one check, reports the outcome
//! - **GenerationManager**: Drains the old generation before starting the next
//! - **MetricsReporter**: Pushes latency gauges on a fixed interval
//!
//! ## Communication Patterns
//!
//! 1. **Cancellation**: one `watch` channel per monitor, raised exactly once
//! 2. **Join**: the manager awaits each monitor's task before spawning the next generation
//! 3. **Commands**: the metrics reporter takes mpsc commands with oneshot replies

pub mod manager;
pub mod messages;
pub mod metrics;
pub mod monitor;
pub mod reloader;
