//! Task Loop & Safety State Machine support (§4.4): failsafe output
//! table and the operator interlock state machine. The task loop itself
//! (`cycle.rs`) owns the orchestration; this module owns the two pieces
//! of policy it needs.

pub mod failsafe;
pub mod interlock;
