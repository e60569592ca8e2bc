//! Clinical-outcome kernel for CodeBlue.
//!
//! Given a patient's physiological state and an ordered intervention, this
//! crate decides whether the order is safe, whether it works, what the
//! patient looks like afterwards and what happened, without any dialogue,
//! audio or rendering concerns. Every call takes plain data and returns
//! plain data; the session orchestrator owns the state and the
//! [`random::RandomSource`].
//!
//! A typical tick:
//!
//! 1. [`safety`] judges the spoken order (allow, cap, question, refuse);
//! 2. [`intervention::process_intervention`] produces an outcome and a delta;
//! 3. [`patient::apply_result`] merges the delta;
//! 4. [`deterioration::step`] advances time, and
//!    [`intervention::resolve_transient_state`] closes any adenosine pause.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`deterioration`] | Staged decompensation, arrest desaturation, post-conversion recovery |
//! | [`dosing`] | Weight-based drug doses, shock energies, dose accuracy |
//! | [`events`] | Flat, timestamped event log for debrief tooling |
//! | [`intervention`] | Intervention engine and transient resolution |
//! | [`patient`] | Patient state, rhythms, deltas and the state reducer |
//! | [`random`] | Seedable random source shared by all draws |
//! | [`safety`] | Rule-table safety gate for drug and energy orders |
//! | [`scenario`] | Scenario definitions, loading and validation |

pub mod deterioration;
pub mod dosing;
pub mod events;
pub mod intervention;
pub mod patient;
pub mod random;
pub mod safety;
pub mod scenario;
