//! Time-driven vital signs for the three physiological regimes.
//!
//! - untreated tachyarrhythmia: five fixed stages, softened at each stage
//!   boundary and adjusted by supportive interventions;
//! - arrest/asystole: linear desaturation;
//! - post-conversion recovery: heart-rate ramps plus a 30 s return to
//!   baseline for everything else.
//!
//! [`step`] picks the regime for a state and returns the delta to merge.

use serde::{Deserialize, Serialize};

use crate::patient::{
    InterventionFlags, MentalStatus, PatientState, SkinColor, Stability, StateDelta, Vitals,
};
use crate::random::RandomSource;

const BODY_TEMPERATURE_C: f32 = 37.0;

/// Healthy resting vitals for the reference patient.
pub const BASELINE_VITALS: Vitals = Vitals {
    heart_rate: 100,
    systolic: 100,
    diastolic: 65,
    respiratory_rate: 22,
    spo2: 99,
    temperature_c: BODY_TEMPERATURE_C,
    cap_refill_s: 1.5,
};

/// Fraction of a stage window after which vitals begin drifting toward the next stage.
const BLEND_START: f64 = 0.7;
/// Furthest the drift goes before the threshold is crossed.
const BLEND_MAX: f64 = 0.3;

const OXYGEN_SPO2_BONUS: u8 = 3;
const POSITION_SPO2_BONUS: u8 = 1;
const SUPPORTED_SPO2_CAP: u8 = 99;
const FLUID_SYSTOLIC_BONUS: u16 = 8;
const FLUID_DIASTOLIC_BONUS: u16 = 5;

const JITTER_SPO2_RANGE: (i32, i32) = (80, 100);
const JITTER_RR_FLOOR: i32 = 20;

const ASYSTOLE_START_SPO2: f64 = 94.0;
const ASYSTOLE_SPO2_DROP_PER_S: f64 = 3.0;
const ASYSTOLE_SPO2_FLOOR: f64 = 70.0;
const ASYSTOLE_CAP_REFILL_S: f32 = 5.0;

/// Length of the post-conversion recovery window.
pub const RECOVERY_WINDOW_MS: u64 = 30_000;
const JUST_CONVERTED: Vitals = Vitals {
    heart_rate: 0,
    systolic: 82,
    diastolic: 52,
    respiratory_rate: 30,
    spo2: 92,
    temperature_c: BODY_TEMPERATURE_C,
    cap_refill_s: 3.5,
};

/// Vitals the instant a conversion lands, before the recovery ramps start.
pub fn post_conversion_vitals(heart_rate: u16) -> Vitals {
    Vitals {
        heart_rate,
        ..JUST_CONVERTED
    }
}

/// `(until_ms, from_hr, to_hr)`; the last leg ends at the target rate.
const JUNCTIONAL_ESCAPE: (u64, f64, f64) = (2_000, 0.0, 55.0);
const BRADYCARDIC_LEG: (u64, f64, f64) = (5_000, 55.0, 70.0);
const APPROACH_END_MS: u64 = 10_000;
const RECOVERED_HR_JITTER: u32 = 2;

/// Progressive decompensation of an untreated tachyarrhythmia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeteriorationStage {
    Compensated,
    EarlyStress,
    ModerateStress,
    Decompensating,
    Critical,
}

/// Fixed vitals for one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSnapshot {
    pub heart_rate: u16,
    pub systolic: u16,
    pub diastolic: u16,
    pub respiratory_rate: u16,
    pub spo2: u8,
    pub cap_refill_s: f32,
    pub mental_status: MentalStatus,
}

impl StageSnapshot {
    fn vitals(&self) -> Vitals {
        Vitals {
            heart_rate: self.heart_rate,
            systolic: self.systolic,
            diastolic: self.diastolic,
            respiratory_rate: self.respiratory_rate,
            spo2: self.spo2,
            temperature_c: BODY_TEMPERATURE_C,
            cap_refill_s: self.cap_refill_s,
        }
    }
}

const COMPENSATED: StageSnapshot = StageSnapshot {
    heart_rate: 220,
    systolic: 95,
    diastolic: 60,
    respiratory_rate: 28,
    spo2: 97,
    cap_refill_s: 2.0,
    mental_status: MentalStatus::Alert,
};

const EARLY_STRESS: StageSnapshot = StageSnapshot {
    heart_rate: 228,
    systolic: 90,
    diastolic: 57,
    respiratory_rate: 32,
    spo2: 95,
    cap_refill_s: 2.5,
    mental_status: MentalStatus::Alert,
};

const MODERATE_STRESS: StageSnapshot = StageSnapshot {
    heart_rate: 235,
    systolic: 84,
    diastolic: 53,
    respiratory_rate: 36,
    spo2: 93,
    cap_refill_s: 3.0,
    mental_status: MentalStatus::Verbal,
};

const DECOMPENSATING: StageSnapshot = StageSnapshot {
    heart_rate: 242,
    systolic: 76,
    diastolic: 48,
    respiratory_rate: 42,
    spo2: 90,
    cap_refill_s: 4.0,
    mental_status: MentalStatus::Pain,
};

const CRITICAL: StageSnapshot = StageSnapshot {
    heart_rate: 250,
    systolic: 68,
    diastolic: 42,
    respiratory_rate: 48,
    spo2: 86,
    cap_refill_s: 5.0,
    mental_status: MentalStatus::Unresponsive,
};

impl DeteriorationStage {
    pub const ALL: [Self; 5] = [
        Self::Compensated,
        Self::EarlyStress,
        Self::ModerateStress,
        Self::Decompensating,
        Self::Critical,
    ];

    /// 0 (compensated) through 4 (critical).
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Elapsed time at which this stage ends; `None` for the last stage.
    pub fn until_ms(self) -> Option<u64> {
        match self {
            Self::Compensated => Some(60_000),
            Self::EarlyStress => Some(120_000),
            Self::ModerateStress => Some(180_000),
            Self::Decompensating => Some(240_000),
            Self::Critical => None,
        }
    }

    /// Elapsed time at which this stage begins.
    pub fn starts_at_ms(self) -> u64 {
        match self.previous() {
            Some(prev) => prev.until_ms().unwrap_or(0),
            None => 0,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() as usize + 1).copied()
    }

    fn previous(self) -> Option<Self> {
        (self.index() as usize)
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn snapshot(self) -> &'static StageSnapshot {
        match self {
            Self::Compensated => &COMPENSATED,
            Self::EarlyStress => &EARLY_STRESS,
            Self::ModerateStress => &MODERATE_STRESS,
            Self::Decompensating => &DECOMPENSATING,
            Self::Critical => &CRITICAL,
        }
    }

    /// First stage whose threshold exceeds `elapsed_ms`.
    pub fn for_elapsed(elapsed_ms: u64) -> Self {
        Self::ALL
            .into_iter()
            .find(|stage| stage.until_ms().map_or(true, |until| elapsed_ms < until))
            .unwrap_or(Self::Critical)
    }

    /// Stability category shown for a patient in this stage.
    pub fn stability(self) -> Stability {
        match self {
            Self::Compensated | Self::EarlyStress => Stability::Compensated,
            Self::ModerateStress | Self::Decompensating => Stability::Unstable,
            Self::Critical => Stability::Critical,
        }
    }

    pub fn skin_color(self) -> SkinColor {
        match self {
            Self::Compensated => SkinColor::Pink,
            Self::EarlyStress | Self::ModerateStress => SkinColor::Pale,
            Self::Decompensating => SkinColor::Mottled,
            Self::Critical => SkinColor::Cyanotic,
        }
    }
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

fn lerp_u16(from: u16, to: u16, t: f64) -> u16 {
    lerp(f64::from(from), f64::from(to), t).round() as u16
}

fn lerp_u8(from: u8, to: u8, t: f64) -> u8 {
    lerp(f64::from(from), f64::from(to), t).round() as u8
}

fn lerp_vitals(from: &Vitals, to: &Vitals, t: f64) -> Vitals {
    Vitals {
        heart_rate: lerp_u16(from.heart_rate, to.heart_rate, t),
        systolic: lerp_u16(from.systolic, to.systolic, t),
        diastolic: lerp_u16(from.diastolic, to.diastolic, t),
        respiratory_rate: lerp_u16(from.respiratory_rate, to.respiratory_rate, t),
        spo2: lerp_u8(from.spo2, to.spo2, t),
        temperature_c: BODY_TEMPERATURE_C,
        cap_refill_s: lerp(f64::from(from.cap_refill_s), f64::from(to.cap_refill_s), t) as f32,
    }
}

/// How far toward the next stage's snapshot vitals have drifted.
fn blend_toward_next(stage: DeteriorationStage, elapsed_ms: u64) -> f64 {
    let Some(until) = stage.until_ms() else {
        return 0.0;
    };
    let start = stage.starts_at_ms();
    let window = (until - start) as f64;
    let progress = (elapsed_ms.saturating_sub(start)) as f64 / window;
    if progress <= BLEND_START {
        return 0.0;
    }
    ((progress - BLEND_START) / (1.0 - BLEND_START)).min(1.0) * BLEND_MAX
}

/// Stage vitals at `elapsed_ms` with boundary smoothing, before modifiers or jitter.
pub fn snapshot_vitals(elapsed_ms: u64) -> Vitals {
    let stage = DeteriorationStage::for_elapsed(elapsed_ms);
    let current = stage.snapshot().vitals();
    match stage.next() {
        Some(next) => lerp_vitals(&current, &next.snapshot().vitals(), blend_toward_next(stage, elapsed_ms)),
        None => current,
    }
}

/// Vitals and categories for an untreated tachyarrhythmia.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeteriorationVitals {
    pub vitals: Vitals,
    pub stage: DeteriorationStage,
    pub mental_status: MentalStatus,
}

/// Staged deterioration at `elapsed_ms` into the rhythm.
///
/// Draws twice from `rng` (SpO₂ and respiratory-rate jitter).
pub fn calculate_deterioration_vitals(
    elapsed_ms: u64,
    flags: &InterventionFlags,
    rng: &mut RandomSource,
) -> DeteriorationVitals {
    let stage = DeteriorationStage::for_elapsed(elapsed_ms);
    let mut vitals = snapshot_vitals(elapsed_ms);

    if flags.oxygen {
        vitals.spo2 = vitals.spo2.saturating_add(OXYGEN_SPO2_BONUS).min(SUPPORTED_SPO2_CAP);
    }
    if flags.iv_fluids {
        vitals.systolic = (vitals.systolic + FLUID_SYSTOLIC_BONUS).min(BASELINE_VITALS.systolic);
        vitals.diastolic = (vitals.diastolic + FLUID_DIASTOLIC_BONUS).min(BASELINE_VITALS.diastolic);
    }
    if flags.position_optimized {
        vitals.spo2 = vitals.spo2.saturating_add(POSITION_SPO2_BONUS).min(SUPPORTED_SPO2_CAP);
    }

    let spo2 = i32::from(vitals.spo2) + rng.jitter(1);
    vitals.spo2 = spo2.clamp(JITTER_SPO2_RANGE.0, JITTER_SPO2_RANGE.1) as u8;
    let rr = i32::from(vitals.respiratory_rate) + rng.jitter(1);
    vitals.respiratory_rate = rr.max(JITTER_RR_FLOOR) as u16;

    DeteriorationVitals {
        vitals,
        stage,
        mental_status: stage.snapshot().mental_status,
    }
}

/// Vitals during asystole (or any arrest) `elapsed_ms` after onset.
pub fn calculate_asystole_vitals(elapsed_ms: u64) -> Vitals {
    let seconds = elapsed_ms as f64 / 1000.0;
    let spo2 = (ASYSTOLE_START_SPO2 - ASYSTOLE_SPO2_DROP_PER_S * seconds).max(ASYSTOLE_SPO2_FLOOR);
    Vitals {
        heart_rate: 0,
        systolic: 0,
        diastolic: 0,
        respiratory_rate: 0,
        spo2: spo2.round() as u8,
        temperature_c: BODY_TEMPERATURE_C,
        cap_refill_s: ASYSTOLE_CAP_REFILL_S,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoverySnapshot {
    pub vitals: Vitals,
    pub mental_status: MentalStatus,
    pub skin_color: SkinColor,
}

fn ramp(elapsed_ms: u64, start_ms: u64, end_ms: u64, from: f64, to: f64) -> f64 {
    let t = (elapsed_ms.saturating_sub(start_ms)) as f64 / (end_ms - start_ms) as f64;
    lerp(from, to, t.clamp(0.0, 1.0))
}

/// Heart rate during recovery. Draws from `rng` only once the ramps are done.
fn recovery_heart_rate(elapsed_ms: u64, target_hr: u16, rng: &mut RandomSource) -> u16 {
    let (escape_end, escape_from, escape_to) = JUNCTIONAL_ESCAPE;
    let (brady_end, brady_from, brady_to) = BRADYCARDIC_LEG;
    let hr = if elapsed_ms < escape_end {
        ramp(elapsed_ms, 0, escape_end, escape_from, escape_to)
    } else if elapsed_ms < brady_end {
        ramp(elapsed_ms, escape_end, brady_end, brady_from, brady_to)
    } else if elapsed_ms < APPROACH_END_MS {
        ramp(elapsed_ms, brady_end, APPROACH_END_MS, brady_to, f64::from(target_hr))
    } else {
        f64::from(i32::from(target_hr) + rng.jitter(RECOVERED_HR_JITTER))
    };
    hr.round().max(0.0) as u16
}

/// Post-conversion vitals `elapsed_ms` after the rhythm became sinus.
pub fn calculate_recovery_vitals(
    elapsed_ms: u64,
    target_hr: u16,
    rng: &mut RandomSource,
) -> RecoverySnapshot {
    let progress = (elapsed_ms as f64 / RECOVERY_WINDOW_MS as f64).min(1.0);
    let mut vitals = lerp_vitals(&JUST_CONVERTED, &BASELINE_VITALS, progress);
    vitals.heart_rate = recovery_heart_rate(elapsed_ms, target_hr, rng);

    let mental_status = if progress < 0.3 {
        MentalStatus::Pain
    } else if progress < 0.7 {
        MentalStatus::Verbal
    } else {
        MentalStatus::Alert
    };
    let skin_color = if progress < 0.5 {
        SkinColor::Pale
    } else {
        SkinColor::Pink
    };

    RecoverySnapshot {
        vitals,
        mental_status,
        skin_color,
    }
}

/// Advance the patient by `dt_ms` of simulated time.
///
/// The stored deterioration stage is a floor: a tachyarrhythmia that has
/// already reached a stage never reads as an earlier one until a conversion
/// resets it.
pub fn step(state: &PatientState, dt_ms: u64, rng: &mut RandomSource) -> StateDelta {
    let elapsed = state.rhythm_elapsed_ms.saturating_add(dt_ms);
    log::debug!("step +{} ms: {:?} at {} ms", dt_ms, state.rhythm, elapsed);
    let mut delta = StateDelta {
        rhythm_elapsed_ms: Some(elapsed),
        ..Default::default()
    };

    if state.rhythm.is_pulseless() {
        delta.vitals = Some(calculate_asystole_vitals(elapsed));
        if !state.transient_active() {
            delta.mental_status = Some(MentalStatus::Unresponsive);
            delta.stability = Some(Stability::Critical);
            delta.skin_color = Some(SkinColor::Cyanotic);
        }
        return delta;
    }

    if state.rhythm.is_sinus() && state.stability == Stability::Recovering {
        let target = state.recovery_target_hr.unwrap_or(BASELINE_VITALS.heart_rate);
        let recovery = calculate_recovery_vitals(elapsed, target, rng);
        delta.vitals = Some(recovery.vitals);
        delta.mental_status = Some(if state.sedated {
            recovery.mental_status.max(MentalStatus::Pain)
        } else {
            recovery.mental_status
        });
        delta.skin_color = Some(recovery.skin_color);
        if elapsed >= RECOVERY_WINDOW_MS {
            log::info!("recovery complete after {} ms", elapsed);
            delta.stability = Some(Stability::Stable);
        }
        return delta;
    }

    if state.rhythm.is_crisis() {
        let effective = elapsed.max(state.deterioration_stage.starts_at_ms());
        let result = calculate_deterioration_vitals(effective, &state.flags, rng);
        if result.stage > state.deterioration_stage {
            log::info!(
                "deterioration {:?} -> {:?} at {} ms",
                state.deterioration_stage,
                result.stage,
                elapsed
            );
        }
        delta.vitals = Some(result.vitals);
        delta.deterioration_stage = Some(result.stage);
        delta.stability = Some(result.stage.stability());
        delta.skin_color = Some(result.stage.skin_color());
        delta.mental_status = Some(if state.sedated {
            result.mental_status.max(MentalStatus::Pain)
        } else {
            result.mental_status
        });
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{apply_result, Rhythm};
    use crate::scenario::ScenarioDefinition;

    const NO_FLAGS: InterventionFlags = InterventionFlags {
        oxygen: false,
        iv_fluids: false,
        position_optimized: false,
    };

    #[test]
    fn stage_boundaries() {
        assert_eq!(DeteriorationStage::for_elapsed(0), DeteriorationStage::Compensated);
        assert_eq!(DeteriorationStage::for_elapsed(59_999), DeteriorationStage::Compensated);
        assert_eq!(DeteriorationStage::for_elapsed(60_000), DeteriorationStage::EarlyStress);
        assert_eq!(DeteriorationStage::for_elapsed(179_999), DeteriorationStage::ModerateStress);
        assert_eq!(DeteriorationStage::for_elapsed(240_000), DeteriorationStage::Critical);
        assert_eq!(DeteriorationStage::for_elapsed(u64::MAX), DeteriorationStage::Critical);
        assert_eq!(DeteriorationStage::Critical.index(), 4);
        assert_eq!(DeteriorationStage::EarlyStress.starts_at_ms(), 60_000);
    }

    #[test]
    fn stage_never_decreases_with_time() {
        let mut last = DeteriorationStage::Compensated;
        for ms in (0..400_000).step_by(500) {
            let stage = DeteriorationStage::for_elapsed(ms);
            assert!(stage >= last);
            last = stage;
        }
    }

    #[test]
    fn no_blend_before_seventy_percent() {
        assert_eq!(snapshot_vitals(0), COMPENSATED.vitals());
        assert_eq!(snapshot_vitals(42_000), COMPENSATED.vitals());
    }

    #[test]
    fn blend_reaches_thirty_percent_at_boundary() {
        // 1 ms short of EarlyStress: ~30% of the way from 220 to 228
        let v = snapshot_vitals(59_999);
        assert_eq!(v.heart_rate, 222);
        assert_eq!(v.systolic, 94);
        // after the threshold the next stage starts unblended
        assert_eq!(snapshot_vitals(60_000).heart_rate, 228);
    }

    #[test]
    fn critical_has_no_blend() {
        assert_eq!(snapshot_vitals(1_000_000), CRITICAL.vitals());
    }

    #[test]
    fn modifiers_are_capped() {
        let flags = InterventionFlags {
            oxygen: true,
            iv_fluids: true,
            position_optimized: true,
        };
        for seed in 0..50 {
            let mut rng = RandomSource::new(seed);
            let v = calculate_deterioration_vitals(0, &flags, &mut rng).vitals;
            // 97 + 3 + 1 capped at 99, then ±1 jitter
            assert!((98..=100).contains(&v.spo2));
            assert_eq!(v.systolic, 100);
            assert_eq!(v.diastolic, 65);
        }
    }

    #[test]
    fn jitter_is_bounded() {
        for seed in 0..200 {
            let mut rng = RandomSource::new(seed);
            let d = calculate_deterioration_vitals(300_000, &NO_FLAGS, &mut rng);
            assert!((85..=87).contains(&d.vitals.spo2));
            assert!((47..=49).contains(&d.vitals.respiratory_rate));
            assert_eq!(d.mental_status, MentalStatus::Unresponsive);
        }
    }

    #[test]
    fn asystole_desaturates_to_floor() {
        assert_eq!(calculate_asystole_vitals(0).spo2, 94);
        assert_eq!(calculate_asystole_vitals(2_000).spo2, 88);
        assert_eq!(calculate_asystole_vitals(60_000).spo2, 70);
        let v = calculate_asystole_vitals(1_000);
        assert_eq!((v.heart_rate, v.systolic, v.diastolic), (0, 0, 0));
    }

    #[test]
    fn recovery_heart_rate_ramps() {
        let mut rng = RandomSource::new(1);
        assert_eq!(calculate_recovery_vitals(0, 95, &mut rng).vitals.heart_rate, 0);
        assert_eq!(calculate_recovery_vitals(1_000, 95, &mut rng).vitals.heart_rate, 28);
        assert_eq!(calculate_recovery_vitals(2_000, 95, &mut rng).vitals.heart_rate, 55);
        assert_eq!(calculate_recovery_vitals(5_000, 95, &mut rng).vitals.heart_rate, 70);
        assert_eq!(calculate_recovery_vitals(7_500, 90, &mut rng).vitals.heart_rate, 80);
        for _ in 0..50 {
            let hr = calculate_recovery_vitals(15_000, 95, &mut rng).vitals.heart_rate;
            assert!((93..=97).contains(&hr));
        }
    }

    #[test]
    fn recovery_categories_switch_at_thresholds() {
        let mut rng = RandomSource::new(2);
        let early = calculate_recovery_vitals(0, 95, &mut rng);
        assert_eq!(early.mental_status, MentalStatus::Pain);
        assert_eq!(early.skin_color, SkinColor::Pale);
        assert_eq!(early.vitals.systolic, 82);

        let mid = calculate_recovery_vitals(15_000, 95, &mut rng);
        assert_eq!(mid.mental_status, MentalStatus::Verbal);
        assert_eq!(mid.skin_color, SkinColor::Pink);

        let done = calculate_recovery_vitals(40_000, 95, &mut rng);
        assert_eq!(done.mental_status, MentalStatus::Alert);
        assert_eq!(done.vitals.systolic, BASELINE_VITALS.systolic);
        assert_eq!(done.vitals.spo2, BASELINE_VITALS.spo2);
    }

    #[test]
    fn step_deteriorates_untreated_svt() {
        let mut state = ScenarioDefinition::pediatric_svt().initial_state();
        let mut rng = RandomSource::new(3);
        for _ in 0..130 {
            let delta = step(&state, 1_000, &mut rng);
            state = apply_result(&state, &delta);
        }
        assert_eq!(state.rhythm_elapsed_ms, 130_000);
        assert_eq!(state.deterioration_stage, DeteriorationStage::ModerateStress);
        assert_eq!(state.mental_status, MentalStatus::Verbal);
        assert_eq!(state.stability, Stability::Unstable);
    }

    #[test]
    fn step_respects_stored_stage() {
        let mut state = ScenarioDefinition::pediatric_svt().initial_state();
        state.deterioration_stage = DeteriorationStage::Decompensating;
        state.rhythm_elapsed_ms = 0;
        let delta = step(&state, 1_000, &mut RandomSource::new(4));
        assert_eq!(delta.deterioration_stage, Some(DeteriorationStage::Decompensating));
        assert_eq!(delta.rhythm_elapsed_ms, Some(1_000));
    }

    #[test]
    fn step_recovers_to_stable() {
        let mut state = ScenarioDefinition::pediatric_svt().initial_state();
        state.rhythm = Rhythm::SinusRhythm;
        state.stability = Stability::Recovering;
        state.rhythm_elapsed_ms = 0;
        state.recovery_target_hr = Some(95);
        let mut rng = RandomSource::new(5);
        for _ in 0..29 {
            state = apply_result(&state, &step(&state, 1_000, &mut rng));
            assert_eq!(state.stability, Stability::Recovering);
        }
        state = apply_result(&state, &step(&state, 1_000, &mut rng));
        assert_eq!(state.stability, Stability::Stable);
        assert_eq!(state.mental_status, MentalStatus::Alert);

        let before = state.vitals;
        let delta = step(&state, 1_000, &mut rng);
        assert_eq!(delta.vitals, None);
        assert_eq!(apply_result(&state, &delta).vitals, before);
    }

    #[test]
    fn step_in_asystole_desaturates() {
        let mut state = ScenarioDefinition::pediatric_svt().initial_state();
        state.rhythm = Rhythm::Asystole;
        state.rhythm_elapsed_ms = 0;
        let next = apply_result(&state, &step(&state, 3_000, &mut RandomSource::new(6)));
        assert_eq!(next.vitals.spo2, 85);
        assert_eq!(next.vitals.heart_rate, 0);
        assert_eq!(next.mental_status, MentalStatus::Unresponsive);
    }

    #[test]
    fn step_in_vf_shows_no_rate() {
        let mut state = ScenarioDefinition::pediatric_svt().initial_state();
        state.rhythm = Rhythm::VentricularFibrillation;
        state.vitals.heart_rate = 180;
        let delta = step(&state, 1_000, &mut RandomSource::new(7));
        assert_eq!(delta.vitals.map(|v| v.heart_rate), Some(0));
        assert_eq!(apply_result(&state, &delta).vitals.heart_rate, 0);
    }
}
