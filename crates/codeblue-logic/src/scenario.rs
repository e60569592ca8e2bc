//! Scenario definitions: the data a session starts from.
//!
//! A scenario is plain JSON (see `data/scenarios/`). Loading validates it
//! and reports every problem at once.
//!
//! ```
//! use codeblue_logic::scenario::ScenarioDefinition;
//!
//! let json = r#"{
//!     "id": "svt-5yo",
//!     "title": "Pediatric SVT",
//!     "patient": {
//!         "name": "Lily Chen",
//!         "age_years": 5,
//!         "weight_kg": 18.5,
//!         "sex": "Female",
//!         "chief_complaint": "Racing heart"
//!     },
//!     "initial_rhythm": "SVT"
//! }"#;
//! let scenario = ScenarioDefinition::from_json_str(json).unwrap();
//! assert_eq!(scenario.initial_state().vitals.heart_rate, 220);
//! ```

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::deterioration::{self, DeteriorationStage};
use crate::patient::{
    apply_result, InterventionFlags, InterventionHistory, MentalStatus, PatientProfile,
    PatientState, Perfusion, Rhythm, Sex, SkinColor, Stability, StateDelta, Vitals,
};
use crate::random::{RandomSource, DEFAULT_SEED};

const MAX_WEIGHT_KG: f64 = 150.0;
const MAX_AGE_YEARS: u8 = 21;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: String,
    pub title: String,
    pub patient: PatientProfile,
    pub initial_rhythm: Rhythm,
    /// Defaults to the regime's starting vitals for `initial_rhythm`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_vitals: Option<Vitals>,
    #[serde(default)]
    pub iv_access: bool,
    #[serde(default)]
    pub io_access: bool,
    #[serde(default)]
    pub sedated: bool,
    #[serde(default)]
    pub intubated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Scenario validation problem.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioIssue {
    EmptyId,
    EmptyPatientName,
    /// Weight must be in (0, 150] kg.
    WeightOutOfRange(f64),
    /// Pediatric scenarios only.
    AgeOutOfRange(u8),
    /// Arrest rhythm with a non-zero heart rate.
    PulselessWithHeartRate(Rhythm, u16),
    SpO2OutOfRange(u8),
}

impl std::fmt::Display for ScenarioIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioIssue::EmptyId => write!(f, "scenario id is empty"),
            ScenarioIssue::EmptyPatientName => write!(f, "patient name is empty"),
            ScenarioIssue::WeightOutOfRange(w) => {
                write!(f, "weight {} kg is outside (0, {}]", w, MAX_WEIGHT_KG)
            }
            ScenarioIssue::AgeOutOfRange(a) => {
                write!(f, "age {} is above the pediatric limit of {}", a, MAX_AGE_YEARS)
            }
            ScenarioIssue::PulselessWithHeartRate(rhythm, hr) => {
                write!(f, "pulseless {:?} scenario has heart rate {}", rhythm, hr)
            }
            ScenarioIssue::SpO2OutOfRange(s) => write!(f, "SpO2 {}% is above 100%", s),
        }
    }
}

/// Errors that can occur while loading a scenario
#[derive(Debug)]
pub enum ScenarioError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Invalid(Vec<ScenarioIssue>),
}

impl From<std::io::Error> for ScenarioError {
    fn from(e: std::io::Error) -> Self {
        ScenarioError::Io(e)
    }
}

impl From<serde_json::Error> for ScenarioError {
    fn from(e: serde_json::Error) -> Self {
        ScenarioError::Json(e)
    }
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::Io(e) => write!(f, "IO error: {}", e),
            ScenarioError::Json(e) => write!(f, "Scenario parse error: {}", e),
            ScenarioError::Invalid(issues) => {
                write!(f, "Invalid scenario: ")?;
                for (i, issue) in issues.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", issue)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScenarioError::Io(e) => Some(e),
            ScenarioError::Json(e) => Some(e),
            ScenarioError::Invalid(_) => None,
        }
    }
}

/// Validate a scenario, returning all issues found.
pub fn validate_scenario(scenario: &ScenarioDefinition) -> Vec<ScenarioIssue> {
    let mut issues = Vec::new();

    if scenario.id.trim().is_empty() {
        issues.push(ScenarioIssue::EmptyId);
    }
    if scenario.patient.name.trim().is_empty() {
        issues.push(ScenarioIssue::EmptyPatientName);
    }
    let weight = scenario.patient.weight_kg;
    if !(weight.is_finite() && weight > 0.0 && weight <= MAX_WEIGHT_KG) {
        issues.push(ScenarioIssue::WeightOutOfRange(weight));
    }
    if scenario.patient.age_years > MAX_AGE_YEARS {
        issues.push(ScenarioIssue::AgeOutOfRange(scenario.patient.age_years));
    }
    if let Some(vitals) = scenario.initial_vitals {
        if scenario.initial_rhythm.is_pulseless() && vitals.heart_rate != 0 {
            issues.push(ScenarioIssue::PulselessWithHeartRate(
                scenario.initial_rhythm,
                vitals.heart_rate,
            ));
        }
        if vitals.spo2 > 100 {
            issues.push(ScenarioIssue::SpO2OutOfRange(vitals.spo2));
        }
    }

    issues
}

impl ScenarioDefinition {
    /// The built-in scenario: a 5-year-old in SVT, no access yet.
    pub fn pediatric_svt() -> Self {
        Self {
            id: "pediatric-svt".to_string(),
            title: "Pediatric SVT".to_string(),
            patient: PatientProfile {
                name: "Lily Chen".to_string(),
                age_years: 5,
                weight_kg: 18.5,
                sex: Sex::Female,
                chief_complaint: "Heart racing since recess, feels dizzy".to_string(),
            },
            initial_rhythm: Rhythm::Svt,
            initial_vitals: None,
            iv_access: false,
            io_access: false,
            sedated: false,
            intubated: false,
            seed: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        Self::checked(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ScenarioError> {
        Self::checked(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    fn checked(scenario: Self) -> Result<Self, ScenarioError> {
        let issues = validate_scenario(&scenario);
        if issues.is_empty() {
            log::debug!("loaded scenario {}", scenario.id);
            Ok(scenario)
        } else {
            Err(ScenarioError::Invalid(issues))
        }
    }

    /// Starting state for a session.
    pub fn initial_state(&self) -> PatientState {
        let rhythm = self.initial_rhythm;
        let (vitals, mental_status, stability, skin_color) = if rhythm.is_pulseless() {
            (
                deterioration::calculate_asystole_vitals(0),
                MentalStatus::Unresponsive,
                Stability::Critical,
                SkinColor::Cyanotic,
            )
        } else if rhythm.is_crisis() {
            let stage = DeteriorationStage::Compensated;
            (
                deterioration::snapshot_vitals(0),
                stage.snapshot().mental_status,
                stage.stability(),
                stage.skin_color(),
            )
        } else {
            (
                deterioration::BASELINE_VITALS,
                MentalStatus::Alert,
                Stability::Stable,
                SkinColor::Pink,
            )
        };
        let mental_status = if self.sedated {
            mental_status.max(MentalStatus::Pain)
        } else {
            mental_status
        };

        let state = PatientState {
            profile: self.patient.clone(),
            rhythm,
            vitals: self.initial_vitals.unwrap_or(vitals),
            mental_status,
            perfusion: Perfusion::Normal,
            stability,
            skin_color,
            iv_access: self.iv_access,
            io_access: self.io_access,
            sedated: self.sedated,
            intubated: self.intubated,
            rhythm_elapsed_ms: 0,
            deterioration_stage: DeteriorationStage::Compensated,
            transient: None,
            history: InterventionHistory::default(),
            flags: InterventionFlags::default(),
            recovery_target_hr: None,
        };
        // settle perfusion and the rhythm invariants
        apply_result(&state, &StateDelta::default())
    }

    /// Random source for a session; falls back to [`DEFAULT_SEED`].
    pub fn random_source(&self) -> RandomSource {
        RandomSource::new(self.seed.unwrap_or(DEFAULT_SEED))
    }
}

impl Default for ScenarioDefinition {
    fn default() -> Self {
        Self::pediatric_svt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scenario_is_valid() {
        let scenario = ScenarioDefinition::pediatric_svt();
        assert!(validate_scenario(&scenario).is_empty());
        let state = scenario.initial_state();
        assert_eq!(state.rhythm, Rhythm::Svt);
        assert_eq!(state.vitals.heart_rate, 220);
        assert_eq!(state.vitals.systolic, 95);
        assert_eq!(state.perfusion, Perfusion::Normal);
        assert_eq!(state.stability, Stability::Compensated);
        assert!(!state.has_vascular_access());
        assert_eq!(scenario.random_source().seed(), DEFAULT_SEED);
    }

    #[test]
    fn initial_state_is_settled() {
        let state = ScenarioDefinition::pediatric_svt().initial_state();
        assert_eq!(apply_result(&state, &StateDelta::default()), state);
    }

    #[test]
    fn validation_reports_every_issue() {
        let mut scenario = ScenarioDefinition::pediatric_svt();
        scenario.id = " ".to_string();
        scenario.patient.name.clear();
        scenario.patient.weight_kg = 0.0;
        scenario.patient.age_years = 40;
        let issues = validate_scenario(&scenario);
        assert_eq!(issues.len(), 4);
        assert!(issues.contains(&ScenarioIssue::EmptyId));
        assert!(issues.contains(&ScenarioIssue::EmptyPatientName));
        assert!(issues.contains(&ScenarioIssue::WeightOutOfRange(0.0)));
        assert!(issues.contains(&ScenarioIssue::AgeOutOfRange(40)));
    }

    #[test]
    fn pulseless_vitals_must_have_zero_rate() {
        let mut vitals = deterioration::BASELINE_VITALS;
        vitals.heart_rate = 180;
        for rhythm in [Rhythm::Asystole, Rhythm::VentricularFibrillation, Rhythm::Pea] {
            let mut scenario = ScenarioDefinition::pediatric_svt();
            scenario.initial_rhythm = rhythm;
            scenario.initial_vitals = Some(vitals);
            assert_eq!(
                validate_scenario(&scenario),
                vec![ScenarioIssue::PulselessWithHeartRate(rhythm, 180)]
            );
        }
    }

    #[test]
    fn arrest_scenario_starts_pulseless() {
        let mut scenario = ScenarioDefinition::pediatric_svt();
        scenario.initial_rhythm = Rhythm::VentricularFibrillation;
        let state = scenario.initial_state();
        assert_eq!(state.perfusion, Perfusion::Absent);
        assert_eq!(state.vitals.heart_rate, 0);
        assert_eq!(state.vitals.systolic, 0);
        assert_eq!(state.mental_status, MentalStatus::Unresponsive);
    }

    #[test]
    fn json_round_trip_and_errors() {
        let json = serde_json::to_string(&ScenarioDefinition::pediatric_svt()).unwrap();
        let loaded = ScenarioDefinition::from_json_str(&json).unwrap();
        assert_eq!(loaded, ScenarioDefinition::pediatric_svt());

        assert!(matches!(
            ScenarioDefinition::from_json_str("{ not json"),
            Err(ScenarioError::Json(_))
        ));

        let bad = json.replace("18.5", "-3.0");
        match ScenarioDefinition::from_json_str(&bad) {
            Err(ScenarioError::Invalid(issues)) => {
                assert_eq!(issues, vec![ScenarioIssue::WeightOutOfRange(-3.0)])
            }
            other => panic!("expected invalid scenario, got {:?}", other),
        }
    }

    #[test]
    fn seed_from_scenario() {
        let mut scenario = ScenarioDefinition::pediatric_svt();
        scenario.seed = Some(99);
        assert_eq!(scenario.random_source().seed(), 99);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ScenarioDefinition::from_path("/nonexistent/scenario.json").unwrap_err();
        assert!(matches!(err, ScenarioError::Io(_)));
        assert!(err.to_string().starts_with("IO error"));
    }
}
