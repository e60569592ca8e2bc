//! Weight-based drug dosing and shock energy against the PALS tables.
//!
//! Everything here is pure. Unknown identifiers and unusable weights come
//! back as `None` rather than an error.
//!
//! ```
//! use codeblue_logic::dosing::{calculate_drug_dose, calculate_energy, Drug, EnergyKind};
//!
//! let first = calculate_drug_dose(Drug::Adenosine, 18.5, false).unwrap();
//! assert_eq!(first.calculated_dose, 1.85);
//! let shock = calculate_energy(EnergyKind::SynchronizedCardioversion, 18.5, 1).unwrap();
//! assert_eq!(shock.calculated_dose, 9.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::intervention::InterventionType;

/// Administration route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Route {
    Iv,
    Io,
    Im,
    Intranasal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoseUnit {
    #[serde(rename = "mg")]
    Milligrams,
    #[serde(rename = "mL")]
    Milliliters,
    #[serde(rename = "J")]
    Joules,
}

impl DoseUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Milligrams => "mg",
            Self::Milliliters => "mL",
            Self::Joules => "J",
        }
    }
}

/// Drugs in the protocol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Drug {
    Adenosine,
    Amiodarone,
    Procainamide,
    Epinephrine,
    Midazolam,
    Ketamine,
    NormalSalineBolus,
}

/// Fixed protocol record for one drug.
#[derive(Debug, Clone, Copy)]
pub struct DrugProtocol {
    pub name: &'static str,
    pub per_kg: f64,
    pub max_dose: f64,
    pub unit: DoseUnit,
    /// `(per-kg multiplier, max)` used for the repeat dose.
    pub second_dose: Option<(f64, f64)>,
    pub routes: &'static [Route],
    pub notes: &'static str,
}

const VASCULAR: &[Route] = &[Route::Iv, Route::Io];

const ADENOSINE: DrugProtocol = DrugProtocol {
    name: "Adenosine",
    per_kg: 0.1,
    max_dose: 6.0,
    unit: DoseUnit::Milligrams,
    second_dose: Some((2.0, 12.0)),
    routes: VASCULAR,
    notes: "Rapid push via the most proximal site, immediately followed by a 5-10 mL saline flush.",
};

const AMIODARONE: DrugProtocol = DrugProtocol {
    name: "Amiodarone",
    per_kg: 5.0,
    max_dose: 300.0,
    unit: DoseUnit::Milligrams,
    second_dose: None,
    routes: VASCULAR,
    notes: "Infuse over 20-60 minutes with a perfusing rhythm. Do not combine with procainamide.",
};

const PROCAINAMIDE: DrugProtocol = DrugProtocol {
    name: "Procainamide",
    per_kg: 15.0,
    max_dose: 1000.0,
    unit: DoseUnit::Milligrams,
    second_dose: None,
    routes: VASCULAR,
    notes: "Infuse over 30-60 minutes. Do not combine with amiodarone.",
};

const EPINEPHRINE: DrugProtocol = DrugProtocol {
    name: "Epinephrine",
    per_kg: 0.01,
    max_dose: 1.0,
    unit: DoseUnit::Milligrams,
    second_dose: None,
    routes: VASCULAR,
    notes: "0.1 mg/mL concentration. Repeat every 3-5 minutes during arrest.",
};

const MIDAZOLAM: DrugProtocol = DrugProtocol {
    name: "Midazolam",
    per_kg: 0.1,
    max_dose: 2.0,
    unit: DoseUnit::Milligrams,
    second_dose: None,
    routes: &[Route::Iv, Route::Io, Route::Intranasal],
    notes: "Procedural sedation before synchronized cardioversion. Watch for respiratory depression.",
};

const KETAMINE: DrugProtocol = DrugProtocol {
    name: "Ketamine",
    per_kg: 1.0,
    max_dose: 100.0,
    unit: DoseUnit::Milligrams,
    second_dose: None,
    routes: &[Route::Iv, Route::Io, Route::Im],
    notes: "Dissociative sedation; preserves airway reflexes and blood pressure.",
};

const NORMAL_SALINE_BOLUS: DrugProtocol = DrugProtocol {
    name: "Normal saline bolus",
    per_kg: 20.0,
    max_dose: 1000.0,
    unit: DoseUnit::Milliliters,
    second_dose: None,
    routes: VASCULAR,
    notes: "Isotonic crystalloid push-pull. Reassess perfusion after each bolus.",
};

impl Drug {
    pub const ALL: [Drug; 7] = [
        Drug::Adenosine,
        Drug::Amiodarone,
        Drug::Procainamide,
        Drug::Epinephrine,
        Drug::Midazolam,
        Drug::Ketamine,
        Drug::NormalSalineBolus,
    ];

    pub fn protocol(self) -> &'static DrugProtocol {
        match self {
            Self::Adenosine => &ADENOSINE,
            Self::Amiodarone => &AMIODARONE,
            Self::Procainamide => &PROCAINAMIDE,
            Self::Epinephrine => &EPINEPHRINE,
            Self::Midazolam => &MIDAZOLAM,
            Self::Ketamine => &KETAMINE,
            Self::NormalSalineBolus => &NORMAL_SALINE_BOLUS,
        }
    }

    /// Upper-snake identifier, e.g. `"ADENOSINE"`.
    pub fn id(self) -> &'static str {
        match self {
            Self::Adenosine => "ADENOSINE",
            Self::Amiodarone => "AMIODARONE",
            Self::Procainamide => "PROCAINAMIDE",
            Self::Epinephrine => "EPINEPHRINE",
            Self::Midazolam => "MIDAZOLAM",
            Self::Ketamine => "KETAMINE",
            Self::NormalSalineBolus => "NORMAL_SALINE_BOLUS",
        }
    }

    pub fn parse(id: &str) -> Option<Drug> {
        Self::ALL.into_iter().find(|d| d.id().eq_ignore_ascii_case(id.trim()))
    }
}

/// Shock delivery modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnergyKind {
    SynchronizedCardioversion,
    Defibrillation,
}

#[derive(Debug, Clone, Copy)]
pub struct EnergyProtocol {
    pub name: &'static str,
    pub initial_per_kg: f64,
    pub escalated_per_kg: f64,
    pub device_max: f64,
    pub notes: &'static str,
}

/// Largest energy the simulated defibrillator will deliver.
pub const DEVICE_MAX_JOULES: f64 = 200.0;

const SYNC_CARDIOVERSION: EnergyProtocol = EnergyProtocol {
    name: "Synchronized cardioversion",
    initial_per_kg: 0.5,
    escalated_per_kg: 2.0,
    device_max: DEVICE_MAX_JOULES,
    notes: "Sedate first. Confirm SYNC markers on each R wave before charging.",
};

const DEFIBRILLATION: EnergyProtocol = EnergyProtocol {
    name: "Defibrillation",
    initial_per_kg: 2.0,
    escalated_per_kg: 4.0,
    device_max: DEVICE_MAX_JOULES,
    notes: "Unsynchronized. Resume CPR immediately after each shock.",
};

impl EnergyKind {
    pub const ALL: [EnergyKind; 2] = [
        EnergyKind::SynchronizedCardioversion,
        EnergyKind::Defibrillation,
    ];

    pub fn protocol(self) -> &'static EnergyProtocol {
        match self {
            Self::SynchronizedCardioversion => &SYNC_CARDIOVERSION,
            Self::Defibrillation => &DEFIBRILLATION,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::SynchronizedCardioversion => "SYNC_CARDIOVERSION",
            Self::Defibrillation => "DEFIBRILLATION",
        }
    }

    pub fn parse(id: &str) -> Option<EnergyKind> {
        Self::ALL.into_iter().find(|k| k.id().eq_ignore_ascii_case(id.trim()))
    }
}

/// A computed dose (or energy) for one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseCalculation {
    pub name: String,
    /// Per-kilogram rate actually used (after any repeat-dose scaling).
    pub per_kg: f64,
    /// `min(weight * per_kg, max_dose)`, rounded.
    pub calculated_dose: f64,
    pub max_dose: f64,
    pub unit: DoseUnit,
    pub routes: Vec<Route>,
    pub notes: String,
}

fn usable_weight(weight_kg: f64) -> bool {
    weight_kg.is_finite() && weight_kg >= 0.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Weight-based dose for `drug`. Repeat dosing only changes drugs that define it.
pub fn calculate_drug_dose(
    drug: Drug,
    weight_kg: f64,
    is_second_dose: bool,
) -> Option<DoseCalculation> {
    if !usable_weight(weight_kg) {
        return None;
    }
    let p = drug.protocol();
    let (per_kg, max_dose) = match p.second_dose {
        Some((multiplier, second_max)) if is_second_dose => (p.per_kg * multiplier, second_max),
        _ => (p.per_kg, p.max_dose),
    };

    Some(DoseCalculation {
        name: p.name.to_string(),
        per_kg,
        calculated_dose: round2((weight_kg * per_kg).min(max_dose)),
        max_dose,
        unit: p.unit,
        routes: p.routes.to_vec(),
        notes: p.notes.to_string(),
    })
}

/// Shock energy for the given 1-based attempt number, rounded to whole joules.
pub fn calculate_energy(
    kind: EnergyKind,
    weight_kg: f64,
    attempt_number: u32,
) -> Option<DoseCalculation> {
    if !usable_weight(weight_kg) {
        return None;
    }
    let p = kind.protocol();
    let per_kg = if attempt_number <= 1 {
        p.initial_per_kg
    } else {
        p.escalated_per_kg
    };

    Some(DoseCalculation {
        name: p.name.to_string(),
        per_kg,
        calculated_dose: (weight_kg * per_kg).min(p.device_max).round(),
        max_dose: p.device_max,
        unit: DoseUnit::Joules,
        routes: Vec::new(),
        notes: p.notes.to_string(),
    })
}

/// What an intervention is dosed against, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DosingReference {
    Drug(Drug),
    Energy(EnergyKind),
}

impl InterventionType {
    pub fn dosing_reference(self) -> Option<DosingReference> {
        use InterventionType::*;
        match self {
            Adenosine => Some(DosingReference::Drug(Drug::Adenosine)),
            Amiodarone => Some(DosingReference::Drug(Drug::Amiodarone)),
            Procainamide => Some(DosingReference::Drug(Drug::Procainamide)),
            Epinephrine => Some(DosingReference::Drug(Drug::Epinephrine)),
            Sedation => Some(DosingReference::Drug(Drug::Midazolam)),
            FluidBolus => Some(DosingReference::Drug(Drug::NormalSalineBolus)),
            SynchronizedCardioversion => {
                Some(DosingReference::Energy(EnergyKind::SynchronizedCardioversion))
            }
            Defibrillation => Some(DosingReference::Energy(EnergyKind::Defibrillation)),
            VagalManeuver | EstablishIv | EstablishIo | Oxygen | PositionOptimization => None,
        }
    }
}

/// Protocol-correct dose for `intervention`, `sequence` being the 1-based dose/attempt number.
pub fn reference_dose(
    intervention: InterventionType,
    weight_kg: f64,
    sequence: u32,
) -> Option<DoseCalculation> {
    match intervention.dosing_reference()? {
        DosingReference::Drug(drug) => calculate_drug_dose(drug, weight_kg, sequence >= 2),
        DosingReference::Energy(kind) => calculate_energy(kind, weight_kg, sequence),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseFeedback {
    /// Within ±10% of the protocol dose.
    Correct,
    /// Within ±20%.
    Acceptable,
    Underdosed,
    Overdosed,
}

/// Given dose compared with the protocol dose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseAccuracy {
    /// `given / correct`; 0 when the correct dose is 0.
    pub accuracy: f64,
    pub correct_dose: f64,
    pub feedback: DoseFeedback,
    pub message: String,
}

impl DoseAccuracy {
    fn neutral() -> Self {
        Self {
            accuracy: 1.0,
            correct_dose: 0.0,
            feedback: DoseFeedback::Correct,
            message: "No weight-based dose applies".to_string(),
        }
    }
}

/// Compare `given_dose` against the protocol dose for this patient.
///
/// Interventions without a weight-based reference return a neutral
/// `accuracy = 1, correct_dose = 0` result.
pub fn evaluate_dose_accuracy(
    intervention: InterventionType,
    given_dose: f64,
    weight_kg: f64,
    sequence: u32,
) -> DoseAccuracy {
    let Some(reference) = reference_dose(intervention, weight_kg, sequence) else {
        return DoseAccuracy::neutral();
    };
    let correct = reference.calculated_dose;
    let unit = reference.unit.symbol();
    let accuracy = if correct == 0.0 {
        0.0
    } else {
        given_dose / correct
    };

    let deviation = (accuracy - 1.0).abs();
    let (feedback, message) = if deviation <= 0.10 {
        (
            DoseFeedback::Correct,
            format!("Correct dose: {} {}", given_dose, unit),
        )
    } else if deviation <= 0.20 {
        (
            DoseFeedback::Acceptable,
            format!(
                "Acceptable: {} {} (protocol {} {})",
                given_dose, unit, correct, unit
            ),
        )
    } else if accuracy < 1.0 {
        (
            DoseFeedback::Underdosed,
            format!(
                "Underdosed: gave {} {}, protocol dose is {} {}",
                given_dose, unit, correct, unit
            ),
        )
    } else {
        (
            DoseFeedback::Overdosed,
            format!(
                "Overdosed: gave {} {}, protocol dose is {} {}",
                given_dose, unit, correct, unit
            ),
        )
    };

    DoseAccuracy {
        accuracy,
        correct_dose: correct,
        feedback,
        message,
    }
}
