//! Nurse safety gate: inspects an order before it reaches the engine.
//!
//! Each order class has an ordered [`RuleTable`]. Rules are tried top to
//! bottom and the first whose condition holds produces the
//! [`NurseEvaluation`]; if none match, the table's fallback confirms the
//! order. Refused orders must never be passed to
//! [`crate::intervention::process_intervention`].
//!
//! ```
//! use codeblue_logic::safety::{evaluate_adenosine_order, NurseAction, ReasonCode};
//!
//! let eval = evaluate_adenosine_order(1.0, 2, 18.5);
//! assert!(!eval.allowed);
//! assert_eq!(eval.action, NurseAction::Refuse);
//! assert_eq!(eval.reason, Some(ReasonCode::ThirdDose));
//! ```

use serde::{Deserialize, Serialize};

use crate::dosing::{calculate_drug_dose, calculate_energy, Drug, EnergyKind, DEVICE_MAX_JOULES};
use crate::patient::Rhythm;

/// What the nurse does with an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NurseAction {
    Confirm,
    Note,
    Question,
    Warn,
    Cap,
    Refuse,
}

/// Why the nurse intervened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    ThirdDose,
    DangerousOverdose,
    OverMax,
    HighDose,
    VeryLow,
    LowDose,
    WrongRhythm,
    NotShockable,
    NeedsDefibrillation,
    NotSedated,
    OverDeviceMax,
    DangerousEnergy,
    HighEnergy,
    UpperLimit,
    LowEnergy,
    InvalidWeight,
}

/// The gate's answer for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NurseEvaluation {
    pub allowed: bool,
    pub action: NurseAction,
    pub reason: Option<ReasonCode>,
    pub message: String,
    /// Replacement dose when the order was capped.
    pub corrected_dose: Option<f64>,
    /// The caller must get explicit confirmation before proceeding.
    pub requires_confirmation: bool,
    /// Effective dose over protocol dose.
    pub dose_ratio: f64,
    /// Success-rate multiplier the engine will apply at `dose_ratio`.
    pub expected_success: f64,
}

impl NurseEvaluation {
    fn new(allowed: bool, action: NurseAction, reason: Option<ReasonCode>, message: String) -> Self {
        Self {
            allowed,
            action,
            reason,
            message,
            corrected_dose: None,
            requires_confirmation: false,
            dose_ratio: 0.0,
            expected_success: 0.0,
        }
    }

    pub fn refuse(reason: ReasonCode, message: String) -> Self {
        Self::new(false, NurseAction::Refuse, Some(reason), message)
    }

    pub fn confirm(message: String) -> Self {
        Self::new(true, NurseAction::Confirm, None, message)
    }

    pub fn note(reason: ReasonCode, message: String) -> Self {
        Self::new(true, NurseAction::Note, Some(reason), message)
    }

    pub fn question(reason: ReasonCode, message: String) -> Self {
        Self {
            requires_confirmation: true,
            ..Self::new(true, NurseAction::Question, Some(reason), message)
        }
    }

    pub fn warn(reason: ReasonCode, message: String) -> Self {
        Self {
            requires_confirmation: true,
            ..Self::new(true, NurseAction::Warn, Some(reason), message)
        }
    }

    pub fn cap(reason: ReasonCode, corrected: f64, message: String) -> Self {
        Self {
            corrected_dose: Some(corrected),
            ..Self::new(true, NurseAction::Cap, Some(reason), message)
        }
    }

    /// Dose that will actually be given if the order proceeds.
    pub fn effective_dose(&self, ordered: f64) -> f64 {
        self.corrected_dose.unwrap_or(ordered)
    }
}

/// A single condition → verdict row.
pub struct Rule<C> {
    pub name: &'static str,
    pub applies: fn(&C) -> bool,
    pub verdict: fn(&C) -> NurseEvaluation,
}

/// Ordered rules with first-match-wins semantics.
pub struct RuleTable<C> {
    rules: Vec<Rule<C>>,
    fallback: fn(&C) -> NurseEvaluation,
}

impl<C> RuleTable<C> {
    pub fn new(fallback: fn(&C) -> NurseEvaluation) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// Append a rule at the lowest precedence.
    pub fn rule(
        mut self,
        name: &'static str,
        applies: fn(&C) -> bool,
        verdict: fn(&C) -> NurseEvaluation,
    ) -> Self {
        self.rules.push(Rule {
            name,
            applies,
            verdict,
        });
        self
    }

    /// Insert `rule` directly ahead of the rule called `before`.
    /// Appends when no such rule exists.
    pub fn insert_before(&mut self, before: &str, rule: Rule<C>) {
        let idx = self
            .rules
            .iter()
            .position(|r| r.name == before)
            .unwrap_or(self.rules.len());
        self.rules.insert(idx, rule);
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    /// Name of the first rule that fires, `None` meaning the fallback.
    pub fn matching_rule(&self, ctx: &C) -> Option<&'static str> {
        self.rules.iter().find(|r| (r.applies)(ctx)).map(|r| r.name)
    }

    pub fn evaluate(&self, ctx: &C) -> NurseEvaluation {
        match self.rules.iter().find(|r| (r.applies)(ctx)) {
            Some(rule) => (rule.verdict)(ctx),
            None => (self.fallback)(ctx),
        }
    }
}

// ── Success curves ──────────────────────────────────────────────────────

/// Success-rate multiplier for adenosine at a given dose ratio.
/// Large overdoses taper slightly.
pub fn adenosine_success_multiplier(ratio: f64) -> f64 {
    if ratio < 0.3 {
        0.10
    } else if ratio < 0.5 {
        0.30
    } else if ratio < 0.7 {
        0.55
    } else if ratio < 0.85 {
        0.80
    } else if ratio <= 1.15 {
        1.0
    } else if ratio <= 1.5 {
        0.95
    } else {
        0.85
    }
}

/// Success-rate multiplier for a shock at a given energy ratio.
/// Extra energy keeps efficacy high.
pub fn cardioversion_success_multiplier(ratio: f64) -> f64 {
    if ratio < 0.3 {
        0.05
    } else if ratio < 0.5 {
        0.35
    } else if ratio < 0.7 {
        0.65
    } else if ratio < 0.85 {
        0.85
    } else if ratio <= 2.0 {
        1.0
    } else {
        0.97
    }
}

/// Antiarrhythmics and other drugs share the adenosine curve.
pub fn drug_success_multiplier(ratio: f64) -> f64 {
    adenosine_success_multiplier(ratio)
}

fn ratio(given: f64, target: f64) -> f64 {
    if target == 0.0 {
        0.0
    } else {
        given / target
    }
}

// ── Adenosine ───────────────────────────────────────────────────────────

/// Everything the adenosine rules look at.
#[derive(Debug, Clone, Copy)]
pub struct AdenosineOrder {
    pub dose_mg: f64,
    pub prior_doses: u32,
    pub weight_kg: f64,
    /// Protocol dose for this dose number.
    pub target_mg: f64,
    pub max_mg: f64,
}

impl AdenosineOrder {
    fn mg_per_kg(&self) -> f64 {
        if self.weight_kg > 0.0 {
            self.dose_mg / self.weight_kg
        } else {
            f64::INFINITY
        }
    }

    fn is_repeat(&self) -> bool {
        self.prior_doses >= 1
    }
}

pub fn adenosine_rules() -> RuleTable<AdenosineOrder> {
    RuleTable::<AdenosineOrder>::new(|o| {
        NurseEvaluation::confirm(format!(
            "Pushing {} mg adenosine now, flush is ready.",
            o.dose_mg
        ))
    })
    .rule(
        "third_dose",
        |o| o.prior_doses >= 2,
        |_| {
            NurseEvaluation::refuse(
                ReasonCode::ThirdDose,
                "That would be a third dose of adenosine. PALS stops at two doses. \
                 Should we set up for synchronized cardioversion?"
                    .to_string(),
            )
        },
    )
    .rule(
        "dangerous_overdose",
        |o| o.dose_mg > o.max_mg * 1.5,
        |o| {
            NurseEvaluation::refuse(
                ReasonCode::DangerousOverdose,
                format!(
                    "{} mg is more than one and a half times the {} mg maximum. I can't give that.",
                    o.dose_mg, o.max_mg
                ),
            )
        },
    )
    .rule(
        "over_max",
        |o| o.dose_mg > o.max_mg,
        |o| {
            NurseEvaluation::cap(
                ReasonCode::OverMax,
                o.max_mg,
                format!(
                    "{} mg is over the {} mg maximum. I'll draw up {} mg instead.",
                    o.dose_mg, o.max_mg, o.max_mg
                ),
            )
        },
    )
    .rule(
        "high_dose",
        |o| {
            let limit = if o.is_repeat() { 0.35 } else { 0.18 };
            o.mg_per_kg() > limit
        },
        |o| {
            NurseEvaluation::warn(
                ReasonCode::HighDose,
                format!(
                    "That works out to {:.2} mg/kg, higher than usual. Do you want {} mg pushed?",
                    o.mg_per_kg(),
                    o.dose_mg
                ),
            )
        },
    )
    .rule(
        "very_low",
        |o| o.dose_mg < o.target_mg * 0.3,
        |o| {
            NurseEvaluation::question(
                ReasonCode::VeryLow,
                format!(
                    "{} mg is well under the {} mg dose for {} kg. Are you sure?",
                    o.dose_mg, o.target_mg, o.weight_kg
                ),
            )
        },
    )
    .rule(
        "low_dose",
        |o| o.dose_mg < o.target_mg * 0.7,
        |o| {
            NurseEvaluation::note(
                ReasonCode::LowDose,
                format!(
                    "Giving {} mg. Protocol dose would be {} mg.",
                    o.dose_mg, o.target_mg
                ),
            )
        },
    )
}

/// Gate an adenosine order. `prior_count` is the number of doses already given.
pub fn evaluate_adenosine_order(dose_mg: f64, prior_count: u32, weight_kg: f64) -> NurseEvaluation {
    let Some(reference) = calculate_drug_dose(Drug::Adenosine, weight_kg, prior_count >= 1) else {
        return invalid_weight(weight_kg);
    };
    let order = AdenosineOrder {
        dose_mg,
        prior_doses: prior_count,
        weight_kg,
        target_mg: reference.calculated_dose,
        max_mg: reference.max_dose,
    };

    let mut eval = adenosine_rules().evaluate(&order);
    eval.dose_ratio = ratio(eval.effective_dose(dose_mg), order.target_mg);
    eval.expected_success = adenosine_success_multiplier(eval.dose_ratio);
    log_evaluation("adenosine", &eval);
    eval
}

// ── Synchronized cardioversion ──────────────────────────────────────────

/// Everything the cardioversion rules look at.
#[derive(Debug, Clone, Copy)]
pub struct CardioversionOrder {
    pub energy_j: f64,
    pub attempt_number: u32,
    pub weight_kg: f64,
    pub rhythm: Rhythm,
    pub sedated: bool,
    pub target_j: f64,
}

impl CardioversionOrder {
    fn joules_per_kg(&self) -> f64 {
        if self.weight_kg > 0.0 {
            self.energy_j / self.weight_kg
        } else {
            f64::INFINITY
        }
    }
}

pub fn cardioversion_rules() -> RuleTable<CardioversionOrder> {
    RuleTable::<CardioversionOrder>::new(|o| {
        NurseEvaluation::confirm(format!(
            "Charging to {} J, sync is on. Everybody clear.",
            o.energy_j
        ))
    })
    .rule(
        "wrong_rhythm",
        |o| o.rhythm.is_sinus(),
        |_| {
            NurseEvaluation::refuse(
                ReasonCode::WrongRhythm,
                "The monitor shows sinus now. There's nothing to cardiovert.".to_string(),
            )
        },
    )
    .rule(
        "not_shockable",
        |o| matches!(o.rhythm, Rhythm::Asystole | Rhythm::Pea),
        |_| {
            NurseEvaluation::refuse(
                ReasonCode::NotShockable,
                "That's not a shockable rhythm. We need CPR and epinephrine.".to_string(),
            )
        },
    )
    .rule(
        "needs_defibrillation",
        |o| o.rhythm.is_defibrillatable(),
        |_| {
            NurseEvaluation::refuse(
                ReasonCode::NeedsDefibrillation,
                "That's a pulseless shockable rhythm. It needs unsynchronized defibrillation."
                    .to_string(),
            )
        },
    )
    .rule(
        "not_sedated",
        |o| !o.sedated,
        |_| {
            NurseEvaluation::refuse(
                ReasonCode::NotSedated,
                "The patient isn't sedated yet. Can we give sedation before we shock?".to_string(),
            )
        },
    )
    .rule(
        "over_device_max",
        |o| o.energy_j > DEVICE_MAX_JOULES,
        |o| {
            NurseEvaluation::refuse(
                ReasonCode::OverDeviceMax,
                format!(
                    "The defibrillator only goes up to {} J; it can't deliver {} J.",
                    DEVICE_MAX_JOULES, o.energy_j
                ),
            )
        },
    )
    .rule(
        "dangerous_energy",
        |o| o.joules_per_kg() > 4.0,
        |o| {
            NurseEvaluation::refuse(
                ReasonCode::DangerousEnergy,
                format!(
                    "{} J is {:.1} J/kg. That's above 4 J/kg and I won't deliver it.",
                    o.energy_j,
                    o.joules_per_kg()
                ),
            )
        },
    )
    .rule(
        "high_energy",
        |o| o.joules_per_kg() > 2.5,
        |o| {
            NurseEvaluation::warn(
                ReasonCode::HighEnergy,
                format!(
                    "{} J is {:.1} J/kg, higher than the usual 2 J/kg. Confirm you want that?",
                    o.energy_j,
                    o.joules_per_kg()
                ),
            )
        },
    )
    .rule(
        "upper_limit",
        |o| o.joules_per_kg() > 2.0,
        |o| {
            NurseEvaluation::note(
                ReasonCode::UpperLimit,
                format!("{} J is at the top of the range. Charging.", o.energy_j),
            )
        },
    )
    .rule(
        "very_low",
        |o| o.energy_j < o.target_j * 0.3,
        |o| {
            NurseEvaluation::question(
                ReasonCode::VeryLow,
                format!(
                    "{} J is far below the {} J for attempt {}. Are you sure?",
                    o.energy_j, o.target_j, o.attempt_number
                ),
            )
        },
    )
    .rule(
        "low_energy",
        |o| o.energy_j < o.target_j * 0.6,
        |o| {
            NurseEvaluation::note(
                ReasonCode::LowEnergy,
                format!(
                    "Charging to {} J; the protocol energy would be {} J.",
                    o.energy_j, o.target_j
                ),
            )
        },
    )
}

/// Gate a synchronized cardioversion order.
pub fn evaluate_cardioversion_order(
    energy_j: f64,
    attempt_number: u32,
    weight_kg: f64,
    rhythm: Rhythm,
    sedated: bool,
) -> NurseEvaluation {
    let Some(reference) =
        calculate_energy(EnergyKind::SynchronizedCardioversion, weight_kg, attempt_number)
    else {
        return invalid_weight(weight_kg);
    };
    let order = CardioversionOrder {
        energy_j,
        attempt_number,
        weight_kg,
        rhythm,
        sedated,
        target_j: reference.calculated_dose,
    };

    let mut eval = cardioversion_rules().evaluate(&order);
    eval.dose_ratio = ratio(eval.effective_dose(energy_j), order.target_j);
    eval.expected_success = cardioversion_success_multiplier(eval.dose_ratio);
    log_evaluation("cardioversion", &eval);
    eval
}

// ── Other protocol drugs ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct DrugOrder {
    pub drug: Drug,
    pub dose: f64,
    pub weight_kg: f64,
    pub target: f64,
    pub max: f64,
}

impl DrugOrder {
    fn unit(&self) -> &'static str {
        self.drug.protocol().unit.symbol()
    }
}

pub fn drug_rules() -> RuleTable<DrugOrder> {
    RuleTable::<DrugOrder>::new(|o| {
        NurseEvaluation::confirm(format!(
            "Giving {} {} {} now.",
            o.dose,
            o.unit(),
            o.drug.protocol().name.to_lowercase()
        ))
    })
    .rule(
        "dangerous_overdose",
        |o| o.dose > o.max * 1.5,
        |o| {
            NurseEvaluation::refuse(
                ReasonCode::DangerousOverdose,
                format!(
                    "{} {} is far past the {} {} maximum. I can't give that.",
                    o.dose,
                    o.unit(),
                    o.max,
                    o.unit()
                ),
            )
        },
    )
    .rule(
        "over_max",
        |o| o.dose > o.max,
        |o| {
            NurseEvaluation::cap(
                ReasonCode::OverMax,
                o.max,
                format!(
                    "That's over the maximum. I'll give {} {} instead.",
                    o.max,
                    o.unit()
                ),
            )
        },
    )
    .rule(
        "high_dose",
        |o| o.dose > o.target * 1.5,
        |o| {
            NurseEvaluation::warn(
                ReasonCode::HighDose,
                format!(
                    "{} {} is well above the {} {} weight-based dose. Confirm?",
                    o.dose,
                    o.unit(),
                    o.target,
                    o.unit()
                ),
            )
        },
    )
    .rule(
        "very_low",
        |o| o.dose < o.target * 0.3,
        |o| {
            NurseEvaluation::question(
                ReasonCode::VeryLow,
                format!(
                    "{} {} is far below the {} {} dose. Are you sure?",
                    o.dose,
                    o.unit(),
                    o.target,
                    o.unit()
                ),
            )
        },
    )
    .rule(
        "low_dose",
        |o| o.dose < o.target * 0.7,
        |o| {
            NurseEvaluation::note(
                ReasonCode::LowDose,
                format!(
                    "Giving {} {}; protocol dose is {} {}.",
                    o.dose,
                    o.unit(),
                    o.target,
                    o.unit()
                ),
            )
        },
    )
}

/// Gate an order for any protocol drug without a dedicated table.
pub fn evaluate_drug_order(
    drug: Drug,
    dose: f64,
    weight_kg: f64,
    is_second_dose: bool,
) -> NurseEvaluation {
    if drug == Drug::Adenosine {
        return evaluate_adenosine_order(dose, u32::from(is_second_dose), weight_kg);
    }
    let Some(reference) = calculate_drug_dose(drug, weight_kg, is_second_dose) else {
        return invalid_weight(weight_kg);
    };
    let order = DrugOrder {
        drug,
        dose,
        weight_kg,
        target: reference.calculated_dose,
        max: reference.max_dose,
    };

    let mut eval = drug_rules().evaluate(&order);
    eval.dose_ratio = ratio(eval.effective_dose(dose), order.target);
    eval.expected_success = drug_success_multiplier(eval.dose_ratio);
    log_evaluation(drug.id(), &eval);
    eval
}

fn invalid_weight(weight_kg: f64) -> NurseEvaluation {
    let eval = NurseEvaluation::refuse(
        ReasonCode::InvalidWeight,
        format!("I can't dose off a weight of {} kg. Can we get a weight?", weight_kg),
    );
    log_evaluation("weight", &eval);
    eval
}

fn log_evaluation(order: &str, eval: &NurseEvaluation) {
    if eval.allowed {
        log::debug!(
            "{} order {:?} ({:?}), ratio={:.2}",
            order,
            eval.action,
            eval.reason,
            eval.dose_ratio
        );
    } else {
        log::warn!("{} order refused: {:?}", order, eval.reason);
    }
}
