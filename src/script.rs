//! Consultation script extraction
//!
//! Validates the completion service's answer against the fixed two-group,
//! ten-field checklist. Required keys are checked strictly, anything extra is
//! ignored, and every problem ends up in [`ExtractionResult::Failure`] with the
//! raw text kept for inspection.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Group of things the patient has to tell the doctor
pub const PATIENT_GROUP: &str = "patient_must_tell";
/// Group of things the patient has to hear from the doctor
pub const DOCTOR_GROUP: &str = "doctor_must_tell";

pub const PATIENT_KEYS: [&str; 5] = [
    "symptom_location",
    "symptom_timing",
    "symptom_severity",
    "current_medication",
    "allergy_info",
];

pub const DOCTOR_KEYS: [&str; 5] = [
    "diagnosis_info",
    "prescription_info",
    "side_effects",
    "followup_plan",
    "emergency_plan",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientMustTell {
    pub symptom_location: String,
    pub symptom_timing: String,
    pub symptom_severity: String,
    pub current_medication: String,
    pub allergy_info: String,
}

impl PatientMustTell {
    /// Fields in checklist order, keyed by their wire names
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            (PATIENT_KEYS[0], &self.symptom_location),
            (PATIENT_KEYS[1], &self.symptom_timing),
            (PATIENT_KEYS[2], &self.symptom_severity),
            (PATIENT_KEYS[3], &self.current_medication),
            (PATIENT_KEYS[4], &self.allergy_info),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorMustTell {
    pub diagnosis_info: String,
    pub prescription_info: String,
    pub side_effects: String,
    pub followup_plan: String,
    pub emergency_plan: String,
}

impl DoctorMustTell {
    /// Fields in checklist order, keyed by their wire names
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            (DOCTOR_KEYS[0], &self.diagnosis_info),
            (DOCTOR_KEYS[1], &self.prescription_info),
            (DOCTOR_KEYS[2], &self.side_effects),
            (DOCTOR_KEYS[3], &self.followup_plan),
            (DOCTOR_KEYS[4], &self.emergency_plan),
        ]
    }
}

/// The ten-field consultation checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFields {
    pub patient_must_tell: PatientMustTell,
    pub doctor_must_tell: DoctorMustTell,
}

/// Why an extraction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Not a JSON object of the expected shape
    Malformed,
    /// Well-formed, but one or more required keys are absent
    MissingFields,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Malformed => write!(f, "malformed"),
            FailureKind::MissingFields => write!(f, "missing fields"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub kind: FailureKind,
    pub reason: String,
    /// The service's answer, verbatim
    pub raw_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    Success(ScriptFields),
    Failure(ExtractionFailure),
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success(_))
    }

    pub fn script(&self) -> Option<&ScriptFields> {
        match self {
            ExtractionResult::Success(fields) => Some(fields),
            ExtractionResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ExtractionFailure> {
        match self {
            ExtractionResult::Success(_) => None,
            ExtractionResult::Failure(failure) => Some(failure),
        }
    }
}

/// Turn `symptom_location` into `Symptom Location`
pub fn field_title(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop one surrounding Markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    match body.split_once('\n') {
        // First line is the language tag (possibly empty)
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

/// Parse the completion service's answer into a consultation script.
///
/// Never panics and never returns an error: every problem is reported as
/// [`ExtractionResult::Failure`].
pub fn extract(raw_text: &str) -> ExtractionResult {
    let fail = |kind: FailureKind, reason: String| {
        ExtractionResult::Failure(ExtractionFailure {
            kind,
            reason,
            raw_text: raw_text.to_string(),
        })
    };

    let root: Value = match serde_json::from_str(strip_code_fence(raw_text)) {
        Ok(value) => value,
        Err(e) => {
            return fail(
                FailureKind::Malformed,
                format!("response is not valid JSON: {}", e),
            )
        }
    };
    let Some(root_map) = root.as_object() else {
        return fail(
            FailureKind::Malformed,
            "expected a JSON object at the top level".to_string(),
        );
    };

    let mut missing = Vec::new();
    for (group, keys) in [(PATIENT_GROUP, PATIENT_KEYS), (DOCTOR_GROUP, DOCTOR_KEYS)] {
        let entries = match root_map.get(group) {
            None => {
                missing.extend(keys.iter().map(|key| format!("{}.{}", group, key)));
                continue;
            }
            Some(Value::Object(entries)) => entries,
            Some(_) => {
                return fail(
                    FailureKind::Malformed,
                    format!("`{}` must be a JSON object", group),
                )
            }
        };
        for key in keys {
            match entries.get(key) {
                None => missing.push(format!("{}.{}", group, key)),
                Some(Value::String(_)) => {}
                Some(_) => {
                    return fail(
                        FailureKind::Malformed,
                        format!("`{}.{}` must be a string", group, key),
                    )
                }
            }
        }
    }

    if !missing.is_empty() {
        return fail(
            FailureKind::MissingFields,
            format!("missing required fields: {}", missing.join(", ")),
        );
    }

    match serde_json::from_value::<ScriptFields>(root) {
        Ok(fields) => ExtractionResult::Success(fields),
        Err(e) => fail(FailureKind::Malformed, format!("unexpected script shape: {}", e)),
    }
}
