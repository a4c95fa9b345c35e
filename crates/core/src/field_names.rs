//! Well-known sensor field names and outcome labels.
//!
//! Field names are the keys the sensor firmware emits in each JSON
//! record. Rule keys in a threshold file are built from them with a
//! `_min` / `_max` suffix (e.g. `HeartRate_min`).

pub const FIELD_HEART_RATE: &str = "HeartRate";
pub const FIELD_BODY_TEMP: &str = "BodyTemp";
pub const FIELD_GSR: &str = "GSR";
pub const FIELD_BLOOD_OXYGEN: &str = "BloodOxygen";
pub const FIELD_FATIGUE: &str = "Fatigue";
pub const FIELD_BREATH_RATE: &str = "BreathRate";
pub const FIELD_BP_HIGH: &str = "BP_High";
pub const FIELD_BP_LOW: &str = "BP_Low";
pub const FIELD_HRV_SDNN: &str = "HRV_SDNN";
pub const FIELD_HRV_RMSSD: &str = "HRV_RMSSD";
pub const FIELD_RR_INTERVAL: &str = "RRInterval";
pub const FIELD_CIRCULATION: &str = "Circulation";

/// Informational flag set by the sensor's own on-board detector.
/// Carried through for display; never compared against a threshold.
pub const FIELD_EMOTION_DETECTED: &str = "EmotionDetected";

pub const LABEL_ABNORMAL: &str = "abnormal";
pub const LABEL_ANXIETY: &str = "anxiety";
pub const LABEL_ANGER: &str = "anger";
pub const LABEL_SADNESS: &str = "sadness";

/// Suffix of a rule key whose field must be at least the threshold.
pub const RULE_SUFFIX_MIN: &str = "_min";

/// Suffix of a rule key whose field must be at most the threshold.
pub const RULE_SUFFIX_MAX: &str = "_max";
