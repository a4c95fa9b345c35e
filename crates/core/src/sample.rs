//! One normalized physiological reading.
//!
//! A [`Sample`] is always fully defined: every field absent from the
//! incoming record resolves to its documented default (`0` / `0.0` /
//! `false`). Those defaults take part in threshold comparisons like any
//! other value, so a record that omits `BloodOxygen` satisfies an
//! at-most oxygen rule.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::SampleParseError;
use crate::field_names::{
    FIELD_BLOOD_OXYGEN, FIELD_BODY_TEMP, FIELD_BP_HIGH, FIELD_BP_LOW, FIELD_BREATH_RATE,
    FIELD_CIRCULATION, FIELD_FATIGUE, FIELD_GSR, FIELD_HEART_RATE, FIELD_HRV_RMSSD,
    FIELD_HRV_SDNN, FIELD_RR_INTERVAL,
};

/// A single sensor reading.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Sample {
    /// Beats per minute.
    #[serde(rename = "HeartRate", deserialize_with = "lenient_int")]
    pub heart_rate: i64,
    /// Degrees Celsius.
    #[serde(rename = "BodyTemp", deserialize_with = "lenient_real")]
    pub body_temp: f64,
    /// Galvanic skin response, raw sensor units.
    #[serde(rename = "GSR", deserialize_with = "lenient_int")]
    pub gsr: i64,
    /// SpO2 percentage.
    #[serde(rename = "BloodOxygen", deserialize_with = "lenient_int")]
    pub blood_oxygen: i64,
    #[serde(rename = "Fatigue", deserialize_with = "lenient_int")]
    pub fatigue: i64,
    /// Breaths per minute.
    #[serde(rename = "BreathRate", deserialize_with = "lenient_int")]
    pub breath_rate: i64,
    /// Systolic pressure, mmHg.
    #[serde(rename = "BP_High", deserialize_with = "lenient_int")]
    pub bp_high: i64,
    /// Diastolic pressure, mmHg.
    #[serde(rename = "BP_Low", deserialize_with = "lenient_int")]
    pub bp_low: i64,
    /// Milliseconds.
    #[serde(rename = "HRV_SDNN", deserialize_with = "lenient_int")]
    pub hrv_sdnn: i64,
    /// Milliseconds.
    #[serde(rename = "HRV_RMSSD", deserialize_with = "lenient_int")]
    pub hrv_rmssd: i64,
    /// Milliseconds.
    #[serde(rename = "RRInterval", deserialize_with = "lenient_int")]
    pub rr_interval: i64,
    #[serde(rename = "Circulation", deserialize_with = "lenient_int")]
    pub circulation: i64,
    /// The sensor's own emotion flag. Informational only.
    #[serde(rename = "EmotionDetected", deserialize_with = "lenient_flag")]
    pub emotion_detected: bool,
}

/// The numeric sample fields a threshold rule may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleField {
    HeartRate,
    BodyTemp,
    Gsr,
    BloodOxygen,
    Fatigue,
    BreathRate,
    BpHigh,
    BpLow,
    HrvSdnn,
    HrvRmssd,
    RrInterval,
    Circulation,
}

impl SampleField {
    pub const ALL: [SampleField; 12] = [
        Self::HeartRate,
        Self::BodyTemp,
        Self::Gsr,
        Self::BloodOxygen,
        Self::Fatigue,
        Self::BreathRate,
        Self::BpHigh,
        Self::BpLow,
        Self::HrvSdnn,
        Self::HrvRmssd,
        Self::RrInterval,
        Self::Circulation,
    ];

    /// Resolve a record key (e.g. `"HeartRate"`) to a field.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    /// The record key for this field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HeartRate => FIELD_HEART_RATE,
            Self::BodyTemp => FIELD_BODY_TEMP,
            Self::Gsr => FIELD_GSR,
            Self::BloodOxygen => FIELD_BLOOD_OXYGEN,
            Self::Fatigue => FIELD_FATIGUE,
            Self::BreathRate => FIELD_BREATH_RATE,
            Self::BpHigh => FIELD_BP_HIGH,
            Self::BpLow => FIELD_BP_LOW,
            Self::HrvSdnn => FIELD_HRV_SDNN,
            Self::HrvRmssd => FIELD_HRV_RMSSD,
            Self::RrInterval => FIELD_RR_INTERVAL,
            Self::Circulation => FIELD_CIRCULATION,
        }
    }
}

impl Sample {
    /// Parse one line of sensor output.
    ///
    /// The line must hold a single JSON object. Unknown keys are
    /// ignored; missing keys take their defaults.
    pub fn from_json_line(line: &str) -> Result<Self, SampleParseError> {
        let record: Map<String, Value> =
            serde_json::from_str(line.trim()).map_err(SampleParseError::Malformed)?;
        Self::deserialize(Value::Object(record)).map_err(SampleParseError::InvalidField)
    }

    /// Numeric value of `field`, widened to `f64` for comparison.
    pub fn value(&self, field: SampleField) -> f64 {
        match field {
            SampleField::HeartRate => self.heart_rate as f64,
            SampleField::BodyTemp => self.body_temp,
            SampleField::Gsr => self.gsr as f64,
            SampleField::BloodOxygen => self.blood_oxygen as f64,
            SampleField::Fatigue => self.fatigue as f64,
            SampleField::BreathRate => self.breath_rate as f64,
            SampleField::BpHigh => self.bp_high as f64,
            SampleField::BpLow => self.bp_low as f64,
            SampleField::HrvSdnn => self.hrv_sdnn as f64,
            SampleField::HrvRmssd => self.hrv_rmssd as f64,
            SampleField::RrInterval => self.rr_interval as f64,
            SampleField::Circulation => self.circulation as f64,
        }
    }
}

/// Human-readable one-line summary, as shown on the monitor console.
impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HR: {}, Temp: {}, GSR: {}, O2: {}, Fatigue: {}, BR: {}, BP: {}/{}, \
             RR: {}, SDNN: {}, RMSSD: {}, Circulation: {}, AutoEmotion: {}",
            self.heart_rate,
            self.body_temp,
            self.gsr,
            self.blood_oxygen,
            self.fatigue,
            self.breath_rate,
            self.bp_high,
            self.bp_low,
            self.rr_interval,
            self.hrv_sdnn,
            self.hrv_rmssd,
            self.circulation,
            self.emotion_detected,
        )
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

/// Integers arrive as JSON integers, reals (truncated toward zero),
/// booleans, or numeric strings depending on the firmware build.
fn int_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn real_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The flag is informational, so any value it cannot be read as is `false`.
fn flag_from_value(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        _ => false,
    }
}

fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    int_from_value(&value)
        .ok_or_else(|| de::Error::custom(format!("expected an integer, got {value}")))
}

fn lenient_real<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    real_from_value(&value)
        .ok_or_else(|| de::Error::custom(format!("expected a number, got {value}")))
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Value::deserialize(deserializer).map(|value| flag_from_value(&value))
}
