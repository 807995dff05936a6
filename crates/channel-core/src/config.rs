//! Injected configuration.
//!
//! The host loads and parses its own configuration files; this crate
//! only consumes the resulting values. Everything here is plain data
//! with serde derives so the host's loader can feed it directly.

use std::collections::HashMap;

use serde::Deserialize;

use crate::cause::r2::R2Country;

fn default_true() -> bool {
    true
}

/// One tone cadence: on/off times in milliseconds, optionally a second
/// on/off pair (zero means unused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CadenceTimes {
    pub ring: u32,
    pub ring_s: u32,
    #[serde(default)]
    pub ring_ext: u32,
    #[serde(default)]
    pub ring_ext_s: u32,
}

impl CadenceTimes {
    pub fn simple(on_ms: u32, off_ms: u32) -> Self {
        Self {
            ring: on_ms,
            ring_s: off_ms,
            ring_ext: 0,
            ring_ext_s: 0,
        }
    }
}

/// Well-known cadence names the engine asks for by itself.
pub mod cadence_names {
    pub const FAST_BUSY: &str = "fast-busy";
    pub const RINGBACK: &str = "ringback";
    pub const PBX_RING: &str = "pbx-ring";
    pub const CO_RING: &str = "co-ring";
    pub const VM_TONE: &str = "vm-tone";
}

/// Driver-wide options, injected by the host at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Delay before generating local ringback on trunk lines (ms).
    pub ringback_co_delay_ms: u64,
    /// Delay before generating local ringback towards the PBX side when
    /// the far end stays silent after call success (ms).
    pub ringback_pbx_delay_ms: u64,
    /// Inter-digit timeout for the assisted-transfer digit buffer (ms).
    pub transfer_digit_timeout_ms: u64,
    /// Inter-digit timeout when collecting a dialed number (R2 incoming,
    /// FXS station dialing) (ms).
    pub dial_timeout_ms: u64,
    /// Grace period between host hangup and the hardware disconnect (ms).
    pub disconnect_delay_ms: u64,
    /// Period of the GSM modem SMS poll (ms).
    pub sms_poll_interval_ms: u64,
    /// Refuse collect calls as soon as they are recognized.
    pub drop_collect_call: bool,
    /// Discard A-D "letter" digits instead of delivering them.
    pub ignore_letter_dtmfs: bool,
    /// R2: wait for the full number + end-of-number before reporting the
    /// call upward, and answer refusals with signaling codes.
    pub r2_strict_behaviour: bool,
    /// R2: delay between pre-connect and ringback status (ms).
    pub r2_preconnect_wait_ms: u64,
    /// R2 country variant for group-B signaling.
    pub r2_country: R2Country,
    /// Suppress inband DTMF while out-of-band delivery is on.
    #[serde(default = "default_true")]
    pub out_of_band_dtmfs: bool,
    /// Default audio gains, restored when a call's overrides are dropped.
    pub input_volume: i32,
    pub output_volume: i32,
    /// Digit sequence that triggers the assisted transfer. Empty
    /// disables the feature.
    pub transfer_trigger_digits: String,
    /// Named tone cadences (see [`cadence_names`]).
    pub cadences: HashMap<String, CadenceTimes>,
    /// Dialplan patterns collected digits are matched against (station
    /// dialing, R2 incoming number). A full match completes collection.
    pub dialplan: Vec<String>,
    /// Context exported with incoming calls.
    pub context: String,
}

impl Default for Options {
    fn default() -> Self {
        let mut cadences = HashMap::new();
        cadences.insert(
            cadence_names::FAST_BUSY.to_string(),
            CadenceTimes::simple(250, 250),
        );
        cadences.insert(
            cadence_names::RINGBACK.to_string(),
            CadenceTimes::simple(1000, 4000),
        );
        cadences.insert(
            cadence_names::PBX_RING.to_string(),
            CadenceTimes {
                ring: 1000,
                ring_s: 200,
                ring_ext: 1000,
                ring_ext_s: 4000,
            },
        );
        cadences.insert(
            cadence_names::CO_RING.to_string(),
            CadenceTimes::simple(1000, 4000),
        );
        cadences.insert(
            cadence_names::VM_TONE.to_string(),
            CadenceTimes::simple(450, 450),
        );

        Self {
            ringback_co_delay_ms: 1500,
            ringback_pbx_delay_ms: 1000,
            transfer_digit_timeout_ms: 500,
            dial_timeout_ms: 3500,
            disconnect_delay_ms: 0,
            sms_poll_interval_ms: 60_000,
            drop_collect_call: false,
            ignore_letter_dtmfs: true,
            r2_strict_behaviour: false,
            r2_preconnect_wait_ms: 50,
            r2_country: R2Country::Brazil,
            out_of_band_dtmfs: true,
            input_volume: 0,
            output_volume: 0,
            transfer_trigger_digits: String::new(),
            cadences,
            dialplan: Vec::new(),
            context: "default".to_string(),
        }
    }
}

impl Options {
    pub fn cadence(&self, name: &str) -> Option<CadenceTimes> {
        self.cadences.get(name).copied()
    }
}

/// How a collected digit string relates to a dialplan pattern set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtenMatch {
    /// No pattern can match, no matter what else is dialed.
    None,
    /// At least one pattern could still match with more digits.
    More,
    /// Some pattern matches the digits exactly.
    Exact,
}

/// Match collected digits against dialplan patterns. A pattern is a
/// digit string where `x`/`X` matches any single digit and a trailing
/// `.` matches one or more further digits.
pub fn match_exten(patterns: &[String], digits: &str) -> ExtenMatch {
    let mut more = false;
    for pattern in patterns {
        match match_one(pattern, digits) {
            ExtenMatch::Exact => return ExtenMatch::Exact,
            ExtenMatch::More => more = true,
            ExtenMatch::None => {}
        }
    }
    if more {
        ExtenMatch::More
    } else {
        ExtenMatch::None
    }
}

fn match_one(pattern: &str, digits: &str) -> ExtenMatch {
    let pat: Vec<char> = pattern.chars().collect();
    let mut di = digits.chars();

    for &p in &pat {
        if p == '.' {
            // one or more of anything
            return if di.next().is_some() {
                ExtenMatch::Exact
            } else {
                ExtenMatch::More
            };
        }
        let Some(d) = di.next() else {
            // ran out of digits inside the pattern
            return ExtenMatch::More;
        };
        let matched = matches!(p, 'x' | 'X') && d.is_ascii_digit() || p == d;
        if !matched {
            return ExtenMatch::None;
        }
    }

    if di.next().is_some() {
        // digits longer than the pattern
        ExtenMatch::None
    } else {
        ExtenMatch::Exact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_wellknown_cadences() {
        let opts = Options::default();
        assert!(opts.cadence(cadence_names::FAST_BUSY).is_some());
        assert!(opts.cadence(cadence_names::PBX_RING).is_some());
        assert!(opts.cadence("nonexistent").is_none());
    }

    #[test]
    fn deserializes_partial_config() {
        let opts: Options = serde_json::from_str(
            r##"{ "drop_collect_call": true, "transfer_trigger_digits": "#1" }"##,
        )
        .unwrap();
        assert!(opts.drop_collect_call);
        assert_eq!(opts.transfer_trigger_digits, "#1");
        // untouched fields keep their defaults
        assert_eq!(opts.dial_timeout_ms, 3500);
    }

    #[test]
    fn exten_matching() {
        let plan = vec!["9XXX".to_string(), "0.".to_string(), "411".to_string()];
        assert_eq!(match_exten(&plan, "411"), ExtenMatch::Exact);
        assert_eq!(match_exten(&plan, "9"), ExtenMatch::More);
        assert_eq!(match_exten(&plan, "9123"), ExtenMatch::Exact);
        assert_eq!(match_exten(&plan, "91234"), ExtenMatch::None);
        assert_eq!(match_exten(&plan, "0"), ExtenMatch::More);
        assert_eq!(match_exten(&plan, "0555"), ExtenMatch::Exact);
        assert_eq!(match_exten(&plan, "8"), ExtenMatch::None);
    }
}
