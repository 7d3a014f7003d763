//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Unknown keys never break a config.

use std::collections::HashSet;

use super::defaults;
use super::LampConfig;
use crate::pipeline::OverflowPolicy;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `LampConfig`.
///
/// Any new field added to `LampConfig` must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [capture]
        "capture",
        "capture.interface",
        "capture.snaplen",
        "capture.promiscuous",
        "capture.read_timeout_ms",
        // [serial]
        "serial",
        "serial.device",
        "serial.baud_rate",
        "serial.write_timeout_ms",
        // [queue]
        "queue",
        "queue.capacity",
        "queue.overflow_threshold",
        "queue.overflow_policy",
        // [pacing]
        "pacing",
        "pacing.interval_ms",
        "pacing.drain_timeout_ms",
        // [logging]
        "logging",
        "logging.level",
        "logging.format",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve alphabetically so the suggestion is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| {
            let suggestion = suggest_correction(&key, &known);
            let message = format!("Unknown config key '{key}'");
            ValidationWarning {
                field: key,
                message,
                suggestion,
            }
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed `LampConfig`.
///
/// Returns (errors, warnings). Errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_ranges(config: &LampConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let q = &config.queue;
    if q.capacity == 0 {
        errors.push("queue.capacity = 0 must be at least 1".to_string());
    }
    if q.overflow_threshold == 0 {
        errors.push(
            "queue.overflow_threshold = 0 would drop every packet (must be at least 1)".to_string(),
        );
    }
    if q.overflow_threshold > q.capacity {
        errors.push(format!(
            "queue.overflow_threshold = {} exceeds queue.capacity = {}",
            q.overflow_threshold, q.capacity
        ));
    }
    if q.capacity > defaults::QUEUE_CAPACITY_WARN {
        warnings.push(ValidationWarning {
            field: "queue.capacity".to_string(),
            message: format!(
                "queue.capacity = {} holds minutes of backlog at the paced output rate",
                q.capacity
            ),
            suggestion: None,
        });
    }
    if q.overflow_policy == OverflowPolicy::BlockProducer && q.overflow_threshold != q.capacity {
        warnings.push(ValidationWarning {
            field: "queue.overflow_threshold".to_string(),
            message: format!(
                "queue.overflow_threshold = {} is ignored by the block_producer policy",
                q.overflow_threshold
            ),
            suggestion: None,
        });
    }

    let s = &config.serial;
    if s.baud_rate == 0 {
        errors.push("serial.baud_rate = 0 must be positive".to_string());
    } else if !defaults::STANDARD_BAUD_RATES.contains(&s.baud_rate) {
        warnings.push(ValidationWarning {
            field: "serial.baud_rate".to_string(),
            message: format!("serial.baud_rate = {} is not a standard rate", s.baud_rate),
            suggestion: None,
        });
    }

    let p = &config.pacing;
    if p.interval_ms == 0 {
        errors.push("pacing.interval_ms = 0 disables pacing (must be positive)".to_string());
    } else if s.baud_rate > 0 {
        // Time to clock one 2-byte frame out of the UART at 8N1.
        let frame_ms = (2 * defaults::SERIAL_BITS_PER_BYTE * 1_000).div_ceil(u64::from(s.baud_rate));
        if p.interval_ms < frame_ms {
            warnings.push(ValidationWarning {
                field: "pacing.interval_ms".to_string(),
                message: format!(
                    "pacing.interval_ms = {} is shorter than one frame at {} baud ({} ms)",
                    p.interval_ms, s.baud_rate, frame_ms
                ),
                suggestion: None,
            });
        }
    }

    let c = &config.capture;
    if c.snaplen <= 0 {
        errors.push(format!("capture.snaplen = {} must be positive", c.snaplen));
    }
    if c.read_timeout_ms <= 0 {
        errors.push(format!(
            "capture.read_timeout_ms = {} must be positive (0 blocks forever and ignores shutdown)",
            c.read_timeout_ms
        ));
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.logging.level) {
        errors.push(format!("logging.level = {:?} is not a valid filter: {e}", config.logging.level));
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
