//! Gate tallies and the resource-count record reported by every backend.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-gate tally of a Clifford+T circuit.
///
/// The field set mirrors what the native cost tool prints: `cx`, `t`,
/// `tdg`, `s`, `sdg`, `x`, `z`. `h` and `other` are only filled when the
/// tally comes from a circuit description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCounts {
    pub cx: u64,
    pub t: u64,
    pub tdg: u64,
    pub s: u64,
    pub sdg: u64,
    pub x: u64,
    pub z: u64,
    #[serde(default)]
    pub h: u64,
    #[serde(default)]
    pub other: u64,
}

impl GateCounts {
    /// Record one application of the named gate.
    pub fn record(&mut self, name: &str) {
        self.record_n(name, 1);
    }

    /// Record `n` applications of the named gate.
    pub fn record_n(&mut self, name: &str, n: u64) {
        let slot = match name.to_ascii_lowercase().as_str() {
            "cx" | "cnot" => &mut self.cx,
            "t" => &mut self.t,
            "tdg" => &mut self.tdg,
            "s" => &mut self.s,
            "sdg" => &mut self.sdg,
            "x" => &mut self.x,
            "z" => &mut self.z,
            "h" => &mut self.h,
            _ => &mut self.other,
        };
        *slot += n;
    }

    /// T-count: T and T† both count.
    pub fn t_count(&self) -> u64 {
        self.t + self.tdg
    }

    /// S and S† together.
    pub fn s_family(&self) -> u64 {
        self.s + self.sdg
    }

    /// All Clifford-family gates.
    pub fn clifford_count(&self) -> u64 {
        self.cx + self.s_family() + self.x + self.z + self.h
    }

    /// Every gate application.
    pub fn total(&self) -> u64 {
        self.t_count() + self.clifford_count() + self.other
    }

    /// Collapse into a [`ResourceCounts`] record.
    pub fn to_resource_counts(&self, qubits: u32) -> ResourceCounts {
        ResourceCounts {
            t: self.t_count(),
            clifford: self.clifford_count(),
            cx: Some(self.cx),
            s: Some(self.s_family()),
            x: Some(self.x),
            z: Some(self.z),
            rotations: Some(self.other),
            total_gates: self.total(),
            qubits,
            phase_bits: None,
        }
    }
}

/// Resource estimate for one (state, eps) pair.
///
/// Breakdown fields are `None` when the backend does not report them;
/// `Some(0)` is a real zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    /// T-gate (or T-equivalent) count.
    pub t: u64,
    /// Clifford-family gate count.
    pub clifford: u64,
    /// CNOT count.
    pub cx: Option<u64>,
    /// S and S† count.
    pub s: Option<u64>,
    /// X count.
    pub x: Option<u64>,
    /// Z count.
    pub z: Option<u64>,
    /// Residual non-Clifford rotations.
    pub rotations: Option<u64>,
    /// Total gate count.
    pub total_gates: u64,
    /// Qubits used, ancillas included.
    pub qubits: u32,
    /// Phase-register width for rotation-based synthesis.
    pub phase_bits: Option<u32>,
}

impl ResourceCounts {
    /// Value of a metric, `None` if this backend does not report it.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::T => Some(self.t as f64),
            Metric::Clifford => Some(self.clifford as f64),
            Metric::Cx => self.cx.map(|v| v as f64),
            Metric::S => self.s.map(|v| v as f64),
            Metric::X => self.x.map(|v| v as f64),
            Metric::Z => self.z.map(|v| v as f64),
            Metric::Rotations => self.rotations.map(|v| v as f64),
            Metric::Gates => Some(self.total_gates as f64),
            Metric::Qubits => Some(f64::from(self.qubits)),
            Metric::PhaseBits => self.phase_bits.map(f64::from),
        }
    }
}

/// Numeric fields of [`ResourceCounts`], in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    T,
    Clifford,
    Cx,
    S,
    X,
    Z,
    Rotations,
    Gates,
    Qubits,
    PhaseBits,
}

impl Metric {
    /// Every metric, in column order.
    pub const ALL: [Metric; 10] = [
        Metric::T,
        Metric::Clifford,
        Metric::Cx,
        Metric::S,
        Metric::X,
        Metric::Z,
        Metric::Rotations,
        Metric::Gates,
        Metric::Qubits,
        Metric::PhaseBits,
    ];

    /// Column suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::T => "t",
            Metric::Clifford => "clifford",
            Metric::Cx => "cx",
            Metric::S => "s",
            Metric::X => "x",
            Metric::Z => "z",
            Metric::Rotations => "rotations",
            Metric::Gates => "gates",
            Metric::Qubits => "qubits",
            Metric::PhaseBits => "phase_bits",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_t_and_tdg_collapse() {
        let mut c = GateCounts::default();
        for g in ["t", "tdg", "T", "cx", "s", "sdg", "h", "ry"] {
            c.record(g);
        }
        assert_eq!(c.t_count(), 3);
        assert_eq!(c.s_family(), 2);
        assert_eq!(c.clifford_count(), 4);
        assert_eq!(c.other, 1);
        assert_eq!(c.total(), 8);
    }

    #[test]
    fn test_to_resource_counts() {
        let c = GateCounts {
            cx: 4,
            t: 3,
            tdg: 2,
            s: 1,
            sdg: 1,
            x: 2,
            z: 0,
            h: 0,
            other: 0,
        };
        let r = c.to_resource_counts(3);
        assert_eq!(r.t, 5);
        assert_eq!(r.clifford, 8);
        assert_eq!(r.total_gates, 13);
        assert_eq!(r.get(Metric::Z), Some(0.0));
        assert_eq!(r.get(Metric::PhaseBits), None);
        assert_eq!(r.get(Metric::Qubits), Some(3.0));
    }

    #[test]
    fn test_metric_order_matches_all() {
        let mut sorted = Metric::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Metric::ALL.to_vec());
    }
}
