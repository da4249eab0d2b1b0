use std::{fmt, sync::LazyLock};

use regex::Regex;

/// Accepted phrasings of the cycle counter, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    GlobalClockCycles,
    GlobalClock,
    TotalExecutionCycles,
    Cycles,
}

impl Tier {
    pub const ALL: [Tier; 4] = [
        Tier::GlobalClockCycles,
        Tier::GlobalClock,
        Tier::TotalExecutionCycles,
        Tier::Cycles,
    ];

    fn pattern(self) -> &'static str {
        match self {
            Tier::GlobalClockCycles => r"Global Clock:\s*(\d+)\s+cycles",
            Tier::GlobalClock => r"Global Clock:\s*(\d+)",
            Tier::TotalExecutionCycles => r"Total Execution Cycles:\s*(\d+)",
            Tier::Cycles => r"Cycles:\s*(\d+)",
        }
    }
}

static MATCHERS: LazyLock<Vec<(Tier, Regex)>> = LazyLock::new(|| {
    Tier::ALL
        .into_iter()
        .map(|tier| (tier, Regex::new(tier.pattern()).expect("valid regex")))
        .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
    Combined,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
            Stream::Combined => write!(f, "combined output"),
        }
    }
}

/// Outcome of searching simulator output for the cycle counter. A legitimate
/// zero is `Found { cycles: 0, .. }`, never `Unresolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleCount {
    Found { cycles: u64, tier: Tier, stream: Stream },
    Unresolved,
}

impl CycleCount {
    pub fn cycles(&self) -> Option<u64> {
        match self {
            CycleCount::Found { cycles, .. } => Some(*cycles),
            CycleCount::Unresolved => None,
        }
    }

    /// Values of 0 or 1 are not plausible for a finished run.
    pub fn is_degenerate(&self) -> bool {
        !matches!(self.cycles(), Some(c) if c > 1)
    }
}

/// First tier that matches anywhere in `text`, first occurrence within it.
pub fn extract(text: &str, stream: Stream) -> CycleCount {
    for (tier, re) in MATCHERS.iter() {
        // Digit runs too long for u64 fall through to the next tier.
        let hit = re
            .captures(text)
            .and_then(|c| c[1].parse::<u64>().ok());
        if let Some(cycles) = hit {
            tracing::debug!("Found {tier:?} match in {stream}: {cycles}");
            return CycleCount::Found {
                cycles,
                tier: *tier,
                stream,
            };
        }
    }
    report_unresolved(text, stream);
    CycleCount::Unresolved
}

/// Searches stdout, then stderr.
pub fn extract_from(stdout: &str, stderr: &str) -> CycleCount {
    match extract(stdout, Stream::Stdout) {
        CycleCount::Unresolved => {
            tracing::warn!("Could not parse cycles from stdout, trying stderr");
            extract(stderr, Stream::Stderr)
        }
        found => found,
    }
}

fn report_unresolved(text: &str, stream: Stream) {
    if text.is_empty() {
        return;
    }
    tracing::warn!(
        "No cycle count found in {stream}.\n--- First 200 chars ---\n{}\n--- Last 500 chars ---\n{}",
        head(text, 200),
        tail(text, 500)
    );
}

pub fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
