use std::collections::HashMap;

use tracing::{info, warn};

use super::segmenter::Segmenter;
use crate::types::Frame;

/// Most frequent row count among non-empty windows. Ties go to the length
/// seen first.
pub fn modal_length(windows: &[Frame]) -> Option<usize> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    let mut order = Vec::new();
    for window in windows.iter().filter(|w| !w.is_empty()) {
        let count = counts.entry(window.len()).or_insert(0);
        if *count == 0 {
            order.push(window.len());
        }
        *count += 1;
    }

    let mut best: Option<(usize, usize)> = None;
    for length in order {
        let count = counts[&length];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((length, count));
        }
    }
    best.map(|(length, _)| length)
}

/// Re-slices the joined, scaled table into windows of the derived length.
#[derive(Debug, Clone, Copy)]
pub struct Rebatcher {
    derived_length: usize,
}

impl Rebatcher {
    pub fn new(derived_length: usize) -> Self {
        Self { derived_length }
    }

    /// Derives the window length from the augmented windows.
    pub fn from_windows(windows: &[Frame]) -> Option<Self> {
        let derived_length = modal_length(windows)?;
        let matching = windows.iter().filter(|w| w.len() == derived_length).count();
        info!(
            "Derived sequence length {} ({} of {} windows match)",
            derived_length,
            matching,
            windows.len()
        );
        let odd = windows.iter().filter(|w| !w.is_empty() && w.len() != derived_length).count();
        if odd > 0 {
            warn!("{} windows do not have the derived length {} and yield no samples", odd, derived_length);
        }
        Some(Self::new(derived_length))
    }

    pub fn derived_length(&self) -> usize {
        self.derived_length
    }

    /// Joined windows break contiguity at every boundary (the timestamp
    /// jumps back or forward), so each one becomes its own run and only the
    /// windows already of the derived length come back out.
    pub fn rebatch(&self, joined: &Frame) -> Vec<Frame> {
        Segmenter::new(self.derived_length).segment(joined)
    }
}
