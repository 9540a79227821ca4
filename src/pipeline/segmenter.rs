use tracing::debug;

use crate::types::Frame;

/// Spacing between consecutive rows of a contiguous run.
pub const STEP_SECONDS: i64 = 60;

/// Cuts a minute-indexed frame into fixed-length windows of strictly
/// consecutive minutes.
///
/// A new run starts at the first row and at every row whose gap to the
/// previous row is not exactly one minute (including zero and negative gaps,
/// which occur in joined frames). Every run yields all of its overlapping
/// windows `run[i..i + L]`; runs shorter than `L` yield nothing.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    sequence_length: usize,
}

impl Segmenter {
    pub fn new(sequence_length: usize) -> Self {
        Self { sequence_length }
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// `[start, end)` row ranges of the contiguous runs.
    pub fn runs(&self, frame: &Frame) -> Vec<(usize, usize)> {
        let mut runs = Vec::new();
        if frame.is_empty() {
            return runs;
        }
        let mut start = 0;
        for i in 1..frame.len() {
            if frame.gap_seconds(i) != Some(STEP_SECONDS) {
                runs.push((start, i));
                start = i;
            }
        }
        runs.push((start, frame.len()));
        runs
    }

    pub fn segment(&self, frame: &Frame) -> Vec<Frame> {
        let length = self.sequence_length;
        if length == 0 {
            return Vec::new();
        }

        let runs = self.runs(frame);
        let mut windows = Vec::new();
        let mut rejected = 0usize;
        for &(start, end) in &runs {
            if end - start < length {
                continue;
            }
            for offset in start..=end - length {
                let window = frame.slice_rows(offset, offset + length);
                if is_contiguous(&window) {
                    windows.push(window);
                } else {
                    rejected += 1;
                }
            }
        }

        debug!(
            "Segmented {} rows into {} runs and {} windows of {} rows ({} rejected)",
            frame.len(),
            runs.len(),
            windows.len(),
            length,
            rejected
        );
        windows
    }
}

/// True when every internal gap of the frame is exactly one minute.
pub fn is_contiguous(frame: &Frame) -> bool {
    (1..frame.len()).all(|i| frame.gap_seconds(i) == Some(STEP_SECONDS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::frame::tests::frame_at;

    fn ramp(offsets: &[i64]) -> Frame {
        let values: Vec<f64> = (0..offsets.len()).map(|i| i as f64).collect();
        frame_at(offsets, &values)
    }

    #[test]
    fn test_single_run_overlapping_windows() {
        let frame = ramp(&[0, 1, 2, 3, 4]);
        let windows = Segmenter::new(3).segment(&frame);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].column("price").unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(windows.iter().all(is_contiguous));
    }

    #[test]
    fn test_gap_splits_runs() {
        // Runs [0..4) and [10..13)
        let frame = ramp(&[0, 1, 2, 3, 10, 11, 12]);
        let segmenter = Segmenter::new(3);
        assert_eq!(segmenter.runs(&frame), vec![(0, 4), (4, 7)]);
        let windows = segmenter.segment(&frame);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].column("price").unwrap().to_vec(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_ten_rows_length_six() {
        let offsets: Vec<i64> = (0..10).collect();
        let windows = Segmenter::new(6).segment(&ramp(&offsets));
        assert_eq!(windows.len(), 5);
        for (i, w) in windows.iter().enumerate() {
            let expected: Vec<f64> = (i..i + 6).map(|r| r as f64).collect();
            assert_eq!(w.column("price").unwrap().to_vec(), expected);
        }
    }

    #[test]
    fn test_two_minute_gap_never_spanned() {
        // Row 5 sits two minutes after row 4
        let offsets: Vec<i64> = (0..5).chain(6..12).collect();
        let frame = ramp(&offsets);
        let segmenter = Segmenter::new(3);
        assert_eq!(segmenter.runs(&frame), vec![(0, 5), (5, 11)]);

        let windows = segmenter.segment(&frame);
        assert_eq!(windows.len(), 3 + 4);
        for w in &windows {
            let rows = w.column("price").unwrap().to_vec();
            assert!(rows.iter().all(|&r| r < 5.0) || rows.iter().all(|&r| r >= 5.0), "{:?}", rows);
        }
    }

    #[test]
    fn test_short_runs_yield_nothing() {
        let frame = ramp(&[0, 1, 5, 6, 9]);
        assert!(Segmenter::new(3).segment(&frame).is_empty());
    }

    #[test]
    fn test_window_equal_to_run() {
        let frame = ramp(&[0, 1, 2]);
        assert_eq!(Segmenter::new(3).segment(&frame).len(), 1);
        assert!(Segmenter::new(4).segment(&frame).is_empty());
    }

    #[test]
    fn test_backwards_jump_starts_new_run() {
        // Two joined blocks, each its own run
        let frame = ramp(&[0, 1, 2, 0, 1, 2]);
        let windows = Segmenter::new(3).segment(&frame);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].column("price").unwrap().to_vec(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_empty_frame() {
        let frame = ramp(&[]);
        assert!(Segmenter::new(2).segment(&frame).is_empty());
        assert!(Segmenter::new(2).runs(&frame).is_empty());
    }
}
