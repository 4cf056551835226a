//! Line-delimited JSON frame replay.
//!
//! One object per line:
//!
//! ```text
//! {"features": [0.51, 0.62, -0.01, ...]}   hand detected
//! {"features": null}                        no hand
//! {}                                        no hand
//! ```
//!
//! Blank lines are skipped. Feature length is validated against the
//! configured expectation, so a short record surfaces as a rejected frame.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde::Deserialize;

use crate::classifier::FeatureVector;
use crate::error::{Result, SignlineError};
use crate::frames::{Frame, FrameSource};

#[derive(Debug, Deserialize)]
struct FrameRecord {
    #[serde(default)]
    features: Option<Vec<f32>>,
}

pub struct JsonlFrameSource<R> {
    lines: Lines<R>,
    line_no: usize,
    expected_len: usize,
}

impl<R: BufRead> JsonlFrameSource<R> {
    pub fn new(reader: R, expected_len: usize) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            expected_len,
        }
    }

    fn parse_line(&self, line: &str) -> Result<Frame> {
        let record: FrameRecord =
            serde_json::from_str(line).map_err(|e| SignlineError::MalformedFrame {
                line: self.line_no,
                message: e.to_string(),
            })?;
        match record.features {
            Some(values) => Ok(Frame::Hand(FeatureVector::new(values, self.expected_len)?)),
            None => Ok(Frame::NoHand),
        }
    }
}

impl JsonlFrameSource<BufReader<File>> {
    pub fn open(path: &Path, expected_len: usize) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), expected_len))
    }
}

impl<R: BufRead + Send + 'static> FrameSource for JsonlFrameSource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line?;
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return self.parse_line(trimmed).map(Some);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(text: &str) -> JsonlFrameSource<Cursor<Vec<u8>>> {
        JsonlFrameSource::new(Cursor::new(text.as_bytes().to_vec()), 3)
    }

    #[test]
    fn parses_hands_and_empty_frames() {
        let mut src = source("{\"features\":[0.1,0.2,0.3]}\n\n{\"features\":null}\n{}\n");
        assert!(matches!(src.next_frame().unwrap(), Some(Frame::Hand(_))));
        assert_eq!(src.next_frame().unwrap(), Some(Frame::NoHand));
        assert_eq!(src.next_frame().unwrap(), Some(Frame::NoHand));
        assert_eq!(src.next_frame().unwrap(), None);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let mut src = source("{}\n\nnot json\n");
        src.next_frame().unwrap();
        match src.next_frame() {
            Err(SignlineError::MalformedFrame { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed frame, got {other:?}"),
        }
    }

    #[test]
    fn wrong_length_is_rejected_input() {
        let mut src = source("{\"features\":[0.1,0.2]}\n");
        let err = src.next_frame().unwrap_err();
        assert!(err.is_rejected_input());
    }
}
