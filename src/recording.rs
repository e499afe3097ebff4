//! Raw tri-axial recordings
//!
//! Loading device files is left to callers; this module only holds the
//! decoded samples and reads the plain `timestamp_ms,x,y,z` text format used
//! by the command line tool.

use std::io::BufRead;

use crate::error::{PipelineError, Result};
use crate::types::Signal;

/// Header of the raw sample format
pub const RAW_CSV_HEADER: &str = "timestamp_ms,x,y,z";

/// Timestamped x, y, z acceleration samples (g)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecording {
    timestamps_ms: Vec<i64>,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl RawRecording {
    pub fn new(timestamps_ms: Vec<i64>, x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Result<Self> {
        let n = timestamps_ms.len();
        if x.len() != n || y.len() != n || z.len() != n {
            return Err(PipelineError::Shape(format!(
                "{} timestamps but axis lengths {}, {}, {}",
                n,
                x.len(),
                y.len(),
                z.len()
            )));
        }
        Ok(Self {
            timestamps_ms,
            x,
            y,
            z,
        })
    }

    /// Parse `timestamp_ms,x,y,z` lines; the header line is optional
    pub fn from_csv<R: BufRead>(reader: R) -> Result<Self> {
        let mut recording = Self::default();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || (i == 0 && line.starts_with("timestamp")) {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return Err(PipelineError::Parse(format!(
                    "line {}: expected 4 fields ({}), got {}",
                    i + 1,
                    RAW_CSV_HEADER,
                    fields.len()
                )));
            }

            let float = |field: &str, axis: &str| {
                field.parse::<f64>().map_err(|e| {
                    PipelineError::Parse(format!("line {}: invalid {} value {:?}: {}", i + 1, axis, field, e))
                })
            };
            recording.timestamps_ms.push(fields[0].parse::<i64>().map_err(|e| {
                PipelineError::Parse(format!("line {}: invalid timestamp {:?}: {}", i + 1, fields[0], e))
            })?);
            recording.x.push(float(fields[1], "x")?);
            recording.y.push(float(fields[2], "y")?);
            recording.z.push(float(fields[3], "z")?);
        }
        Ok(recording)
    }

    pub fn len(&self) -> usize {
        self.timestamps_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_ms.is_empty()
    }

    pub fn timestamps_ms(&self) -> &[i64] {
        &self.timestamps_ms
    }

    /// The three axes as pipeline input channels
    pub fn channels(&self) -> Vec<Signal> {
        vec![
            Signal::channel(self.x.clone()),
            Signal::channel(self.y.clone()),
            Signal::channel(self.z.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_header() {
        let csv = "timestamp_ms,x,y,z\n0,0.1,0.2,1.0\n10, -0.1 ,0.0,0.98\n\n";
        let recording = RawRecording::from_csv(csv.as_bytes()).unwrap();
        assert_eq!(recording.len(), 2);
        assert_eq!(recording.timestamps_ms(), &[0, 10]);
        assert_eq!(recording.channels()[0], Signal::channel(vec![0.1, -0.1]));
    }

    #[test]
    fn test_parse_without_header() {
        let recording = RawRecording::from_csv("5,0,0,1\n".as_bytes()).unwrap();
        assert_eq!(recording.timestamps_ms(), &[5]);
    }

    #[test]
    fn test_bad_field_reports_line() {
        let err = RawRecording::from_csv("timestamp_ms,x,y,z\n0,a,0,1\n".as_bytes()).unwrap_err();
        match err {
            PipelineError::Parse(message) => assert!(message.starts_with("line 2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_field_count() {
        assert!(RawRecording::from_csv("0,1,2\n".as_bytes()).is_err());
    }

    #[test]
    fn test_axis_lengths_must_match() {
        let err = RawRecording::new(vec![0, 1], vec![0.0], vec![0.0, 0.0], vec![0.0, 0.0]).unwrap_err();
        assert!(err.is_shape());
    }
}
