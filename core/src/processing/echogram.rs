use ndarray::{Array2, ArrayView1, ShapeError};
use std::io::{self, Write};

use crate::processing::range::RangeProfile;

/// Range-profile magnitudes of successive bursts, one row per burst.
#[derive(Debug, Clone)]
pub struct Echogram {
    rows: Array2<f32>,
    bin_spacing_m: f64,
}

impl Echogram {
    pub fn new(bins: usize, bin_spacing_m: f64) -> Self {
        Self {
            rows: Array2::zeros((0, bins)),
            bin_spacing_m,
        }
    }

    /// Starts an echogram sized after the first profile.
    pub fn from_profile(profile: &RangeProfile) -> Result<Self, ShapeError> {
        let mut echogram = Self::new(profile.bins.len(), profile.bin_spacing_m);
        echogram.push(profile)?;
        Ok(echogram)
    }

    pub fn push(&mut self, profile: &RangeProfile) -> Result<(), ShapeError> {
        let magnitudes = profile.magnitudes();
        self.rows.push_row(ArrayView1::from(&magnitudes))
    }

    pub fn bursts(&self) -> usize {
        self.rows.nrows()
    }

    pub fn bins(&self) -> usize {
        self.rows.ncols()
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.rows
    }

    /// Writes one header line of ranges in metres, then one line per burst.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        let header: Vec<String> = (0..self.bins())
            .map(|bin| format!("{:.3}", bin as f64 * self.bin_spacing_m))
            .collect();
        writeln!(out, "{}", header.join(","))?;
        for row in self.rows.rows() {
            let line: Vec<String> = row.iter().map(|value| format!("{value:.6e}")).collect();
            writeln!(out, "{}", line.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    fn profile(values: &[f32]) -> RangeProfile {
        RangeProfile {
            bins: values.iter().map(|&v| Complex32::new(v, 0.0)).collect(),
            bin_spacing_m: 0.5,
        }
    }

    #[test]
    fn rows_stack_per_burst() {
        let mut echogram = Echogram::from_profile(&profile(&[1.0, 2.0, 3.0])).unwrap();
        echogram.push(&profile(&[4.0, -5.0, 6.0])).unwrap();
        assert_eq!(echogram.bursts(), 2);
        assert_eq!(echogram.bins(), 3);
        assert_eq!(echogram.data()[[1, 1]], 5.0);
    }

    #[test]
    fn mismatched_width_is_rejected() {
        let mut echogram = Echogram::new(3, 0.5);
        assert!(echogram.push(&profile(&[1.0, 2.0])).is_err());
        assert_eq!(echogram.bursts(), 0);
    }

    #[test]
    fn csv_has_header_and_one_line_per_burst() {
        let echogram = Echogram::from_profile(&profile(&[1.0, 2.0])).unwrap();
        let mut out = Vec::new();
        echogram.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "0.000,0.500");
    }
}
