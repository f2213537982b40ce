//! Polynomial calibration curves.

use crate::{Error, Result, Value};

/// `y = c0 + c1*x + c2*x^2 + ...` over the raw value.
#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialConversion {
    coefficients: Vec<f64>,
}

impl PolynomialConversion {
    /// # Errors
    /// [`Error::Conversion`] when no coefficients are given.
    pub fn new(coefficients: Vec<f64>) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(Error::Conversion(
                "polynomial requires at least one coefficient".to_string(),
            ));
        }
        Ok(Self { coefficients })
    }

    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub(crate) fn call(&self, value: &Value) -> Result<Value> {
        let x = value
            .as_f64()
            .ok_or_else(|| Error::Conversion(format!("cannot evaluate polynomial of {}", value.kind())))?;
        Ok(Value::Float(horner(&self.coefficients, x)))
    }
}

fn horner(coefficients: &[f64], x: f64) -> f64 {
    let mut acc = 0.0;
    for &c in coefficients.iter().rev() {
        acc = acc * x + c;
    }
    acc
}

/// A piecewise polynomial: each segment applies from its lower bound up to
/// the next segment's lower bound.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedPolynomialConversion {
    /// Sorted by descending lower bound so lookup scans to the first
    /// applicable segment.
    segments: Vec<(f64, Vec<f64>)>,
}

impl SegmentedPolynomialConversion {
    /// # Errors
    /// [`Error::Conversion`] when no segments are given or a segment has no
    /// coefficients.
    pub fn new(mut segments: Vec<(f64, Vec<f64>)>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::Conversion(
                "segmented polynomial requires at least one segment".to_string(),
            ));
        }
        if segments.iter().any(|(_, c)| c.is_empty()) {
            return Err(Error::Conversion(
                "every segment requires at least one coefficient".to_string(),
            ));
        }
        segments.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[(f64, Vec<f64>)] {
        &self.segments
    }

    pub(crate) fn call(&self, value: &Value) -> Result<Value> {
        let x = value
            .as_f64()
            .ok_or_else(|| Error::Conversion(format!("cannot evaluate polynomial of {}", value.kind())))?;
        let coefficients = self
            .segments
            .iter()
            .find(|(lower, _)| x >= *lower)
            .map_or_else(
                // Below every segment: fall back to the lowest one
                || &self.segments[self.segments.len() - 1].1,
                |(_, c)| c,
            );
        Ok(Value::Float(horner(coefficients, x)))
    }
}
