//! Lenient field access for comma-separated protocol lines
//!
//! A malformed number decodes to zero instead of rejecting the line. Every
//! fallback is recorded in a [`DecodeQuality`] so callers that care can tell
//! a real zero from a corrupt field.

use std::str::FromStr;

/// Field separator on the wire
pub const FIELD_SEPARATOR: char = ',';

/// Which fields of a decoded line fell back to their default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeQuality {
    fallbacks: Vec<&'static str>,
}

impl DecodeQuality {
    /// True when every numeric field parsed as sent
    pub fn is_clean(&self) -> bool {
        self.fallbacks.is_empty()
    }

    /// Names of the fields that decoded to their fallback value
    pub fn fallback_fields(&self) -> &[&'static str] {
        &self.fallbacks
    }

    fn record(&mut self, field: &'static str) {
        self.fallbacks.push(field);
    }
}

/// Split fields of one line with lenient typed accessors
pub(crate) struct Fields<'a> {
    parts: Vec<&'a str>,
    quality: DecodeQuality,
}

impl<'a> Fields<'a> {
    pub(crate) fn split(line: &'a str) -> Self {
        Self {
            parts: line.split(FIELD_SEPARATOR).map(str::trim).collect(),
            quality: DecodeQuality::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.parts.len()
    }

    /// Raw text at `index`, empty when absent
    pub(crate) fn text(&self, index: usize) -> &'a str {
        self.parts.get(index).copied().unwrap_or_default()
    }

    /// Integer at `index`, zero when absent or malformed
    pub(crate) fn int<T>(&mut self, index: usize, name: &'static str) -> T
    where
        T: FromStr + Default,
    {
        match self.text(index).parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                self.quality.record(name);
                T::default()
            }
        }
    }

    /// Finite float at `index`, zero when absent, malformed, NaN or infinite
    pub(crate) fn float(&mut self, index: usize, name: &'static str) -> f64 {
        match self.text(index).parse::<f64>() {
            Ok(value) if value.is_finite() => value,
            _ => {
                self.quality.record(name);
                0.0
            }
        }
    }

    /// `1`/`0` style flag; any non-zero integer is true, malformed is false
    pub(crate) fn flag(&mut self, index: usize, name: &'static str) -> bool {
        self.int::<i64>(index, name) != 0
    }

    pub(crate) fn into_quality(self) -> DecodeQuality {
        self.quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_numbers_fall_back_to_zero() {
        let mut fields = Fields::split("EV,abc,12,1e400");
        assert_eq!(fields.int::<i64>(1, "start"), 0);
        assert_eq!(fields.int::<i64>(2, "duration"), 12);
        assert_eq!(fields.float(3, "g"), 0.0);

        let quality = fields.into_quality();
        assert!(!quality.is_clean());
        assert_eq!(quality.fallback_fields(), &["start", "g"]);
    }

    #[test]
    fn test_fields_are_trimmed() {
        let mut fields = Fields::split("CAL, 0.25 ");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.float(1, "vibration_g"), 0.25);
        assert!(fields.into_quality().is_clean());
    }

    #[test]
    fn test_missing_field_is_empty_text() {
        let fields = Fields::split("SYNC");
        assert_eq!(fields.text(3), "");
    }
}
