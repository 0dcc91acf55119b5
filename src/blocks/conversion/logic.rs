//! Conversion dispatch: map a decoded raw value to its engineering value.

use log::warn;

use crate::blocks::conversion::base::ConversionBlock;
use crate::blocks::conversion::bitfield::apply_bitfield_text;
use crate::blocks::conversion::linear::{
    apply_algebraic, apply_exponential, apply_linear, apply_logarithmic, apply_polynomial,
    apply_range_lookup, apply_rational, apply_table, apply_table_interp,
};
use crate::blocks::conversion::text::{
    apply_range_to_text, apply_text_to_text, apply_text_to_value, apply_value_to_text,
};
use crate::blocks::conversion::types::ConversionType;
use crate::error::MdfError;
use crate::parsing::decoder::DecodedValue;

/// Maximum nesting of text/scale conversion chains.
pub const MAX_CHAIN_DEPTH: usize = 16;

impl ConversionBlock {
    /// Apply this conversion to a decoded channel value.
    ///
    /// Numeric conversion errors (division by zero, domain errors, chains
    /// deeper than [`MAX_CHAIN_DEPTH`]) are non-fatal: they produce NaN for
    /// numeric results and an empty string for text results, as the reader
    /// observers expect. I/O and parse failures still propagate.
    pub fn apply_decoded(
        &self,
        value: DecodedValue,
        file_data: &[u8],
    ) -> Result<DecodedValue, MdfError> {
        match self.apply_decoded_depth(value, file_data, 0) {
            Ok(result) => Ok(result),
            Err(
                err @ (MdfError::DivideByZero
                | MdfError::DomainError(_)
                | MdfError::ConversionChainTooDeep { .. }
                | MdfError::ConversionChainCycle { .. }),
            ) => {
                warn!("conversion degraded to NaN: {}", err);
                Ok(self.degraded_value())
            }
            Err(err) => Err(err),
        }
    }

    /// NaN or empty text, depending on what this conversion produces.
    fn degraded_value(&self) -> DecodedValue {
        match self.cc_type {
            ConversionType::ValueToText
            | ConversionType::RangeToText
            | ConversionType::TextToText
            | ConversionType::BitfieldText => DecodedValue::String(String::new()),
            _ => DecodedValue::Float(f64::NAN),
        }
    }

    /// Depth-carrying dispatch used for nested table entries.
    pub(crate) fn apply_decoded_depth(
        &self,
        value: DecodedValue,
        file_data: &[u8],
        depth: usize,
    ) -> Result<DecodedValue, MdfError> {
        if depth >= MAX_CHAIN_DEPTH {
            return Err(MdfError::ConversionChainTooDeep {
                max_depth: MAX_CHAIN_DEPTH,
            });
        }

        match self.cc_type {
            ConversionType::Identity | ConversionType::NoConversion => Ok(value),
            ConversionType::Linear => apply_linear(self, value),
            ConversionType::Rational => apply_rational(self, value),
            ConversionType::Algebraic => apply_algebraic(self, value),
            ConversionType::TableLookupInterp => apply_table_interp(self, value),
            ConversionType::TableLookupNoInterp => apply_table(self, value),
            ConversionType::RangeLookup => apply_range_lookup(self, value),
            ConversionType::Polynomial => apply_polynomial(self, value),
            ConversionType::Exponential => apply_exponential(self, value),
            ConversionType::Logarithmic => apply_logarithmic(self, value),
            ConversionType::ValueToText => apply_value_to_text(self, value, file_data, depth),
            ConversionType::RangeToText => apply_range_to_text(self, value, file_data, depth),
            ConversionType::TextToValue => apply_text_to_value(self, value, file_data),
            ConversionType::TextToText => apply_text_to_text(self, value, file_data),
            ConversionType::BitfieldText => apply_bitfield_text(self, value, file_data, depth),
            // Date/time conversions describe the record layout, not a value
            // mapping; the decoder already produced the timestamp.
            ConversionType::DateConversion | ConversionType::TimeConversion => Ok(value),
            ConversionType::Unknown(_) => Ok(value),
        }
    }
}
