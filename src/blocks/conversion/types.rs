/// Semantic conversion type shared by the MDF 3 and MDF 4 flavors.
///
/// MDF 4 stores codes 0..11 in the CC block; MDF 3 uses a different
/// numbering (and keeps the legacy polynomial/exponential/logarithmic and
/// date/time forms that MDF 4 dropped). Both map onto this one enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionType {
    /// 1:1 pass-through.
    Identity,
    /// `y = a + b·x`
    Linear,
    /// Second-degree rational, six parameters.
    Rational,
    /// MCD-2 MC text formula over `X`.
    Algebraic,
    /// Key/value table, linear interpolation between breakpoints.
    TableLookupInterp,
    /// Key/value table, nearest neighbor.
    TableLookupNoInterp,
    /// Range triples `[min, max, value]` with trailing default.
    RangeLookup,
    /// Exact value to text/scale table.
    ValueToText,
    /// Half-open range to text/scale table.
    RangeToText,
    TextToValue,
    TextToText,
    /// Bitmask table joining sub-conversion texts with `|`.
    BitfieldText,
    /// MDF 3 legacy six-parameter rational polynomial.
    Polynomial,
    /// MDF 3 legacy seven-parameter exponential.
    Exponential,
    /// MDF 3 legacy seven-parameter logarithmic.
    Logarithmic,
    /// MDF 3 date field (7-byte CANopen layout in the record).
    DateConversion,
    /// MDF 3 time field (6-byte CANopen layout in the record).
    TimeConversion,
    /// MDF 3 explicit "no conversion" (0xFFFF).
    NoConversion,
    Unknown(u16),
}

impl ConversionType {
    /// Decode the MDF 4 CC type byte.
    pub fn from_v4_u8(value: u8) -> Self {
        match value {
            0 => ConversionType::Identity,
            1 => ConversionType::Linear,
            2 => ConversionType::Rational,
            3 => ConversionType::Algebraic,
            4 => ConversionType::TableLookupInterp,
            5 => ConversionType::TableLookupNoInterp,
            6 => ConversionType::RangeLookup,
            7 => ConversionType::ValueToText,
            8 => ConversionType::RangeToText,
            9 => ConversionType::TextToValue,
            10 => ConversionType::TextToText,
            11 => ConversionType::BitfieldText,
            other => ConversionType::Unknown(other as u16),
        }
    }

    pub fn to_v4_u8(&self) -> u8 {
        match self {
            ConversionType::Identity | ConversionType::NoConversion => 0,
            ConversionType::Linear => 1,
            ConversionType::Rational => 2,
            ConversionType::Algebraic => 3,
            ConversionType::TableLookupInterp => 4,
            ConversionType::TableLookupNoInterp => 5,
            ConversionType::RangeLookup => 6,
            ConversionType::ValueToText => 7,
            ConversionType::RangeToText => 8,
            ConversionType::TextToValue => 9,
            ConversionType::TextToText => 10,
            ConversionType::BitfieldText => 11,
            // Legacy forms have no v4 encoding; identity is the safe fallback.
            ConversionType::Polynomial
            | ConversionType::Exponential
            | ConversionType::Logarithmic
            | ConversionType::DateConversion
            | ConversionType::TimeConversion => 0,
            ConversionType::Unknown(raw) => *raw as u8,
        }
    }

    /// Decode the MDF 3 CC type word.
    pub fn from_v3_u16(value: u16) -> Self {
        match value {
            0 => ConversionType::Linear,
            1 => ConversionType::TableLookupInterp,
            2 => ConversionType::TableLookupNoInterp,
            6 => ConversionType::Polynomial,
            7 => ConversionType::Exponential,
            8 => ConversionType::Logarithmic,
            9 => ConversionType::Rational,
            10 => ConversionType::Algebraic,
            11 => ConversionType::ValueToText,
            12 => ConversionType::RangeToText,
            132 => ConversionType::DateConversion,
            133 => ConversionType::TimeConversion,
            0xFFFF => ConversionType::NoConversion,
            other => ConversionType::Unknown(other),
        }
    }

    pub fn to_v3_u16(&self) -> u16 {
        match self {
            ConversionType::Linear => 0,
            ConversionType::TableLookupInterp => 1,
            ConversionType::TableLookupNoInterp => 2,
            ConversionType::Polynomial => 6,
            ConversionType::Exponential => 7,
            ConversionType::Logarithmic => 8,
            ConversionType::Rational => 9,
            ConversionType::Algebraic => 10,
            ConversionType::ValueToText => 11,
            ConversionType::RangeToText => 12,
            ConversionType::DateConversion => 132,
            ConversionType::TimeConversion => 133,
            _ => 0xFFFF,
        }
    }
}
