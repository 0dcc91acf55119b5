//! Numeric conversion forms: linear, rational, tabular and the MDF 3
//! legacy polynomial / exponential / logarithmic shapes.

use meval::{eval_str_with_context, Context};

use crate::blocks::conversion::base::ConversionBlock;
use crate::error::MdfError;
use crate::parsing::decoder::DecodedValue;

/// Attempts to extract a numeric value from a [`DecodedValue`].
pub fn extract_numeric(value: &DecodedValue) -> Option<f64> {
    match value {
        DecodedValue::Float(n) => Some(*n),
        DecodedValue::UnsignedInteger(n) => Some(*n as f64),
        DecodedValue::SignedInteger(n) => Some(*n as f64),
        _ => None,
    }
}

/// Apply a linear conversion `y = a + b·x`.
pub fn apply_linear(block: &ConversionBlock, value: DecodedValue) -> Result<DecodedValue, MdfError> {
    if let Some(raw) = extract_numeric(&value) {
        if block.cc_val.len() >= 2 {
            Ok(DecodedValue::Float(block.cc_val[0] + block.cc_val[1] * raw))
        } else {
            Ok(DecodedValue::Float(raw))
        }
    } else {
        Ok(value)
    }
}

/// Apply a second-degree rational conversion. A zero denominator yields NaN.
pub fn apply_rational(
    block: &ConversionBlock,
    value: DecodedValue,
) -> Result<DecodedValue, MdfError> {
    if let Some(raw) = extract_numeric(&value) {
        if block.cc_val.len() >= 6 {
            let v = &block.cc_val;
            let num = v[0] * raw * raw + v[1] * raw + v[2];
            let den = v[3] * raw * raw + v[4] * raw + v[5];
            if den == 0.0 {
                return Err(MdfError::DivideByZero);
            }
            Ok(DecodedValue::Float(num / den))
        } else {
            Ok(DecodedValue::Float(raw))
        }
    } else {
        Ok(value)
    }
}

/// Apply an algebraic conversion using the stored formula text.
pub fn apply_algebraic(
    block: &ConversionBlock,
    value: DecodedValue,
) -> Result<DecodedValue, MdfError> {
    if let (Some(raw), Some(expr_str)) = (extract_numeric(&value), block.formula.as_ref()) {
        let mut ctx = Context::new();
        ctx.var("X", raw);
        ctx.var("x", raw);
        match eval_str_with_context(expr_str, ctx) {
            Ok(res) => Ok(DecodedValue::Float(res)),
            Err(_) => Err(MdfError::DomainError("algebraic formula")),
        }
    } else {
        Ok(value)
    }
}

/// Interpolated table lookup. Keys are sorted ascending; inputs outside the
/// key range clamp to the first/last value.
pub fn apply_table_interp(
    block: &ConversionBlock,
    value: DecodedValue,
) -> Result<DecodedValue, MdfError> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    let v = &block.cc_val;
    if v.len() < 4 || v.len() % 2 != 0 {
        return Ok(DecodedValue::Float(raw));
    }
    let n = v.len() / 2;
    let key = |i: usize| v[2 * i];
    let val = |i: usize| v[2 * i + 1];

    if raw <= key(0) {
        return Ok(DecodedValue::Float(val(0)));
    }
    if raw >= key(n - 1) {
        return Ok(DecodedValue::Float(val(n - 1)));
    }

    // Binary search for the segment containing raw.
    let (mut lo, mut hi) = (0usize, n - 1);
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if key(mid) <= raw {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let (k0, v0) = (key(lo), val(lo));
    let (k1, v1) = (key(hi), val(hi));
    if k1 == k0 {
        return Ok(DecodedValue::Float(v0));
    }
    let t = (raw - k0) / (k1 - k0);
    Ok(DecodedValue::Float(v0 + t * (v1 - v0)))
}

/// Exact table lookup; inputs with no matching key yield NaN.
pub fn apply_table(block: &ConversionBlock, value: DecodedValue) -> Result<DecodedValue, MdfError> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    let v = &block.cc_val;
    if v.len() < 2 || v.len() % 2 != 0 {
        return Ok(DecodedValue::Float(f64::NAN));
    }
    for pair in v.chunks_exact(2) {
        if pair[0] == raw {
            return Ok(DecodedValue::Float(pair[1]));
        }
    }
    Ok(DecodedValue::Float(f64::NAN))
}

/// Range lookup over `[min, max, value]` triples with a trailing default.
pub fn apply_range_lookup(
    block: &ConversionBlock,
    value: DecodedValue,
) -> Result<DecodedValue, MdfError> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    let inclusive_upper = matches!(
        value,
        DecodedValue::UnsignedInteger(_) | DecodedValue::SignedInteger(_)
    );
    let v = &block.cc_val;
    if v.len() < 4 || (v.len() - 1) % 3 != 0 {
        return Ok(DecodedValue::Float(raw));
    }
    let n = (v.len() - 1) / 3;
    for i in 0..n {
        let key_min = v[3 * i];
        let key_max = v[3 * i + 1];
        let phys = v[3 * i + 2];
        let hit = if inclusive_upper {
            raw >= key_min && raw <= key_max
        } else {
            raw >= key_min && raw < key_max
        };
        if hit {
            return Ok(DecodedValue::Float(phys));
        }
    }
    Ok(DecodedValue::Float(v[3 * n]))
}

/// MDF 3 legacy polynomial: `y = (P2 − P4·u) / (P3·u − P1)` with
/// `u = x − P5 − P6`.
pub fn apply_polynomial(
    block: &ConversionBlock,
    value: DecodedValue,
) -> Result<DecodedValue, MdfError> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    if block.cc_val.len() < 6 {
        return Ok(DecodedValue::Float(raw));
    }
    let p = &block.cc_val;
    let u = raw - p[4] - p[5];
    let den = p[2] * u - p[0];
    if den == 0.0 {
        return Err(MdfError::DivideByZero);
    }
    Ok(DecodedValue::Float((p[1] - p[3] * u) / den))
}

/// MDF 3 legacy exponential, seven parameters.
pub fn apply_exponential(
    block: &ConversionBlock,
    value: DecodedValue,
) -> Result<DecodedValue, MdfError> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    if block.cc_val.len() < 7 {
        return Ok(DecodedValue::Float(raw));
    }
    let p = &block.cc_val;
    let y = if p[3] == 0.0 {
        if p[0] == 0.0 || p[1] == 0.0 {
            return Err(MdfError::DivideByZero);
        }
        (((raw - p[6]) * p[5] - p[2]) / p[0]).ln() / p[1]
    } else if p[0] == 0.0 {
        if p[3] == 0.0 || p[4] == 0.0 || raw == p[6] {
            return Err(MdfError::DivideByZero);
        }
        ((p[2] / (raw - p[6]) - p[5]) / p[3]).ln() / p[4]
    } else {
        return Err(MdfError::DomainError("exponential parameter layout"));
    };
    if y.is_nan() {
        return Err(MdfError::DomainError("log of non-positive value"));
    }
    Ok(DecodedValue::Float(y))
}

/// MDF 3 legacy logarithmic, seven parameters.
pub fn apply_logarithmic(
    block: &ConversionBlock,
    value: DecodedValue,
) -> Result<DecodedValue, MdfError> {
    let raw = match extract_numeric(&value) {
        Some(x) => x,
        None => return Ok(value),
    };
    if block.cc_val.len() < 7 {
        return Ok(DecodedValue::Float(raw));
    }
    let p = &block.cc_val;
    let y = if p[3] == 0.0 {
        if p[0] == 0.0 || p[1] == 0.0 {
            return Err(MdfError::DivideByZero);
        }
        (((raw - p[6]) * p[5] - p[2]) / p[0]).exp() / p[1]
    } else if p[0] == 0.0 {
        if p[3] == 0.0 || p[4] == 0.0 || raw == p[6] {
            return Err(MdfError::DivideByZero);
        }
        ((p[2] / (raw - p[6]) - p[5]) / p[3]).exp() / p[4]
    } else {
        return Err(MdfError::DomainError("logarithmic parameter layout"));
    };
    Ok(DecodedValue::Float(y))
}
