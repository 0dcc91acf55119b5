use mdf_rs::blocks::conversion::{ConversionBlock, ConversionType};
use mdf_rs::blocks::text_block::TextBlock;
use mdf_rs::error::MdfError;
use mdf_rs::parsing::decoder::DecodedValue;

fn float(value: f64) -> DecodedValue {
    DecodedValue::Float(value)
}

fn expect_float(result: DecodedValue) -> f64 {
    match result {
        DecodedValue::Float(v) => v,
        other => panic!("expected float, got {:?}", other),
    }
}

fn expect_text(result: DecodedValue) -> String {
    match result {
        DecodedValue::String(s) => s,
        other => panic!("expected text, got {:?}", other),
    }
}

#[test]
fn linear_conversion() -> Result<(), MdfError> {
    let cc = ConversionBlock::linear(-40.0, 0.5);
    assert_eq!(expect_float(cc.apply_decoded(float(100.0), &[])?), 10.0);
    Ok(())
}

#[test]
fn rational_division_by_zero_degrades_to_nan() -> Result<(), MdfError> {
    // Denominator identically zero for x = 0.
    let cc = ConversionBlock::rational([0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
    assert_eq!(expect_float(cc.apply_decoded(float(2.0), &[])?), 1.0);
    assert!(expect_float(cc.apply_decoded(float(0.0), &[])?).is_nan());
    Ok(())
}

#[test]
fn algebraic_formula() -> Result<(), MdfError> {
    let cc = ConversionBlock::algebraic("2 * X + 1");
    assert_eq!(expect_float(cc.apply_decoded(float(3.0), &[])?), 7.0);
    Ok(())
}

#[test]
fn table_interp_clamps_and_interpolates() -> Result<(), MdfError> {
    let cc = ConversionBlock::table_interp(&[(0.0, 0.0), (10.0, 100.0), (20.0, 150.0)]);
    assert_eq!(expect_float(cc.apply_decoded(float(-5.0), &[])?), 0.0);
    assert_eq!(expect_float(cc.apply_decoded(float(5.0), &[])?), 50.0);
    assert_eq!(expect_float(cc.apply_decoded(float(15.0), &[])?), 125.0);
    assert_eq!(expect_float(cc.apply_decoded(float(99.0), &[])?), 150.0);
    Ok(())
}

#[test]
fn exact_table_misses_yield_nan() -> Result<(), MdfError> {
    let cc = ConversionBlock::table(&[(1.0, 10.0), (2.0, 20.0)]);
    assert_eq!(expect_float(cc.apply_decoded(float(2.0), &[])?), 20.0);
    assert!(expect_float(cc.apply_decoded(float(1.5), &[])?).is_nan());
    Ok(())
}

#[test]
fn polynomial_legacy_form() -> Result<(), MdfError> {
    // P = [1, 6, 2, 0, 1, 1]: y = (6 - 0·u) / (2·u - 1), u = x - 2.
    let mut cc = ConversionBlock::linear(0.0, 1.0);
    cc.cc_type = ConversionType::Polynomial;
    cc.cc_val = vec![1.0, 6.0, 2.0, 0.0, 1.0, 1.0];
    assert_eq!(expect_float(cc.apply_decoded(float(3.0), &[])?), 6.0);
    // u = 0.5 makes the denominator zero.
    assert!(expect_float(cc.apply_decoded(float(2.5), &[])?).is_nan());
    Ok(())
}

#[test]
fn exponential_domain_error_degrades_to_nan() -> Result<(), MdfError> {
    // P4 = 0 form: y = ln(((x - P7)·P6 - P3) / P1) / P2.
    let mut cc = ConversionBlock::linear(0.0, 1.0);
    cc.cc_type = ConversionType::Exponential;
    cc.cc_val = vec![1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let e = std::f64::consts::E;
    assert!((expect_float(cc.apply_decoded(float(e), &[])?) - 1.0).abs() < 1e-12);
    assert!(expect_float(cc.apply_decoded(float(-1.0), &[])?).is_nan());
    Ok(())
}

#[test]
fn value_range_to_text_first_match_wins() -> Result<(), MdfError> {
    let mut cc = ConversionBlock::value_range_to_text(&[(0.0, 1.0), (1.0, 5.0), (5.0, 10.0)]);
    cc.inline_texts = vec![
        String::from("low"),
        String::from("mid"),
        String::from("hi"),
        String::from("out"),
    ];

    for (input, expected) in [
        (0.0, "low"),
        (0.999, "low"),
        (1.0, "mid"),
        (5.0, "hi"),
        (9.999, "hi"),
        (10.0, "out"),
        (-0.1, "out"),
    ] {
        assert_eq!(
            expect_text(cc.apply_decoded(float(input), &[])?),
            expected,
            "input {}",
            input
        );
    }
    Ok(())
}

#[test]
fn value_to_text_through_referenced_blocks() -> Result<(), MdfError> {
    // Build a little file image holding the referenced TX blocks.
    let mut buffer = vec![0u8; 8];
    let mut refs = Vec::new();
    for text in ["off", "on", "unknown"] {
        refs.push(buffer.len() as u64);
        buffer.extend_from_slice(&TextBlock::new(text).to_bytes()?);
    }

    let mut cc = ConversionBlock::value_to_text(&[0.0, 1.0]);
    cc.cc_ref = refs;

    assert_eq!(expect_text(cc.apply_decoded(float(0.0), &buffer)?), "off");
    assert_eq!(expect_text(cc.apply_decoded(float(1.0), &buffer)?), "on");
    assert_eq!(
        expect_text(cc.apply_decoded(float(7.0), &buffer)?),
        "unknown"
    );
    Ok(())
}

#[test]
fn nested_text_chain_depth_guard() -> Result<(), MdfError> {
    // A range table whose only entry points back at itself: the chain
    // guard must cut the recursion and degrade to empty text.
    let mut cc = ConversionBlock::value_range_to_text(&[(0.0, 100.0)]);
    let self_offset = 8u64;
    let mut buffer = vec![0u8; self_offset as usize];
    cc.cc_ref = vec![self_offset, 0];
    let cc_bytes = cc.to_bytes()?;
    buffer.extend_from_slice(&cc_bytes);

    let result = cc.apply_decoded(float(1.0), &buffer)?;
    assert_eq!(result, DecodedValue::String(String::new()));
    Ok(())
}

#[test]
fn conversion_block_roundtrip() -> Result<(), MdfError> {
    use mdf_rs::blocks::common::BlockParse;

    let cc = ConversionBlock::rational([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let bytes = cc.to_bytes()?;
    let parsed = ConversionBlock::from_bytes(&bytes)?;
    assert_eq!(parsed.cc_type, ConversionType::Rational);
    assert_eq!(parsed.cc_val, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    Ok(())
}

#[test]
fn identity_detection() {
    assert!(ConversionBlock::linear(0.0, 1.0).is_identity());
    assert!(!ConversionBlock::linear(1.0, 1.0).is_identity());
}
