use mdf_rs::helper::{
    canopen_date_array_to_ns, canopen_time_array_to_ns, ns_to_canopen_date_array,
    ns_to_canopen_time_array,
};

#[test]
fn date_array_roundtrip_at_midnight() {
    // 2024-01-01 00:00:00 UTC hits the encoding exactly.
    let ns = 1_704_067_200_000_000_000u64;
    let array = ns_to_canopen_date_array(ns);
    assert_eq!(canopen_date_array_to_ns(&array), ns);
}

#[test]
fn date_array_roundtrip_truncates_to_milliseconds() {
    let ns = 1_700_000_000_123_456_789u64;
    let array = ns_to_canopen_date_array(ns);
    assert_eq!(canopen_date_array_to_ns(&array), 1_700_000_000_123_000_000);
}

#[test]
fn date_array_field_layout() {
    let ns = 1_700_000_000_123_456_789u64;
    let array = ns_to_canopen_date_array(ns);
    // 2023-11-14 22:13:20 UTC; 20.123 s into the minute.
    assert_eq!(u16::from_le_bytes([array[0], array[1]]), 20_123);
    assert_eq!(array[2] & 0x3F, 13);
    assert_eq!(array[3] & 0x1F, 22);
    assert_eq!(array[4] & 0x1F, 14);
    assert_eq!(array[5] & 0x3F, 11);
    assert_eq!(array[6] & 0x7F, 23);
}

#[test]
fn time_array_roundtrip() {
    let ns = 1_700_000_000_123_000_000u64;
    let array = ns_to_canopen_time_array(ns);
    assert_eq!(canopen_time_array_to_ns(&array), ns);
}

#[test]
fn time_array_field_layout() {
    // 1984-01-02 00:00:00.5 UTC: one day and 500 ms past the epoch.
    let ns = (441_763_200_000u64 + 86_400_000 + 500) * 1_000_000;
    let array = ns_to_canopen_time_array(ns);
    let ms = u32::from_le_bytes([array[0], array[1], array[2], array[3]]);
    let days = u16::from_le_bytes([array[4], array[5]]);
    assert_eq!(ms, 500);
    assert_eq!(days, 1);
}

#[test]
fn two_digit_year_pivot() {
    // Years below 70 decode into the 2000s, the rest into the 1900s.
    let recent = ns_to_canopen_date_array(1_700_000_000_000_000_000); // 2023
    assert_eq!(recent[6], 23);
    let ns = canopen_date_array_to_ns(&recent);
    let back = ns_to_canopen_date_array(ns);
    assert_eq!(back, recent);

    let old = ns_to_canopen_date_array(500_000_000_000_000_000); // 1985
    assert_eq!(old[6], 85);
    let ns = canopen_date_array_to_ns(&old);
    assert_eq!(ns_to_canopen_date_array(ns), old);
}
