use super::{ChecksumKind, ProtocolProfile};

#[test]
fn checksum_algorithms() {
    let data = [0x09, 0x4D, 0x01, 0x02, 0x83];
    // 0x09 + 0x4D + 0x01 + 0x02 + 0x83 = 0xDC
    assert_eq!(ChecksumKind::Sum8.compute(&data), 0xDC);
    assert_eq!(ChecksumKind::Sum7F.compute(&data), 0xDC & 0x7F);
    assert_eq!(ChecksumKind::Xor8.compute(&data), 0x09 ^ 0x4D ^ 0x01 ^ 0x02 ^ 0x83);
    assert_eq!(ChecksumKind::Sum8.compute(&[]), 0);
}

#[test]
fn sum8_wraps() {
    assert_eq!(ChecksumKind::Sum8.compute(&[0xFF, 0x02]), 0x01);
}

#[test]
fn sum7f_masks_the_high_bit() {
    // the mn bus reserves the high bit for address bytes
    assert_eq!(ChecksumKind::Sum7F.compute(&[0x80]), 0);
    assert_eq!(ChecksumKind::Sum7F.compute(&[0x7F, 0x01]), 0);
}

#[test]
fn unit_scale_conversion() {
    let profile = ProtocolProfile {
        counts_per_unit: 200.0,
        ..ProtocolProfile::mn_series()
    };
    assert_eq!(profile.units_to_counts(2.5), 500);
    assert_eq!(profile.counts_to_units(500), 2.5);
    // rounds to the nearest count
    assert_eq!(profile.units_to_counts(0.0024), 0);
    assert_eq!(profile.units_to_counts(0.0026), 1);
}

#[test]
fn mn_series_defaults() {
    let profile = ProtocolProfile::mn_series();
    assert_eq!(profile.start_marker, 0x02);
    assert_eq!(profile.terminator, 0x03);
    assert_eq!(profile.position_max, (1 << 23) - 1);
    assert_eq!(profile.position_min, -(1 << 23));
    // a slave checksum error (7) and an empty packet (15) prove the request
    // never executed
    assert_eq!(profile.resend_reasons, &[7u8, 15][..]);
}
