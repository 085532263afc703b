use crate::sim::SimTime;

#[test]
fn sim_time_unit_conversions() {
    assert_eq!(SimTime::from_micros(1), SimTime(1_000));
    assert_eq!(SimTime::from_millis(1), SimTime(1_000_000));
    assert_eq!(SimTime::from_secs(1), SimTime(1_000_000_000));
    assert_eq!(SimTime::from_secs(15).as_millis(), 15_000);
}

#[test]
fn sim_time_arithmetic_saturates() {
    assert_eq!(SimTime::from_millis(u64::MAX), SimTime(u64::MAX));
    assert_eq!(SimTime(u64::MAX).saturating_add(SimTime(1)), SimTime(u64::MAX));
    assert_eq!(SimTime(3).saturating_sub(SimTime(5)), SimTime::ZERO);
}

#[test]
fn sim_time_displays_milliseconds_with_micro_fraction() {
    assert_eq!(SimTime::from_micros(4_500_250).to_string(), "4500.250ms");
    assert_eq!(SimTime::ZERO.to_string(), "0.000ms");
}
