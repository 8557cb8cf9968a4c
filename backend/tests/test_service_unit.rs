//! Tests for the ServiceUnit state machine

use queueing_sim_core::{Distribution, ServiceUnit, SimRng, SimTime, UnitError, UnitState};

fn t(units: f64) -> SimTime {
    SimTime::from_units(units)
}

fn unit(value: f64) -> ServiceUnit {
    ServiceUnit::new(Distribution::Fixed { value })
}

#[test]
fn test_new_unit_is_idle() {
    let u = unit(3.0);
    assert_eq!(u.state(), UnitState::Idle);
    assert_eq!(u.remaining(), None);
    assert_eq!(u.stats().served(), 0);
}

#[test]
fn test_full_cycle() {
    let mut rng = SimRng::new(1);
    let mut u = unit(3.0);

    u.accept(&mut rng).unwrap();
    assert_eq!(u.state(), UnitState::Busy);
    assert_eq!(u.remaining(), Some(t(3.0)));

    assert!(!u.advance(t(1.0)).unwrap());
    assert_eq!(u.remaining(), Some(t(2.0)));

    assert!(u.advance(t(2.0)).unwrap());
    assert_eq!(u.state(), UnitState::Completed);
    assert_eq!(u.remaining(), None);
    assert_eq!(u.stats().served(), 1);

    u.rearm().unwrap();
    assert_eq!(u.state(), UnitState::Idle);
}

#[test]
fn test_accept_while_busy_or_completed_fails() {
    let mut rng = SimRng::new(1);
    let mut u = unit(1.0);
    u.accept(&mut rng).unwrap();
    assert_eq!(u.accept(&mut rng), Err(UnitError::AlreadyBusy));

    u.advance(t(1.0)).unwrap();
    assert_eq!(u.accept(&mut rng), Err(UnitError::AlreadyBusy));
}

#[test]
fn test_advance_while_idle_fails() {
    let mut u = unit(1.0);
    assert_eq!(u.advance(t(1.0)), Err(UnitError::NotBusy));
}

#[test]
fn test_over_advance_is_rejected_without_side_effects() {
    let mut rng = SimRng::new(1);
    let mut u = unit(2.0);
    u.accept(&mut rng).unwrap();
    assert_eq!(
        u.advance(t(2.5)),
        Err(UnitError::OverAdvance {
            requested: t(2.5),
            remaining: t(2.0),
        })
    );
    assert_eq!(u.remaining(), Some(t(2.0)));
    assert_eq!(u.stats().busy_time(), SimTime::ZERO);
}

#[test]
fn test_wait_idle_rejected_while_busy() {
    let mut rng = SimRng::new(1);
    let mut u = unit(2.0);
    u.accept(&mut rng).unwrap();
    assert_eq!(u.wait_idle(t(1.0)), Err(UnitError::AlreadyBusy));
    assert_eq!(u.rearm(), Err(UnitError::AlreadyBusy));
}

#[test]
fn test_draw_rounding_to_zero_is_rejected() {
    let mut rng = SimRng::new(1);
    let mut u = unit(1e-9);
    assert!(matches!(
        u.accept(&mut rng),
        Err(UnitError::NonPositiveDraw { .. })
    ));
    assert_eq!(u.state(), UnitState::Idle);
}

#[test]
fn test_utilization_counts_busy_over_total() {
    let mut rng = SimRng::new(1);
    let mut u = unit(3.0);
    u.accept(&mut rng).unwrap();
    u.advance(t(3.0)).unwrap();
    u.rearm().unwrap();
    u.wait_idle(t(1.0)).unwrap();

    assert_eq!(u.stats().busy_time(), t(3.0));
    assert_eq!(u.stats().total_time(), t(4.0));
    assert!((u.stats().utilization() - 0.75).abs() < 1e-12);

    u.clear_stats();
    assert_eq!(u.stats().utilization(), 0.0);
}
