//! Integration tests for the session: stepping, baking, failure recovery
//! and the user commands.
//!
//! Everything runs against `HostSink`, so no GPU is needed.

use std::time::Duration;

use chaos_cubes::batch::{HostBatch, HostSink};
use chaos_cubes::config::RuntimeConfig;
use chaos_cubes::geometry::{Point3, Rgb, CUBE_VERTEX_COUNT};
use chaos_cubes::iterator::{Mode, ScriptedTargets};
use chaos_cubes::session::{Command, Session};

const THRESHOLD: usize = 16;

fn tetrahedron() -> RuntimeConfig {
    RuntimeConfig::new(
        1000,
        0.5,
        1.0,
        Rgb::new(255, 128, 0),
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 1.0),
        ],
        Point3::splat(0.5),
    )
    .with_batch_threshold(THRESHOLD)
}

fn session() -> Session<HostBatch> {
    Session::with_targets(tetrahedron(), ScriptedTargets::new(vec![0, 3, 1, 2, 2, 0, 1])).unwrap()
}

fn step_n(session: &mut Session<HostBatch>, sink: &mut HostSink, n: usize) {
    let source = session.config().clone();
    for _ in 0..n {
        session.apply(Command::ManualStep, sink, &source);
    }
}

// ============================================================================
// Stepping
// ============================================================================

#[test]
fn test_halfway_scenario() {
    let config = RuntimeConfig::new(
        60,
        0.5,
        1.0,
        Rgb::WHITE,
        vec![Point3::ZERO],
        Point3::ONE,
    );
    let mut session: Session<HostBatch> = Session::new(config.clone()).unwrap();
    let mut sink = HostSink::new();

    session.apply(Command::ManualStep, &mut sink, &config);
    assert_eq!(session.current(), Point3::splat(0.5));
    assert_eq!(session.live_points(), &[Point3::ONE]);

    session.apply(Command::ManualStep, &mut sink, &config);
    assert_eq!(session.current(), Point3::splat(0.25));
    assert_eq!(session.live_points(), &[Point3::ONE, Point3::splat(0.5)]);
}

#[test]
fn test_scripted_trajectory_is_reproducible() {
    let run = || {
        let mut s = session();
        let mut sink = HostSink::new();
        step_n(&mut s, &mut sink, 10);
        s.live_points().to_vec()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_seeded_sessions_match() {
    let run = || {
        let mut s: Session<HostBatch> = Session::new(tetrahedron().with_seed(1234)).unwrap();
        let mut sink = HostSink::new();
        s.set_running(true);
        s.update(Duration::from_millis(40), &mut sink);
        (s.current(), s.baked_points(), s.live_points().to_vec())
    };
    assert_eq!(run(), run());
}

#[test]
fn test_points_stay_inside_attractor_hull() {
    let mut s: Session<HostBatch> = Session::new(tetrahedron().with_seed(5)).unwrap();
    let mut sink = HostSink::new();
    step_n(&mut s, &mut sink, 500);
    let all_inside = s
        .live_points()
        .iter()
        .all(|p| p.cmpge(Point3::ZERO).all() && p.cmple(Point3::ONE).all());
    assert!(all_inside);
}

// ============================================================================
// Baking
// ============================================================================

#[test]
fn test_threshold_plus_one_bakes_once() {
    let mut s = session();
    let mut sink = HostSink::new();

    step_n(&mut s, &mut sink, THRESHOLD);
    assert!(s.batches().is_empty());
    assert_eq!(s.live_points().len(), THRESHOLD);

    step_n(&mut s, &mut sink, 1);
    assert_eq!(s.batches().len(), 1);
    assert_eq!(s.batches()[0].len(), THRESHOLD + 1);
    assert!(s.live_points().is_empty());

    let handle = s.batches()[0].handle();
    assert_eq!(handle.vertex_count, (THRESHOLD + 1) * CUBE_VERTEX_COUNT);
    assert_eq!(
        sink.vertices(handle).map(|v| v.len()),
        Some((THRESHOLD + 1) * CUBE_VERTEX_COUNT)
    );
}

#[test]
fn test_count_invariant_over_long_run() {
    let mut s = session();
    let mut sink = HostSink::new();
    s.set_running(true);
    for _ in 0..120 {
        s.update(Duration::from_secs_f64(1.0 / 60.0), &mut sink);
        assert!(s.is_balanced());
        assert!(s.live_points().len() <= THRESHOLD);
    }
    assert!(s.iterations() > 1900);
    assert_eq!(
        s.iterations() as usize,
        s.live_points().len() + s.batches().iter().map(|b| b.len()).sum::<usize>()
    );
    assert_eq!(sink.live_batches(), s.batches().len());
}

#[test]
fn test_forced_bake_failure_pauses_and_keeps_points() {
    let mut s = session();
    let mut sink = HostSink::new();
    s.set_running(true);

    // One short of the threshold, then fail the bake that follows.
    s.update(Duration::from_millis(THRESHOLD as u64), &mut sink);
    assert_eq!(s.live_points().len(), THRESHOLD);
    sink.fail_next();

    let report = s.update(Duration::from_millis(10), &mut sink);

    assert!(report.stalled.is_some());
    assert_eq!(report.steps, 1);
    assert_eq!(report.bakes, 0);
    assert_eq!(s.mode(), Mode::Idle);
    assert_eq!(s.live_points().len(), THRESHOLD + 1);
    assert!(s.batches().is_empty());
    assert!(s.is_balanced());
}

#[test]
fn test_resume_after_failure_bakes_backlog() {
    let mut s = session();
    let mut sink = HostSink::new();
    let source = tetrahedron();

    step_n(&mut s, &mut sink, THRESHOLD);
    sink.fail_next();
    step_n(&mut s, &mut sink, 1);
    assert!(s.batches().is_empty());

    s.apply(Command::ToggleRunning, &mut sink, &source);
    s.update(Duration::from_millis(1), &mut sink);
    assert_eq!(s.batches().len(), 1);
    assert_eq!(s.batches()[0].len(), THRESHOLD + 2);
    assert!(s.is_balanced());
}

#[test]
fn test_capacity_limit_stalls_without_losing_points() {
    let mut s = session();
    // Room for fewer cubes than one batch needs.
    let mut sink = HostSink::with_capacity_limit(THRESHOLD * CUBE_VERTEX_COUNT);
    s.set_running(true);
    let report = s.update(Duration::from_millis(100), &mut sink);

    assert!(report.stalled.is_some());
    assert_eq!(report.steps, THRESHOLD as u64 + 1);
    assert!(!s.is_running());
    assert_eq!(s.live_points().len(), THRESHOLD + 1);
    assert_eq!(sink.created(), 0);
}

#[test]
fn test_step_cap_drops_backlog() {
    let mut s: Session<HostBatch> = Session::with_targets(
        tetrahedron().with_max_steps_per_frame(50),
        ScriptedTargets::new(vec![0, 1]),
    )
    .unwrap();
    let mut sink = HostSink::new();
    s.set_running(true);
    let report = s.update(Duration::from_secs(5), &mut sink);
    assert_eq!(report.steps, 50);
    let report = s.update(Duration::from_millis(10), &mut sink);
    assert_eq!(report.steps, 10);
}

// ============================================================================
// Commands
// ============================================================================

#[test]
fn test_reset_disposes_batches_and_is_idempotent() {
    let mut s = session();
    let mut sink = HostSink::new();
    let source = tetrahedron();

    s.apply(Command::ToggleSpin, &mut sink, &source);
    s.apply(Command::ToggleRunning, &mut sink, &source);
    s.update(Duration::from_millis(100), &mut sink);
    assert!(!s.batches().is_empty());
    assert!(s.angle() > 0.0);
    let created = sink.created();

    s.apply(Command::Reset, &mut sink, &source);
    assert_eq!(sink.disposed(), created);
    assert_eq!(sink.live_batches(), 0);

    let after_one = (s.iterations(), s.live_points().len(), s.batches().len(), s.current(), s.mode(), s.angle());
    s.apply(Command::Reset, &mut sink, &source);
    let after_two = (s.iterations(), s.live_points().len(), s.batches().len(), s.current(), s.mode(), s.angle());

    assert_eq!(after_one, after_two);
    assert_eq!(after_one, (0, 0, 0, Point3::splat(0.5), Mode::Idle, 0.0));
    assert_eq!(sink.disposed(), created);
    assert!(s.is_spinning());
}

#[test]
fn test_randomize_mid_run_keeps_progress() {
    let mut s = session();
    let mut sink = HostSink::new();
    let source = tetrahedron();
    s.set_running(true);
    s.update(Duration::from_millis(40), &mut sink);

    let iterations = s.iterations();
    let current = s.current();
    let live = s.live_points().to_vec();
    let batches = s.batches().len();
    let version = s.config_version();

    s.apply(Command::RandomizeAttractors, &mut sink, &source);

    assert_ne!(s.config().attractors, tetrahedron().attractors);
    assert!((3..=10).contains(&s.config().attractors.len()));
    assert_eq!(s.config_version(), version + 1);
    assert_eq!(s.iterations(), iterations);
    assert_eq!(s.current(), current);
    assert_eq!(s.live_points(), live.as_slice());
    assert_eq!(s.batches().len(), batches);
    assert!(s.is_running());
}

#[test]
fn test_reload_swaps_whole_config() {
    let mut s = session();
    let mut sink = HostSink::new();
    step_n(&mut s, &mut sink, 5);

    let mut next = tetrahedron().with_batch_threshold(2);
    next.point_color = Rgb::new(0, 0, 255);
    next.start = Point3::ZERO;
    next.attractors = vec![Point3::ONE];
    s.apply(Command::ReloadConfig, &mut sink, &next);

    assert_eq!(s.config(), &next);
    assert_eq!(s.current(), Point3::ZERO);
    assert_eq!(s.iterations(), 5);
    assert_eq!(s.meshes().point.color(), Rgb::new(0, 0, 255));

    // The new threshold applies from the next step.
    step_n(&mut s, &mut sink, 1);
    assert_eq!(s.batches().len(), 1);
    assert_eq!(s.batches()[0].len(), 6);
    assert_eq!(s.current(), Point3::splat(0.5));
}

#[test]
fn test_rejected_reload_keeps_running_config() {
    let mut s = session();
    let mut sink = HostSink::new();
    let mut bad = tetrahedron();
    bad.movement_fraction = 2.0;

    s.apply(Command::ReloadConfig, &mut sink, &bad);
    assert_eq!(s.config(), &tetrahedron());
    assert_eq!(s.config_version(), 1);
}

#[test]
fn test_manual_step_only_while_idle() {
    let mut s = session();
    let mut sink = HostSink::new();
    let source = tetrahedron();

    s.apply(Command::ManualStep, &mut sink, &source);
    s.apply(Command::ToggleRunning, &mut sink, &source);
    s.apply(Command::ManualStep, &mut sink, &source);
    assert_eq!(s.iterations(), 1);

    s.apply(Command::ToggleRunning, &mut sink, &source);
    s.apply(Command::ManualStep, &mut sink, &source);
    assert_eq!(s.iterations(), 2);
}
