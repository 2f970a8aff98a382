//! Integration tests for the timeline model through its public API.
//!
//! Covers the partition invariants under arbitrary edit sequences, quantity
//! sharing and forking, merging, locking, and expression dependencies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wf_core::expr::ExprError;
use wf_core::{ModelError, Timeline};

/// One line per channel: `name[start,end)=quantity` for each interval.
fn render(timeline: &Timeline) -> String {
    timeline
        .channels()
        .iter()
        .map(|channel| {
            let intervals: Vec<String> = channel
                .intervals()
                .iter()
                .map(|interval| {
                    let span = interval.span(timeline.markers()).unwrap();
                    let value = timeline.quantities().name_of(interval.value());
                    format!("{}[{},{})={}", interval.name(), span.start, span.end, value)
                })
                .collect();
            format!("{}: {}", channel.name(), intervals.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn json(timeline: &Timeline) -> String {
    serde_json::to_string(&timeline.snapshot()).unwrap()
}

fn approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

/// Inserting `mid=400` splits every channel; deleting it restores one interval.
#[test]
fn test_insert_and_delete_mid_marker() {
    let mut timeline = Timeline::with_channels(1000, &["ch1", "ch2"], 1.0).unwrap();
    let before = render(&timeline);

    timeline.insert_time("mid", 400).unwrap();
    insta::assert_snapshot!(render(&timeline), @r"
    ch1: initial_a[0,400)=initial initial_b[400,1000)=initial
    ch2: initial_a[0,400)=initial initial_b[400,1000)=initial
    ");

    timeline.delete_time("mid").unwrap();
    insta::assert_snapshot!(render(&timeline), @r"
    ch1: initial[0,1000)=initial
    ch2: initial[0,1000)=initial
    ");
    assert_eq!(render(&timeline), before);
}

/// Forking a shared quantity before editing it isolates the edit.
#[test]
fn test_fork_then_set_isolates_one_channel() {
    let mut timeline = Timeline::with_channels(1000, &["ch1", "ch2"], 1.0).unwrap();
    timeline.add_constant("A", 5.0).unwrap();
    timeline.assign_value("ch1", "initial", "A").unwrap();
    timeline.assign_value("ch2", "initial", "A").unwrap();
    assert_eq!(timeline.quantities().len(), 1);

    let forked = timeline.fork_if_shared("ch1", "initial").unwrap().unwrap();
    let name = timeline.quantities().name_of(forked);
    assert_eq!(name, "A1");
    timeline.set_quantity_value(&name, 9.0, true).unwrap();

    approx(timeline.value_at("ch1", 100).unwrap(), 9.0);
    approx(timeline.value_at("ch2", 100).unwrap(), 5.0);
    assert_eq!(timeline.quantities().len(), 2);

    // no longer shared: forking again is a no-op
    assert_eq!(timeline.fork_if_shared("ch1", "initial").unwrap(), None);
}

/// Dragging forks automatically and leaves sibling intervals alone.
#[test]
fn test_drag_value_forks_shared_quantity() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 2.0).unwrap();
    timeline.insert_time("mid", 500).unwrap();

    timeline.drag_value("ch1", "initial_b", 7.0).unwrap();
    insta::assert_snapshot!(render(&timeline), @"ch1: initial_a[0,500)=initial initial_b[500,1000)=initial1");

    // the fork is now private, so a second drag edits it in place
    timeline.drag_value("ch1", "initial_b", 8.0).unwrap();
    assert_eq!(timeline.quantities().len(), 2);
    approx(timeline.value_at("ch1", 499).unwrap(), 2.0);
    approx(timeline.value_at("ch1", 500).unwrap(), 8.0);
}

#[test]
fn test_drag_refuses_function_quantities() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 2.0).unwrap();
    timeline.set_quantity_expression("initial", "t").unwrap();
    let err = timeline.drag_value("ch1", "initial", 1.0).unwrap_err();
    assert_eq!(
        err,
        ModelError::NotConstant {
            name: "initial".to_string()
        }
    );
}

/// Merging A into B repoints all three of A's intervals and collects A.
#[test]
fn test_merge_repoints_every_interval() {
    let mut timeline = Timeline::with_channels(1000, &["ch1", "ch2"], 1.0).unwrap();
    timeline.insert_time("mid", 400).unwrap();
    timeline.add_constant("A", 2.0).unwrap();
    timeline.assign_value("ch1", "initial_a", "A").unwrap();
    timeline.assign_value("ch1", "initial_b", "A").unwrap();
    timeline.assign_value("ch2", "initial_a", "A").unwrap();
    timeline.add_constant("B", 3.0).unwrap();
    timeline.assign_value("ch2", "initial_b", "B").unwrap();

    let a = timeline.quantity_id("A").unwrap();
    assert_eq!(timeline.reference_count(a), 3);

    let repointed = timeline.merge_quantities("B", "A").unwrap();
    assert_eq!(repointed, 3);
    assert_eq!(timeline.reference_count(a), 0);
    assert!(matches!(
        timeline.quantity_named("A"),
        Err(ModelError::NotFound { .. })
    ));
    let b = timeline.quantity_id("B").unwrap();
    assert_eq!(timeline.reference_count(b), 4);
}

#[test]
fn test_self_merge_is_a_no_op() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 1.0).unwrap();
    let before = json(&timeline);
    assert_eq!(timeline.merge_quantities("initial", "initial").unwrap(), 0);
    assert_eq!(json(&timeline), before);
}

/// An expression naming `end` follows the end anchor without any explicit
/// recompilation by the caller.
#[test]
fn test_function_follows_end_marker() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 1.0).unwrap();
    timeline.set_quantity_expression("initial", "t / end").unwrap();

    approx(timeline.sample_quantity("initial", 0.5e-6).unwrap(), 0.5);
    timeline.set_end_instant(2000).unwrap();
    approx(timeline.sample_quantity("initial", 0.5e-6).unwrap(), 0.25);
}

#[test]
fn test_end_cannot_precede_other_markers() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 1.0).unwrap();
    timeline.insert_time("mid", 800).unwrap();
    assert!(matches!(
        timeline.set_end_instant(800),
        Err(ModelError::OutOfRange { .. })
    ));
    timeline.set_end_instant(801).unwrap();
    timeline.validate().unwrap();
}

#[test]
fn test_variables_and_markers_feed_expressions() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 1.0).unwrap();
    timeline.insert_time("mid", 500).unwrap();
    timeline.set_variable("amp", 2.0).unwrap();
    timeline.add_constant("offset", 0.5).unwrap();
    timeline.set_quantity_expression("initial", "amp * mid * 1e6 + offset").unwrap();

    approx(timeline.value_at("ch1", 0).unwrap(), 1.5);
    timeline.set_variable("amp", 4.0).unwrap();
    approx(timeline.value_at("ch1", 0).unwrap(), 2.5);
    timeline.set_time("mid", 250.0, true).unwrap();
    approx(timeline.value_at("ch1", 0).unwrap(), 1.5);
}

#[test]
fn test_expression_failures_surface_as_expression_errors() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 1.0).unwrap();
    timeline.set_quantity_expression("initial", "1 / t").unwrap();
    let err = timeline.value_at("ch1", 0).unwrap_err();
    assert_eq!(
        err,
        ModelError::Expression {
            text: "1 / t".to_string(),
            source: ExprError::DivisionByZero
        }
    );

    timeline.set_quantity_expression("initial", "ghost * t").unwrap();
    assert!(matches!(
        timeline.value_at("ch1", 10),
        Err(ModelError::Expression {
            source: ExprError::Unbound { .. },
            ..
        })
    ));
}

#[test]
fn test_hostile_nesting_is_rejected() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 1.0).unwrap();
    let text = format!("{}t{}", "(".repeat(500), ")".repeat(500));
    let err = timeline
        .set_quantity_expression("initial", &text)
        .unwrap_err();
    assert!(matches!(
        err,
        ModelError::Expression {
            source: ExprError::TooDeep { .. },
            ..
        }
    ));
    // the quantity is untouched
    approx(timeline.value_at("ch1", 0).unwrap(), 1.0);
}

/// A long flat operator chain is refused instead of building a tree whose
/// later walks would exhaust the stack.
#[test]
fn test_long_flat_chain_is_rejected() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 1.0).unwrap();
    let text = vec!["t"; 100_000].join(" + ");
    let err = timeline
        .set_quantity_expression("initial", &text)
        .unwrap_err();
    assert!(matches!(
        err,
        ModelError::Expression {
            source: ExprError::TooDeep { .. },
            ..
        }
    ));

    // a realistic sum still parses and samples on every worker
    let text = vec!["t"; 100].join(" + ");
    timeline.set_quantity_expression("initial", &text).unwrap();
    assert_eq!(timeline.channel_samples("ch1").unwrap().len(), 1000);
}

/// Every mutating call on a locked entity fails and changes nothing.
#[test]
fn test_locked_entities_are_left_unchanged() {
    let mut timeline = Timeline::with_channels(1000, &["ch1", "ch2"], 1.0).unwrap();
    timeline.insert_time("mid", 400).unwrap();
    timeline.add_constant("spare", 3.0).unwrap();
    timeline.assign_value("ch2", "initial_b", "spare").unwrap();
    timeline.set_marker_locked("mid", true).unwrap();
    timeline.set_quantity_locked("initial", true).unwrap();
    timeline.set_interval_locked("ch1", "initial_a", true).unwrap();
    let before = json(&timeline);

    let attempts: Vec<Result<(), ModelError>> = vec![
        timeline.set_time("mid", 300.0, true).map(drop),
        timeline.rename_marker("mid", "middle"),
        timeline.delete_time("mid"),
        timeline.set_quantity_value("initial", 2.0, true).map(drop),
        timeline.set_quantity_expression("initial", "t"),
        timeline.set_constant_mode("initial"),
        timeline.rename_quantity("initial", "base"),
        timeline.merge_quantities("spare", "initial").map(drop),
        timeline.rename_interval("ch1", "initial_a", "head"),
        timeline.assign_value("ch1", "initial_a", "spare"),
        timeline.drag_value("ch1", "initial_a", 4.0),
        timeline.fork_if_shared("ch1", "initial_a").map(drop),
        timeline.detach_value("ch1", "initial_a", "own").map(drop),
    ];
    for (i, attempt) in attempts.into_iter().enumerate() {
        assert!(
            matches!(attempt, Err(ModelError::Locked { .. })),
            "attempt {i}: {attempt:?}"
        );
    }
    assert_eq!(json(&timeline), before);

    // lenient calls swallow the rejection
    assert!(!timeline.set_time("mid", 300.0, false).unwrap());
    assert!(!timeline.set_quantity_value("initial", 2.0, false).unwrap());
    assert_eq!(json(&timeline), before);
}

/// Insert-then-delete of any interior instant is an exact round trip.
#[test]
fn test_split_and_merge_round_trip() {
    let mut timeline = Timeline::with_channels(1000, &["ch1", "ch2", "ch3"], 1.0).unwrap();
    for (name, instant) in [("a", 100), ("b", 350), ("c", 720)] {
        timeline.insert_time(name, instant).unwrap();
    }
    timeline.drag_value("ch2", "initial_b_a", 4.0).unwrap();
    let before = json(&timeline);

    for instant in [1, 99, 101, 349, 351, 500, 719, 721, 999] {
        timeline.insert_time("probe", instant).unwrap();
        timeline.validate().unwrap();
        timeline.delete_time("probe").unwrap();
        assert_eq!(json(&timeline), before, "probe at {instant}");
    }
}

/// Deleting markers through the public API never reaches the missing-boundary
/// check, whatever the order of deletion.
#[test]
fn test_delete_time_never_reports_missing_boundary() {
    let mut rng = StdRng::seed_from_u64(7);
    for round in 0..20 {
        let mut timeline = Timeline::with_channels(1000, &["ch1"], 1.0).unwrap();
        let mut names = Vec::new();
        for i in 0..8 {
            let name = format!("m{i}");
            let instant = rng.gen_range(1..999);
            if timeline.insert_time(&name, instant).is_ok() {
                names.push(name);
            }
        }
        timeline.add_channel("late", "initial").unwrap();

        while !names.is_empty() {
            let name = names.swap_remove(rng.gen_range(0..names.len()));
            let result = timeline.delete_time(&name);
            assert!(result.is_ok(), "round {round}, deleting {name}: {result:?}");
        }
        timeline.validate().unwrap();
        for channel in timeline.channels() {
            assert_eq!(channel.intervals().len(), 1, "round {round}");
        }
    }
}

/// The partition, reference and garbage invariants hold after every step of
/// a long pseudo-random edit sequence.
#[test]
fn test_invariants_hold_under_random_edits() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut timeline = Timeline::with_channels(1000, &["x", "y", "z"], 1.0).unwrap();
    let mut counter = 0;

    for step in 0..400 {
        let result: Result<(), ModelError> = match rng.gen_range(0..6) {
            0 => {
                counter += 1;
                let instant = rng.gen_range(0..=1000);
                timeline
                    .insert_time(&format!("m{counter}"), instant)
                    .map(drop)
            }
            1 => match pick_marker(&timeline, &mut rng) {
                Some(name) => timeline.delete_time(&name),
                None => Ok(()),
            },
            2 => match pick_marker(&timeline, &mut rng) {
                Some(name) => {
                    let target = f64::from(rng.gen_range(0..1000_u32));
                    timeline.set_time(&name, target, false).map(drop)
                }
                None => Ok(()),
            },
            3 => {
                let (channel, interval) = pick_interval(&timeline, &mut rng);
                let value = f64::from(rng.gen_range(0..10_u32));
                timeline.drag_value(&channel, &interval, value)
            }
            4 => {
                let (channel, interval) = pick_interval(&timeline, &mut rng);
                let quantity = pick_quantity(&timeline, &mut rng);
                timeline.assign_value(&channel, &interval, &quantity)
            }
            _ => {
                let keep = pick_quantity(&timeline, &mut rng);
                let absorb = pick_quantity(&timeline, &mut rng);
                timeline.merge_quantities(&keep, &absorb).map(drop)
            }
        };

        if let Err(err) = &result {
            assert!(
                !err.is_invariant_violation(),
                "step {step}: invariant violation {err}"
            );
            assert!(
                matches!(err, ModelError::OutOfRange { .. }),
                "step {step}: unexpected rejection {err}"
            );
        }
        timeline.validate().unwrap();
        for (id, quantity) in timeline.quantities().iter() {
            assert!(
                timeline.reference_count(id) > 0,
                "step {step}: {} is garbage",
                quantity.name()
            );
        }
        for channel in timeline.channels() {
            assert_eq!(timeline.channel_samples(channel.name()).unwrap().len(), 1000);
        }
    }
}

fn pick_marker(timeline: &Timeline, rng: &mut StdRng) -> Option<String> {
    let inner: Vec<String> = timeline
        .markers()
        .iter()
        .filter(|(id, _)| !timeline.is_anchor(*id))
        .map(|(_, marker)| marker.name().to_string())
        .collect();
    if inner.is_empty() {
        None
    } else {
        Some(inner[rng.gen_range(0..inner.len())].clone())
    }
}

fn pick_interval(timeline: &Timeline, rng: &mut StdRng) -> (String, String) {
    let channels = timeline.channels();
    let channel = &channels[rng.gen_range(0..channels.len())];
    let intervals = channel.intervals();
    let interval = &intervals[rng.gen_range(0..intervals.len())];
    (channel.name().to_string(), interval.name().to_string())
}

fn pick_quantity(timeline: &Timeline, rng: &mut StdRng) -> String {
    let names: Vec<String> = timeline
        .quantities()
        .iter()
        .map(|(_, quantity)| quantity.name().to_string())
        .collect();
    names[rng.gen_range(0..names.len())].clone()
}

#[test]
fn test_display_range_over_a_function() {
    let mut timeline = Timeline::with_channels(1000, &["ch1"], 1.0).unwrap();
    timeline
        .set_quantity_expression("initial", "t * 1e9 - 500")
        .unwrap();
    let range = timeline.display_range("ch1").unwrap();
    approx(range.max, 1.25 * 499.0);
    approx(range.min, 1.25 * -500.0);
}
