//! Interpreter scenarios under a simulated clock: delayed sends,
//! cancellation, logging order, service lifecycle, activities, and
//! execution-error routing.

use serde_json::json;
use statecraft::{
    assign, cancel, exec, interpret, log, send, try_assign, ActionError, Machine, ServiceError,
    SimulatedClock, StateConfig, StateValue, TransitionConfig, TransitionError,
};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq, Default)]
struct Counter {
    count: i64,
}

fn delayed_light() -> Machine<()> {
    Machine::builder("lights")
        .initial("green")
        .state(
            "green",
            StateConfig::new()
                .entry(send("TIMER").delay(10))
                .on("TIMER", "yellow")
                .on("KEEP_GOING", TransitionConfig::new().action(cancel("TIMER"))),
        )
        .state("yellow", StateConfig::new().after(10, "red"))
        .state("red", StateConfig::new().after(10, "green"))
        .build()
        .expect("delayed light builds")
}

fn counter_logger() -> Machine<Counter> {
    Machine::builder("counter")
        .initial("active")
        .state(
            "active",
            StateConfig::new().on(
                "LOG",
                TransitionConfig::new()
                    .action(assign(|ctx: &Counter, _| Counter {
                        count: ctx.count + 1,
                    }))
                    .action(log(|ctx: &Counter, _| json!({ "count": ctx.count }))),
            ),
        )
        .build()
        .expect("counter machine builds")
}

// ---- scenario 5: delayed sends under a simulated clock ----------------

#[test]
fn delayed_sends_fire_on_schedule() {
    let clock = Arc::new(SimulatedClock::new());
    let service = interpret(delayed_light()).with_clock(clock.clone());

    let initial = service.start().unwrap();
    assert!(initial.matches("green"));

    clock.increment(5);
    assert!(service.state().matches("green"));

    clock.increment(5);
    assert!(service.state().matches("yellow"));

    clock.increment(10);
    assert!(service.state().matches("red"));

    clock.increment(10);
    assert!(service.state().matches("green"));
}

// ---- scenario 6: cancellation -----------------------------------------

#[test]
fn cancel_nullifies_a_pending_delayed_send() {
    let clock = Arc::new(SimulatedClock::new());
    let service = interpret(delayed_light()).with_clock(clock.clone());
    service.start().unwrap();

    clock.increment(5);
    service.send("KEEP_GOING").unwrap();

    clock.increment(10);
    assert!(service.state().matches("green"));
}

// ---- scenario 7: assign + log through the service ---------------------

#[test]
fn logger_receives_resolved_messages_in_order() {
    let captured: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);

    let service = interpret(counter_logger())
        .with_logger(move |entry| sink.lock().unwrap().push(entry.message.clone()));
    service.start().unwrap();

    service.send("LOG").unwrap();
    service.send("LOG").unwrap();

    assert_eq!(
        *captured.lock().unwrap(),
        vec![json!({ "count": 1 }), json!({ "count": 2 })]
    );
}

// ---- scenario 8: service lifecycle ------------------------------------

#[test]
fn sending_before_start_is_an_error() {
    let service = interpret(delayed_light());
    let result = service.send("TIMER");
    assert!(matches!(result, Err(ServiceError::NotStarted)));
}

#[test]
fn unmatched_event_after_start_is_a_noop() {
    let service = interpret(counter_logger());
    service.start().unwrap();

    let state = service.send("UNKNOWN").unwrap();
    assert!(state.matches("active"));
    assert!(!state.changed);
    assert!(service.is_running());
}

#[test]
fn start_is_idempotent_while_running() {
    let service = interpret(counter_logger());
    let first = service.start().unwrap();
    let again = service.start().unwrap();
    assert_eq!(first.value, again.value);
}

// ---- macrosteps drain raised events -----------------------------------

#[test]
fn raised_done_events_drain_within_one_macrostep() {
    let machine: Machine<()> = Machine::builder("wizard")
        .initial("steps")
        .state(
            "steps",
            StateConfig::new()
                .initial("one")
                .state("one", StateConfig::new().on("NEXT", "two"))
                .state("two", StateConfig::new().on("NEXT", "finish"))
                .state("finish", StateConfig::final_state())
                .on_done("complete"),
        )
        .state("complete", StateConfig::new())
        .build()
        .unwrap();

    let seen: Arc<Mutex<Vec<StateValue>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let service = interpret(machine);
    let _sub = service.on_transition(move |state| sink.lock().unwrap().push(state.value.clone()));
    service.start().unwrap();

    service.send("NEXT").unwrap();
    let last = service.send("NEXT").unwrap();
    assert!(last.matches("complete"));

    // One notification per macrostep: start, NEXT, NEXT (with the
    // raised done event consumed internally).
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            StateValue::from("steps.one"),
            StateValue::from("steps.two"),
            StateValue::from("complete"),
        ]
    );
}

// ---- activities --------------------------------------------------------

#[test]
fn activities_start_on_entry_and_stop_on_exit() {
    let started = Arc::new(Mutex::new(0usize));
    let stopped = Arc::new(Mutex::new(0usize));

    let started_in = Arc::clone(&started);
    let stopped_in = Arc::clone(&stopped);

    let machine: Machine<()> = Machine::builder("recorder")
        .initial("idle")
        .activity("beeping", move |_, _| {
            *started_in.lock().unwrap() += 1;
            let on_stop = Arc::clone(&stopped_in);
            Some(Box::new(move || {
                *on_stop.lock().unwrap() += 1;
            }) as Box<dyn FnOnce() + Send>)
        })
        .state("idle", StateConfig::new().on("RECORD", "recording"))
        .state(
            "recording",
            StateConfig::new().activity("beeping").on("STOP", "idle"),
        )
        .build()
        .unwrap();

    let service = interpret(machine);
    service.start().unwrap();
    assert_eq!(*started.lock().unwrap(), 0);

    let recording = service.send("RECORD").unwrap();
    assert_eq!(*started.lock().unwrap(), 1);
    assert_eq!(recording.activities.get("beeping"), Some(&true));

    let idle = service.send("STOP").unwrap();
    assert_eq!(*stopped.lock().unwrap(), 1);
    assert_eq!(idle.activities.get("beeping"), Some(&false));
}

// ---- forced stop -------------------------------------------------------

#[test]
fn stop_runs_exit_actions_and_cancels_timers() {
    let cleanups = Arc::new(Mutex::new(0usize));
    let counted = Arc::clone(&cleanups);

    let machine: Machine<()> = Machine::builder("lights")
        .initial("green")
        .state(
            "green",
            StateConfig::new()
                .entry(send("TIMER").delay(10))
                .exit(exec("cleanup", move |_, _| {
                    *counted.lock().unwrap() += 1;
                    Ok(())
                }))
                .on("TIMER", "yellow"),
        )
        .state("yellow", StateConfig::new())
        .build()
        .unwrap();

    let clock = Arc::new(SimulatedClock::new());
    let service = interpret(machine).with_clock(clock.clone());
    service.start().unwrap();

    let stopped = service.stop().unwrap();
    assert!(stopped.matches("green"));
    assert_eq!(*cleanups.lock().unwrap(), 1);

    // The pending TIMER was cancelled with the service.
    clock.increment(20);
    assert!(service.state().matches("green"));
    assert!(matches!(service.send("TIMER"), Err(ServiceError::Stopped)));
}

// ---- previews and subscriptions ---------------------------------------

#[test]
fn next_state_previews_without_committing() {
    let clock = Arc::new(SimulatedClock::new());
    let service = interpret(delayed_light()).with_clock(clock);
    service.start().unwrap();

    let preview = service.next_state("TIMER").unwrap();
    assert!(preview.matches("yellow"));
    assert!(service.state().matches("green"));
}

#[test]
fn unsubscribed_listeners_stop_receiving() {
    let count = Arc::new(Mutex::new(0usize));
    let counted = Arc::clone(&count);

    let service = interpret(counter_logger());
    let subscription = service.on_transition(move |_| *counted.lock().unwrap() += 1);
    service.start().unwrap();
    service.send("LOG").unwrap();
    assert_eq!(*count.lock().unwrap(), 2);

    subscription.unsubscribe();
    service.send("LOG").unwrap();
    assert_eq!(*count.lock().unwrap(), 2);
}

// ---- execution errors --------------------------------------------------

fn risky(with_handler: bool) -> Machine<Counter> {
    let mut builder = Machine::builder("risky").initial("a").state(
        "a",
        StateConfig::new().on(
            "BOOM",
            TransitionConfig::new().action(try_assign(|_: &Counter, _| {
                Err(ActionError::new("assignment exploded"))
            })),
        ),
    );
    if with_handler {
        builder = builder
            .on("error.execution", "failed")
            .state("failed", StateConfig::new());
    }
    builder.build().expect("risky machine builds")
}

#[test]
fn execution_errors_route_to_an_error_execution_handler() {
    let service = interpret(risky(true));
    service.start().unwrap();

    let state = service.send("BOOM").unwrap();
    assert!(state.matches("failed"));
    assert!(service.is_running());
}

#[test]
fn unhandled_execution_errors_stop_the_service() {
    let service = interpret(risky(false));
    service.start().unwrap();

    let result = service.send("BOOM");
    assert!(matches!(
        result,
        Err(ServiceError::Transition(TransitionError::Execution(_)))
    ));
    assert!(!service.is_running());
    assert!(matches!(service.send("BOOM"), Err(ServiceError::Stopped)));
}
