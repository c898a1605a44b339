//! Property-based invariant tests for dispatch, scoping and watching.
//!
//! These hold for any sequence of registrations and triggers:
//!
//! **Dispatch:**
//! 1. Handlers run in registration order, once per registration.
//! 2. `trigger` returns the number of handlers invoked.
//! 3. A once-only handler runs at most once, no matter how often its event
//!    is triggered.
//! 4. `off` removes exactly the named registration.
//! 5. Events never leak into each other's handler lists.
//!
//! **Scoping:**
//! 6. A scoped handler never runs after its owner is destroyed, whatever
//!    the destruction order.
//!
//! **Watching:**
//! 7. A watch callback runs once per effective change of a watched path,
//!    never for unchanged writes or unwatched paths.
//!
//! **Lifecycle:**
//! 8. After destroy every mutating operation fails and no handler runs.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hark::{EventError, Events, Properties};
use proptest::prelude::*;

const EVENTS: [&str; 3] = ["alpha", "beta", "gamma"];

// ── Strategies ────────────────────────────────────────────────────────────

/// (event index, once-only)
fn registrations_strategy() -> impl Strategy<Value = Vec<(usize, bool)>> {
    proptest::collection::vec((0..EVENTS.len(), any::<bool>()), 0..=24)
}

fn triggers_strategy() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(0..EVENTS.len(), 0..=16)
}

/// (path index, value)
fn writes_strategy() -> impl Strategy<Value = Vec<(usize, u8)>> {
    proptest::collection::vec((0..4usize, 0u8..4), 0..=40)
}

fn register_all(events: &Events, regs: &[(usize, bool)], log: &Rc<RefCell<Vec<usize>>>) {
    for (n, &(event, once)) in regs.iter().enumerate() {
        let log = Rc::clone(log);
        let handler = move || log.borrow_mut().push(n);
        if once {
            events.on_once(EVENTS[event], handler).unwrap();
        } else {
            events.on(EVENTS[event], handler).unwrap();
        }
    }
}

// 1-3, 5. Order, counts and once-only semantics against a model

proptest! {
    #[test]
    fn dispatch_matches_model(
        regs in registrations_strategy(),
        triggers in triggers_strategy(),
    ) {
        let events = Events::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        register_all(&events, &regs, &log);

        let mut fired = vec![false; regs.len()];
        for &event in &triggers {
            log.borrow_mut().clear();
            let expected: Vec<usize> = regs
                .iter()
                .enumerate()
                .filter(|&(n, &(e, once))| e == event && !(once && fired[n]))
                .map(|(n, _)| n)
                .collect();
            for &n in &expected {
                fired[n] = true;
            }

            let invoked = events.trigger(EVENTS[event]).unwrap();
            prop_assert_eq!(invoked, expected.len());
            prop_assert_eq!(&*log.borrow(), &expected);
        }
    }
}

// 3. Once-only handlers fire at most once

proptest! {
    #[test]
    fn once_handlers_fire_at_most_once(
        count in 1usize..=8,
        triggers in 0usize..=10,
    ) {
        let events = Events::new();
        let calls = Rc::new(Cell::new(0usize));
        for _ in 0..count {
            let calls = Rc::clone(&calls);
            events.on_once("ready", move || calls.set(calls.get() + 1)).unwrap();
        }
        for _ in 0..triggers {
            events.trigger("ready").unwrap();
        }
        let expected = if triggers == 0 { 0 } else { count };
        prop_assert_eq!(calls.get(), expected);
        prop_assert_eq!(events.handler_count("ready"), count - expected);
    }
}

// 4. `off` removes exactly one registration

proptest! {
    #[test]
    fn off_removes_exactly_one(
        count in 1usize..=12,
        victim_seed in any::<usize>(),
    ) {
        let events = Events::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let ids: Vec<_> = (0..count)
            .map(|n| {
                let log = Rc::clone(&log);
                events.on("go", move || log.borrow_mut().push(n)).unwrap()
            })
            .collect();
        let victim = victim_seed % count;

        prop_assert_eq!(events.off("go", ids[victim]), Ok(true));
        prop_assert_eq!(events.off("go", ids[victim]), Ok(false));
        events.trigger("go").unwrap();

        let expected: Vec<usize> = (0..count).filter(|&n| n != victim).collect();
        prop_assert_eq!(&*log.borrow(), &expected);
    }
}

// 6. Scoped handlers never outlive their owner

proptest! {
    #[test]
    fn scoped_handlers_stop_with_owner(
        owners in 1usize..=6,
        destroy_order in Just((0..6).collect::<Vec<usize>>()).prop_shuffle(),
        destroy_target_first in any::<bool>(),
    ) {
        let target = Events::new();
        let owner_hubs: Vec<Events> = (0..owners).map(|_| Events::new()).collect();
        let calls: Vec<Rc<Cell<u32>>> = (0..owners).map(|_| Rc::new(Cell::new(0))).collect();
        for (owner, count) in owner_hubs.iter().zip(&calls) {
            let count = Rc::clone(count);
            target.when(owner, "tick", move || count.set(count.get() + 1)).unwrap();
        }

        if destroy_target_first {
            target.destroy();
        }
        let mut alive = vec![true; owners];
        for &index in destroy_order.iter().filter(|&&i| i < owners) {
            owner_hubs[index].destroy();
            alive[index] = false;

            let before: Vec<u32> = calls.iter().map(|c| c.get()).collect();
            let _ = target.trigger("tick");
            for n in 0..owners {
                let ran = calls[n].get() - before[n];
                let expected = u32::from(alive[n] && !destroy_target_first);
                prop_assert_eq!(ran, expected, "owner {} alive={}", n, alive[n]);
            }
        }
        if !destroy_target_first {
            prop_assert_eq!(target.handler_count("tick"), 0);
        }
    }
}

// 7. Watches fire once per effective change

proptest! {
    #[test]
    fn watch_fires_per_effective_change(
        watched in proptest::collection::btree_set(0..4usize, 1..=4),
        writes in writes_strategy(),
    ) {
        const PATHS: [&str; 4] = ["selected", "highlighted", "width", "height"];
        let props = Properties::with_values(PATHS.iter().map(|&p| (p, 0u8)));
        let events = Events::new();
        let calls = Rc::new(Cell::new(0usize));
        let calls_clone = Rc::clone(&calls);
        events
            .on_change_of_any(&props, watched.iter().map(|&i| PATHS[i]), move || {
                calls_clone.set(calls_clone.get() + 1);
            })
            .unwrap();

        let mut model = [0u8; 4];
        let mut expected = 0usize;
        for &(path, value) in &writes {
            if model[path] != value {
                model[path] = value;
                if watched.contains(&path) {
                    expected += 1;
                }
            }
            props.set(PATHS[path], value);
        }
        prop_assert_eq!(calls.get(), expected);
    }
}

// 8. Destroyed hubs are inert

proptest! {
    #[test]
    fn destroyed_hub_is_inert(
        regs in registrations_strategy(),
        triggers in triggers_strategy(),
    ) {
        let events = Events::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        register_all(&events, &regs, &log);
        events.destroy();

        let destroyed = EventError::Destroyed { object: events.id() };
        for &event in &triggers {
            prop_assert_eq!(events.trigger(EVENTS[event]), Err(destroyed.clone()));
            prop_assert_eq!(events.on(EVENTS[event], || {}).map(|_| ()), Err(destroyed.clone()));
            prop_assert_eq!(events.handler_count(EVENTS[event]), 0);
        }
        prop_assert!(log.borrow().is_empty());
    }
}
