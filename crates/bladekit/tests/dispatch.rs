//! Raw driver callbacks flowing through a running session

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use bladekit::{
    listener, AppEvent, AppEventKind, AppEventMode, DeviceSession, Direction, FlickGesture,
    Gesture, GestureEvent, KeyEvent, KeyEventKind, KeyIdentity, KeyState, KeyboardCharEvent,
    KeyboardKeyEvent, KeyboardRawEvent, Listener, ModifierKeys, ResultCode, SessionOptions,
    SimulatedDriver, TapGesture, VirtualKey, ZoomDirection, ZoomGesture,
};

const DOWN: u32 = 2;
const UP: u32 = 1;
const HOLD: u32 = 3;

fn running_session() -> (Arc<SimulatedDriver>, DeviceSession) {
    let driver = Arc::new(SimulatedDriver::new());
    let session = DeviceSession::new(driver.clone(), SessionOptions::default());
    session.start().expect("session should start");
    (driver, session)
}

/// Listener that records every event it sees
fn recorder<E: Clone + Send + 'static>() -> (Arc<Mutex<Vec<E>>>, Listener<E>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let l = listener(move |event: &E| {
        s.lock().unwrap().push(event.clone());
        Ok(())
    });
    (seen, l)
}

fn key_recorders(session: &DeviceSession) -> Arc<Mutex<Vec<KeyEvent>>> {
    let (seen, l) = recorder::<KeyEvent>();
    session.bus().key_state_changed.add(l.clone());
    session.bus().key_pressed.add(l.clone());
    session.bus().key_released.add(l);
    seen
}

// ===== Dynamic keys =====

#[test]
fn test_key_callback_for_unregistered_slot_is_dropped() {
    let (driver, session) = running_session();
    let seen = key_recorders(&session);

    assert_eq!(driver.fire_key(3, DOWN), Some(ResultCode::Ok));
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_key_press_end_to_end() {
    let (driver, session) = running_session();
    let seen = key_recorders(&session);

    session
        .enable_key(KeyIdentity::Dk2, "up.png".as_ref(), "down.png".as_ref(), None, false)
        .unwrap();

    // Raw identities are ordinals: 3 is DK3, which is still empty
    assert_eq!(driver.fire_key(3, DOWN), Some(ResultCode::Ok));
    assert!(seen.lock().unwrap().is_empty());

    assert_eq!(driver.fire_key(2, DOWN), Some(ResultCode::Ok));

    let key = session.key(KeyIdentity::Dk2).unwrap().unwrap();
    assert_eq!(key.state(), KeyState::Down);
    assert_eq!(key.previous_state(), KeyState::None);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            KeyEvent {
                kind: KeyEventKind::StateChanged,
                key: KeyIdentity::Dk2,
                state: KeyState::Down,
            },
            KeyEvent {
                kind: KeyEventKind::Pressed,
                key: KeyIdentity::Dk2,
                state: KeyState::Down,
            },
        ]
    );
}

#[test]
fn test_key_listeners_run_before_bus() {
    let (driver, session) = running_session();
    let order = Arc::new(Mutex::new(Vec::new()));

    let o = order.clone();
    let own: Listener<KeyEvent> = listener(move |e: &KeyEvent| {
        o.lock().unwrap().push(("key", e.kind));
        Ok(())
    });
    let o = order.clone();
    session.bus().key_pressed.add(listener(move |e: &KeyEvent| {
        o.lock().unwrap().push(("bus", e.kind));
        Ok(())
    }));

    session
        .enable_key(KeyIdentity::Dk7, "a.png".as_ref(), "".as_ref(), Some(own), false)
        .unwrap();
    driver.fire_key(7, DOWN);

    assert_eq!(
        *order.lock().unwrap(),
        vec![
            ("key", KeyEventKind::StateChanged),
            ("key", KeyEventKind::Pressed),
            ("bus", KeyEventKind::Pressed),
        ]
    );
}

#[test]
fn test_hold_then_up_is_not_a_release() {
    let (driver, session) = running_session();
    let (released, l) = recorder::<KeyEvent>();
    session.bus().key_released.add(l);
    session
        .enable_key(KeyIdentity::Dk1, "a.png".as_ref(), "".as_ref(), None, false)
        .unwrap();

    driver.fire_key(1, DOWN);
    driver.fire_key(1, HOLD);
    driver.fire_key(1, UP);
    assert!(released.lock().unwrap().is_empty());

    driver.fire_key(1, DOWN);
    driver.fire_key(1, UP);
    assert_eq!(released.lock().unwrap().len(), 1);
}

#[test]
fn test_disabled_key_stops_receiving() {
    let (driver, session) = running_session();
    let (seen, l) = recorder::<KeyEvent>();
    let key = session
        .enable_key(KeyIdentity::Dk4, "a.png".as_ref(), "".as_ref(), Some(l), false)
        .unwrap();

    session.disable_key(KeyIdentity::Dk4).unwrap();
    driver.fire_key(4, DOWN);

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(key.state(), KeyState::None);
}

#[test]
fn test_out_of_range_key_values_are_rejected() {
    let (driver, _session) = running_session();

    assert_eq!(driver.fire_key(12, DOWN), Some(ResultCode::InvalidParameter));
    assert_eq!(driver.fire_key(1, 9), Some(ResultCode::InvalidParameter));
    // Sentinels never index a slot
    assert_eq!(driver.fire_key(0, DOWN), Some(ResultCode::InvalidParameter));
}

// ===== Gestures =====

#[test]
fn test_gesture_generic_then_specific() {
    let (driver, session) = running_session();
    let order = Arc::new(Mutex::new(Vec::new()));

    let o = order.clone();
    session.bus().gesture.add(listener(move |e: &GestureEvent| {
        o.lock().unwrap().push(format!("gesture {}", e.gesture));
        Ok(())
    }));
    let o = order.clone();
    session.bus().tap.add(listener(move |e: &TapGesture| {
        o.lock().unwrap().push(format!("tap {},{}", e.x, e.y));
        Ok(())
    }));

    assert_eq!(driver.fire_gesture(0x0002, 1, 120, 40, 0), Some(ResultCode::Ok));
    assert_eq!(*order.lock().unwrap(), vec!["gesture tap", "tap 120,40"]);
}

#[test]
fn test_gesture_sub_events() {
    let (driver, session) = running_session();
    let (flicks, l) = recorder::<FlickGesture>();
    session.bus().flick.add(l);
    let (zooms, l) = recorder::<ZoomGesture>();
    session.bus().zoom.add(l);
    let (scrolls, l) = recorder::<GestureEvent>();
    session.bus().scroll.add(l);

    driver.fire_gesture(Gesture::Flick.bits(), 2, 0, 0, 3);
    driver.fire_gesture(Gesture::Zoom.bits(), 2, 0, 0, 0);
    driver.fire_gesture(Gesture::Zoom.bits(), 7, 0, 0, 0);
    driver.fire_gesture(Gesture::Scroll.bits(), 5, 1, 2, 3);

    assert_eq!(
        *flicks.lock().unwrap(),
        vec![FlickGesture {
            touch_points: 2,
            direction: Direction::Up,
        }]
    );
    let zooms: Vec<_> = zooms.lock().unwrap().iter().map(|z| z.direction).collect();
    assert_eq!(zooms, vec![ZoomDirection::Out, ZoomDirection::Invalid]);
    assert_eq!(
        *scrolls.lock().unwrap(),
        vec![GestureEvent {
            gesture: Gesture::Scroll,
            parameters: 5,
            x: 1,
            y: 2,
            z: 3,
        }]
    );
}

#[test]
fn test_gesture_mask_must_hold_one_gesture() {
    let (driver, session) = running_session();
    let (seen, l) = recorder::<GestureEvent>();
    session.bus().gesture.add(l);

    assert_eq!(driver.fire_gesture(0, 0, 0, 0, 0), Some(ResultCode::InvalidParameter));
    assert_eq!(
        driver.fire_gesture(0x0003, 0, 0, 0, 0),
        Some(ResultCode::InvalidParameter)
    );
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_flick_direction_out_of_range() {
    let (driver, session) = running_session();
    let (generic, l) = recorder::<GestureEvent>();
    session.bus().gesture.add(l);
    let (flicks, l) = recorder::<FlickGesture>();
    session.bus().flick.add(l);

    assert_eq!(
        driver.fire_gesture(Gesture::Flick.bits(), 1, 10, 20, 9),
        Some(ResultCode::InvalidParameter)
    );

    // The generic event goes out before the direction is looked at
    assert_eq!(
        *generic.lock().unwrap(),
        vec![GestureEvent {
            gesture: Gesture::Flick,
            parameters: 1,
            x: 10,
            y: 20,
            z: 9,
        }]
    );
    assert!(flicks.lock().unwrap().is_empty());
}

#[test]
fn test_listener_error_reaches_driver() {
    let (driver, session) = running_session();
    let (after, l) = recorder::<TapGesture>();
    session.bus().tap.add(listener(|_: &TapGesture| Err("tap handler failed".into())));
    session.bus().tap.add(l);

    assert_eq!(
        driver.fire_gesture(Gesture::Tap.bits(), 0, 0, 0, 0),
        Some(ResultCode::Unsuccessful)
    );
    assert!(after.lock().unwrap().is_empty());
}

#[test]
fn test_listener_removes_itself_mid_dispatch() {
    let (driver, session) = running_session();
    let (others, other) = recorder::<TapGesture>();

    let slot: Arc<Mutex<Option<Listener<TapGesture>>>> = Arc::new(Mutex::new(None));
    let calls = Arc::new(AtomicUsize::new(0));
    let remover = {
        let session = session.clone();
        let slot = slot.clone();
        let calls = calls.clone();
        listener(move |_: &TapGesture| {
            calls.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = slot.lock().unwrap().take() {
                session.bus().tap.remove(&me);
            }
            Ok(())
        })
    };
    *slot.lock().unwrap() = Some(remover.clone());
    session.bus().tap.add(remover);
    session.bus().tap.add(other);

    assert_eq!(driver.fire_gesture(Gesture::Tap.bits(), 0, 0, 0, 0), Some(ResultCode::Ok));
    assert_eq!(driver.fire_gesture(Gesture::Tap.bits(), 0, 0, 0, 0), Some(ResultCode::Ok));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(others.lock().unwrap().len(), 2);
}

// ===== App events and keyboard =====

#[test]
fn test_app_events() {
    let (driver, session) = running_session();
    let (seen, l) = recorder::<AppEvent>();
    session.bus().app_event.add(l);

    assert_eq!(driver.fire_app_event(1, 0x04, 4242), Some(ResultCode::Ok));
    // None and Invalid are ignored
    assert_eq!(driver.fire_app_event(0, 0x04, 1), Some(ResultCode::Ok));
    assert_eq!(driver.fire_app_event(5, 0x04, 1), Some(ResultCode::Ok));
    // Unknown mode
    assert_eq!(
        driver.fire_app_event(3, 0x08, 1),
        Some(ResultCode::InvalidParameter)
    );

    assert_eq!(
        *seen.lock().unwrap(),
        vec![AppEvent {
            kind: AppEventKind::Activated,
            mode: AppEventMode::Normal,
            process_id: 4242,
        }]
    );
}

#[test]
fn test_keyboard_messages() {
    let (driver, session) = running_session();
    session.set_keyboard_capture(true).unwrap();
    driver.set_modifiers(ModifierKeys::SHIFT);

    let (raw, l) = recorder::<KeyboardRawEvent>();
    session.bus().keyboard_raw.add(l);
    let (chars, l) = recorder::<KeyboardCharEvent>();
    session.bus().keyboard_char.add(l);
    let (downs, l) = recorder::<KeyboardKeyEvent>();
    session.bus().keyboard_key_pressed.add(l);
    let (ups, l) = recorder::<KeyboardKeyEvent>();
    session.bus().keyboard_key_released.add(l);

    driver.fire_keyboard(0x0100, 0x41, 0);
    driver.fire_keyboard(0x0102, 'A' as usize, 0);
    driver.fire_keyboard(0x0101, 0x41, 0);
    driver.fire_keyboard(0x0200, 0, 0);

    assert_eq!(raw.lock().unwrap().len(), 4);
    assert_eq!(
        *chars.lock().unwrap(),
        vec![KeyboardCharEvent { character: 'A' }]
    );
    let expected = KeyboardKeyEvent {
        key: VirtualKey(0x41),
        modifiers: ModifierKeys::SHIFT,
    };
    assert_eq!(*downs.lock().unwrap(), vec![expected]);
    assert_eq!(*ups.lock().unwrap(), vec![expected]);
}

// ===== Concurrency =====

#[test]
fn test_concurrent_callbacks_from_driver_threads() {
    let (driver, session) = running_session();
    for identity in KeyIdentity::KEYS {
        session
            .enable_key(identity, "a.png".as_ref(), "".as_ref(), None, false)
            .unwrap();
    }

    let presses = Arc::new(AtomicUsize::new(0));
    let p = presses.clone();
    session.bus().key_pressed.add(listener(move |_: &KeyEvent| {
        p.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    let taps = Arc::new(AtomicUsize::new(0));
    let t = taps.clone();
    session.bus().tap.add(listener(move |_: &TapGesture| {
        t.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    let handles: Vec<_> = (1..=10u32)
        .map(|raw| {
            let driver = driver.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    assert_eq!(driver.fire_key(raw, DOWN), Some(ResultCode::Ok));
                    assert_eq!(driver.fire_key(raw, UP), Some(ResultCode::Ok));
                    assert_eq!(
                        driver.fire_gesture(Gesture::Tap.bits(), 0, 0, 0, 0),
                        Some(ResultCode::Ok)
                    );
                }
            })
        })
        .collect();

    // Listener churn on the application side while callbacks run
    for _ in 0..100 {
        let l = listener(|_: &TapGesture| Ok(()));
        session.bus().tap.add(l.clone());
        assert!(session.bus().tap.remove(&l));
    }

    for handle in handles {
        handle.join().expect("callback thread panicked");
    }

    assert_eq!(presses.load(Ordering::SeqCst), 500);
    assert_eq!(taps.load(Ordering::SeqCst), 500);
}

#[test]
fn test_gesture_reconcile_through_session() {
    let (driver, session) = running_session();
    driver.clear_calls();

    assert!(session.enable_gesture(Gesture::Press).unwrap());
    assert!(!session.enable_gesture(Gesture::Press).unwrap());
    assert!(session.set_gestures(&Gesture::None.into(), false).unwrap());

    let state = session.gesture_state();
    assert!(state.all_enabled);
    assert!(state.active.has_full_range());
    assert!(state.active.contains(Gesture::All));
    assert_eq!(
        driver.calls(),
        vec![
            bladekit::DriverCall::EnableGesture(0x0001, true),
            bladekit::DriverCall::EnableGesture(0xFFFF, true),
        ]
    );
}
