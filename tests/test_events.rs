use std::cell::{Cell, RefCell};
use std::rc::Rc;
use vellum::prelude::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9
}

fn recorded(canvas: &mut Canvas) -> Rc<RefCell<Vec<Event>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    canvas.add_observer(move |event| sink.borrow_mut().push(event.clone()));
    log
}

fn inverses(canvas: &mut Canvas) -> Rc<RefCell<Vec<Event>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    canvas.add_subscriber(move |event| sink.borrow_mut().push(event.clone()));
    log
}

#[test]
fn test_observers_see_old_and_new_values() {
    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();
    canvas.update().unwrap();

    let log = recorded(&mut canvas);
    let pos = canvas.item(id).unwrap().handles()[Element::SE].pos;
    canvas.set_var(pos.x, 140.0);

    let events = log.borrow();
    assert_eq!(
        events.as_slice(),
        &[Event::VariableSet {
            var: pos.x,
            value: 140.0,
            old: 100.0
        }]
    );
}

#[test]
fn test_variable_undo_restores_state() {
    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();
    canvas.update().unwrap();

    let log = inverses(&mut canvas);
    canvas.move_handle(id, Element::SE, (140.0, 90.0)).unwrap();
    canvas.update().unwrap();

    // Replaying the recorded inverse events in reverse order rolls the
    // geometry back.
    let events: Vec<Event> = log.borrow().iter().rev().cloned().collect();
    for event in &events {
        canvas.apply(event).unwrap();
    }
    canvas.update().unwrap();

    let element = canvas.item_of::<Element>(id).unwrap();
    assert!(close(element.width(canvas.solver()), 100.0));
    assert!(close(element.height(canvas.solver()), 50.0));
}

#[test]
fn test_matrix_undo_restores_state() {
    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();
    canvas.update().unwrap();

    let log = inverses(&mut canvas);
    canvas.translate(id, 25.0, -5.0).unwrap();
    canvas.update().unwrap();

    let events: Vec<Event> = log.borrow().iter().rev().cloned().collect();
    for event in &events {
        canvas.apply(event).unwrap();
    }
    canvas.update().unwrap();

    assert_eq!(canvas.matrix(id).unwrap(), Matrix::identity());
}

#[test]
fn test_undo_a_connect() {
    // Observe the connect, apply the inverse: the record is gone, the
    // constraint left the solver and the disconnect callback ran once.
    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let a = canvas.add(element, None).unwrap();
    let line = Line::new(canvas.solver_mut());
    let line = canvas.add(line, None).unwrap();
    canvas.update().unwrap();

    let log = inverses(&mut canvas);
    let calls = Rc::new(Cell::new(0));
    let callback: Box<dyn FnMut()> = {
        let calls = calls.clone();
        Box::new(move || calls.set(calls.get() + 1))
    };
    let constraint = canvas
        .connect(line, 0, a, Element::PORT_TOP, Some(callback))
        .unwrap();

    let undo: Vec<Event> = log
        .borrow()
        .iter()
        .filter(|event| matches!(event, Event::HandleDisconnected { .. }))
        .cloned()
        .collect();
    assert_eq!(
        undo,
        vec![Event::HandleDisconnected {
            item: line,
            handle: 0,
            connected: a,
            port: Element::PORT_TOP,
        }]
    );

    canvas.apply(&undo[0]).unwrap();

    assert!(canvas.connections().get_connection(line, 0).is_none());
    assert!(!canvas.solver().has_constraint(constraint));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_handle_flag_events_round_trip() {
    let mut canvas = Canvas::new();
    let line = Line::new(canvas.solver_mut());
    let id = canvas.add(line, None).unwrap();

    let log = inverses(&mut canvas);
    canvas
        .set_handle_flag(id, 0, HandleFlag::Movable, false)
        .unwrap();
    assert!(!canvas.item(id).unwrap().handles()[0].is_movable());

    // Re-setting to the same value is silent.
    canvas
        .set_handle_flag(id, 0, HandleFlag::Movable, false)
        .unwrap();
    assert_eq!(log.borrow().len(), 1);

    let undo = log.borrow()[0].clone();
    canvas.apply(&undo).unwrap();
    assert!(canvas.item(id).unwrap().handles()[0].is_movable());
}

#[test]
fn test_line_flag_events_round_trip() {
    let mut canvas = Canvas::new();
    let line = Line::new(canvas.solver_mut());
    let id = canvas.add(line, None).unwrap();
    canvas.update().unwrap();

    let log = inverses(&mut canvas);
    canvas.set_orthogonal(id, true).unwrap();
    canvas.update().unwrap();

    let undo: Vec<Event> = log
        .borrow()
        .iter()
        .filter(|event| matches!(event, Event::LineFlagSet { .. }))
        .cloned()
        .collect();
    assert_eq!(undo.len(), 1);
    canvas.apply(&undo[0]).unwrap();
    canvas.update().unwrap();

    assert!(!canvas.item_of::<Line>(id).unwrap().is_orthogonal());
}

#[test]
fn test_add_event_inverse_is_remove() {
    let mut canvas = Canvas::new();
    let log = inverses(&mut canvas);

    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();

    let undo: Vec<Event> = log
        .borrow()
        .iter()
        .filter(|event| matches!(event, Event::ItemRemoved { .. }))
        .cloned()
        .collect();
    assert_eq!(
        undo,
        vec![Event::ItemRemoved {
            item: id,
            parent: None,
            index: 0
        }]
    );

    canvas.apply(&undo[0]).unwrap();
    assert!(canvas.items().is_empty());
}

#[test]
fn test_reparent_event_round_trip() {
    let mut canvas = Canvas::new();
    let p1 = {
        let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
        canvas.add(element, None).unwrap()
    };
    let p2 = {
        let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
        canvas.add(element, None).unwrap()
    };
    let x = {
        let element = Element::new(canvas.solver_mut(), 20.0, 20.0);
        canvas.add(element, Some(p1)).unwrap()
    };

    let log = inverses(&mut canvas);
    canvas.reparent(x, Some(p2), None).unwrap();

    let undo: Vec<Event> = log
        .borrow()
        .iter()
        .filter(|event| matches!(event, Event::ItemReparented { .. }))
        .cloned()
        .collect();
    assert_eq!(undo.len(), 1);
    canvas.apply(&undo[0]).unwrap();

    assert_eq!(canvas.tree().parent(x), Some(p1));
    assert_eq!(canvas.tree().index_of(x), Some(0));
}

#[test]
fn test_views_are_notified_of_dirty_items() {
    struct Recorder(Rc<RefCell<Vec<(Vec<ItemId>, bool)>>>);
    impl View for Recorder {
        fn request_update(&mut self, items: &[ItemId], matrix_only: bool) {
            self.0.borrow_mut().push((items.to_vec(), matrix_only));
        }
    }

    let mut canvas = Canvas::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    canvas.register_view(Box::new(Recorder(log.clone())));

    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();
    canvas.translate(id, 5.0, 5.0).unwrap();

    let notifications = log.borrow();
    assert!(notifications.contains(&(vec![id], false))); // from add
    assert!(notifications.contains(&(vec![id], true))); // from translate
}
