use std::cell::Cell;
use std::rc::Rc;
use vellum::prelude::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9
}

fn scene(canvas: &mut Canvas) -> (ItemId, ItemId, ItemId) {
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let a = canvas.add(element, None).unwrap();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let b = canvas.add(element, None).unwrap();
    canvas.translate(b, 300.0, 200.0).unwrap();
    let line = Line::new(canvas.solver_mut());
    let line = canvas.add(line, None).unwrap();
    canvas.update().unwrap();
    (a, b, line)
}

fn handle_in_canvas(canvas: &Canvas, id: ItemId, handle: usize) -> (f64, f64) {
    let item = canvas.item(id).unwrap();
    let local = canvas.solver().point(item.handles()[handle].pos);
    canvas.matrix_i2c(id).transform_point(local)
}

#[test]
fn test_line_tracks_moved_element() {
    // A line glued to two elements follows when one of them moves.
    let mut canvas = Canvas::new();
    let (a, b, line) = scene(&mut canvas);

    canvas.connect(line, 0, a, Element::PORT_TOP, None).unwrap();
    canvas.connect(line, 1, b, Element::PORT_LEFT, None).unwrap();
    canvas.update().unwrap();

    // Glued to B's left edge (x = 300, y in [200, 250]).
    let tail = handle_in_canvas(&canvas, line, 1);
    assert!(close(tail.0, 300.0));
    assert!(tail.1 >= 200.0 - 1e-9 && tail.1 <= 250.0 + 1e-9);

    canvas.translate(b, 50.0, -20.0).unwrap();
    canvas.update().unwrap();

    let tail = handle_in_canvas(&canvas, line, 1);
    assert!(close(tail.0, 350.0));
    assert!(tail.1 >= 180.0 - 1e-9 && tail.1 <= 230.0 + 1e-9);

    // The line's own first handle stays pinned to its local origin.
    let line_item = canvas.item_of::<Line>(line).unwrap();
    let head_local = canvas.solver().point(line_item.handles()[0].pos);
    assert!(close(head_local.0, 0.0) && close(head_local.1, 0.0));
}

#[test]
fn test_connection_residual_is_zero_after_update() {
    let mut canvas = Canvas::new();
    let (a, _b, line) = scene(&mut canvas);

    let constraint = canvas.connect(line, 0, a, Element::PORT_RIGHT, None).unwrap();
    canvas.update().unwrap();

    let residual = canvas.solver().residual(constraint).unwrap();
    assert!(residual <= 1e-9, "residual {residual}");
}

#[test]
fn test_duplicate_connection_is_rejected() {
    let mut canvas = Canvas::new();
    let (a, b, line) = scene(&mut canvas);

    canvas.connect(line, 0, a, Element::PORT_TOP, None).unwrap();
    let result = canvas.connect(line, 0, b, Element::PORT_TOP, None);

    assert_eq!(
        result,
        Err(VellumError::DuplicateConnection {
            item: line,
            handle: 0
        })
    );
    // The original record is untouched.
    let record = canvas.connections().get_connection(line, 0).unwrap();
    assert_eq!(record.connected, a);
}

#[test]
fn test_disconnect_runs_callback_once_and_unregisters() {
    let mut canvas = Canvas::new();
    let (a, _b, line) = scene(&mut canvas);

    let calls = Rc::new(Cell::new(0));
    let callback: Box<dyn FnMut()> = {
        let calls = calls.clone();
        Box::new(move || calls.set(calls.get() + 1))
    };
    let constraint = canvas
        .connect(line, 0, a, Element::PORT_TOP, Some(callback))
        .unwrap();

    canvas.disconnect(line, 0).unwrap();

    assert_eq!(calls.get(), 1);
    assert!(canvas.connections().get_connection(line, 0).is_none());
    assert!(!canvas.solver().has_constraint(constraint));

    // Disconnecting again is rejected and the callback does not rerun.
    assert!(canvas.disconnect(line, 0).is_err());
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_removing_an_item_disconnects_both_sides() {
    let mut canvas = Canvas::new();
    let (a, b, line) = scene(&mut canvas);

    let from_line = Rc::new(Cell::new(0));
    let callback: Box<dyn FnMut()> = {
        let calls = from_line.clone();
        Box::new(move || calls.set(calls.get() + 1))
    };
    canvas
        .connect(line, 0, a, Element::PORT_TOP, Some(callback))
        .unwrap();
    let to_b = Rc::new(Cell::new(0));
    let callback: Box<dyn FnMut()> = {
        let calls = to_b.clone();
        Box::new(move || calls.set(calls.get() + 1))
    };
    canvas
        .connect(line, 1, b, Element::PORT_LEFT, Some(callback))
        .unwrap();

    // Removing element A breaks the record where A is the connected side;
    // the record to B survives.
    canvas.remove(a).unwrap();
    assert_eq!(from_line.get(), 1);
    assert_eq!(to_b.get(), 0);
    assert!(canvas.connections().get_connection(line, 0).is_none());
    assert!(canvas.connections().get_connection(line, 1).is_some());

    // Removing the line breaks its remaining record.
    canvas.remove(line).unwrap();
    assert_eq!(to_b.get(), 1);
    assert!(canvas.connections().is_empty());
}

#[test]
fn test_solvable_constraints_are_anchored_to_item() {
    let mut canvas = Canvas::new();
    let (a, b, line) = scene(&mut canvas);

    let first = canvas.connect(line, 0, a, Element::PORT_TOP, None).unwrap();
    let second = canvas.connect(line, 1, b, Element::PORT_LEFT, None).unwrap();

    let anchored = canvas.connections().solvable_constraints(line);
    assert_eq!(anchored, vec![first, second]);
    assert!(canvas.connections().solvable_constraints(a).is_empty());
}

#[test]
fn test_glue_picks_nearest_port() {
    let mut canvas = Canvas::new();
    let (a, _b, line) = scene(&mut canvas);

    // The line's head sits at canvas (0, 0) = A's top-left corner; the
    // top edge is among the nearest ports.
    let (port, distance) = canvas.glue(line, 0, a).unwrap();
    assert!(distance <= 1e-9);
    assert!(port == Element::PORT_TOP || port == Element::PORT_LEFT);

    canvas.connect_nearest(line, 0, a, None).unwrap();
    assert!(canvas.connections().get_connection(line, 0).is_some());
}
