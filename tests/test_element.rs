use vellum::prelude::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9
}

fn corner(canvas: &Canvas, id: ItemId, index: usize) -> (f64, f64) {
    let element = canvas.item_of::<Element>(id).unwrap();
    canvas.solver().point(element.handles()[index].pos)
}

#[test]
fn test_resize_keeps_rectangularity() {
    // An element at translation (10, 20); dragging the south-east handle
    // to canvas (200, 120) must carry the other corners along.
    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();
    canvas.translate(id, 10.0, 20.0).unwrap();
    canvas.update().unwrap();

    canvas.move_handle(id, Element::SE, (190.0, 100.0)).unwrap();
    canvas.update().unwrap();

    let element = canvas.item_of::<Element>(id).unwrap();
    assert!(close(element.width(canvas.solver()), 190.0));
    assert!(close(element.height(canvas.solver()), 100.0));
    assert!(close(element.min_width(canvas.solver()), 10.0));
    assert!(close(element.min_height(canvas.solver()), 10.0));

    assert_eq!(corner(&canvas, id, Element::NW), (0.0, 0.0));
    assert_eq!(corner(&canvas, id, Element::NE), (190.0, 0.0));
    assert_eq!(corner(&canvas, id, Element::SW), (0.0, 100.0));

    // The dragged corner sits at canvas (200, 120).
    let se = canvas
        .matrix_i2c(id)
        .transform_point(corner(&canvas, id, Element::SE));
    assert!(close(se.0, 200.0) && close(se.1, 120.0));
}

#[test]
fn test_minimum_size_is_a_strong_lower_bound() {
    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();
    canvas.update().unwrap();

    // Try to collapse the element; the STRONG minimums push back.
    canvas.move_handle(id, Element::SE, (2.0, 3.0)).unwrap();
    canvas.update().unwrap();

    let element = canvas.item_of::<Element>(id).unwrap();
    assert!(close(element.width(canvas.solver()), 10.0));
    assert!(close(element.height(canvas.solver()), 10.0));
}

#[test]
fn test_normalization_moves_offset_into_matrix() {
    // Handle 0 dragged to local (5, 7): after update it is back at the
    // origin and the matrix translation grew by (5, 7).
    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();
    canvas.update().unwrap();

    canvas.move_handle(id, Element::NW, (5.0, 7.0)).unwrap();
    canvas.update().unwrap();

    assert_eq!(corner(&canvas, id, Element::NW), (0.0, 0.0));
    let matrix = canvas.matrix(id).unwrap();
    assert!(close(matrix.tx, 5.0));
    assert!(close(matrix.ty, 7.0));

    // The south-east corner kept its canvas position.
    let se = canvas
        .matrix_i2c(id)
        .transform_point(corner(&canvas, id, Element::SE));
    assert!(close(se.0, 100.0) && close(se.1, 50.0));
}

#[test]
fn test_set_width_and_height() {
    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();
    canvas.update().unwrap();

    canvas
        .with_item::<Element, _>(id, |element, solver, bus| {
            element.set_width(solver, bus, 60.0);
            element.set_height(solver, bus, 30.0);
        })
        .unwrap();
    canvas.update().unwrap();

    let element = canvas.item_of::<Element>(id).unwrap();
    assert!(close(element.width(canvas.solver()), 60.0));
    assert!(close(element.height(canvas.solver()), 30.0));
    assert_eq!(corner(&canvas, id, Element::NE), (60.0, 0.0));
    assert_eq!(corner(&canvas, id, Element::SW), (0.0, 30.0));
}

#[test]
fn test_point_distance_to_border() {
    let mut canvas = Canvas::new();
    let element = Element::new(canvas.solver_mut(), 100.0, 50.0);
    let id = canvas.add(element, None).unwrap();
    canvas.update().unwrap();

    let element = canvas.item_of::<Element>(id).unwrap();
    assert!(close(element.point(canvas.solver(), 50.0, 25.0), 0.0));
    assert!(close(element.point(canvas.solver(), -3.0, 25.0), 3.0));
    assert!(close(element.point(canvas.solver(), 104.0, 53.0), 5.0));
}
