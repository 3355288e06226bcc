use std::cell::RefCell;
use std::rc::Rc;
use vellum::prelude::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9
}

#[test]
fn test_equation_solves_for_weakest_operand() {
    // a + b - c = 0 with b and c pinned STRONG leaves a as the target.
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(0.0, strength::NORMAL);
    let b = solver.variable(4.0, strength::STRONG);
    let c = solver.variable(5.0, strength::STRONG);
    solver.add_constraint(Constraint::Equation {
        operands: vec![a, b, c],
        f: Box::new(|values: &[f64]| values[0] + values[1] - values[2]),
    });

    solver.solve(&mut bus).unwrap();

    assert!(close(solver.value(a), 1.0), "a = {}", solver.value(a));
    assert!(close(solver.value(b), 4.0));
    assert!(close(solver.value(c), 5.0));
}

#[test]
fn test_equality_targets_least_recently_written() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(1.0, strength::NORMAL);
    let b = solver.variable(2.0, strength::NORMAL);
    solver.add_constraint(Constraint::Equality { a, b });

    solver.set_value(&mut bus, b, 5.0);
    solver.solve(&mut bus).unwrap();

    // b was written most recently, so a loses the tie and follows.
    assert!(close(solver.value(a), 5.0));
    assert!(close(solver.value(b), 5.0));
}

#[test]
fn test_required_variables_are_never_targets() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(3.0, strength::REQUIRED);
    let b = solver.variable(7.0, strength::NORMAL);
    solver.add_constraint(Constraint::Equality { a, b });

    solver.set_value(&mut bus, a, 4.0);
    solver.solve(&mut bus).unwrap();

    assert!(close(solver.value(a), 4.0));
    assert!(close(solver.value(b), 4.0));
}

#[test]
fn test_all_required_violation_is_reported() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(1.0, strength::REQUIRED);
    let b = solver.variable(2.0, strength::REQUIRED);
    let id = solver.add_constraint(Constraint::Equality { a, b });

    let result = solver.solve(&mut bus);

    match result {
        Err(VellumError::UnresolvableConstraints(pending)) => {
            assert!(pending.contains(&id));
        }
        other => panic!("expected unresolvable constraints, got {other:?}"),
    }
    assert!(close(solver.value(a), 1.0));
    assert!(close(solver.value(b), 2.0));
}

#[test]
fn test_center_and_balance() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();

    let a = solver.variable(0.0, strength::STRONG);
    let b = solver.variable(10.0, strength::STRONG);
    let center = solver.variable(0.0, strength::NORMAL);
    solver.add_constraint(Constraint::Center { center, a, b });

    let v = solver.variable(0.0, strength::NORMAL);
    let c = solver.variable(4.0, strength::STRONG);
    let d = solver.variable(12.0, strength::STRONG);
    solver.add_constraint(Constraint::Balance {
        var: v,
        a: c,
        b: d,
        ratio: 0.25,
    });

    solver.solve(&mut bus).unwrap();

    assert!(close(solver.value(center), 5.0));
    assert!(close(solver.value(v), 6.0));
}

#[test]
fn test_less_than_only_adjusts_when_violated() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let smaller = solver.variable(5.0, strength::STRONG);
    let bigger = solver.variable(3.0, strength::NORMAL);
    solver.add_constraint(Constraint::LessThan { smaller, bigger });

    solver.solve(&mut bus).unwrap();
    assert!(close(solver.value(bigger), 5.0));

    // At exact equality no write happens: a second pass is silent.
    let writes = Rc::new(RefCell::new(0));
    {
        let writes = writes.clone();
        bus.observe(move |event| {
            if matches!(event, Event::VariableSet { .. }) {
                *writes.borrow_mut() += 1;
            }
        });
    }
    solver.set_value(&mut bus, bigger, 5.0);
    solver.solve(&mut bus).unwrap();
    assert_eq!(*writes.borrow(), 0);
}

#[test]
fn test_solve_is_idempotent_at_fixed_point() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(1.0, strength::NORMAL);
    let b = solver.variable(9.0, strength::NORMAL);
    solver.add_constraint(Constraint::Equality { a, b });
    solver.solve(&mut bus).unwrap();

    let writes = Rc::new(RefCell::new(0));
    {
        let writes = writes.clone();
        bus.observe(move |event| {
            if matches!(event, Event::VariableSet { .. }) {
                *writes.borrow_mut() += 1;
            }
        });
    }
    solver.solve(&mut bus).unwrap();
    assert_eq!(*writes.borrow(), 0);
}

#[test]
fn test_assigning_current_value_is_not_observed() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(2.5, strength::NORMAL);

    let events = Rc::new(RefCell::new(Vec::new()));
    {
        let events = events.clone();
        bus.observe(move |event| events.borrow_mut().push(event.clone()));
    }
    solver.set_value(&mut bus, a, 2.5);
    solver.set_value(&mut bus, a, 2.5 + 1e-12);

    assert!(events.borrow().is_empty());
}

#[test]
fn test_contradictory_constraints_terminate_and_report_both() {
    // a = b + 1 and a = b cannot both hold; solving must halt and name
    // both constraints.
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(0.0, strength::STRONG);
    let b = solver.variable(0.0, strength::STRONG);
    let first = solver.add_constraint(Constraint::Equation {
        operands: vec![a, b],
        f: Box::new(|values: &[f64]| values[0] - values[1] - 1.0),
    });
    let second = solver.add_constraint(Constraint::Equation {
        operands: vec![a, b],
        f: Box::new(|values: &[f64]| values[0] - values[1]),
    });

    match solver.solve(&mut bus) {
        Err(VellumError::UnresolvableConstraints(pending)) => {
            assert!(pending.contains(&first), "missing {first:?} in {pending:?}");
            assert!(pending.contains(&second), "missing {second:?} in {pending:?}");
        }
        other => panic!("expected unresolvable constraints, got {other:?}"),
    }
}

#[test]
fn test_non_convergent_equation_is_reported_and_stays_dirty() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(0.0, strength::NORMAL);
    let id = solver.add_constraint(Constraint::Equation {
        operands: vec![a],
        f: Box::new(|values: &[f64]| values[0].abs() + 1.0), // no root anywhere
    });

    for _ in 0..2 {
        match solver.solve(&mut bus) {
            Err(VellumError::UnresolvableConstraints(pending)) => {
                assert!(pending.contains(&id));
            }
            other => panic!("expected unresolvable constraints, got {other:?}"),
        }
    }
}

#[test]
fn test_pinned_point_is_never_written() {
    // The position kinds always adjust their designated point; a point
    // with a REQUIRED component is pinned instead, and the violation is
    // reported rather than solved.
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let source = solver.position((3.0, 4.0), strength::NORMAL);
    let target = solver.position((0.0, 0.0), strength::REQUIRED);
    let id = solver.add_constraint(Constraint::PositionEqual { source, target });

    match solver.solve(&mut bus) {
        Err(VellumError::UnresolvableConstraints(pending)) => {
            assert!(pending.contains(&id));
        }
        other => panic!("expected unresolvable constraints, got {other:?}"),
    }
    assert_eq!(solver.point(target), (0.0, 0.0));

    // Once the relation holds on its own, the pinned point is no error.
    solver.set_point(&mut bus, source, (0.0, 0.0));
    solver.solve(&mut bus).unwrap();
}

#[test]
fn test_remove_constraint_rejects_unknown() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(0.0, strength::NORMAL);
    let b = solver.variable(1.0, strength::NORMAL);
    let id = solver.add_constraint(Constraint::Equality { a, b });

    solver.remove_constraint(id).unwrap();
    assert_eq!(
        solver.remove_constraint(id),
        Err(VellumError::UnknownConstraint)
    );

    // A removed constraint no longer resolves.
    solver.set_value(&mut bus, a, 42.0);
    solver.solve(&mut bus).unwrap();
    assert!(close(solver.value(b), 1.0));
}

#[test]
fn test_chained_equalities_propagate() {
    let mut solver = Solver::new();
    let mut bus = EventBus::new();
    let a = solver.variable(0.0, strength::NORMAL);
    let b = solver.variable(0.0, strength::NORMAL);
    let c = solver.variable(0.0, strength::NORMAL);
    solver.add_constraint(Constraint::Equality { a, b });
    solver.add_constraint(Constraint::Equality { a: b, b: c });
    solver.solve(&mut bus).unwrap();

    solver.set_value(&mut bus, a, 8.0);
    solver.solve(&mut bus).unwrap();

    assert!(close(solver.value(b), 8.0));
    assert!(close(solver.value(c), 8.0));
}
