use std::{error::Error, result::Result};

use derivata_core::Value;
use ndarray::IxDyn;

use super::*;
use crate::test_utils::{are_similar, value};

fn constant(shape: &[usize], data: Vec<f64>) -> Result<Variable, Box<dyn Error>> {
    Ok(Variable::constant(value(shape, data)?))
}

#[test]
fn latch_reaches_zero_once() -> Result<(), Box<dyn Error>> {
    let accumulator = Accumulator::new();
    accumulator.expect(7, &[vec![2]], 3);

    assert!(!accumulator.add(7, 0, Some(constant(&[2], vec![1., 2.])?))?);
    assert!(!accumulator.add(7, 0, None)?);
    assert_eq!(accumulator.pending(7), Some(1));
    assert!(accumulator.add(7, 0, Some(constant(&[2], vec![3., 4.])?))?);

    let grads = accumulator.take(7)?;
    are_similar(
        grads[0].as_ref().ok_or("missing grad")?.value(),
        &value(&[2], vec![4., 6.])?,
    )?;
    assert_eq!(accumulator.pending(7), None);
    Ok(())
}

#[test]
fn take_before_ready() -> Result<(), Box<dyn Error>> {
    let accumulator = Accumulator::new();
    accumulator.expect(1, &[vec![]], 2);
    accumulator.add(1, 0, None)?;

    assert!(matches!(
        accumulator.take(1),
        Err(AutogradError::AccumulatorNotReady { node: 1, pending: 1 })
    ));
    Ok(())
}

#[test]
fn seed_does_not_count() -> Result<(), Box<dyn Error>> {
    let accumulator = Accumulator::new();
    accumulator.expect(3, &[vec![2], vec![1]], 0);
    accumulator.seed(3, 1, constant(&[1], vec![1.])?)?;

    let grads = accumulator.take(3)?;
    assert!(grads[0].is_none());
    are_similar(grads[1].as_ref().ok_or("missing seed")?.value(), &value(&[1], vec![1.])?)
}

#[test]
fn absent_contributions_keep_slots_empty() -> Result<(), Box<dyn Error>> {
    let accumulator = Accumulator::new();
    accumulator.expect(2, &[vec![3]], 2);
    accumulator.add(2, 0, None)?;
    accumulator.add(2, 0, None)?;

    assert!(accumulator.take(2)?.iter().all(Option::is_none));
    Ok(())
}

#[test]
fn shape_mismatch() -> Result<(), Box<dyn Error>> {
    let accumulator = Accumulator::new();
    accumulator.expect(5, &[vec![2, 2]], 1);

    let wrong = Variable::constant(Value::zeros(IxDyn(&[4])));
    assert!(matches!(
        accumulator.add(5, 0, Some(wrong)),
        Err(AutogradError::ShapeMismatch(_))
    ));
    Ok(())
}

#[test]
fn unknown_node() {
    let accumulator = Accumulator::new();
    assert!(accumulator.add(42, 0, None).is_err());
    assert!(accumulator.take(42).is_err());
}

#[test]
fn concurrent_adds() -> Result<(), Box<dyn Error>> {
    let accumulator = Accumulator::new();
    accumulator.expect(9, &[vec![2]], 64);

    let ready: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..64)
            .map(|_| {
                scope.spawn(|| {
                    let grad = Variable::constant(Value::ones(IxDyn(&[2])));
                    accumulator.add(9, 0, Some(grad))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| "worker panicked")?
                    .map_err(|e| e.to_string())
            })
            .collect::<Result<Vec<bool>, String>>()
    })?;

    assert_eq!(ready.iter().filter(|&&ready| ready).count(), 1);
    are_similar(
        accumulator.take(9)?[0].as_ref().ok_or("missing grad")?.value(),
        &value(&[2], vec![64., 64.])?,
    )
}

#[test]
fn buffers_lock_independently() -> Result<(), Box<dyn Error>> {
    let accumulator = Accumulator::new();
    accumulator.expect(5, &[vec![1]], 1);
    accumulator.expect(6, &[vec![1]], 1);

    let busy = accumulator.buffer(5)?;
    let _guard = busy.lock();
    let ready = std::thread::scope(|scope| {
        scope
            .spawn(|| accumulator.add(6, 0, Some(Variable::constant(Value::ones(IxDyn(&[1]))))))
            .join()
            .map_err(|_| "worker panicked")
    })??;

    assert!(ready);
    assert_eq!(accumulator.pending(6), Some(0));
    Ok(())
}
