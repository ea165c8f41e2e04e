use sluice::prelude::*;
use sluice::{range, Backend, LoopBodyError, SluiceError};
use test_strategy::proptest;

fn runtime() -> Runtime<CpuBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    Runtime::new(CpuBackend::default())
}

#[test]
fn increments_a_fixed_number_of_times() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.zeros(shape![4], DType::F64)?;
    let report = do_while(&mut rt, Some(5), |rt| {
        rt.ufunc(Opcode::Add, &[(&a).into(), (&a).into(), 1.0.into()])?;
        Ok(None)
    })?;
    assert_eq!(report.iterations, 5);
    assert_eq!(rt.to_vec::<f64>(&a)?, vec![5.0; 4]);
    Ok(())
}

#[test]
fn stops_when_the_condition_is_false() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.zeros(shape![4], DType::I64)?;
    let report = do_while(&mut rt, None, |rt| {
        rt.ufunc(Opcode::Add, &[(&a).into(), (&a).into(), 1.into()])?;
        let total = rt.sum(&a)?;
        let cond = rt.less(&total, 10)?;
        rt.release_view(&total)?;
        Ok(Some(cond))
    })?;
    assert_eq!(report.iterations, 3);
    assert_eq!(rt.to_vec::<i64>(&a)?, vec![3; 4]);
    Ok(())
}

#[test]
fn condition_also_respects_the_trip_count() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.zeros(shape![1], DType::I32)?;
    let report = do_while(&mut rt, Some(2), |rt| {
        rt.ufunc(Opcode::Add, &[(&a).into(), (&a).into(), 1.into()])?;
        rt.less(&a, 100).map(Some)
    })?;
    assert_eq!(report.iterations, 2);
    assert_eq!(rt.to_vec::<i32>(&a)?, vec![2]);
    Ok(())
}

#[test]
fn cumulative_product_with_sliding_views() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.arange(1, 6, DType::I64)?;
    do_while(&mut rt, Some(4), |rt| {
        let i = rt.iterator(1);
        let current = a.at(&idx![i])?;
        let previous = a.at(&idx![i - 1])?;
        rt.ufunc(
            Opcode::Multiply,
            &[(&current).into(), (&current).into(), (&previous).into()],
        )?;
        Ok(None)
    })?;
    assert_eq!(rt.to_vec::<i64>(&a)?, vec![1, 2, 6, 24, 120]);
    Ok(())
}

#[test]
fn growing_window_computes_prefix_sums() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.arange(1, 5, DType::F32)?;
    let out = rt.zeros(shape![4], DType::F32)?;
    do_while(&mut rt, Some(4), |rt| {
        let i = rt.iterator(1);
        let window = a.at(&idx![range(0, i)])?;
        let target = out.at(&idx![i - 1])?;
        rt.reduce(Opcode::Add, &target, &window, 0)?;
        Ok(None)
    })?;
    assert_eq!(rt.to_vec::<f32>(&out)?, vec![1.0, 3.0, 6.0, 10.0]);
    Ok(())
}

#[test]
fn backwards_iteration_over_rows() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.arange(0, 6, DType::I32)?.reshape(shape![3, 2])?;
    let out = rt.zeros(shape![3, 2], DType::I32)?;
    do_while(&mut rt, Some(3), |rt| {
        let i = rt.iterator(0);
        let src = a.at(&idx![-i - 1, full()])?;
        let dst = out.at(&idx![i, full()])?;
        rt.assign(&dst, &src)?;
        Ok(None)
    })?;
    assert_eq!(rt.to_vec::<i32>(&out)?, vec![4, 5, 2, 3, 0, 1]);
    Ok(())
}

#[test]
fn slides_over_an_offset_slice() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.arange(0, 10, DType::I64)?;
    let v = a.slice(&idx![3..8])?;

    let out = rt.zeros(shape![5], DType::I64)?;
    do_while(&mut rt, Some(5), |rt| {
        let i = rt.iterator(0);
        rt.assign(&out.at(&idx![i])?, &v.at(&idx![i])?)?;
        Ok(None)
    })?;
    assert_eq!(rt.to_vec::<i64>(&out)?, vec![3, 4, 5, 6, 7]);

    // Starting from the end wraps back to the start of the slice.
    let wrapped = rt.zeros(shape![4], DType::I64)?;
    do_while(&mut rt, Some(4), |rt| {
        let i = rt.iterator(-2);
        let j = rt.iterator(0);
        rt.assign(&wrapped.at(&idx![j])?, &v.at(&idx![i])?)?;
        Ok(None)
    })?;
    assert_eq!(rt.to_vec::<i64>(&wrapped)?, vec![6, 7, 3, 4]);
    Ok(())
}

#[test]
fn slides_over_a_column_window() -> anyhow::Result<()> {
    let mut rt = runtime();
    let m = rt.arange(0, 15, DType::I64)?.reshape(shape![3, 5])?;
    let cols = m.slice(&idx![.., 1..5])?;

    let first_row = rt.zeros(shape![4], DType::I64)?;
    do_while(&mut rt, Some(4), |rt| {
        let i = rt.iterator(0);
        rt.assign(&first_row.at(&idx![i])?, &cols.at(&idx![0, i])?)?;
        Ok(None)
    })?;
    assert_eq!(rt.to_vec::<i64>(&first_row)?, vec![1, 2, 3, 4]);

    let last_row = rt.zeros(shape![4], DType::I64)?;
    do_while(&mut rt, Some(4), |rt| {
        let i = rt.iterator(-1);
        let j = rt.iterator(0);
        rt.assign(&last_row.at(&idx![j])?, &cols.at(&idx![2, i])?)?;
        Ok(None)
    })?;
    assert_eq!(rt.to_vec::<i64>(&last_row)?, vec![14, 11, 12, 13]);
    Ok(())
}

#[test]
fn nested_sliding_views_compose() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.arange(0, 10, DType::I64)?;
    let out = rt.zeros(shape![6], DType::I64)?;
    do_while(&mut rt, Some(3), |rt| {
        let i = rt.iterator(0);
        let outer = a.at(&idx![range(i, i + 6)])?;
        let j = rt.iterator(0) * 2;
        let inner = outer.at(&idx![range(j, j + 2)])?;
        let dst = out.at(&idx![range(j, j + 2)])?;
        rt.assign(&dst, &inner)?;
        Ok(None)
    })?;
    assert_eq!(rt.to_vec::<i64>(&out)?, vec![0, 1, 3, 4, 6, 7]);
    Ok(())
}

#[test]
fn out_of_bounds_iterators_fail_before_anything_runs() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.zeros(shape![3], DType::F32)?;
    let err = do_while(&mut rt, Some(4), |rt| {
        let i = rt.iterator(0);
        rt.assign(&a.at(&idx![i])?, 1.0)?;
        Ok(None)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        SluiceError::OutOfBounds {
            dim: 0,
            len: 3,
            first: 0,
            last: 3
        }
    ));
    assert_eq!(rt.backend().queued_ops(), 0);
    assert_eq!(rt.to_vec::<f32>(&a)?, vec![0.0; 3]);
    Ok(())
}

#[test]
fn windows_must_keep_their_shape_when_both_ends_move() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.zeros(shape![8], DType::F32)?;
    let err = do_while(&mut rt, Some(2), |rt| {
        let i = rt.iterator(0);
        rt.assign(&a.at(&idx![range(i, 2 * i + 1)])?, 1.0)?;
        Ok(None)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        SluiceError::InconsistentShape {
            start_step: 1,
            stop_step: 2
        }
    ));
    Ok(())
}

#[test]
fn rejects_bodies_without_work() {
    let mut rt = runtime();
    let err = do_while(&mut rt, Some(1), |_| Ok(None)).unwrap_err();
    assert!(matches!(
        err,
        SluiceError::InvalidLoopBody(LoopBodyError::NoOperations)
    ));
}

#[proptest(cases = 16)]
fn trip_count_is_honoured(#[strategy(1u64..32)] niters: u64, #[strategy(1usize..8)] len: usize) {
    let mut rt = runtime();
    let a = rt.zeros(shape![len], DType::U32).unwrap();
    let report = do_while(&mut rt, Some(niters), |rt| {
        rt.ufunc(Opcode::Add, &[(&a).into(), (&a).into(), 1u32.into()])?;
        Ok(None)
    })
    .unwrap();
    assert_eq!(report.iterations, niters);
    assert_eq!(rt.to_vec::<u32>(&a).unwrap(), vec![niters as u32; len]);
}
