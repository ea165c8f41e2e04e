use crate::{Backend, DType, LoopBodyError, Result, Runtime, View};

/// Outcome of a [`do_while`] loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopReport {
    /// Executions of the recorded body, the priming one included.
    pub iterations: u64,
}

/// Records `body` once and has the backend replay it.
///
/// The body runs a single time on the host to record its array operations;
/// the backend then executes that batch up to `niters` times (or the
/// configured unbounded trip count), sliding every view built from
/// [`Runtime::iterator`] between executions. If the body returns a
/// one-element bool array, the loop stops after the first execution that
/// leaves it false.
///
/// The body must not read array data on the host, since that would flush
/// the batch being recorded.
pub fn do_while<B, F>(rt: &mut Runtime<B>, niters: Option<u64>, body: F) -> Result<LoopReport>
where
    B: Backend,
    F: FnOnce(&mut Runtime<B>) -> Result<Option<View>>,
{
    let trip_count = niters.unwrap_or(rt.config().unbounded_trip_count);
    rt.flush()?;
    let flushes = rt.backend().flush_count();
    let queued = rt.backend().queued_ops();
    log::debug!("Priming loop body, trip count {}", trip_count);

    rt.set_trip_count(Some(trip_count));
    let recorded = body(rt);
    rt.set_trip_count(None);
    let condition = recorded?;

    if rt.backend().flush_count() != flushes {
        return Err(LoopBodyError::ForcedFlush.into());
    }
    if rt.backend().queued_ops() <= queued {
        return Err(LoopBodyError::NoOperations.into());
    }

    let condition = match condition {
        Some(cond) => Some(condition_handle(rt, &cond)?),
        None => None,
    };
    let iterations = rt.backend_mut().flush_and_repeat(trip_count, condition)?;
    log::debug!("Loop finished after {} iterations", iterations);
    Ok(LoopReport { iterations })
}

fn condition_handle<B: Backend>(rt: &mut Runtime<B>, cond: &View) -> Result<B::Handle> {
    if cond.dt() != DType::Bool {
        return Err(LoopBodyError::WrongDType(cond.dt()).into());
    }
    if cond.numel() != 1 {
        return Err(LoopBodyError::WrongShape(cond.shape().clone()).into());
    }
    if !rt.is_base(cond) {
        return Err(LoopBodyError::NotABase.into());
    }
    let handle = rt.base_handle(cond.base())?;
    rt.backend_mut().sync(handle)?;
    Ok(handle)
}

#[cfg(all(test, feature = "cpu"))]
mod tests {
    use super::*;
    use crate::{idx, shape, test_util::cpu_runtime, Opcode, SluiceError};

    #[test]
    fn fixed_trip_count() -> anyhow::Result<()> {
        let mut rt = cpu_runtime();
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
    fn empty_body_is_rejected() {
        let mut rt = cpu_runtime();
        let err = do_while(&mut rt, Some(3), |_| Ok(None)).unwrap_err();
        assert!(matches!(
            err,
            SluiceError::InvalidLoopBody(LoopBodyError::NoOperations)
        ));
    }

    #[test]
    fn host_reads_are_rejected() -> anyhow::Result<()> {
        let mut rt = cpu_runtime();
        let a = rt.zeros(shape![2], DType::I32)?;
        let err = do_while(&mut rt, Some(3), |rt| {
            rt.ufunc(Opcode::Add, &[(&a).into(), (&a).into(), 1.into()])?;
            rt.to_vec::<i32>(&a)?;
            Ok(None)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SluiceError::InvalidLoopBody(LoopBodyError::ForcedFlush)
        ));
        Ok(())
    }

    #[test]
    fn condition_must_be_a_bool_base() -> anyhow::Result<()> {
        let mut rt = cpu_runtime();
        let a = rt.zeros(shape![2], DType::I32)?;

        let err = do_while(&mut rt, Some(3), |rt| rt.add(&a, 1).map(Some)).unwrap_err();
        assert!(matches!(
            err,
            SluiceError::InvalidLoopBody(LoopBodyError::WrongDType(DType::I32))
        ));

        let err = do_while(&mut rt, Some(3), |rt| rt.less(&a, 1).map(Some)).unwrap_err();
        assert!(matches!(
            err,
            SluiceError::InvalidLoopBody(LoopBodyError::WrongShape(_))
        ));

        let err = do_while(&mut rt, Some(3), |rt| {
            let mask = rt.less(&a, 1)?;
            Ok(Some(mask.slice(&idx![1..2])?))
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SluiceError::InvalidLoopBody(LoopBodyError::NotABase)
        ));
        Ok(())
    }

    #[test]
    fn iterators_are_unbound_after_the_body() -> anyhow::Result<()> {
        let mut rt = cpu_runtime();
        let a = rt.zeros(shape![3], DType::I64)?;
        do_while(&mut rt, Some(3), |rt| {
            assert_eq!(rt.iterator(0).max_iter(), 3);
            let i = rt.iterator(0);
            rt.assign(&a.at(&idx![i])?, 7)?;
            Ok(None)
        })?;
        assert_eq!(rt.iterator(0).max_iter(), 0);
        assert_eq!(rt.to_vec::<i64>(&a)?, vec![7, 7, 7]);
        Ok(())
    }
}
