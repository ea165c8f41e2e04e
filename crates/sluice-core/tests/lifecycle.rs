use sluice::prelude::*;
use sluice::{BackendError, CpuBackendConfig, HostPointer, SluiceError};

fn runtime() -> Runtime<CpuBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    Runtime::new(CpuBackend::default())
}

#[test]
fn releasing_one_base_leaves_others_alone() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.arange(0, 4, DType::I32)?;
    let b = rt.add(&a, 10)?;
    rt.release_view(&a)?;
    assert_eq!(rt.to_vec::<i32>(&b)?, vec![10, 11, 12, 13]);

    assert!(matches!(rt.to_vec::<i32>(&a), Err(SluiceError::UnknownBase(_))));
    assert!(matches!(rt.release_view(&a), Err(SluiceError::UnknownBase(_))));
    assert_eq!(rt.num_bases(), 1);
    assert_eq!(rt.backend().live_handles(), 1);
    Ok(())
}

#[test]
fn release_is_deferred_until_queued_work_ran() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.from_slice(&[2.0f64, 4.0], shape![2])?;
    let b = rt.multiply(&a, &a)?;
    rt.release_view(&a)?;
    assert_eq!(rt.backend().live_handles(), 2);
    rt.flush()?;
    assert_eq!(rt.backend().live_handles(), 1);
    assert_eq!(rt.to_vec::<f64>(&b)?, vec![4.0, 16.0]);
    Ok(())
}

#[test]
fn exported_memory_belongs_to_the_host() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.from_slice(&[1.5f32, 2.5, 3.5], shape![3])?;
    let doubled = rt.add(&a, &a)?;

    let values = {
        let pointer = rt
            .export_pointer(&doubled, false, true)?
            .ok_or_else(|| anyhow::anyhow!("no host memory"))?;
        assert!(pointer.is_owned());
        assert_eq!(pointer.dt(), DType::F32);
        pointer.to_vec::<f32>()
    };
    assert_eq!(values, Some(vec![3.0, 5.0, 7.0]));

    assert!(matches!(
        rt.to_vec::<f32>(&doubled),
        Err(SluiceError::Exported(_))
    ));
    assert!(matches!(
        rt.binary(Opcode::Add, &doubled, 1.0f32),
        Err(SluiceError::Exported(_))
    ));
    assert_eq!(rt.to_vec::<f32>(&a)?, vec![1.5, 2.5, 3.5]);
    Ok(())
}

#[test]
fn borrowed_pointers_see_current_data() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.full(shape![2, 2], 7, DType::U64)?;
    let pointer = rt.export_pointer(&a, false, false)?;
    match pointer {
        Some(p @ HostPointer::Borrowed { .. }) => {
            assert_eq!(p.len(), 4);
            assert_eq!(p.to_vec::<u64>(), Some(vec![7; 4]));
        }
        other => panic!("expected a borrowed pointer, got {:?}", other),
    }
    Ok(())
}

#[test]
fn allocation_failures_are_reported() {
    let backend = CpuBackend::new(CpuBackendConfig::new(Some(16)));
    let mut rt = Runtime::new(backend);
    let err = rt.empty(shape![8], DType::F32).unwrap_err();
    match err {
        SluiceError::Allocation { len, dtype, source } => {
            assert_eq!((len, dtype), (8, DType::F32));
            assert!(matches!(
                source,
                BackendError::OutOfMemory {
                    requested: 32,
                    available: 16
                }
            ));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(rt.num_bases(), 0);
    assert!(rt.empty(shape![4], DType::F32).is_ok());
}

#[test]
fn failed_fills_do_not_leak_bases() -> anyhow::Result<()> {
    let mut rt = runtime();
    let err = rt.from_slice(&[1u32, 2, 3], shape![2, 2]).unwrap_err();
    assert!(matches!(err, SluiceError::ShapeMismatch { .. }));
    assert_eq!(rt.num_bases(), 0);

    let a = rt.ones(shape![3], DType::I32)?;
    rt.unary(Opcode::Cos, &a).unwrap_err();
    assert_eq!(rt.num_bases(), 1);
    Ok(())
}

#[test]
fn is_base_requires_the_whole_buffer() -> anyhow::Result<()> {
    let mut rt = runtime();
    let a = rt.zeros(shape![2, 3], DType::F64)?;
    assert!(rt.is_base(&a));
    assert!(rt.is_base(&rt.full_view(a.base())?));
    assert!(!rt.is_base(&a.slice(&idx![1])?));
    assert!(!rt.is_base(&a.slice(&idx![.., 0..2])?));
    Ok(())
}
