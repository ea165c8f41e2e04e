use std::alloc::Layout;

use crate::{BackendError, DType, HostMemory, TensorDType};

/// Alignment of every host buffer; enough for the widest element type.
pub(crate) const BUFFER_ALIGNMENT: usize = 16;

/// Zero-initialized, aligned host allocation.
#[derive(PartialEq, Eq)]
pub struct HostBuffer(*mut u8, Layout);

impl HostBuffer {
    pub fn zeroed(size: usize) -> Result<Self, BackendError> {
        let layout = Layout::from_size_align(size, BUFFER_ALIGNMENT)
            .map_err(|e| BackendError::Execution(e.to_string()))?;
        let data = if size == 0 {
            std::ptr::null_mut::<u8>().wrapping_add(BUFFER_ALIGNMENT)
        } else {
            let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
            if ptr.is_null() {
                return Err(BackendError::OutOfMemory {
                    requested: size,
                    available: 0,
                });
            }
            ptr
        };
        Ok(Self(data, layout))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BackendError> {
        let mut raw = Self::zeroed(bytes.len())?;
        raw.as_bytes_mut().copy_from_slice(bytes);
        Ok(raw)
    }

    pub fn n_bytes(&self) -> usize {
        self.1.size()
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.0, self.1.size()) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.0, self.1.size()) }
    }

    pub fn typed<T: TensorDType>(&self) -> Result<&[T], BackendError> {
        bytemuck::try_cast_slice(self.as_bytes()).map_err(|e| BackendError::Execution(e.to_string()))
    }

    pub fn typed_mut<T: TensorDType>(&mut self) -> Result<&mut [T], BackendError> {
        bytemuck::try_cast_slice_mut(self.as_bytes_mut())
            .map_err(|e| BackendError::Execution(e.to_string()))
    }

    pub fn dump(&self, dtype: DType, full: bool) -> String {
        fn dump_inner<T: TensorDType>(data: &[T], full: bool) -> String {
            let length = data.len().min(16);
            if full || data.len() <= 2 * length {
                format!("{:?}", data)
            } else {
                format!("{:?}...{:?}", &data[..length], &data[data.len() - length..])
            }
        }
        let dumped = match dtype {
            DType::Bool => self.typed::<u8>().map(|d| dump_inner(d, full)),
            DType::I32 => self.typed::<i32>().map(|d| dump_inner(d, full)),
            DType::I64 => self.typed::<i64>().map(|d| dump_inner(d, full)),
            DType::U32 => self.typed::<u32>().map(|d| dump_inner(d, full)),
            DType::U64 => self.typed::<u64>().map(|d| dump_inner(d, full)),
            DType::F16 => self.typed::<half::f16>().map(|d| dump_inner(d, full)),
            DType::BF16 => self.typed::<half::bf16>().map(|d| dump_inner(d, full)),
            DType::F32 => self.typed::<f32>().map(|d| dump_inner(d, full)),
            DType::F64 => self.typed::<f64>().map(|d| dump_inner(d, full)),
        };
        dumped.unwrap_or_else(|e| e.to_string())
    }
}

impl Clone for HostBuffer {
    fn clone(&self) -> Self {
        let mut copy = match Self::zeroed(self.n_bytes()) {
            Ok(copy) => copy,
            Err(_) => std::alloc::handle_alloc_error(self.1),
        };
        copy.as_bytes_mut().copy_from_slice(self.as_bytes());
        copy
    }
}

impl Drop for HostBuffer {
    fn drop(&mut self) {
        if self.1.size() > 0 {
            unsafe { std::alloc::dealloc(self.0, self.1) }
        }
    }
}

impl std::fmt::Debug for HostBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBuffer")
            .field("ptr", &self.0)
            .field("n_bytes", &self.n_bytes())
            .finish()
    }
}

unsafe impl Send for HostBuffer {}
unsafe impl Sync for HostBuffer {}

impl HostMemory for HostBuffer {
    fn as_bytes(&self) -> &[u8] {
        HostBuffer::as_bytes(self)
    }
}
