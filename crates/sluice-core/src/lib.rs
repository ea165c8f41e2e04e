mod backend;
mod base;
mod config;
#[cfg(feature = "cpu")]
pub mod cpu;
mod dispatch;
mod dtype;
mod dynamic;
mod error;
mod index;
mod iterator;
mod looping;
mod op;
mod runtime;
mod scalar;
mod shape;
mod strides;
mod view;

pub use backend::*;
pub use base::*;
pub use config::*;
pub use dispatch::*;
pub use dtype::*;
pub use dynamic::*;
pub use error::*;
pub use index::*;
pub use iterator::*;
pub use looping::*;
pub use op::*;
pub use runtime::*;
pub use scalar::*;
pub use shape::*;
pub use strides::*;
pub use view::*;

use smallvec::SmallVec;
pub type RVec<T> = SmallVec<[T; 4]>;

//https://github.com/sonos/tract/blob/main/data/src/macros.rs#L2
#[macro_export]
macro_rules! rvec {
    (@one $x:expr) => (1usize);
    ($elem:expr; $n:expr) => ({
        $crate::RVec::from_elem($elem, $n)
    });
    ($($x:expr),*$(,)*) => ({
        let count = 0usize $(+ rvec![@one $x])*;
        #[allow(unused_mut)]
        let mut vec = $crate::RVec::new();
        if count <= vec.inline_size() {
            $(vec.push($x);)*
            vec
        } else {
            $crate::RVec::from_vec(vec![$($x,)*])
        }
    });
}

#[macro_export]
macro_rules! shape {
    ($($x:expr),*$(,)*) => ({
        use $crate::rvec;
        $crate::Shape::new(rvec![$($x,)*])
    });
}

/// Builds an index expression for [`View::at`].
///
/// Each element is anything convertible into [`IndexElem`]: integers, ranges,
/// [`LoopIter`]s, or [`IndexElem`] values built with [`range`] / [`full`].
#[macro_export]
macro_rules! idx {
    ($($x:expr),*$(,)*) => ({
        use $crate::rvec;
        let elems: $crate::RVec<$crate::IndexElem> = $crate::rvec![$($crate::IndexElem::from($x),)*];
        elems
    });
}

pub mod prelude {
    pub use crate::{
        do_while, full, idx, range, rvec, shape, DType, LoopIter, Opcode, Operand, Runtime,
        Scalar, Shape, View,
    };
    #[cfg(feature = "cpu")]
    pub use crate::cpu::CpuBackend;
}

#[cfg(all(test, feature = "cpu"))]
pub(crate) mod test_util {
    use crate::{cpu::CpuBackend, Runtime};

    pub fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub fn cpu_runtime() -> Runtime<CpuBackend> {
        init_logger();
        Runtime::new(CpuBackend::default())
    }
}
