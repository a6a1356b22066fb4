#[cold]
#[inline(always)]
fn cold_path() {}

#[doc(hidden)]
#[inline(always)]
pub fn _unlikely(b: bool) -> bool {
    if b {
        cold_path()
    }
    b
}

macro_rules! unlikely {
    ($e:expr) => {
        $crate::internal::optim::_unlikely($e)
    };
}

#[doc(hidden)]
#[inline(always)]
pub fn _likely(b: bool) -> bool {
    if !b {
        cold_path()
    }
    b
}

macro_rules! likely {
    ($e:expr) => {
        $crate::internal::optim::_likely($e)
    };
}
