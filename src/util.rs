// Same contract as anyhow::ensure, minus the formatting machinery: bail out
// of the surrounding function with `err` unless `cond` holds.
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

pub(crate) use ensure;
