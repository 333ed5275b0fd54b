pub use enclose::*;

/// Shorthand for [`crate::computed`] with captured clones.
///
/// ```ignore
/// let total = computed!((rate) this => Ok(this.get("count")?.as_f64().unwrap_or(0.0) * rate));
/// ```
#[macro_export]
macro_rules! computed {
    (( $($d_tt:tt)* ) $this:ident => $($b:tt)*) => {
        $crate::computed($crate::macros::enclose!(($( $d_tt )*) move |$this: &$crate::Subscriber| { $($b)* }))
    };
    ($this:ident => $($b:tt)*) => {
        $crate::computed(move |$this: &$crate::Subscriber| { $($b)* })
    };
}

/// Shorthand for [`crate::Control::on`] with captured clones.
#[macro_export]
macro_rules! on {
    ($model:expr, $expect:expr, ( $($d_tt:tt)* ) $keys:ident => $($b:tt)*) => {
        $model.on($expect, $crate::macros::enclose!(($( $d_tt )*) move |$keys: &[$crate::Key]| { $($b)* }), false)
    };
    ($model:expr, $expect:expr, $keys:ident => $($b:tt)*) => {
        $model.on($expect, move |$keys: &[$crate::Key]| { $($b)* }, false)
    };
}
