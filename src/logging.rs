//! Helper macros enforcing consistent pipeline log fields.
//!
//! These macros keep `transform` and `side` fields present on every log
//! emitted from the executor and plan layers so downstream parsing can rely
//! on them.

/// Log an event for a transform/side pair plus any extra fields.
#[macro_export]
macro_rules! transform_event {
    ($level:ident, $target:expr, $event:expr, $id:expr, transform = $transform:expr, side = $side:expr $(, $field:ident = $value:expr )* $(,)?) => {
        tracing::$level!(
            target: $target,
            event = $event,
            event_id = $id,
            transform = %$transform,
            side = $side,
            $($field = %$value,)*
        )
    };
}
