//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use boxoffice_core::async_effect;
///
/// async_effect! {
///     let expired = waitlist.cleanup_expired_waitlist().await;
///     Some(ReaperAction::SweepCompleted { expired: expired.len() })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use boxoffice_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(60),
///     action: ReaperAction::Sweep
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}
