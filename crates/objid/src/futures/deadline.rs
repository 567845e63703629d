use core::{future::Future, pin::pin, time::Duration};

use ::futures::future::{Either, select};

use crate::SleepProvider;

/// The deadline passed before the wrapped future completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Elapsed;

/// Drives `fut` to completion unless `remaining` runs out first.
///
/// `None` means no deadline. When the timer wins, `fut` is dropped at its
/// current suspension point.
pub(crate) async fn within<P, F>(remaining: Option<Duration>, fut: F) -> Result<F::Output, Elapsed>
where
    P: SleepProvider,
    F: Future,
{
    let Some(remaining) = remaining else {
        return Ok(fut.await);
    };
    if remaining.is_zero() {
        return Err(Elapsed);
    }
    let fut = pin!(fut);
    let timer = pin!(P::sleep_for(remaining));
    match select(fut, timer).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(((), _)) => Err(Elapsed),
    }
}
