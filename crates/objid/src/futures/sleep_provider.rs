use core::{future::Future, time::Duration};

/// A trait that abstracts over how to sleep for a given [`Duration`] in async
/// contexts.
///
/// The reconciliation coordinator uses it for backoff between attempts and to
/// enforce deadlines, which keeps it generic over runtimes like `Tokio` or
/// `Smol`.
pub trait SleepProvider {
    /// The returned future must be `Send` so coordinators can run on
    /// multi-threaded executors.
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send;
}
