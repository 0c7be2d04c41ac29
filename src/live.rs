//! Live result streams.

use crate::error::{GeoError, Result};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::AbortHandle;

/// A push-driven sequence of snapshots.
///
/// The stream owns whatever keeps it alive (observer registrations, background
/// merge tasks); dropping it releases them and cancels the underlying store
/// subscriptions. A terminal `Err` item is followed by the end of the stream.
pub struct LiveStream<T> {
    inner: BoxStream<'static, Result<T>>,
    resources: Vec<Box<dyn Send>>,
}

impl<T> LiveStream<T> {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            resources: Vec::new(),
        }
    }

    /// Tie a resource's lifetime to the stream.
    pub(crate) fn with_resource<R: Send + 'static>(mut self, resource: R) -> Self {
        self.resources.push(Box::new(resource));
        self
    }
}

impl<T> Stream for LiveStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T> fmt::Debug for LiveStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveStream")
            .field("resources", &self.resources.len())
            .finish()
    }
}

/// Aborts a background task when dropped.
pub(crate) struct TaskGuard(pub(crate) AbortHandle);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Resolve a live stream to its first emitted value.
///
/// Stays pending for as long as the stream stays silent; there is no default
/// value. A stream that ends without emitting yields [`GeoError::Closed`].
///
/// ```
/// use spatio_live::live::first_value;
/// use futures::stream;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let value = first_value(stream::iter([Ok::<_, spatio_live::GeoError>(7), Ok(8)])).await?;
/// assert_eq!(value, 7);
/// # Ok::<(), spatio_live::GeoError>(())
/// # }).unwrap();
/// ```
pub async fn first_value<T, S>(mut stream: S) -> Result<T>
where
    S: Stream<Item = Result<T>> + Unpin,
{
    match stream.next().await {
        Some(item) => item,
        None => Err(GeoError::Closed),
    }
}
