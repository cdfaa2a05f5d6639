//! Turns an engine's success/error event pair into one awaitable outcome.
//!
//! An engine call hands back a [`Request`] and keeps the matching [`Settle`]. The settle handle
//! is cheap to clone so it can be captured by both the success and the error callback; whichever
//! fires first wins and every later signal is ignored.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures_channel::oneshot;

use crate::{Result, StoreError};

/// Creates a pending request together with the handle that settles it.
pub fn request<T>() -> (Settle<T>, Request<T>) {
    let (tx, rx) = oneshot::channel();
    let settle = Settle {
        slot: Rc::new(RefCell::new(Some(tx))),
    };
    (settle, Request { rx })
}

/// Write side of a [`Request`].
pub struct Settle<T> {
    slot: Rc<RefCell<Option<oneshot::Sender<Result<T>>>>>,
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T> Settle<T> {
    /// Settles the request. Returns `false` if it was already settled.
    pub fn settle(&self, outcome: Result<T>) -> bool {
        let Some(tx) = self.slot.borrow_mut().take() else {
            return false;
        };
        // The receiver may already be gone (caller stopped waiting); that is not an error.
        let _ = tx.send(outcome);
        true
    }

    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub fn reject(&self, err: StoreError) -> bool {
        self.settle(Err(err))
    }

    pub fn is_settled(&self) -> bool {
        self.slot.borrow().is_none()
    }
}

/// Future side of a pending engine operation.
///
/// Resolves with whatever the engine signalled first. If every [`Settle`] handle is dropped
/// without signalling, the request fails with [`StoreError::Abandoned`].
#[must_use = "requests do nothing unless awaited"]
pub struct Request<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Request<T> {
    /// Builds an already-settled request; used by engines that complete synchronously.
    pub fn ready(outcome: Result<T>) -> Self {
        let (settle, req) = request();
        settle.settle(outcome);
        req
    }
}

impl<T> Future for Request<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(StoreError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
