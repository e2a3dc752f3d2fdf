//! Head/tail decoration of a body stream.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Nothing forwarded yet; `head` goes out with the first chunk.
    Head,
    Body,
    Done,
}

pin_project! {
    /// Emits `head` before the first body chunk and `tail` after the body
    /// ends. Holds at most one chunk back.
    ///
    /// A body that ends without producing anything still yields `head` then
    /// `tail`. A body error before the first chunk is forwarded without the
    /// head, and no error is ever followed by the tail.
    pub struct Scaffolded<S> {
        #[pin]
        body: S,
        head: Option<Bytes>,
        tail: Option<Bytes>,
        pending: Option<Bytes>,
        phase: Phase,
    }
}

impl<S> Scaffolded<S> {
    pub fn new(body: S, head: impl Into<Bytes>, tail: impl Into<Bytes>) -> Self {
        let non_empty = |b: Bytes| (!b.is_empty()).then_some(b);
        Self {
            body,
            head: non_empty(head.into()),
            tail: non_empty(tail.into()),
            pending: None,
            phase: Phase::Head,
        }
    }
}

impl<S> Stream for Scaffolded<S>
where
    S: Stream<Item = Result<Bytes, Error>>,
{
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(chunk) = this.pending.take() {
                return Poll::Ready(Some(Ok(chunk)));
            }

            match *this.phase {
                Phase::Done => return Poll::Ready(None),
                Phase::Head => match ready!(this.body.as_mut().poll_next(cx)) {
                    Some(Ok(chunk)) => {
                        *this.phase = Phase::Body;
                        match this.head.take() {
                            Some(head) => {
                                *this.pending = Some(chunk);
                                return Poll::Ready(Some(Ok(head)));
                            }
                            None => return Poll::Ready(Some(Ok(chunk))),
                        }
                    }
                    Some(Err(e)) => {
                        *this.phase = Phase::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    None => {
                        *this.phase = Phase::Done;
                        *this.pending = this.tail.take();
                        if let Some(head) = this.head.take() {
                            return Poll::Ready(Some(Ok(head)));
                        }
                    }
                },
                Phase::Body => match ready!(this.body.as_mut().poll_next(cx)) {
                    Some(Ok(chunk)) => return Poll::Ready(Some(Ok(chunk))),
                    Some(Err(e)) => {
                        *this.phase = Phase::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                    None => {
                        *this.phase = Phase::Done;
                        *this.pending = this.tail.take();
                    }
                },
            }
        }
    }
}
