use crate::error::{AdapterError, Result};
use crate::models::BodyStream;
use crate::utils::hash::{DigestAccumulator, DigestAlgorithm, DigestEncoding};
use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::sync::oneshot;

enum TeeOutcome {
    Finished(Vec<u8>),
    Failed(AdapterError),
}

/// Identity stream that hashes every chunk it forwards.
///
/// The tee pulls from its source only when polled, so it inherits the
/// consumer's back-pressure and never buffers. After the first error it
/// drops the source and ends.
pub struct DigestTee<'a> {
    source: Option<BodyStream<'a>>,
    accumulator: DigestAccumulator,
    outcome: Option<oneshot::Sender<TeeOutcome>>,
}

impl<'a> DigestTee<'a> {
    pub fn new(
        source: BodyStream<'a>,
        algorithm: DigestAlgorithm,
        limit: Option<u64>,
    ) -> (Self, DigestHandle) {
        let (tx, rx) = oneshot::channel();
        let tee = Self {
            source: Some(source),
            accumulator: DigestAccumulator::new(algorithm).with_limit(limit),
            outcome: Some(tx),
        };
        (tee, DigestHandle::new(algorithm, rx))
    }

    pub fn digest(&self, encoding: DigestEncoding) -> Result<String> {
        self.accumulator.digest(encoding)
    }

    fn report(&mut self, outcome: TeeOutcome) {
        self.source = None;
        if let Some(tx) = self.outcome.take() {
            // The handle may already be gone if the upload was abandoned.
            let _ = tx.send(outcome);
        }
    }

    fn finish(&mut self) {
        let outcome = match self.accumulator.finish() {
            Ok(()) => match self.accumulator.digest_bytes() {
                Ok(bytes) => TeeOutcome::Finished(bytes.to_vec()),
                Err(err) => TeeOutcome::Failed(err),
            },
            Err(err) => TeeOutcome::Failed(err),
        };
        self.report(outcome);
    }
}

impl Stream for DigestTee<'_> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(source) = this.source.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(source.as_mut().poll_next(cx)) {
            Some(Ok(chunk)) => match this.accumulator.write(&chunk) {
                Ok(()) => Poll::Ready(Some(Ok(chunk))),
                Err(err) => {
                    let forwarded = io::Error::new(io::ErrorKind::InvalidData, err.to_string());
                    this.report(TeeOutcome::Failed(err));
                    Poll::Ready(Some(Err(forwarded)))
                }
            },
            Some(Err(err)) => {
                let forwarded = io::Error::new(err.kind(), err.to_string());
                this.report(TeeOutcome::Failed(AdapterError::SourceStream(err)));
                Poll::Ready(Some(Err(forwarded)))
            }
            None => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }
}

enum HandleState {
    Pending(oneshot::Receiver<TeeOutcome>),
    Finished(Vec<u8>),
    Failed(Option<AdapterError>),
    Dropped,
}

/// Read side of a [`DigestTee`], kept by whoever owns the upload.
pub struct DigestHandle {
    algorithm: DigestAlgorithm,
    state: HandleState,
}

impl DigestHandle {
    fn new(algorithm: DigestAlgorithm, rx: oneshot::Receiver<TeeOutcome>) -> Self {
        Self {
            algorithm,
            state: HandleState::Pending(rx),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    fn settle(&mut self) {
        if let HandleState::Pending(rx) = &mut self.state {
            self.state = match rx.try_recv() {
                Ok(TeeOutcome::Finished(bytes)) => HandleState::Finished(bytes),
                Ok(TeeOutcome::Failed(err)) => HandleState::Failed(Some(err)),
                Err(oneshot::error::TryRecvError::Empty) => return,
                Err(oneshot::error::TryRecvError::Closed) => HandleState::Dropped,
            };
        }
    }

    pub fn is_finished(&mut self) -> bool {
        self.settle();
        matches!(self.state, HandleState::Finished(_))
    }

    /// The error the tee hit, if any. Returned once.
    pub fn take_failure(&mut self) -> Option<AdapterError> {
        self.settle();
        match &mut self.state {
            HandleState::Failed(err) => err.take(),
            _ => None,
        }
    }

    pub fn digest(&mut self, encoding: DigestEncoding) -> Result<String> {
        self.settle();
        match &self.state {
            HandleState::Finished(bytes) => Ok(encoding.encode(bytes)),
            HandleState::Pending(_) => Err(AdapterError::InvalidState(
                "digest requested before end of data".to_string(),
            )),
            HandleState::Failed(_) => Err(AdapterError::InvalidState(
                "digest unavailable after a stream failure".to_string(),
            )),
            HandleState::Dropped => Err(AdapterError::InvalidState(
                "body stream dropped before end of data".to_string(),
            )),
        }
    }
}
