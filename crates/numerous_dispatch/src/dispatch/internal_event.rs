//! Metrics and trace events emitted by the dispatch core.

use std::time::Duration;

use http::StatusCode;
use metrics::{counter, histogram};

/// An observable event. Emitting records metrics and writes a trace line.
pub(crate) trait InternalEvent {
    fn emit(self);
}

pub(crate) struct RequestCompleted<'a> {
    pub method: &'a http::Method,
    pub status: StatusCode,
    pub attempt: u32,
    pub elapsed: Duration,
}

impl InternalEvent for RequestCompleted<'_> {
    fn emit(self) {
        counter!("numerous_requests_total", "status" => self.status.as_u16().to_string())
            .increment(1);
        histogram!("numerous_response_time_seconds").record(self.elapsed);
        trace!(
            target: "numerous_dispatch::stats",
            method = %self.method,
            status = self.status.as_u16(),
            attempt = self.attempt,
            elapsed_ms = self.elapsed.as_millis(),
            "Response received"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum DelayKind {
    Retry,
    Voluntary,
}

impl DelayKind {
    const fn as_str(self) -> &'static str {
        match self {
            DelayKind::Retry => "retry",
            DelayKind::Voluntary => "voluntary",
        }
    }
}

pub(crate) struct ThrottleDelay {
    pub kind: DelayKind,
    pub delay: Duration,
}

impl InternalEvent for ThrottleDelay {
    fn emit(self) {
        histogram!("numerous_throttle_delay_seconds", "kind" => self.kind.as_str())
            .record(self.delay);
        debug!(
            target: "numerous_dispatch::stats",
            kind = self.kind.as_str(),
            delay_ms = self.delay.as_millis(),
            "Throttle delay"
        );
    }
}

pub(crate) struct RetryCeilingReached {
    pub attempts: u32,
}

impl InternalEvent for RetryCeilingReached {
    fn emit(self) {
        counter!("numerous_retry_ceiling_total").increment(1);
        warn!(
            message = "Retry ceiling reached; interpreting last response.",
            attempts = self.attempts,
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Chunk {
    First,
    Additional,
}

pub(crate) struct PageFetched {
    pub chunk: Chunk,
    pub items: usize,
}

impl InternalEvent for PageFetched {
    fn emit(self) {
        let chunk = match self.chunk {
            Chunk::First => "first",
            Chunk::Additional => "additional",
        };
        counter!("numerous_pages_total", "chunk" => chunk).increment(1);
        trace!(
            target: "numerous_dispatch::stats",
            chunk,
            items = self.items,
            "Page fetched"
        );
    }
}

pub(crate) struct DuplicateFiltered<'a> {
    pub key: &'a str,
}

impl InternalEvent for DuplicateFiltered<'_> {
    fn emit(self) {
        counter!("numerous_duplicates_filtered_total").increment(1);
        debug!(
            target: "numerous_dispatch::stats",
            key = self.key,
            "Dropped item repeated across page boundary"
        );
    }
}
