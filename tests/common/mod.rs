//! In-memory `PdfApi` used by the dispatcher and monitor tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use periwatch::dispatch::{GenerationRequest, PdfApi, RawReply};
use periwatch::error::PeriwatchError;
use periwatch::progress::{ProgressEvent, ProgressReceiver};
use tokio::time::Instant;

/// One scripted answer: an HTTP reply, or a transport failure.
pub enum Scripted {
    Reply(RawReply),
    Unreachable,
}

impl Scripted {
    fn into_result(self) -> Result<RawReply, PeriwatchError> {
        match self {
            Self::Reply(r) => Ok(r),
            Self::Unreachable => Err(PeriwatchError::Other("connection refused".into())),
        }
    }
}

pub struct FakeApi {
    generate: Mutex<Option<Scripted>>,
    statuses: Mutex<VecDeque<Scripted>>,
    fallback_status: RawReply,
    cleanup: Mutex<Option<Scripted>>,
    pub generate_calls: AtomicUsize,
    pub status_calls: Mutex<Vec<(String, Instant)>>,
    pub cleanup_hours: Mutex<Vec<u32>>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeApi {
    /// Status polls answer `running` unless scripted otherwise.
    pub fn new() -> Self {
        Self {
            generate: Mutex::new(None),
            statuses: Mutex::new(VecDeque::new()),
            fallback_status: status_reply("running"),
            cleanup: Mutex::new(None),
            generate_calls: AtomicUsize::new(0),
            status_calls: Mutex::new(Vec::new()),
            cleanup_hours: Mutex::new(Vec::new()),
        }
    }

    pub fn with_generate(self, reply: RawReply) -> Self {
        *self.generate.lock().unwrap() = Some(Scripted::Reply(reply));
        self
    }

    pub fn with_generate_unreachable(self) -> Self {
        *self.generate.lock().unwrap() = Some(Scripted::Unreachable);
        self
    }

    /// Replies for the first polls, in order; later polls get the fallback.
    pub fn with_statuses(self, replies: Vec<Scripted>) -> Self {
        self.statuses.lock().unwrap().extend(replies);
        self
    }

    pub fn with_fallback_status(mut self, reply: RawReply) -> Self {
        self.fallback_status = reply;
        self
    }

    pub fn with_cleanup(self, reply: RawReply) -> Self {
        *self.cleanup.lock().unwrap() = Some(Scripted::Reply(reply));
        self
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.status_calls.lock().unwrap().len()
    }

    pub fn polled_ids(&self) -> Vec<String> {
        self.status_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.status_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }
}

impl PdfApi for FakeApi {
    async fn generate(&self, _request: &GenerationRequest) -> Result<RawReply, PeriwatchError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.generate
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Scripted::Unreachable)
            .into_result()
    }

    async fn task_status(&self, task_id: &str) -> Result<RawReply, PeriwatchError> {
        self.status_calls
            .lock()
            .unwrap()
            .push((task_id.to_string(), Instant::now()));
        match self.statuses.lock().unwrap().pop_front() {
            Some(scripted) => scripted.into_result(),
            None => Ok(self.fallback_status.clone()),
        }
    }

    async fn cleanup_tasks(&self, hours: u32) -> Result<RawReply, PeriwatchError> {
        self.cleanup_hours.lock().unwrap().push(hours);
        self.cleanup
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Scripted::Unreachable)
            .into_result()
    }
}

pub fn status_reply(status: &str) -> RawReply {
    RawReply::json(200, &serde_json::json!({ "status": status }))
}

pub fn status(status: &str) -> Scripted {
    Scripted::Reply(status_reply(status))
}

pub fn failed_status(error: &str) -> Scripted {
    Scripted::Reply(RawReply::json(
        200,
        &serde_json::json!({ "status": "failed", "error": error }),
    ))
}

pub fn accepted_reply(task_id: &str, message: &str) -> RawReply {
    RawReply::json(
        202,
        &serde_json::json!({ "task_id": task_id, "message": message }),
    )
}

pub fn pdf_reply(classification: &str, task_id: &str, message: &str, body: &[u8]) -> RawReply {
    RawReply::new(200, body.to_vec())
        .with_header("Content-Type", "application/pdf")
        .with_header("X-PDF-Status", classification)
        .with_header("X-Task-ID", task_id)
        .with_header("X-Message", message)
}

/// (message, percent) pairs, for compact assertions.
pub fn pairs(events: &[ProgressEvent]) -> Vec<(String, i32)> {
    events
        .iter()
        .map(|e| (e.message.clone(), e.percent))
        .collect()
}

pub fn drain(rx: &mut ProgressReceiver) -> Vec<(String, i32)> {
    pairs(&rx.drain())
}
