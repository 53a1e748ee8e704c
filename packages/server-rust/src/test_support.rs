//! Recording fakes for the stage's collaborators.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rofilter_core::{
    OpCode, ProcessorError, ReplyChannel, ReplyError, ReplyHeader, Request, RequestProcessor,
};

pub fn request(cxid: i32, op: OpCode, channel: &Arc<RecordingChannel>) -> Request {
    let cnxn: Arc<dyn ReplyChannel> = channel.clone();
    Request::new(0x100, cxid, op, Vec::new(), cnxn)
}

/// Polls `cond` every millisecond until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Reply channel that records every reply it is given.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    replies: Mutex<Vec<(ReplyHeader, Option<Vec<u8>>)>>,
    closed: bool,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A channel whose connection has already gone away.
    pub fn closed() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(Vec::new()),
            closed: true,
        })
    }

    pub fn replies(&self) -> Vec<(ReplyHeader, Option<Vec<u8>>)> {
        self.replies.lock().clone()
    }
}

impl ReplyChannel for RecordingChannel {
    fn send_response(&self, header: &ReplyHeader, body: Option<&[u8]>) -> Result<(), ReplyError> {
        if self.closed {
            return Err(ReplyError::Closed);
        }
        self.replies.lock().push((*header, body.map(<[u8]>::to_vec)));
        Ok(())
    }
}

/// Observable effect on the downstream processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Forwarded { cxid: i32, op: OpCode },
    Shutdown,
}

/// How the downstream processor reacts to a given cxid.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Error(i32),
    Rollover(i32),
    Panic(i32),
}

/// Downstream processor that records forwards and shutdowns in order.
#[derive(Debug, Default)]
pub struct RecordingProcessor {
    events: Mutex<Vec<Event>>,
    fault: Option<Fault>,
}

impl RecordingProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            fault: Some(fault),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn forwarded(&self) -> Vec<i32> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Forwarded { cxid, .. } => Some(*cxid),
                Event::Shutdown => None,
            })
            .collect()
    }

    pub fn forwarded_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, Event::Forwarded { .. }))
            .count()
    }

    pub fn shutdown_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, Event::Shutdown))
            .count()
    }
}

impl RequestProcessor for RecordingProcessor {
    fn process_request(&self, request: Request) -> Result<(), ProcessorError> {
        match self.fault {
            Some(Fault::Error(cxid)) if cxid == request.cxid => {
                return Err(ProcessorError::Internal(anyhow::anyhow!(
                    "cannot process cxid {cxid}"
                )));
            }
            Some(Fault::Rollover(cxid)) if cxid == request.cxid => {
                return Err(ProcessorError::XidRollover);
            }
            Some(Fault::Panic(cxid)) if cxid == request.cxid => {
                panic!("downstream blew up on cxid {cxid}");
            }
            _ => {}
        }
        self.events.lock().push(Event::Forwarded {
            cxid: request.cxid,
            op: request.op,
        });
        Ok(())
    }

    fn shutdown(&self) {
        self.events.lock().push(Event::Shutdown);
    }
}
