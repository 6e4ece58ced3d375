//! Authenticated WebSocket evaluation session.
//!
//! Turns one stateless HTTP request into a socket exchange with the engine:
//!
//! ```text
//! Connecting ─▶ Open ─▶ AwaitingResult ─▶ Resolved
//!      │          │            │
//!      └──────────┴────────────┴──▶ Failed | TimedOut | Cancelled
//! ```
//!
//! The deadline is armed before connecting and covers the whole exchange.
//! The start frame is always sent before the end frame, and nothing is read
//! until both are out. The session settles exactly once: [`EvaluationSession::run`]
//! consumes the session and the socket is closed on every exit path.

pub mod envelope;
pub mod transport;

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ProxyError, Result};
pub use transport::{FrameTransport, InboundFrame, WsTransport};

/// Close code after a successful or vendor-terminated exchange.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code when the deadline elapsed first.
pub const CLOSE_TIMEOUT: u16 = 4008;
/// Close code when the session was cancelled.
pub const CLOSE_CANCELLED: u16 = 4009;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    AwaitingResult,
    Resolved,
    Failed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    FramesSent,
    ResultReceived,
    Errored,
    DeadlineElapsed,
    CancelRequested,
}

impl SessionState {
    /// Transition table. `None` marks an illegal move, including every move
    /// out of a terminal state.
    pub fn transition(self, event: SessionEvent) -> Option<Self> {
        use SessionEvent::*;
        use SessionState::*;

        match (self, event) {
            (Connecting, Opened) => Some(Open),
            (Open, FramesSent) => Some(AwaitingResult),
            (AwaitingResult, ResultReceived) => Some(Resolved),
            (Connecting | Open | AwaitingResult, Errored) => Some(Failed),
            (Connecting | Open | AwaitingResult, DeadlineElapsed) => Some(TimedOut),
            (Connecting | Open | AwaitingResult, CancelRequested) => Some(Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Resolved | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }
}

/// The two frames of a pre-recorded clip: start (status 0, full audio) and
/// end (status 2).
#[derive(Debug, Clone)]
pub struct FramePair {
    pub start: String,
    pub end: String,
}

/// Terminal state plus the single outcome of a session.
#[derive(Debug)]
pub struct Settlement {
    pub session_id: String,
    pub state: SessionState,
    pub outcome: Result<Value>,
}

impl Settlement {
    pub fn into_result(self) -> Result<Value> {
        self.outcome
    }
}

enum Ending {
    Resolved(Value),
    Failed(ProxyError),
    TimedOut,
    Cancelled,
}

enum Interrupt {
    Deadline,
    Cancelled,
}

impl From<Interrupt> for Ending {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Deadline => Ending::TimedOut,
            Interrupt::Cancelled => Ending::Cancelled,
        }
    }
}

pub struct EvaluationSession {
    id: String,
    state: SessionState,
    timeout: Duration,
    cancel: CancellationToken,
}

impl EvaluationSession {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Connecting,
            timeout,
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connect to `url` over a real socket and run the exchange.
    pub async fn run(self, url: &Url, frames: FramePair) -> Settlement {
        self.run_with(WsTransport::connect(url), frames).await
    }

    /// Run the exchange over whatever transport `connect` yields.
    pub async fn run_with<T, C>(mut self, connect: C, frames: FramePair) -> Settlement
    where
        T: FrameTransport,
        C: Future<Output = Result<T>>,
    {
        let deadline = Instant::now() + self.timeout;
        debug!(session = %self.id, timeout = ?self.timeout, "evaluation session starting");

        let mut transport = match self.guarded(deadline, connect).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => return self.settle::<T>(None, Ending::Failed(e)).await,
            Err(interrupt) => return self.settle::<T>(None, interrupt.into()).await,
        };
        self.advance(SessionEvent::Opened);

        match self
            .guarded(deadline, send_frames(&mut transport, &frames))
            .await
        {
            Ok(Ok(())) => self.advance(SessionEvent::FramesSent),
            Ok(Err(e)) => return self.settle(Some(transport), Ending::Failed(e)).await,
            Err(interrupt) => return self.settle(Some(transport), interrupt.into()).await,
        }

        let ending = match self.guarded(deadline, await_result(&mut transport)).await {
            Ok(Ok(result)) => Ending::Resolved(result),
            Ok(Err(e)) => Ending::Failed(e),
            Err(interrupt) => interrupt.into(),
        };
        self.settle(Some(transport), ending).await
    }

    async fn guarded<F: Future>(
        &self,
        deadline: Instant,
        fut: F,
    ) -> std::result::Result<F::Output, Interrupt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = sleep_until(deadline) => Err(Interrupt::Deadline),
            out = fut => Ok(out),
        }
    }

    fn advance(&mut self, event: SessionEvent) {
        match self.state.transition(event) {
            Some(next) => {
                debug!(session = %self.id, from = ?self.state, to = ?next, "session transition");
                self.state = next;
            }
            None => warn!(
                session = %self.id,
                state = ?self.state,
                ?event,
                "ignored illegal session transition"
            ),
        }
    }

    async fn settle<T: FrameTransport>(
        mut self,
        transport: Option<T>,
        ending: Ending,
    ) -> Settlement {
        let (event, close_code, reason, outcome) = match ending {
            Ending::Resolved(result) => (
                SessionEvent::ResultReceived,
                CLOSE_NORMAL,
                "evaluation complete",
                Ok(result),
            ),
            Ending::Failed(err) => (SessionEvent::Errored, CLOSE_NORMAL, "evaluation failed", Err(err)),
            Ending::TimedOut => (
                SessionEvent::DeadlineElapsed,
                CLOSE_TIMEOUT,
                "evaluation timed out",
                Err(ProxyError::Timeout(format!(
                    "no evaluation result within {:?}",
                    self.timeout
                ))),
            ),
            Ending::Cancelled => (
                SessionEvent::CancelRequested,
                CLOSE_CANCELLED,
                "evaluation cancelled",
                Err(ProxyError::Cancelled),
            ),
        };

        self.advance(event);
        if let Some(mut transport) = transport {
            transport.close(close_code, reason).await;
        }

        match &outcome {
            Ok(_) => info!(session = %self.id, "evaluation session resolved"),
            Err(e) => warn!(
                session = %self.id,
                state = ?self.state,
                code = %e.kind(),
                "evaluation session failed: {}",
                e
            ),
        }

        Settlement {
            session_id: self.id,
            state: self.state,
            outcome,
        }
    }
}

async fn send_frames<T: FrameTransport>(transport: &mut T, frames: &FramePair) -> Result<()> {
    transport.send_text(frames.start.clone()).await?;
    transport.send_text(frames.end.clone()).await?;
    Ok(())
}

/// Read until the first terminal frame. Anything after it is never read.
async fn await_result<T: FrameTransport>(transport: &mut T) -> Result<Value> {
    loop {
        let frame = match transport.next_frame().await {
            Some(frame) => frame?,
            None => {
                return Err(ProxyError::ConnectionFailed(
                    "socket ended before a result arrived".to_string(),
                ));
            }
        };

        let text = match frame {
            InboundFrame::Text(text) => text,
            InboundFrame::Binary(bytes) => String::from_utf8(bytes)
                .map_err(|_| ProxyError::Parse("binary frame is not UTF-8".to_string()))?,
            InboundFrame::Close { code, reason } => {
                return Err(ProxyError::ConnectionFailed(format!(
                    "vendor closed the socket before a result (code {}): {}",
                    code.map(|c| c.to_string()).unwrap_or_else(|| "none".into()),
                    reason
                )));
            }
            InboundFrame::Control => continue,
        };

        if let Some(result) = envelope::interpret(&text)? {
            return Ok(result);
        }
    }
}
