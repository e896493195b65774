use crate::messages::Message;
use crate::telemetry::{MetricsRecorder, StageStatus};

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{stage} does not consume {kind} messages")]
    UnexpectedMessage {
        stage: &'static str,
        kind: &'static str,
    },
    #[error("grid bin ({x}, {y}) outside of 1..={limit}")]
    BinOutOfRange { x: i64, y: i64, limit: usize },
    #[error("{stage} failed to deliver {failed} message(s)")]
    Delivery { stage: &'static str, failed: usize },
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type StageResult<T> = Result<T, StageError>;

/// Outbound primitive supplied by the router. Returns `false` when the
/// message could not be delivered.
pub trait MessageSink {
    fn send(&mut self, message: Message) -> bool;
}

impl MessageSink for Vec<Message> {
    fn send(&mut self, message: Message) -> bool {
        self.push(message);
        true
    }
}

/// Wraps a sink for the duration of one `process` call and tallies
/// delivery outcomes. Failures never abort the call; they are reported
/// once the stage has finished mutating its state.
pub struct Outbox<'a> {
    sink: &'a mut dyn MessageSink,
    sent: usize,
    failed: usize,
}

impl<'a> Outbox<'a> {
    pub fn new(sink: &'a mut dyn MessageSink) -> Self {
        Self {
            sink,
            sent: 0,
            failed: 0,
        }
    }

    pub fn send(&mut self, message: Message) {
        if self.sink.send(message) {
            self.sent += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn finish(self, stage: &'static str, metrics: &MetricsRecorder) -> StageResult<()> {
        metrics.record_emitted(self.sent);
        if self.failed > 0 {
            metrics.record_delivery_failures(self.failed);
            return Err(StageError::Delivery {
                stage,
                failed: self.failed,
            });
        }
        Ok(())
    }
}

/// A stage of the plot-processing chain. The router hands it one message
/// at a time and supplies the sink that receives whatever it emits.
pub trait ProcessingStage {
    fn name(&self) -> &'static str;
    fn process(&mut self, message: Message, sink: &mut dyn MessageSink) -> StageResult<()>;
    /// Flushes held state into `sink` and returns to the initial state.
    fn reset(&mut self, sink: &mut dyn MessageSink) -> StageResult<()>;
    fn status(&self) -> StageStatus;
}

/// Runtime parameters of a stage. `apply_config` validates first and then
/// swaps the whole struct in, recomputing every derived value together.
pub trait Configurable {
    type Config;

    fn config(&self) -> &Self::Config;
    fn apply_config(&mut self, config: Self::Config) -> StageResult<()>;
}
