//! Command-buffer lifecycle: Recording -> Committed -> Completed.
//!
//! A command buffer records through encoders into the context's shared
//! [`CommandStream`]. At most one encoder is active at a time; beginning a
//! new one implicitly ends the previous one. `commit` performs exactly one
//! flush; committing again is a warning, not an error. `wait_until_completed`
//! blocks only the calling thread.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{PipelineHandle, SubmissionBoundary, SubmissionError, SubmissionId};
use crate::cmd::{
    encode_dispatch, encode_draw, encode_end_encoding, encode_set_pipeline, DispatchArgs, DrawArgs,
};
use crate::stream::{CommandStream, StreamError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandBufferState {
    Recording,
    Committed,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandBufferError {
    #[error("command buffer has not been committed")]
    NotCommitted,
    #[error("command buffer is no longer recording")]
    NotRecording,
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

pub struct CommandBuffer {
    stream: Arc<CommandStream>,
    boundary: Arc<dyn SubmissionBoundary>,
    state: CommandBufferState,
    encoder_open: bool,
    submission: Option<SubmissionId>,
}

impl CommandBuffer {
    pub(crate) fn new(stream: Arc<CommandStream>, boundary: Arc<dyn SubmissionBoundary>) -> Self {
        Self {
            stream,
            boundary,
            state: CommandBufferState::Recording,
            encoder_open: false,
            submission: None,
        }
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Begin a render encoder, implicitly ending any open encoder.
    pub fn begin_render_encoder(&mut self) -> Result<RenderEncoder<'_>, CommandBufferError> {
        self.begin_encoder()?;
        Ok(RenderEncoder { cb: self })
    }

    /// Begin a compute encoder, implicitly ending any open encoder.
    pub fn begin_compute_encoder(&mut self) -> Result<ComputeEncoder<'_>, CommandBufferError> {
        self.begin_encoder()?;
        Ok(ComputeEncoder { cb: self })
    }

    fn begin_encoder(&mut self) -> Result<(), CommandBufferError> {
        if self.state != CommandBufferState::Recording {
            return Err(CommandBufferError::NotRecording);
        }
        if self.encoder_open {
            self.stream.push(&encode_end_encoding())?;
        }
        self.encoder_open = true;
        Ok(())
    }

    fn end_encoder(&mut self) -> Result<(), CommandBufferError> {
        if self.encoder_open {
            self.stream.push(&encode_end_encoding())?;
            self.encoder_open = false;
        }
        Ok(())
    }

    /// End recording: close any open encoder, flush the stream once, and move
    /// to Committed.
    ///
    /// A repeated commit logs a warning and returns `Ok` without flushing
    /// again.
    pub fn commit(&mut self) -> Result<(), CommandBufferError> {
        if self.state != CommandBufferState::Recording {
            warn!("commit called on an already-committed command buffer; ignored");
            return Ok(());
        }
        self.end_encoder()?;
        self.submission = self.stream.flush()?;
        self.state = CommandBufferState::Committed;
        debug!(submission = ?self.submission.map(|id| id.0), "command buffer committed");
        Ok(())
    }

    /// Block the calling thread until the committed work retires.
    ///
    /// Fails with [`CommandBufferError::NotCommitted`] while still recording;
    /// a no-op once Completed.
    pub fn wait_until_completed(&mut self, timeout: Duration) -> Result<(), CommandBufferError> {
        match self.state {
            CommandBufferState::Recording => Err(CommandBufferError::NotCommitted),
            CommandBufferState::Completed => Ok(()),
            CommandBufferState::Committed => {
                if let Some(id) = self.submission {
                    self.boundary.wait_for_completion(id, timeout)?;
                }
                self.state = CommandBufferState::Completed;
                Ok(())
            }
        }
    }
}

/// Records render work. Dropping without `end_encoding` leaves the encoder
/// open; the next `begin_*` or `commit` closes it.
pub struct RenderEncoder<'a> {
    cb: &'a mut CommandBuffer,
}

impl RenderEncoder<'_> {
    pub fn set_pipeline(&mut self, handle: PipelineHandle) -> Result<(), CommandBufferError> {
        self.cb.stream.push(&encode_set_pipeline(handle))?;
        Ok(())
    }

    pub fn draw(&mut self, args: DrawArgs) -> Result<(), CommandBufferError> {
        self.cb.stream.push(&encode_draw(args))?;
        Ok(())
    }

    pub fn end_encoding(self) -> Result<(), CommandBufferError> {
        self.cb.end_encoder()
    }
}

/// Records compute work.
pub struct ComputeEncoder<'a> {
    cb: &'a mut CommandBuffer,
}

impl ComputeEncoder<'_> {
    pub fn set_pipeline(&mut self, handle: PipelineHandle) -> Result<(), CommandBufferError> {
        self.cb.stream.push(&encode_set_pipeline(handle))?;
        Ok(())
    }

    pub fn dispatch(&mut self, args: DispatchArgs) -> Result<(), CommandBufferError> {
        self.cb.stream.push(&encode_dispatch(args))?;
        Ok(())
    }

    pub fn end_encoding(self) -> Result<(), CommandBufferError> {
        self.cb.end_encoder()
    }
}
