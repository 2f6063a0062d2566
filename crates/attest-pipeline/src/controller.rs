//! Capture Device Controller.
//!
//! Owns the single active capture input on a dedicated OS thread, the way
//! camera hardware expects: configuration changes, session start/stop, and
//! single-shot captures are processed one at a time off the same request
//! queue, so no two hardware operations can ever interleave.

use attest_core::{CameraPosition, CapturePhase, CapturedImage};
use attest_hw::{CaptureBackend, DeviceProvider};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("no camera available at {0} position")]
    DeviceUnavailable(CameraPosition),
    #[error("not ready: session not running or no input installed")]
    NotReady,
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("camera controller thread exited")]
    ChannelClosed,
}

enum ControllerRequest {
    Configure {
        position: CameraPosition,
        reply: oneshot::Sender<Result<(), ControllerError>>,
    },
    Capture {
        phase: CapturePhase,
        reply: oneshot::Sender<Result<CapturedImage, ControllerError>>,
    },
    Start {
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the controller thread.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerRequest>,
}

impl ControllerHandle {
    /// Install the input for `position`. Idempotent when already installed;
    /// on failure the previously-configured input stays active.
    pub async fn configure(&self, position: CameraPosition) -> Result<(), ControllerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControllerRequest::Configure {
                position,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ControllerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ControllerError::ChannelClosed)?
    }

    /// Take a single still at the currently-configured position. Delivers
    /// exactly one image on success; on failure no image is produced.
    pub async fn capture(&self, phase: CapturePhase) -> Result<CapturedImage, ControllerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControllerRequest::Capture {
                phase,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ControllerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ControllerError::ChannelClosed)?
    }

    /// Mark the session running (capture surface became visible).
    pub async fn start(&self) -> Result<(), ControllerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControllerRequest::Start { reply: reply_tx })
            .await
            .map_err(|_| ControllerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ControllerError::ChannelClosed)
    }

    /// Mark the session stopped (capture surface hidden).
    pub async fn stop(&self) -> Result<(), ControllerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControllerRequest::Stop { reply: reply_tx })
            .await
            .map_err(|_| ControllerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ControllerError::ChannelClosed)
    }
}

struct ControllerState {
    provider: Box<dyn DeviceProvider>,
    backend: Option<Box<dyn CaptureBackend>>,
    position: Option<CameraPosition>,
    running: bool,
    warmup_frames: usize,
}

impl ControllerState {
    fn configure(&mut self, position: CameraPosition) -> Result<(), ControllerError> {
        if self.position == Some(position) && self.backend.is_some() {
            return Ok(());
        }

        match self.provider.open(position) {
            Ok(mut backend) => {
                backend.warm_up(self.warmup_frames);
                self.backend = Some(backend);
                self.position = Some(position);
                tracing::info!(%position, "capture input installed");
                Ok(())
            }
            Err(e) => {
                // Keep whatever input was active before the request.
                tracing::warn!(%position, error = %e, "failed to install capture input");
                Err(ControllerError::DeviceUnavailable(position))
            }
        }
    }

    fn capture(&mut self, phase: CapturePhase) -> Result<CapturedImage, ControllerError> {
        if !self.running {
            return Err(ControllerError::NotReady);
        }
        let (Some(backend), Some(position)) = (self.backend.as_mut(), self.position) else {
            return Err(ControllerError::NotReady);
        };

        let photo = backend
            .take_photo()
            .map_err(|e| ControllerError::Capture(e.to_string()))?;

        Ok(CapturedImage {
            pixels: photo.gray,
            width: photo.width,
            height: photo.height,
            position,
            phase,
        })
    }
}

/// Spawn the controller on a dedicated OS thread.
///
/// The thread owns the provider and the active backend; requests arrive on
/// a bounded queue and are serviced strictly in order.
pub fn spawn_controller(provider: Box<dyn DeviceProvider>, warmup_frames: usize) -> ControllerHandle {
    let (tx, mut rx) = mpsc::channel::<ControllerRequest>(8);

    std::thread::Builder::new()
        .name("attest-camera".into())
        .spawn(move || {
            tracing::info!("camera controller thread started");
            let mut state = ControllerState {
                provider,
                backend: None,
                position: None,
                running: false,
                warmup_frames,
            };

            while let Some(req) = rx.blocking_recv() {
                match req {
                    ControllerRequest::Configure { position, reply } => {
                        let _ = reply.send(state.configure(position));
                    }
                    ControllerRequest::Capture { phase, reply } => {
                        let _ = reply.send(state.capture(phase));
                    }
                    ControllerRequest::Start { reply } => {
                        state.running = true;
                        let _ = reply.send(());
                    }
                    ControllerRequest::Stop { reply } => {
                        state.running = false;
                        let _ = reply.send(());
                    }
                }
            }
            tracing::info!("camera controller thread exiting");
        })
        .expect("failed to spawn camera controller thread");

    ControllerHandle { tx }
}
