use snaptick_core::{EncodeError, FaceEncoder, FaceEncoding};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending encode requests before senders start waiting.
const QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("failed to spawn encoder thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("encoder thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the encoder thread.
struct EncodeRequest {
    image: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<FaceEncoding>, EncodeError>>,
}

/// Clone-safe handle to the encoder thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EncodeRequest>,
}

impl EngineHandle {
    /// Detect and embed every face in an uploaded image.
    pub async fn encode(&self, image: Vec<u8>) -> Result<Vec<FaceEncoding>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EncodeRequest {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| closed())?;
        Ok(reply_rx.await.map_err(|_| closed())??)
    }
}

fn closed() -> EngineError {
    tracing::error!("encoder thread is gone; uploads cannot be encoded");
    EngineError::ChannelClosed
}

/// Move the encoder onto a dedicated OS thread and serve requests from it.
///
/// Inference needs exclusive access to the model sessions, so all uploads are
/// encoded one at a time on this thread while matching stays on the caller.
pub fn spawn_engine<E>(mut encoder: E) -> Result<EngineHandle, EngineError>
where
    E: FaceEncoder + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EncodeRequest>(QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("snaptick-encoder".into())
        .spawn(move || {
            tracing::info!("encoder thread started");
            while let Some(req) = rx.blocking_recv() {
                let started = std::time::Instant::now();
                let result = panic::catch_unwind(AssertUnwindSafe(|| encoder.encode(&req.image)))
                    .unwrap_or_else(|payload| {
                        let reason = panic_message(payload.as_ref());
                        tracing::error!(reason, bytes = req.image.len(), "encoder panicked");
                        Err(EncodeError::Backend(format!("encoder panicked: {reason}")))
                    });
                match &result {
                    Ok(faces) => tracing::debug!(
                        faces = faces.len(),
                        bytes = req.image.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "encoded upload"
                    ),
                    Err(err) => tracing::warn!(error = %err, bytes = req.image.len(), "upload encoding failed"),
                }
                let _ = req.reply.send(result);
            }
            tracing::info!("encoder thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
