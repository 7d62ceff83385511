//! Write pump: the only task that writes to the socket

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::HubConfig;
use crate::error::HubError;
use crate::hub::Frame;

/// Drain the outbound queue into the socket until the queue closes or a write
/// fails. `_done` is dropped on return, which tells the read pump to stop.
pub(crate) async fn write_pump<W>(
    mut sink: W,
    mut queue: mpsc::Receiver<Frame>,
    config: HubConfig,
    _done: oneshot::Sender<()>,
) -> Option<HubError>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut keepalive = tokio::time::interval_at(
        Instant::now() + config.ping_period,
        config.ping_period,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            frame = queue.recv() => {
                let Some(frame) = frame else {
                    // Hub dropped us: say goodbye
                    let _ = with_deadline(config.write_wait, sink.send(Message::Close(None))).await;
                    break None;
                };
                if let Err(e) = write_batch(&mut sink, &mut queue, frame, config.write_wait).await {
                    break Some(e);
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = with_deadline(config.write_wait, sink.send(Message::Ping(Bytes::new()))).await {
                    break Some(e);
                }
            }
        }
    };

    let _ = with_deadline(config.write_wait, sink.close()).await;
    outcome
}

/// Write `first` plus whatever was already queued behind it, then flush once.
/// The batch is bounded by the queue length observed before draining.
async fn write_batch<W>(
    sink: &mut W,
    queue: &mut mpsc::Receiver<Frame>,
    first: Frame,
    write_wait: Duration,
) -> Result<(), HubError>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let pending = queue.len();
    with_deadline(write_wait, async {
        sink.feed(Message::Text(first)).await?;
        for _ in 0..pending {
            match queue.try_recv() {
                Ok(frame) => sink.feed(Message::Text(frame)).await?,
                Err(_) => break,
            }
        }
        sink.flush().await
    })
    .await
}

async fn with_deadline<F, E>(limit: Duration, write: F) -> Result<(), HubError>
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(limit, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(HubError::TransportFailure(e.to_string())),
        Err(_) => Err(HubError::TransportFailure(format!(
            "write did not complete within {:?}",
            limit
        ))),
    }
}
