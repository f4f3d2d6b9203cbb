// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::app::errors::{AppResult, codes, unavailable};
use crate::app::ports::RecoveryQueuePort;
use crate::app::services::recovery::RecoverMsg;

pub const DEFAULT_CAPACITY: usize = 1024;

/// In-process recovery queue backed by a bounded tokio channel.
#[derive(Clone)]
pub struct ChannelRecoveryQueue {
    tx: mpsc::Sender<RecoverMsg>,
}

impl ChannelRecoveryQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RecoverMsg>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RecoveryQueuePort for ChannelRecoveryQueue {
    async fn send(&self, msg: RecoverMsg) -> AppResult<()> {
        let msg_type = msg.msg_type();
        self.tx.send(msg).await.map_err(|_| {
            unavailable(
                codes::INTERNAL_ERROR,
                format!("recovery queue closed; dropped {msg_type} message"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::services::recovery::{MsgHeader, RecoverShutdownMsg, ShutdownMode};

    fn shutdown() -> RecoverMsg {
        RecoverMsg::Shutdown(RecoverShutdownMsg {
            header: MsgHeader::new("jobsd-test"),
            tenant: None,
            mode: ShutdownMode::Graceful,
        })
    }

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (queue, mut rx) = ChannelRecoveryQueue::channel(4);
        let first = shutdown();
        let second = shutdown();
        queue.send(first.clone()).await.unwrap();
        queue.send(second.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(first));
        assert_eq!(rx.recv().await, Some(second));
    }

    #[tokio::test]
    async fn closed_queue_reports_error() {
        let (queue, rx) = ChannelRecoveryQueue::channel(1);
        drop(rx);
        let err = queue.send(shutdown()).await.unwrap_err();
        assert!(err.message().contains("RECOVER_SHUTDOWN"));
    }
}
