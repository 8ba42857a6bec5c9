//! 通知服务 - 业务能力层
//!
//! 发起方（弹出页面）随时可能已经关闭，所以通知只是广播：
//! 没有订阅者时直接丢弃，发送失败不会影响上传结果。

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::Notification;

const CHANNEL_CAPACITY: usize = 64;

/// 发起方通知广播
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// 订阅通知（发起方调用）
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// 发布通知，返回收到通知的订阅者数量；没有订阅者时返回 0
    pub fn publish(&self, notification: Notification) -> usize {
        match self.sender.send(notification) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(notification)) => {
                debug!("发起方已关闭，丢弃通知: {:?}", notification);
                0
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
