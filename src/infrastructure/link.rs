//! 协调器消息通道
//!
//! 发起方、上传页面和页面宿主都通过 `CoordinatorLink` 给协调器发消息。
//! 投递最多一次：协调器已经退出时发送直接失败，不会重试。

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::DeliveryError;
use crate::models::{CoordinatorRequest, Response, SurfaceId};

const COORDINATOR: &str = "coordinator";

/// 协调器收到的事件
#[derive(Debug)]
pub enum Inbound {
    /// 来自发起方或上传页面的消息；`reply` 为空表示不需要应答
    Message {
        request: CoordinatorRequest,
        reply: Option<oneshot::Sender<Response>>,
    },
    /// 宿主报告某个上传页面加载完成
    SurfaceLoaded(SurfaceId),
}

/// 发往协调器的消息通道
#[derive(Debug, Clone)]
pub struct CoordinatorLink {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl CoordinatorLink {
    /// 创建通道，接收端交给协调器
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 发送消息，不等待应答
    pub fn send(&self, request: CoordinatorRequest) -> Result<(), DeliveryError> {
        debug!("发送消息: {}", request.kind());
        self.push(Inbound::Message {
            request,
            reply: None,
        })
    }

    /// 发送消息并等待应答
    pub async fn request(&self, request: CoordinatorRequest) -> Result<Response, DeliveryError> {
        debug!("发送请求: {}", request.kind());
        let (reply_tx, reply_rx) = oneshot::channel();
        self.push(Inbound::Message {
            request,
            reply: Some(reply_tx),
        })?;
        reply_rx.await.map_err(|_| DeliveryError::NoReply {
            target: COORDINATOR.to_string(),
        })
    }

    /// 报告上传页面加载完成
    pub fn surface_loaded(&self, surface_id: SurfaceId) -> Result<(), DeliveryError> {
        self.push(Inbound::SurfaceLoaded(surface_id))
    }

    fn push(&self, inbound: Inbound) -> Result<(), DeliveryError> {
        self.tx
            .send(inbound)
            .map_err(|_| DeliveryError::RecipientGone {
                target: COORDINATOR.to_string(),
            })
    }
}
