//! 页面消息桥
//!
//! 浏览器页面和协调器之间的请求/应答协议：
//!
//! ```text
//! 页面 → window.__uploadRelayBridge('{"requestId":7,"message":{"type":"UPLOAD_TAB_READY",...}}')
//! 页面 ← upload-relay 事件 {"type":"REPLY","requestId":7,"response":{"success":true}}
//! ```
//!
//! - 带 `requestId` 的消息等待协调器应答，应答以同一个 `requestId` 派发回页面
//! - 不带 `requestId` 的消息只转发，不回复
//! - `GET_UPLOAD_RECORD` 只读取 `upload_<id>`，页面借此在加载时读取自己的记录

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::HostError;
use crate::infrastructure::{CoordinatorLink, JsExecutor, RecordStore};
use crate::models::{CoordinatorRequest, Response, UploadId, UploadRecord};
use crate::utils::truncate_text;

/// 页面发消息用的全局函数名
pub const BRIDGE_BINDING: &str = "__uploadRelayBridge";
/// 协调器发给页面的事件名
pub const COMMAND_EVENT: &str = "upload-relay";

/// 页面发来的一帧
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeFrame {
    #[serde(default)]
    pub request_id: Option<u64>,
    pub message: BridgeMessage,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BridgeMessage {
    Lookup(RecordLookup),
    Coordinator(CoordinatorRequest),
}

/// 页面对自己上传记录的只读查询
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum RecordLookup {
    GetUploadRecord { upload_id: UploadId },
}

/// 派发回页面的应答
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum BridgeReply {
    Reply {
        request_id: u64,
        response: Response,
    },
    UploadRecord {
        request_id: u64,
        /// 记录不存在时为 `null`
        record: Option<UploadRecord>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// 把应答送回页面
#[async_trait]
pub trait PagePoster: Send + Sync {
    async fn post(&self, reply: &BridgeReply) -> Result<(), HostError>;
}

#[async_trait]
impl PagePoster for JsExecutor {
    async fn post(&self, reply: &BridgeReply) -> Result<(), HostError> {
        post_to_page(self, reply).await
    }
}

/// 在页面上派发一条消息（尽力而为）
pub async fn post_to_page<T: Serialize + Sync>(
    executor: &JsExecutor,
    message: &T,
) -> Result<(), HostError> {
    executor
        .dispatch(COMMAND_EVENT, message)
        .await
        .map_err(|e| HostError::Script(e.to_string()))
}

/// 一个页面的消息桥
pub struct Bridge {
    link: CoordinatorLink,
    records: RecordStore,
    label: String,
}

impl Bridge {
    pub fn new(link: CoordinatorLink, records: RecordStore, label: impl Into<String>) -> Self {
        Self {
            link,
            records,
            label: label.into(),
        }
    }

    /// 处理一帧，返回需要派发回页面的应答
    pub async fn handle(&self, payload: &str) -> Option<BridgeReply> {
        let frame: BridgeFrame = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    "[{}] ⚠️ 无法解析页面消息 ({}): {}",
                    self.label,
                    truncate_text(payload, 120),
                    e
                );
                return None;
            }
        };

        match (frame.request_id, frame.message) {
            (request_id, BridgeMessage::Lookup(RecordLookup::GetUploadRecord { upload_id })) => {
                let Some(request_id) = request_id else {
                    debug!("[{}] 记录查询缺少 requestId，忽略", self.label);
                    return None;
                };
                let (record, error) = match self.records.get(&upload_id).await {
                    Ok(record) => (record, None),
                    Err(e) => {
                        warn!("[{}] ⚠️ 读取上传记录 {} 失败: {}", self.label, upload_id, e);
                        (None, Some(e.to_string()))
                    }
                };
                Some(BridgeReply::UploadRecord {
                    request_id,
                    record,
                    error,
                })
            }
            (Some(request_id), BridgeMessage::Coordinator(request)) => {
                debug!("[{}] 收到页面请求 #{}: {}", self.label, request_id, request.kind());
                let response = self
                    .link
                    .request(request)
                    .await
                    .unwrap_or_else(Response::failed);
                Some(BridgeReply::Reply {
                    request_id,
                    response,
                })
            }
            (None, BridgeMessage::Coordinator(request)) => {
                debug!("[{}] 收到页面消息: {}", self.label, request.kind());
                if let Err(e) = self.link.send(request) {
                    warn!("[{}] ⚠️ 协调器已退出，消息丢弃: {}", self.label, e);
                }
                None
            }
        }
    }

    /// 依次处理页面发来的消息，直到页面关闭
    pub async fn pump<S, P>(&self, payloads: S, poster: &P)
    where
        S: Stream<Item = String>,
        P: PagePoster + ?Sized,
    {
        let mut payloads = std::pin::pin!(payloads);
        while let Some(payload) = payloads.next().await {
            let Some(reply) = self.handle(&payload).await else {
                continue;
            };
            if let Err(e) = poster.post(&reply).await {
                debug!("[{}] 页面不可用，丢弃应答: {}", self.label, e);
            }
        }
        debug!("[{}] 消息桥已关闭", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{Inbound, KvStore, MemoryStore};
    use crate::models::{PayloadKind, UploadPayload};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// 记录所有派发给页面的应答
    #[derive(Default)]
    struct RecordingPoster {
        sent: Mutex<Vec<BridgeReply>>,
    }

    #[async_trait]
    impl PagePoster for RecordingPoster {
        async fn post(&self, reply: &BridgeReply) -> Result<(), HostError> {
            self.sent.lock().unwrap().push(reply.clone());
            Ok(())
        }
    }

    /// 模拟协调器：UPLOAD_DOCUMENT 返回固定 ID，其它消息直接成功
    fn fake_coordinator(
        mut inbox: mpsc::UnboundedReceiver<Inbound>,
    ) -> mpsc::UnboundedReceiver<CoordinatorRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(inbound) = inbox.recv().await {
                if let Inbound::Message { request, reply } = inbound {
                    if let Some(reply) = reply {
                        let response = match request {
                            CoordinatorRequest::UploadDocument { .. } => {
                                Response::started(UploadId::new("1700000000000"))
                            }
                            _ => Response::ok(),
                        };
                        let _ = reply.send(response);
                    }
                    let _ = tx.send(request);
                }
            }
        });
        rx
    }

    fn frames(values: Vec<serde_json::Value>) -> impl Stream<Item = String> {
        futures::stream::iter(values.into_iter().map(|v| v.to_string()))
    }

    #[tokio::test]
    async fn test_request_reply_carries_request_id() {
        let (link, inbox) = CoordinatorLink::channel();
        let mut seen = fake_coordinator(inbox);
        let bridge = Bridge::new(link, RecordStore::new(Arc::new(MemoryStore::new())), "发起方");
        let poster = RecordingPoster::default();

        bridge
            .pump(
                frames(vec![json!({
                    "requestId": 7,
                    "message": {
                        "type": "UPLOAD_DOCUMENT",
                        "data": { "type": "resume", "context": "Acme Corp" }
                    }
                })]),
                &poster,
            )
            .await;

        let sent = poster.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            [BridgeReply::Reply {
                request_id: 7,
                response: Response::started(UploadId::new("1700000000000")),
            }]
        );
        let wire = serde_json::to_value(&sent[0]).unwrap();
        assert_eq!(wire["type"], "REPLY");
        assert_eq!(wire["requestId"], 7);
        assert_eq!(wire["response"]["uploadId"], "1700000000000");
        assert!(matches!(
            seen.recv().await.unwrap(),
            CoordinatorRequest::UploadDocument { .. }
        ));
    }

    #[tokio::test]
    async fn test_message_without_request_id_is_not_answered() {
        let (link, mut inbox) = CoordinatorLink::channel();
        let bridge = Bridge::new(link, RecordStore::new(Arc::new(MemoryStore::new())), "页面 1");
        let poster = RecordingPoster::default();

        bridge
            .pump(
                frames(vec![
                    json!("not a frame"),
                    json!({
                        "message": { "type": "UPLOAD_CANCELLED", "uploadId": "5", "tabId": 1 }
                    }),
                ]),
                &poster,
            )
            .await;

        assert!(poster.sent.lock().unwrap().is_empty());
        match inbox.try_recv().unwrap() {
            Inbound::Message { request, reply } => {
                assert!(reply.is_none());
                assert_eq!(request.kind(), "UPLOAD_CANCELLED");
            }
            other => panic!("unexpected inbound: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_coordinator_gone_is_reported_to_page() {
        let (link, inbox) = CoordinatorLink::channel();
        drop(inbox);
        let bridge = Bridge::new(link, RecordStore::new(Arc::new(MemoryStore::new())), "页面 2");

        let reply = bridge
            .handle(&json!({
                "requestId": 3,
                "message": { "type": "UPLOAD_TAB_READY", "uploadId": "5" }
            })
            .to_string())
            .await;

        match reply {
            Some(BridgeReply::Reply {
                request_id,
                response,
            }) => {
                assert_eq!(request_id, 3);
                assert!(!response.success);
                assert_eq!(response.error.as_deref(), Some("接收方已关闭: coordinator"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_record_lookup_reads_only_upload_namespace() {
        let kv = Arc::new(MemoryStore::new());
        kv.set("documents", json!([{ "name": "secret.pdf" }]))
            .await
            .unwrap();
        let records = RecordStore::new(kv);
        let record = UploadRecord::new(
            UploadId::new("42"),
            UploadPayload::new(PayloadKind::Resume, "Acme Corp"),
            1_000,
        );
        records.create(&record).await.unwrap();

        let (link, _inbox) = CoordinatorLink::channel();
        let bridge = Bridge::new(link, records, "页面 3");
        let poster = RecordingPoster::default();
        bridge
            .pump(
                frames(vec![
                    json!({
                        "requestId": 1,
                        "message": { "type": "GET_UPLOAD_RECORD", "uploadId": "42" }
                    }),
                    json!({
                        "requestId": 2,
                        "message": { "type": "GET_UPLOAD_RECORD", "uploadId": "documents" }
                    }),
                ]),
                &poster,
            )
            .await;

        let sent = poster.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            [
                BridgeReply::UploadRecord {
                    request_id: 1,
                    record: Some(record),
                    error: None,
                },
                BridgeReply::UploadRecord {
                    request_id: 2,
                    record: None,
                    error: None,
                },
            ]
        );
        let wire = serde_json::to_value(&sent[1]).unwrap();
        assert_eq!(wire["type"], "UPLOAD_RECORD");
        assert!(wire["record"].is_null());
    }
}
