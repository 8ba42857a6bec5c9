//! 上传页面流程 - 流程层
//!
//! 每个上传页面只服务一次上传尝试，只采集一个文件。
//!
//! 流程顺序：
//! 1. 从页面地址取出 uploadId，读取自己的上传记录（找不到则进入终止错误状态）
//! 2. 文件输入就绪后发送 `UPLOAD_TAB_READY`
//! 3. 用户选择文件 → 本地校验 → 发送 `UPLOAD_COMPLETE` → 显示成功 → 延迟关闭
//! 4. 用户取消 → 发送 `UPLOAD_CANCELLED` → 立即关闭
//!
//! 页面是单线程事件循环：所有输入（用户操作、协调器消息、宿主关闭）都从同一个通道进入。

use chrono::Utc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Result, UploadError};
use crate::infrastructure::{CoordinatorLink, RecordStore};
use crate::models::{
    upload_id_from_url, CoordinatorRequest, SurfaceCommand, SurfaceId, UploadId, UploadRecord,
};
use crate::services::capture::{build_document, format_file_size, validate_file, CapturedFile};
use crate::services::MAX_FILE_SIZE;

/// 上传页面配置
#[derive(Debug, Clone)]
pub struct SurfaceSettings {
    /// 显示成功提示后等待多久再关闭页面
    pub grace: Duration,
    /// 文件大小上限
    pub max_file_size: u64,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(2),
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

/// 页面上展示给用户的状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SurfaceView {
    #[default]
    Initializing,
    /// 等待用户选择文件
    AwaitingFile { description: String },
    /// 文件没有通过校验，用户可以重新选择
    Invalid { message: String },
    Uploading { name: String, size: String },
    Succeeded { message: String },
    Failed { message: String },
    Closed,
}

/// 页面状态快照
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SurfaceSnapshot {
    pub view: SurfaceView,
    /// 是否收到过协调器的 `INIT_UPLOAD`
    pub init_received: bool,
}

/// 页面事件循环的输入
#[derive(Debug)]
pub enum SurfaceInput {
    FileSelected(CapturedFile),
    CancelRequested,
    Command(SurfaceCommand),
    /// 宿主关闭页面
    Close,
}

/// 页面退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceExit {
    Completed,
    Cancelled,
    Closed,
    /// 加载阶段失败（例如找不到上传记录）
    Failed,
}

/// 上传页面
pub struct UploadSurface {
    surface_id: SurfaceId,
    records: RecordStore,
    link: CoordinatorLink,
    settings: SurfaceSettings,
    state: watch::Sender<SurfaceSnapshot>,
    upload_id: Option<UploadId>,
    request: Option<UploadRecord>,
}

impl UploadSurface {
    /// 创建上传页面
    ///
    /// `records` 只用于读取自己的记录，所有写入都通过消息交给协调器。
    pub fn new(
        surface_id: SurfaceId,
        records: RecordStore,
        link: CoordinatorLink,
        settings: SurfaceSettings,
    ) -> Self {
        let (state, _) = watch::channel(SurfaceSnapshot::default());
        Self {
            surface_id,
            records,
            link,
            settings,
            state,
            upload_id: None,
            request: None,
        }
    }

    /// 订阅页面状态
    pub fn subscribe(&self) -> watch::Receiver<SurfaceSnapshot> {
        self.state.subscribe()
    }

    /// 运行页面事件循环，直到页面关闭
    pub async fn run(
        mut self,
        launch_url: &str,
        mut inputs: mpsc::UnboundedReceiver<SurfaceInput>,
    ) -> SurfaceExit {
        if let Err(e) = self.on_load(launch_url).await {
            warn!("[页面 {}] ❌ 初始化失败: {}", self.surface_id, e);
            self.show(SurfaceView::Failed {
                message: e.to_string(),
            });
            // 终止错误：不再处理任何操作，只等待页面被关闭
            while let Some(input) = inputs.recv().await {
                if matches!(input, SurfaceInput::Close) {
                    break;
                }
            }
            return self.finish(SurfaceExit::Failed);
        }

        while let Some(input) = inputs.recv().await {
            match input {
                SurfaceInput::FileSelected(file) => {
                    if let Some(exit) = self.handle_file(file).await {
                        return self.finish(exit);
                    }
                }
                SurfaceInput::CancelRequested => {
                    self.cancel();
                    return self.finish(SurfaceExit::Cancelled);
                }
                SurfaceInput::Command(command) => self.handle_command(command),
                SurfaceInput::Close => return self.finish(SurfaceExit::Closed),
            }
        }

        self.finish(SurfaceExit::Closed)
    }

    /// 页面加载：读取记录并报告就绪
    async fn on_load(&mut self, launch_url: &str) -> Result<()> {
        let upload_id = upload_id_from_url(launch_url)
            .ok_or_else(|| UploadError::not_found("(页面地址缺少 uploadId)"))?;
        info!("[上传 {}] 上传页面 {} 正在初始化", upload_id, self.surface_id);

        let record = self
            .records
            .get(&upload_id)
            .await?
            .ok_or_else(|| UploadError::not_found(upload_id.as_str()))?;

        self.show(SurfaceView::AwaitingFile {
            description: format!(
                "上传 {} 用于: {}",
                record.payload.kind.label(),
                record.payload.context
            ),
        });
        self.upload_id = Some(upload_id.clone());
        self.request = Some(record);

        // 文件输入已经就绪，告知协调器消息通道可用
        match self
            .link
            .request(CoordinatorRequest::UploadTabReady {
                upload_id: upload_id.clone(),
            })
            .await
        {
            Ok(response) if response.success => {
                debug!("[上传 {}] 协调器已确认页面就绪", upload_id)
            }
            Ok(response) => warn!(
                "[上传 {}] ⚠️ 协调器未能记录页面就绪: {:?}",
                upload_id, response.error
            ),
            Err(e) => warn!("[上传 {}] ⚠️ 页面就绪消息发送失败: {}", upload_id, e),
        }

        Ok(())
    }

    /// 处理用户选择的文件，返回 `Some` 表示页面应当退出
    async fn handle_file(&self, file: CapturedFile) -> Option<SurfaceExit> {
        let upload_id = self.upload_id.clone()?;

        match self.submit(&upload_id, file).await {
            Ok(()) => {
                self.show(SurfaceView::Succeeded {
                    message: "文档上传成功！".to_string(),
                });
                // 留一点时间显示成功提示
                sleep(self.settings.grace).await;
                Some(SurfaceExit::Completed)
            }
            Err(UploadError::Validation(e)) => {
                info!("[上传 {}] 文件未通过校验: {}", upload_id, e);
                self.show(SurfaceView::Invalid {
                    message: e.to_string(),
                });
                None
            }
            Err(e) => {
                warn!("[上传 {}] ❌ 上传失败: {}", upload_id, e);
                self.show(SurfaceView::Failed {
                    message: format!("上传失败: {}", e),
                });
                None
            }
        }
    }

    /// 校验文件并把文档交给协调器
    async fn submit(&self, upload_id: &UploadId, file: CapturedFile) -> Result<()> {
        let record = self
            .request
            .as_ref()
            .ok_or_else(|| UploadError::not_found(upload_id.as_str()))?;
        validate_file(&file, self.settings.max_file_size)?;

        self.show(SurfaceView::Uploading {
            name: file.name.clone(),
            size: format_file_size(file.size()),
        });

        let document = build_document(&file, &record.payload, Utc::now());
        info!("[上传 {}] 📤 正在上传文档: {}", upload_id, document.name);

        let response = self
            .link
            .request(CoordinatorRequest::UploadComplete {
                document,
                upload_id: upload_id.clone(),
                tab_id: self.surface_id,
            })
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(UploadError::Rejected {
                reason: response.error.unwrap_or_else(|| "未知错误".to_string()),
            })
        }
    }

    /// 用户取消：通知协调器，不等待应答
    fn cancel(&self) {
        let Some(upload_id) = self.upload_id.clone() else {
            return;
        };
        info!("[上传 {}] 用户取消上传", upload_id);
        if let Err(e) = self.link.send(CoordinatorRequest::UploadCancelled {
            upload_id: upload_id.clone(),
            tab_id: self.surface_id,
        }) {
            warn!("[上传 {}] ⚠️ 取消消息发送失败: {}", upload_id, e);
        }
    }

    fn handle_command(&mut self, command: SurfaceCommand) {
        match command {
            SurfaceCommand::InitUpload { upload_id, data } => {
                if self.upload_id.as_ref() != Some(&upload_id) {
                    warn!(
                        "[页面 {}] ⚠️ 收到不属于本页面的 INIT_UPLOAD: {}",
                        self.surface_id, upload_id
                    );
                    return;
                }
                debug!("[上传 {}] 收到 INIT_UPLOAD ({:?})", upload_id, data.kind);
                self.state.send_modify(|s| s.init_received = true);
            }
        }
    }

    fn show(&self, view: SurfaceView) {
        self.state.send_modify(|s| s.view = view);
    }

    fn finish(&self, exit: SurfaceExit) -> SurfaceExit {
        debug!("[页面 {}] 页面关闭: {:?}", self.surface_id, exit);
        self.show(SurfaceView::Closed);
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{Inbound, MemoryStore};
    use crate::models::{launch_url, PayloadKind, Response, UploadPayload};
    use std::sync::Arc;
    use tokio_test::assert_ok;

    struct Harness {
        records: RecordStore,
        link: CoordinatorLink,
        inbox: mpsc::UnboundedReceiver<Inbound>,
    }

    fn harness() -> Harness {
        let (link, inbox) = CoordinatorLink::channel();
        Harness {
            records: RecordStore::new(Arc::new(MemoryStore::new())),
            link,
            inbox,
        }
    }

    async fn seed(records: &RecordStore, id: &str, kind: PayloadKind) -> UploadId {
        let id = UploadId::new(id);
        let record = UploadRecord::new(id.clone(), UploadPayload::new(kind, "Acme Corp"), 1_000);
        assert_ok!(records.create(&record).await);
        id
    }

    /// 模拟协调器：对每个需要应答的消息回复成功，并把消息交给测试检查
    fn answer_all(
        inbox: mpsc::UnboundedReceiver<Inbound>,
    ) -> mpsc::UnboundedReceiver<CoordinatorRequest> {
        answer_with(inbox, |_| Response::ok())
    }

    fn answer_with<F>(
        mut inbox: mpsc::UnboundedReceiver<Inbound>,
        respond: F,
    ) -> mpsc::UnboundedReceiver<CoordinatorRequest>
    where
        F: Fn(&CoordinatorRequest) -> Response + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(inbound) = inbox.recv().await {
                if let Inbound::Message { request, reply } = inbound {
                    if let Some(reply) = reply {
                        let _ = reply.send(respond(&request));
                    }
                    let _ = tx.send(request);
                }
            }
        });
        rx
    }

    #[tokio::test]
    async fn test_missing_record_is_terminal_and_silent() {
        let Harness { records, link, mut inbox } = harness();
        let surface = UploadSurface::new(SurfaceId(1), records, link, SurfaceSettings::default());
        let mut state = surface.subscribe();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            surface.run("http://x/file-upload.html?uploadId=404", input_rx).await
        });

        let snapshot = state
            .wait_for(|s| matches!(s.view, SurfaceView::Failed { .. }))
            .await
            .unwrap()
            .clone();
        assert_eq!(
            snapshot.view,
            SurfaceView::Failed {
                message: "上传记录不存在: 404".to_string()
            }
        );

        // 终止状态下选择文件也不会产生任何消息
        input_tx
            .send(SurfaceInput::FileSelected(CapturedFile::new(
                "a.pdf",
                "application/pdf",
                vec![1],
            )))
            .unwrap();
        input_tx.send(SurfaceInput::Close).unwrap();
        assert_eq!(task.await.unwrap(), SurfaceExit::Failed);
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_file_never_reaches_coordinator() {
        let Harness { records, link, inbox } = harness();
        let id = seed(&records, "10", PayloadKind::Resume).await;
        let mut seen = answer_all(inbox);

        let surface = UploadSurface::new(SurfaceId(2), records, link, SurfaceSettings::default());
        let mut state = surface.subscribe();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let url = launch_url("http://x/file-upload.html", &id);
        let task = tokio::spawn(async move { surface.run(&url, input_rx).await });

        assert_eq!(
            seen.recv().await.unwrap(),
            CoordinatorRequest::UploadTabReady { upload_id: id.clone() }
        );

        input_tx
            .send(SurfaceInput::FileSelected(CapturedFile::new("a.png", "image/png", vec![1])))
            .unwrap();
        state
            .wait_for(|s| matches!(s.view, SurfaceView::Invalid { .. }))
            .await
            .unwrap();

        input_tx.send(SurfaceInput::CancelRequested).unwrap();
        assert_eq!(task.await.unwrap(), SurfaceExit::Cancelled);
        assert_eq!(
            seen.recv().await.unwrap(),
            CoordinatorRequest::UploadCancelled {
                upload_id: id,
                tab_id: SurfaceId(2)
            }
        );
        assert!(seen.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_file_reports_completion_then_closes() {
        let Harness { records, link, inbox } = harness();
        let id = seed(&records, "11", PayloadKind::Certificate).await;
        let mut seen = answer_all(inbox);

        let surface = UploadSurface::new(SurfaceId(3), records, link, SurfaceSettings::default());
        let mut state = surface.subscribe();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let url = launch_url("http://x/file-upload.html", &id);
        let task = tokio::spawn(async move { surface.run(&url, input_rx).await });

        seen.recv().await.unwrap();
        input_tx
            .send(SurfaceInput::Command(SurfaceCommand::InitUpload {
                upload_id: id.clone(),
                data: UploadPayload::new(PayloadKind::Certificate, "Acme Corp"),
            }))
            .unwrap();
        input_tx
            .send(SurfaceInput::FileSelected(CapturedFile::new(
                "cert.pdf",
                "application/pdf",
                b"pdf".to_vec(),
            )))
            .unwrap();

        match seen.recv().await.unwrap() {
            CoordinatorRequest::UploadComplete { document, upload_id, tab_id } => {
                assert_eq!(upload_id, id);
                assert_eq!(tab_id, SurfaceId(3));
                assert_eq!(document.name, "cert.pdf");
                assert_eq!(document.kind, crate::models::DocumentKind::Other);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        state
            .wait_for(|s| matches!(s.view, SurfaceView::Succeeded { .. }))
            .await
            .unwrap();
        assert!(state.borrow().init_received);
        assert_eq!(task.await.unwrap(), SurfaceExit::Completed);
        assert_eq!(state.borrow().view, SurfaceView::Closed);
    }

    #[tokio::test]
    async fn test_rejected_completion_lets_user_retry() {
        let Harness { records, link, inbox } = harness();
        let id = seed(&records, "12", PayloadKind::Resume).await;
        let mut seen = answer_with(inbox, |request| match request {
            CoordinatorRequest::UploadComplete { .. } => Response::failed("存储不可用"),
            _ => Response::ok(),
        });

        let surface = UploadSurface::new(SurfaceId(4), records, link, SurfaceSettings::default());
        let mut state = surface.subscribe();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let url = launch_url("http://x/file-upload.html", &id);
        let task = tokio::spawn(async move { surface.run(&url, input_rx).await });

        seen.recv().await.unwrap();
        input_tx
            .send(SurfaceInput::FileSelected(CapturedFile::new(
                "cv.pdf",
                "application/pdf",
                vec![1; 64],
            )))
            .unwrap();

        let snapshot = state
            .wait_for(|s| matches!(s.view, SurfaceView::Failed { .. }))
            .await
            .unwrap()
            .clone();
        assert_eq!(
            snapshot.view,
            SurfaceView::Failed {
                message: "上传失败: 协调器处理失败: 存储不可用".to_string()
            }
        );

        // 页面没有退出，可以继续操作
        input_tx.send(SurfaceInput::CancelRequested).unwrap();
        assert_eq!(task.await.unwrap(), SurfaceExit::Cancelled);
    }

    #[tokio::test]
    async fn test_coordinator_gone_shows_delivery_failure() {
        let Harness { records, link, inbox } = harness();
        let id = seed(&records, "13", PayloadKind::Resume).await;
        drop(inbox);

        let surface = UploadSurface::new(SurfaceId(5), records, link, SurfaceSettings::default());
        let mut state = surface.subscribe();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let url = launch_url("http://x/file-upload.html", &id);
        let task = tokio::spawn(async move { surface.run(&url, input_rx).await });

        // 就绪消息发送失败不影响页面加载
        state
            .wait_for(|s| matches!(s.view, SurfaceView::AwaitingFile { .. }))
            .await
            .unwrap();
        input_tx
            .send(SurfaceInput::FileSelected(CapturedFile::new(
                "cv.pdf",
                "application/pdf",
                vec![1; 64],
            )))
            .unwrap();

        let snapshot = state
            .wait_for(|s| matches!(s.view, SurfaceView::Failed { .. }))
            .await
            .unwrap()
            .clone();
        assert_eq!(
            snapshot.view,
            SurfaceView::Failed {
                message: "上传失败: 消息投递失败: 接收方已关闭: coordinator".to_string()
            }
        );

        input_tx.send(SurfaceInput::Close).unwrap();
        assert_eq!(task.await.unwrap(), SurfaceExit::Closed);
    }
}
