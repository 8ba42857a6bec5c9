//! 上传协调器 - 编排层
//!
//! 协调器是常驻进程，唯一负责写上传记录，驱动每次上传尝试的状态机：
//!
//! ```text
//! Starting ─(创建)→ SurfaceCreated ─(UPLOAD_TAB_READY)→ Ready ─┬─(UPLOAD_COMPLETE)→ Completed
//!                                                                 └─(UPLOAD_CANCELLED)→ Cancelled
//! ```
//!
//! 消息之间没有顺序保证，状态只前进不后退，允许跳过中间状态。
//! 从未到达终态的记录只会被启动时的清理回收。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::browser::SurfaceHost;
use crate::error::{HostError, Result, StoreError, UploadError};
use crate::infrastructure::{Inbound, RecordStore};
use crate::models::{
    is_stale, launch_url, now_millis, CoordinatorRequest, Document, Notification, Response,
    SurfaceCommand, SurfaceId, UploadId, UploadIdGenerator, UploadPayload, UploadRecord,
    UploadStatus, RECORD_KEY_PREFIX,
};
use crate::orchestrator::attempts::AttemptTable;
use crate::orchestrator::load_registry::{LoadListenerRegistry, PendingInit, Registration};
use crate::services::{DocumentRepository, Notifier};

/// 生成的 ID 与已有记录冲突时最多重试几次
const MAX_ID_RETRIES: usize = 3;

/// 协调器配置
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// 页面加载完成后等待多久再发送 `INIT_UPLOAD`
    pub settle_delay: Duration,
    /// 启动清理的记录年龄阈值（毫秒）
    pub sweep_max_age_ms: i64,
    /// 上传页面基础地址
    pub surface_base_url: String,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(200),
            sweep_max_age_ms: 3_600_000,
            surface_base_url: "http://localhost:8080/file-upload.html".to_string(),
        }
    }
}

/// 启动清理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    /// 无法读取或缺少 createdAt 的记录
    pub skipped: usize,
}

/// 上传协调器
pub struct Coordinator {
    records: RecordStore,
    repository: DocumentRepository,
    host: Arc<dyn SurfaceHost>,
    notifier: Notifier,
    attempts: AttemptTable,
    listeners: LoadListenerRegistry,
    ids: UploadIdGenerator,
    settings: CoordinatorSettings,
}

impl Coordinator {
    pub fn new(
        records: RecordStore,
        repository: DocumentRepository,
        host: Arc<dyn SurfaceHost>,
        notifier: Notifier,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            records,
            repository,
            host,
            notifier,
            attempts: AttemptTable::new(),
            listeners: LoadListenerRegistry::new(),
            ids: UploadIdGenerator::new(),
            settings,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn repository(&self) -> &DocumentRepository {
        &self.repository
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn attempts(&self) -> &AttemptTable {
        &self.attempts
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// 请求上传
    ///
    /// 写入 `Starting` 记录后立即返回 ID，上传页面在后台任务中创建。
    /// 页面创建失败时删除记录并移除进行中的尝试。
    pub async fn request_upload(self: &Arc<Self>, payload: UploadPayload) -> Result<UploadId> {
        let mut retries = 0;
        let (id, now) = loop {
            let now = now_millis();
            let id = self.ids.next_at(now);
            let record = UploadRecord::new(id.clone(), payload.clone(), now);
            match self.records.create(&record).await {
                Ok(()) => break (id, now),
                Err(StoreError::AlreadyExists { key }) if retries < MAX_ID_RETRIES => {
                    warn!("⚠️ 上传 ID 冲突 ({})，重新生成", key);
                    retries += 1;
                }
                Err(e) => {
                    error!("❌ 写入上传记录失败: {}", e);
                    return Err(e.into());
                }
            }
        };

        self.attempts.insert(id.clone(), payload.clone(), now);
        info!(
            "[上传 {}] 🚀 收到上传请求: {} ({})",
            id,
            payload.kind.label(),
            payload.context
        );

        let this = Arc::clone(self);
        let launch_id = id.clone();
        tokio::spawn(async move {
            this.launch_surface(launch_id, payload).await;
        });

        Ok(id)
    }

    /// 创建上传页面并挂上一次性加载监听
    async fn launch_surface(&self, id: UploadId, payload: UploadPayload) {
        let url = launch_url(&self.settings.surface_base_url, &id);
        let surface_id = match self.host.create(&url).await {
            Ok(surface_id) => surface_id,
            Err(e) => {
                self.abort_attempt(&id, None, e.into()).await;
                return;
            }
        };

        if !self.attempts.set_surface(&id, surface_id) {
            debug!("[上传 {}] 页面 {} 创建时尝试已结束，关闭页面", id, surface_id);
            self.listeners.forget(surface_id);
            if let Err(e) = self.host.close(surface_id).await {
                debug!("[上传 {}] 关闭页面 {} 失败: {}", id, surface_id, e);
            }
            return;
        }

        match self.bind_surface(&id, surface_id, payload).await {
            Ok(Some(init)) => self.send_init(surface_id, init).await,
            Ok(None) => {}
            // 页面属于另一次上传，不能关闭
            Err(e @ UploadError::Host(HostError::DuplicateSurface(_))) => {
                self.abort_attempt(&id, None, e).await
            }
            Err(e) => self.abort_attempt(&id, Some(surface_id), e).await,
        }
    }

    /// 注册加载监听并把页面写入记录，返回提前到达的加载事件
    async fn bind_surface(
        &self,
        id: &UploadId,
        surface_id: SurfaceId,
        payload: UploadPayload,
    ) -> Result<Option<PendingInit>> {
        let init = PendingInit {
            upload_id: id.clone(),
            payload,
        };
        let early = match self
            .listeners
            .register(surface_id, init)
            .map_err(|e| HostError::DuplicateSurface(e.0))?
        {
            Registration::Armed => None,
            Registration::Fired(init) => Some(init),
        };

        let now = now_millis();
        let record = self
            .records
            .update(id, |record| {
                record.attach_surface(surface_id);
                record.advance(UploadStatus::SurfaceCreated, now);
            })
            .await?
            .ok_or_else(|| UploadError::not_found(id.as_str()))?;
        info!(
            "[上传 {}] 🪟 上传页面 {} 已创建 (状态: {:?})",
            id, surface_id, record.status
        );
        Ok(early)
    }

    /// 启动失败：关闭页面、删除记录、移除进行中的尝试
    async fn abort_attempt(
        &self,
        id: &UploadId,
        surface_id: Option<SurfaceId>,
        reason: UploadError,
    ) {
        error!("[上传 {}] ❌ 启动上传页面失败，放弃本次上传: {}", id, reason);
        self.attempts.remove(id);
        if let Some(surface_id) = surface_id {
            self.listeners.forget(surface_id);
            if let Err(e) = self.host.close(surface_id).await {
                debug!("[上传 {}] 关闭页面 {} 失败: {}", id, surface_id, e);
            }
        }
        match self.records.delete(id).await {
            Ok(()) => info!("[上传 {}] 🧹 已清理未完成的上传记录", id),
            Err(e) => error!("[上传 {}] ❌ 清理上传记录失败，等待启动清理: {}", id, e),
        }
    }

    /// 宿主报告页面加载完成
    pub async fn surface_loaded(&self, surface_id: SurfaceId) {
        match self.listeners.fire(surface_id) {
            Some(init) => self.send_init(surface_id, init).await,
            None => debug!("页面 {} 加载完成，暂无对应的监听", surface_id),
        }
    }

    /// 等待页面完成自身初始化后发送 `INIT_UPLOAD`，失败只记录日志
    async fn send_init(&self, surface_id: SurfaceId, init: PendingInit) {
        sleep(self.settings.settle_delay).await;

        let upload_id = init.upload_id.clone();
        let command = SurfaceCommand::InitUpload {
            upload_id: init.upload_id,
            data: init.payload,
        };
        match self.host.deliver(surface_id, command).await {
            Ok(()) => debug!("[上传 {}] 📨 已向页面 {} 发送 INIT_UPLOAD", upload_id, surface_id),
            Err(e) => warn!(
                "[上传 {}] ⚠️ INIT_UPLOAD 发送失败 (页面 {}): {}",
                upload_id, surface_id, e
            ),
        }
    }

    /// 页面就绪：合并写入 `Ready` 和 `surfaceReady`，保留其它字段
    pub async fn surface_ready(&self, id: &UploadId) -> Result<UploadRecord> {
        let now = now_millis();
        let record = self
            .records
            .update(id, |record| {
                record.surface_ready = true;
                record.last_updated_at = now;
                record.advance(UploadStatus::Ready, now);
            })
            .await?
            .ok_or_else(|| UploadError::not_found(id.as_str()))?;

        info!("[上传 {}] ✓ 上传页面已就绪 (状态: {:?})", id, record.status);
        Ok(record)
    }

    /// 上传完成
    ///
    /// 文档写入文档库成功后才把记录推进到 `Completed`；文档库写入失败时返回错误，
    /// 记录保持原状态。重复的完成消息不会再次写入文档。
    pub async fn upload_finished(
        &self,
        id: &UploadId,
        document: Document,
        surface_id: SurfaceId,
    ) -> Result<()> {
        let txn = self.records.lock(id).await;
        let existing = txn.load().await?;

        if let Some(record) = existing.as_ref().filter(|r| r.status.is_terminal()) {
            info!("[上传 {}] 重复的完成消息 (状态: {:?})，忽略", id, record.status);
            drop(txn);
            self.teardown(id, surface_id).await;
            return Ok(());
        }
        if existing.is_none() {
            warn!("[上传 {}] ⚠️ 上传记录不存在（可能已被清理），仍然保存文档", id);
        }

        let stored = self.repository.append(document).await.map_err(|e| {
            error!("[上传 {}] ❌ 保存文档失败: {}", id, e);
            e
        })?;

        if let Some(mut record) = existing {
            let now = now_millis();
            record.attach_surface(surface_id);
            record.advance(UploadStatus::Completed, now);
            record.completed_at = Some(now);
            record.artifact = Some(stored.clone());
            if let Err(e) = txn.save(&record).await {
                error!("[上传 {}] ❌ 文档已保存，但更新上传记录失败: {}", id, e);
            }
        }
        drop(txn);

        info!("[上传 {}] ✅ 上传完成: {}", id, stored.name);
        self.teardown(id, surface_id).await;
        self.notifier.publish(Notification::UploadSuccess {
            document_name: stored.name,
            document_type: stored.kind,
        });
        Ok(())
    }

    /// 用户取消：记录推进到 `Cancelled`，不写文档库
    pub async fn upload_cancelled(&self, id: &UploadId, surface_id: SurfaceId) -> Result<()> {
        let now = now_millis();
        let updated = self
            .records
            .update(id, |record| {
                record.attach_surface(surface_id);
                if record.advance(UploadStatus::Cancelled, now) {
                    record.cancelled_at = Some(now);
                }
            })
            .await;

        self.teardown(id, surface_id).await;

        match updated? {
            Some(record) if record.status == UploadStatus::Completed => {
                info!("[上传 {}] 上传已完成，忽略取消消息", id);
            }
            Some(_) => {
                info!("[上传 {}] 🚫 上传已取消", id);
                self.notifier.publish(Notification::UploadCancelled);
            }
            None => {
                warn!("[上传 {}] ⚠️ 取消时上传记录已不存在", id);
                self.notifier.publish(Notification::UploadCancelled);
            }
        }
        Ok(())
    }

    /// 终态清理：移除进行中的尝试，关闭页面
    async fn teardown(&self, id: &UploadId, surface_id: SurfaceId) {
        if self.attempts.remove(id).is_some() {
            debug!("[上传 {}] 已移除进行中的尝试", id);
        }
        self.listeners.forget(surface_id);
        if let Err(e) = self.host.close(surface_id).await {
            debug!("[上传 {}] 页面 {} 已关闭: {}", id, surface_id, e);
        }
    }

    /// 启动清理：删除创建时间超过阈值的上传记录，不区分状态
    pub async fn startup_sweep(&self) -> Result<SweepReport> {
        self.startup_sweep_at(now_millis()).await
    }

    pub async fn startup_sweep_at(&self, now_ms: i64) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let max_age = self.settings.sweep_max_age_ms;

        for key in self.records.record_keys().await? {
            report.scanned += 1;

            let created_at = match self.records.raw(&key).await {
                Ok(Some(value)) => value.get("createdAt").and_then(|v| v.as_i64()),
                Ok(None) => continue,
                Err(e) => {
                    warn!("⚠️ 读取 {} 失败: {}", key, e);
                    None
                }
            };
            let Some(created_at) = created_at else {
                warn!("⚠️ 无法识别的上传记录，跳过: {}", key);
                report.skipped += 1;
                continue;
            };

            if is_stale(created_at, now_ms, max_age) {
                let id = UploadId::new(key.trim_start_matches(RECORD_KEY_PREFIX));
                match self.records.delete(&id).await {
                    Ok(()) => {
                        debug!("🧹 删除过期上传记录: {}", key);
                        report.removed += 1;
                    }
                    Err(e) => error!("❌ 删除过期上传记录 {} 失败: {}", key, e),
                }
            }
        }

        Ok(report)
    }

    /// 处理一条入站事件
    pub async fn dispatch(self: &Arc<Self>, inbound: Inbound) {
        match inbound {
            Inbound::SurfaceLoaded(surface_id) => self.surface_loaded(surface_id).await,
            Inbound::Message { request, reply } => {
                let kind = request.kind();
                let response = self.handle_request(request).await;
                if let Some(reply) = reply {
                    if reply.send(response).is_err() {
                        debug!("{} 的发送方已关闭，丢弃应答", kind);
                    }
                }
            }
        }
    }

    async fn handle_request(self: &Arc<Self>, request: CoordinatorRequest) -> Response {
        let result = match request {
            CoordinatorRequest::UploadDocument { data } => {
                return match self.request_upload(data).await {
                    Ok(id) => Response::started(id),
                    Err(e) => Response::failed(e),
                };
            }
            CoordinatorRequest::UploadTabReady { upload_id } => {
                self.surface_ready(&upload_id).await.map(|_| ())
            }
            CoordinatorRequest::UploadComplete {
                document,
                upload_id,
                tab_id,
            } => self.upload_finished(&upload_id, document, tab_id).await,
            CoordinatorRequest::UploadCancelled { upload_id, tab_id } => {
                self.upload_cancelled(&upload_id, tab_id).await
            }
        };

        match result {
            Ok(()) => Response::ok(),
            Err(e) => {
                warn!("⚠️ 处理消息失败: {}", e);
                Response::failed(e)
            }
        }
    }

    /// 持续处理入站事件，每个事件在独立任务中处理，互不阻塞
    pub async fn serve(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Inbound>) {
        info!("📡 协调器开始处理消息");
        while let Some(inbound) = inbox.recv().await {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.dispatch(inbound).await;
            });
        }
        info!("消息通道已关闭，协调器停止");
    }
}
