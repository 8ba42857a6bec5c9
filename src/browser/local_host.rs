//! 进程内上传页面宿主
//!
//! 每个上传页面是一个运行 `UploadSurface` 事件循环的 tokio 任务。
//! 通过 `SurfaceRemote` 可以模拟用户在页面上的操作（选择文件、取消）。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::browser::SurfaceHost;
use crate::error::HostError;
use crate::infrastructure::{CoordinatorLink, RecordStore};
use crate::models::{upload_id_from_url, SurfaceCommand, SurfaceId, UploadId};
use crate::services::CapturedFile;
use crate::workflow::{SurfaceInput, SurfaceSettings, SurfaceSnapshot, SurfaceView, UploadSurface};

#[derive(Clone)]
struct LocalSurface {
    upload_id: Option<UploadId>,
    inputs: mpsc::UnboundedSender<SurfaceInput>,
    state: watch::Receiver<SurfaceSnapshot>,
}

type SurfaceMap = HashMap<SurfaceId, LocalSurface>;

/// 进程内上传页面宿主
pub struct LocalSurfaceHost {
    records: RecordStore,
    link: CoordinatorLink,
    settings: SurfaceSettings,
    next_id: AtomicU64,
    surfaces: Arc<Mutex<SurfaceMap>>,
}

impl LocalSurfaceHost {
    pub fn new(records: RecordStore, link: CoordinatorLink, settings: SurfaceSettings) -> Self {
        Self {
            records,
            link,
            settings,
            next_id: AtomicU64::new(0),
            surfaces: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 按页面 ID 获取遥控句柄
    pub fn remote(&self, surface_id: SurfaceId) -> Option<SurfaceRemote> {
        let surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        surfaces
            .get(&surface_id)
            .map(|surface| SurfaceRemote::new(surface_id, surface))
    }

    /// 按上传 ID 获取遥控句柄
    pub fn remote_for_upload(&self, upload_id: &UploadId) -> Option<SurfaceRemote> {
        let surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        surfaces
            .iter()
            .find(|(_, surface)| surface.upload_id.as_ref() == Some(upload_id))
            .map(|(id, surface)| SurfaceRemote::new(*id, surface))
    }

    /// 当前打开的页面数量
    pub fn open_surfaces(&self) -> usize {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take_inputs(
        &self,
        surface_id: SurfaceId,
        remove: bool,
    ) -> Option<mpsc::UnboundedSender<SurfaceInput>> {
        let mut surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
        if remove {
            surfaces.remove(&surface_id).map(|s| s.inputs)
        } else {
            surfaces.get(&surface_id).map(|s| s.inputs.clone())
        }
    }
}

#[async_trait]
impl SurfaceHost for LocalSurfaceHost {
    async fn create(&self, launch_url: &str) -> Result<SurfaceId, HostError> {
        let surface_id = SurfaceId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (inputs, input_rx) = mpsc::unbounded_channel();
        let surface = UploadSurface::new(
            surface_id,
            self.records.clone(),
            self.link.clone(),
            self.settings.clone(),
        );
        let state = surface.subscribe();

        {
            let mut surfaces = self.surfaces.lock().unwrap_or_else(PoisonError::into_inner);
            surfaces.insert(
                surface_id,
                LocalSurface {
                    upload_id: upload_id_from_url(launch_url),
                    inputs,
                    state,
                },
            );
        }

        let surfaces = Arc::clone(&self.surfaces);
        let url = launch_url.to_string();
        tokio::spawn(async move {
            let exit = surface.run(&url, input_rx).await;
            debug!("[页面 {}] 任务结束: {:?}", surface_id, exit);
            surfaces
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&surface_id);
        });

        info!("🪟 已创建上传页面 {}: {}", surface_id, launch_url);
        if let Err(e) = self.link.surface_loaded(surface_id) {
            warn!("[页面 {}] ⚠️ 无法报告页面加载完成: {}", surface_id, e);
        }
        Ok(surface_id)
    }

    async fn deliver(
        &self,
        surface_id: SurfaceId,
        command: SurfaceCommand,
    ) -> Result<(), HostError> {
        let inputs = self
            .take_inputs(surface_id, false)
            .ok_or(HostError::SurfaceGone(surface_id))?;
        inputs
            .send(SurfaceInput::Command(command))
            .map_err(|_| HostError::SurfaceGone(surface_id))
    }

    async fn close(&self, surface_id: SurfaceId) -> Result<(), HostError> {
        let inputs = self
            .take_inputs(surface_id, true)
            .ok_or(HostError::SurfaceGone(surface_id))?;
        inputs
            .send(SurfaceInput::Close)
            .map_err(|_| HostError::SurfaceGone(surface_id))
    }
}

/// 进程内上传页面的遥控句柄
#[derive(Clone)]
pub struct SurfaceRemote {
    surface_id: SurfaceId,
    inputs: mpsc::UnboundedSender<SurfaceInput>,
    state: watch::Receiver<SurfaceSnapshot>,
}

impl SurfaceRemote {
    fn new(surface_id: SurfaceId, surface: &LocalSurface) -> Self {
        Self {
            surface_id,
            inputs: surface.inputs.clone(),
            state: surface.state.clone(),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.surface_id
    }

    /// 模拟用户选择文件，页面已关闭时返回 false
    pub fn select_file(&self, file: CapturedFile) -> bool {
        self.inputs.send(SurfaceInput::FileSelected(file)).is_ok()
    }

    /// 模拟用户点击取消
    pub fn cancel(&self) -> bool {
        self.inputs.send(SurfaceInput::CancelRequested).is_ok()
    }

    pub fn snapshot(&self) -> SurfaceSnapshot {
        self.state.borrow().clone()
    }

    /// 等待页面进入满足条件的状态；页面任务结束前都没有满足时返回 `None`
    pub async fn wait_for_view<F>(&mut self, mut predicate: F) -> Option<SurfaceSnapshot>
    where
        F: FnMut(&SurfaceView) -> bool,
    {
        self.state
            .wait_for(|snapshot| predicate(&snapshot.view))
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}
