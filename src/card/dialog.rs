//! 详情对话框
//!
//! 每个打开的对话框是一个独立的 tokio 任务，独占自己的全部状态，一次只处理
//! 一个事件。事件来源：
//! - 句柄发来的用户操作（翻页、选择 activity、按键、关闭）
//! - 状态缓存的推送（broadcast）
//! - activity 总线的通知（broadcast）
//! - 放弃计时器、轮询计时器、派发结果（各自 spawn 的任务）
//!
//! 推送和轮询两条路径都调用同一个幂等的完成判定，谁先看到新数据谁清除请求。

use super::activity::{resolve, ActivityResolution};
use super::bus::{ActivityBus, ActivityChanged};
use super::completion::{has_data, is_satisfied};
use super::projection::{project, DialogView};
use super::tracker::RequestTracker;
use crate::error::{HassError, HassResult};
use crate::hass::{EntitySnapshot, Hass, HubCommand, KeyCategory, StateChange};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 获取/轮询参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// 请求放弃时间（毫秒）
    #[serde(default = "default_giveup")]
    pub giveup_ms: u64,
    /// 轮询间隔（毫秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// 每次轮询前的等待（毫秒）
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    /// update_entity 之后读取状态前的等待（毫秒）
    #[serde(default = "default_refresh_wait")]
    pub refresh_wait_ms: u64,
    /// 打开时没有快照，重试一次前的等待（毫秒）
    #[serde(default = "default_mount_retry")]
    pub mount_retry_ms: u64,
}

fn default_giveup() -> u64 {
    15_000
}

fn default_poll_interval() -> u64 {
    2_000
}

fn default_settle_delay() -> u64 {
    1_000
}

fn default_refresh_wait() -> u64 {
    crate::hass::DEFAULT_REFRESH_WAIT_MS
}

fn default_mount_retry() -> u64 {
    100
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            giveup_ms: default_giveup(),
            poll_interval_ms: default_poll_interval(),
            settle_delay_ms: default_settle_delay(),
            refresh_wait_ms: default_refresh_wait(),
            mount_retry_ms: default_mount_retry(),
        }
    }
}

impl FetchConfig {
    pub fn giveup(&self) -> Duration {
        Duration::from_millis(self.giveup_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn refresh_wait(&self) -> Duration {
        Duration::from_millis(self.refresh_wait_ms)
    }

    pub fn mount_retry(&self) -> Duration {
        Duration::from_millis(self.mount_retry_ms)
    }
}

/// 打开对话框的参数
#[derive(Debug, Clone)]
pub struct DialogOptions {
    /// 跟踪的实体，也是 activity 总线上的 tracking key
    pub entity_id: String,
    /// 缓存里没有该实体时使用的快照
    pub fallback: Option<EntitySnapshot>,
    /// 外部选择的 activity（概览卡片上的选择）
    pub selected_activity_id: Option<i64>,
    pub page: KeyCategory,
}

impl DialogOptions {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            fallback: None,
            selected_activity_id: None,
            page: KeyCategory::Assigned,
        }
    }

    pub fn with_fallback(mut self, snapshot: EntitySnapshot) -> Self {
        self.fallback = Some(snapshot);
        self
    }

    pub fn with_selected_activity(mut self, activity_id: Option<i64>) -> Self {
        self.selected_activity_id = activity_id;
        self
    }

    pub fn with_page(mut self, page: KeyCategory) -> Self {
        self.page = page;
        self
    }
}

/// 用户在对话框里的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// 遥控按键（key_id）
    Assigned(i64),
    Macro(i64),
    Favorite(i64),
    /// 启动 activity，未指定时启动当前匹配的 activity
    StartActivity(Option<i64>),
    StopActivity,
    Refresh,
    RequestBasicData,
}

enum DialogCommand {
    SetPage(KeyCategory),
    NextPage,
    PrevPage,
    SelectActivity(Option<i64>),
    Press(KeyAction),
    Close(oneshot::Sender<()>),
}

/// 计时器和派发任务回送给对话框的事件
#[derive(Debug, Clone, Copy)]
enum Internal {
    GiveupElapsed { category: KeyCategory, generation: u64 },
    PollRefreshed { category: KeyCategory, generation: u64 },
    DispatchFailed { category: KeyCategory, generation: u64 },
    MountRetry,
}

/// 打开中的对话框的句柄
pub struct DialogHandle {
    id: Uuid,
    entity_id: String,
    commands: mpsc::Sender<DialogCommand>,
    view: watch::Receiver<Option<DialogView>>,
    task: JoinHandle<()>,
}

impl DialogHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// 当前视图（对话框关闭后为 None）
    pub fn view(&self) -> Option<DialogView> {
        self.view.borrow().clone()
    }

    /// 订阅视图变化
    pub fn subscribe_view(&self) -> watch::Receiver<Option<DialogView>> {
        self.view.clone()
    }

    async fn send(&self, command: DialogCommand) -> HassResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HassError::NotConnected)
    }

    pub async fn set_page(&self, page: KeyCategory) -> HassResult<()> {
        self.send(DialogCommand::SetPage(page)).await
    }

    pub async fn next_page(&self) -> HassResult<()> {
        self.send(DialogCommand::NextPage).await
    }

    pub async fn prev_page(&self) -> HassResult<()> {
        self.send(DialogCommand::PrevPage).await
    }

    /// 直接更新外部选择的 activity
    pub async fn select_activity(&self, activity_id: Option<i64>) -> HassResult<()> {
        self.send(DialogCommand::SelectActivity(activity_id)).await
    }

    pub async fn press(&self, action: KeyAction) -> HassResult<()> {
        self.send(DialogCommand::Press(action)).await
    }

    /// 关闭对话框并等待清理完成；已关闭时直接返回
    pub async fn close(self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(DialogCommand::Close(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        let _ = self.task.await;
    }
}

/// 打开对话框，返回其句柄
pub fn open(
    hass: Arc<Hass>,
    bus: &ActivityBus,
    config: FetchConfig,
    options: DialogOptions,
) -> DialogHandle {
    let id = Uuid::new_v4();
    let (commands_tx, commands_rx) = mpsc::channel(32);
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(None);

    // 先订阅，打开过程中的推送不会丢失
    let states = hass.subscribe();
    let signals = bus.subscribe();

    let entity_id = options.entity_id.clone();
    let dialog = DetailDialog {
        id,
        hass,
        config,
        entity_id: options.entity_id,
        fallback: options.fallback,
        external: options.selected_activity_id,
        page: options.page,
        last_effective: None,
        tracker: RequestTracker::new(),
        connected: true,
        internal: internal_tx,
        view: view_tx,
    };
    info!("[{}] Opening detail dialog for {}", id, entity_id);
    let task = tokio::spawn(dialog.run(commands_rx, internal_rx, states, signals));

    DialogHandle {
        id,
        entity_id,
        commands: commands_tx,
        view: view_rx,
        task,
    }
}

struct DetailDialog {
    id: Uuid,
    hass: Arc<Hass>,
    config: FetchConfig,
    entity_id: String,
    fallback: Option<EntitySnapshot>,
    external: Option<i64>,
    page: KeyCategory,
    /// 上一次解析出的 effective activity
    last_effective: Option<i64>,
    tracker: RequestTracker,
    /// 关闭后为 false，之后的所有回调都不再生效
    connected: bool,
    internal: mpsc::UnboundedSender<Internal>,
    view: watch::Sender<Option<DialogView>>,
}

impl DetailDialog {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<DialogCommand>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        mut states: broadcast::Receiver<StateChange>,
        mut signals: broadcast::Receiver<ActivityChanged>,
    ) {
        let mut states_open = true;
        let mut signals_open = true;

        self.mount();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(DialogCommand::Close(ack)) => {
                        self.teardown().await;
                        let _ = ack.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
                Some(event) = internal.recv() => self.handle_internal(event),
                change = states.recv(), if states_open => match change {
                    Ok(change) if change.entity_id == self.entity_id => self.on_store_push(),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("[{}] Missed {} state changes, rechecking", self.id, skipped);
                        self.on_store_push();
                    }
                    Err(RecvError::Closed) => states_open = false,
                },
                signal = signals.recv(), if signals_open => match signal {
                    Ok(signal) if signal.tracking_key == self.entity_id => {
                        self.on_activity_changed(signal.selected_activity_id);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[{}] Missed {} activity signals", self.id, skipped);
                    }
                    Err(RecvError::Closed) => signals_open = false,
                },
            }
        }

        info!("[{}] Detail dialog closed", self.id);
    }

    fn latest(&self) -> Option<EntitySnapshot> {
        self.hass.latest(Some(&self.entity_id), self.fallback.as_ref())
    }

    fn mount(&mut self) {
        match self.latest() {
            Some(snapshot) => {
                let resolution = resolve(self.external, &snapshot);
                self.last_effective = resolution.effective;
                self.maybe_fetch(self.page, resolution.effective, &snapshot, true);
            }
            None => {
                debug!(
                    "[{}] No snapshot for {} yet, retrying in {:?}",
                    self.id,
                    self.entity_id,
                    self.config.mount_retry()
                );
                let events = self.internal.clone();
                let delay = self.config.mount_retry();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Internal::MountRetry);
                });
            }
        }
        self.publish();
    }

    fn handle_command(&mut self, command: DialogCommand) {
        if !self.connected {
            return;
        }
        match command {
            DialogCommand::SetPage(page) => self.change_page(page),
            DialogCommand::NextPage => {
                if let Some(page) = self.page.next() {
                    self.change_page(page);
                }
            }
            DialogCommand::PrevPage => {
                if let Some(page) = self.page.prev() {
                    self.change_page(page);
                }
            }
            DialogCommand::SelectActivity(activity_id) => self.on_activity_changed(activity_id),
            DialogCommand::Press(action) => self.press(action),
            // run 里已处理
            DialogCommand::Close(_) => {}
        }
    }

    fn handle_internal(&mut self, event: Internal) {
        if !self.connected {
            return;
        }
        match event {
            Internal::GiveupElapsed {
                category,
                generation,
            } => {
                if self.tracker.complete_if_current(category, generation) {
                    warn!(
                        "[{}] Gave up waiting for {} keys after {:?}",
                        self.id,
                        category,
                        self.config.giveup()
                    );
                    self.publish();
                }
            }
            Internal::PollRefreshed {
                category,
                generation,
            } => {
                if !self.tracker.is_current(category, generation) {
                    return;
                }
                if let Some(snapshot) = self.latest() {
                    if self.check_completion(category, &snapshot) {
                        self.refetch_current_page(&snapshot);
                    }
                }
                self.publish();
            }
            Internal::DispatchFailed {
                category,
                generation,
            } => {
                if self.tracker.complete_if_current(category, generation) {
                    self.publish();
                }
            }
            Internal::MountRetry => {
                if let Some(snapshot) = self.latest() {
                    let resolution = resolve(self.external, &snapshot);
                    self.last_effective = resolution.effective;
                    self.maybe_fetch(self.page, resolution.effective, &snapshot, false);
                } else {
                    debug!("[{}] Still no snapshot for {}", self.id, self.entity_id);
                }
                self.publish();
            }
        }
    }

    fn change_page(&mut self, page: KeyCategory) {
        if page == self.page {
            return;
        }
        debug!("[{}] Page changed to {} ({}/3)", self.id, page, page.page_number());
        self.page = page;
        if let Some(snapshot) = self.latest() {
            let resolution = resolve(self.external, &snapshot);
            self.maybe_fetch(page, resolution.effective, &snapshot, false);
        }
        self.publish();
    }

    /// 外部选择的 activity 变化（总线通知或直接选择）
    fn on_activity_changed(&mut self, selected: Option<i64>) {
        self.external = selected;
        if let Some(snapshot) = self.latest() {
            let resolution = resolve(self.external, &snapshot);
            if resolution.effective != self.last_effective {
                debug!(
                    "[{}] Effective activity {:?} -> {:?}",
                    self.id, self.last_effective, resolution.effective
                );
                self.last_effective = resolution.effective;
                self.maybe_fetch(self.page, resolution.effective, &snapshot, false);
            }
        }
        self.publish();
    }

    /// 状态缓存推送：检查所有在途类别
    fn on_store_push(&mut self) {
        if !self.connected {
            return;
        }
        let Some(snapshot) = self.latest() else {
            return;
        };

        let mut completed = false;
        for category in self.tracker.in_flight_categories() {
            completed |= self.check_completion(category, &snapshot);
        }
        if completed {
            self.refetch_current_page(&snapshot);
        }
        self.publish();
    }

    /// 完成判定，满足时结束请求
    fn check_completion(&mut self, category: KeyCategory, snapshot: &EntitySnapshot) -> bool {
        let Some(activity_id) = self.tracker.requested_activity(category) else {
            return false;
        };
        let issued_at = self.tracker.issued_at(category);
        if !is_satisfied(category, activity_id, snapshot, issued_at) {
            return false;
        }
        info!(
            "[{}] Received {} {} keys for activity {}",
            self.id,
            snapshot.attributes.key_count(category, activity_id),
            category,
            activity_id
        );
        self.tracker.complete(category)
    }

    /// 请求完成后，当前页如果仍缺数据（如请求期间切换了 activity）再取一次
    fn refetch_current_page(&mut self, snapshot: &EntitySnapshot) {
        let resolution = resolve(self.external, snapshot);
        self.maybe_fetch(self.page, resolution.effective, snapshot, false);
    }

    /// 按需获取某类按键数据
    ///
    /// 已有数据且非强制、或该类别已有在途请求时不发请求。返回是否发出了请求。
    fn maybe_fetch(
        &mut self,
        category: KeyCategory,
        activity_id: Option<i64>,
        snapshot: &EntitySnapshot,
        force_refresh: bool,
    ) -> bool {
        let Some(activity_id) = activity_id else {
            debug!("[{}] No effective activity, skipping {} fetch", self.id, category);
            return false;
        };
        if has_data(category, activity_id, snapshot) && !force_refresh {
            debug!(
                "[{}] {}[{}] already cached",
                self.id,
                category.attribute_name(),
                activity_id
            );
            return false;
        }
        if self.tracker.is_in_flight(category) {
            debug!("[{}] {} request already in flight", self.id, category);
            return false;
        }
        let Some(generation) = self.tracker.begin(category, activity_id, Utc::now()) else {
            return false;
        };

        info!(
            "[{}] Requesting {} keys for activity {}",
            self.id, category, activity_id
        );
        self.dispatch_request(category, activity_id, generation);
        let giveup = self.spawn_giveup(category, generation);
        let poll = self.spawn_poll(category, generation);
        self.tracker.attach_timers(category, generation, giveup, poll);
        true
    }

    fn dispatch_request(&self, category: KeyCategory, activity_id: i64, generation: u64) {
        let hass = self.hass.clone();
        let events = self.internal.clone();
        let entity_id = self.entity_id.clone();
        let id = self.id;
        tokio::spawn(async move {
            let command = HubCommand::request_keys(category, activity_id);
            if let Err(e) = hass.send_command(&entity_id, &command).await {
                error!("[{}] Failed to request {} keys: {}", id, category, e);
                let _ = events.send(Internal::DispatchFailed {
                    category,
                    generation,
                });
            }
        });
    }

    fn spawn_giveup(&self, category: KeyCategory, generation: u64) -> JoinHandle<()> {
        let events = self.internal.clone();
        let after = self.config.giveup();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(Internal::GiveupElapsed {
                category,
                generation,
            });
        })
    }

    /// 周期轮询：等待片刻后主动刷新实体，再让对话框检查是否完成
    fn spawn_poll(&self, category: KeyCategory, generation: u64) -> JoinHandle<()> {
        let hass = self.hass.clone();
        let events = self.internal.clone();
        let entity_id = self.entity_id.clone();
        let every = self.config.poll_interval();
        let settle = self.config.settle_delay();
        let id = self.id;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                tokio::time::sleep(settle).await;
                if let Err(e) = hass.refresh_entity(&entity_id).await {
                    warn!("[{}] Poll refresh of {} failed: {}", id, entity_id, e);
                }
                let refreshed = Internal::PollRefreshed {
                    category,
                    generation,
                };
                if events.send(refreshed).is_err() {
                    break;
                }
            }
        })
    }

    fn press(&self, action: KeyAction) {
        let Some(snapshot) = self.latest() else {
            debug!("[{}] No snapshot, ignoring {:?}", self.id, action);
            return;
        };
        let ActivityResolution { key_match, .. } = resolve(self.external, &snapshot);
        let attrs = &snapshot.attributes;

        let command = match action {
            KeyAction::Assigned(key_id) => key_match.map(|activity_id| HubCommand::SendAssignedKey {
                activity_id,
                key_id,
            }),
            KeyAction::Macro(key_id) => key_match.map(|activity_id| HubCommand::SendMacroKey {
                activity_id,
                key_id,
            }),
            KeyAction::Favorite(key_id) => key_match.map(|activity_id| {
                let device_id = attrs
                    .favorites_for(activity_id)
                    .iter()
                    .find(|f| f.id == key_id)
                    .and_then(|f| f.device_id);
                HubCommand::SendFavoriteKey {
                    activity_id,
                    key_id,
                    device_id,
                }
            }),
            KeyAction::StartActivity(requested) => requested
                .or(key_match)
                .map(|activity_id| HubCommand::StartActivity { activity_id }),
            KeyAction::StopActivity => attrs
                .current_activity_id
                .map(|activity_id| HubCommand::StopActivity { activity_id }),
            KeyAction::RequestBasicData => Some(HubCommand::RequestBasicData),
            KeyAction::Refresh => {
                let hass = self.hass.clone();
                let entity_id = self.entity_id.clone();
                let id = self.id;
                tokio::spawn(async move {
                    if let Err(e) = hass.update_entity(&entity_id).await {
                        error!("[{}] Failed to refresh {}: {}", id, entity_id, e);
                    }
                });
                return;
            }
        };

        let Some(command) = command else {
            debug!("[{}] No activity for {:?}, ignoring", self.id, action);
            return;
        };
        let hass = self.hass.clone();
        let entity_id = self.entity_id.clone();
        let id = self.id;
        tokio::spawn(async move {
            if let Err(e) = hass.send_command(&entity_id, &command).await {
                error!("[{}] Failed to send {}: {}", id, command, e);
            }
        });
    }

    fn publish(&self) {
        if !self.connected {
            return;
        }
        let view = self.latest().map(|snapshot| {
            let resolution = resolve(self.external, &snapshot);
            project(&snapshot, resolution, self.page, self.tracker.flags())
        });
        self.view.send_replace(view);
    }

    /// 关闭：停止所有计时器，通知后端释放锁，清空视图
    async fn teardown(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.tracker.cancel_all();

        if let Err(e) = self
            .hass
            .send_command(&self.entity_id, &HubCommand::ClearRequestingKeysFlag)
            .await
        {
            warn!("[{}] Failed to clear requesting-keys flag: {}", self.id, e);
        }
        self.view.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::projection::LoadingHint;
    use crate::hass::test_support::MockHass;
    use chrono::{DateTime, SecondsFormat};
    use serde_json::json;

    const HUB: &str = "remote.hub";

    fn stamp(at: DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn snapshot(at: DateTime<Utc>, assigned: serde_json::Value) -> EntitySnapshot {
        serde_json::from_value(json!({
            "entity_id": HUB,
            "state": "on",
            "attributes": {
                "friendly_name": "Living Room",
                "current_activity_id": null,
                "activities": [
                    {"id": 42, "name": "Watch TV", "state": "on"},
                    {"id": 43, "name": "Music", "state": "off"}
                ],
                "assigned_keys": assigned,
                "macro_keys": {"42": [{"id": 3, "name": "Lights Off"}]}
            },
            "last_updated": stamp(at),
        }))
        .unwrap()
    }

    fn past() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(1)
    }

    fn future() -> DateTime<Utc> {
        Utc::now() + chrono::Duration::hours(1)
    }

    struct Fixture {
        mock: Arc<MockHass>,
        hass: Arc<Hass>,
        bus: ActivityBus,
    }

    impl Fixture {
        fn new() -> Self {
            let mock = MockHass::new();
            let hass = Arc::new(Hass::new(mock.clone()));
            Self {
                mock,
                hass,
                bus: ActivityBus::default(),
            }
        }

        fn open(&self, selected: Option<i64>) -> DialogHandle {
            open(
                self.hass.clone(),
                &self.bus,
                FetchConfig::default(),
                DialogOptions::new(HUB).with_selected_activity(selected),
            )
        }

        fn requests(&self) -> Vec<HubCommand> {
            self.mock
                .commands()
                .into_iter()
                .filter(|c| c.kind().starts_with("request_") && c.kind().ends_with("_keys"))
                .collect()
        }

        /// 轮询发出的 update_entity 次数
        fn updates(&self) -> usize {
            self.mock
                .calls()
                .iter()
                .filter(|c| c.service == "update_entity")
                .count()
        }
    }

    /// 让对话框处理完已排队的事件
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn in_flight(handle: &DialogHandle, category: KeyCategory) -> bool {
        handle.view().is_some_and(|v| v.in_flight.get(category))
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_request_backend_write_then_two_enabled_keys() {
        let fx = Fixture::new();
        fx.hass.apply_state(snapshot(past(), json!({})));

        let handle = fx.open(Some(42));
        settle().await;
        assert_eq!(
            fx.requests(),
            vec![HubCommand::RequestAssignedKeys { activity_id: 42 }]
        );
        assert!(in_flight(&handle, KeyCategory::Assigned));
        assert!(handle.view().unwrap().is_loading());

        // 后端写入服务端，等待轮询拉回
        fx.mock
            .set_state(snapshot(future(), json!({"42": [174, 176]})));
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let view = handle.view().unwrap();
        assert!(!view.in_flight.get(KeyCategory::Assigned));
        let enabled: Vec<&str> = view.enabled_keys().iter().map(|b| b.name).collect();
        assert_eq!(enabled, vec!["up", "ok"]);
        assert_eq!(fx.requests().len(), 1);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_completes_request() {
        let fx = Fixture::new();
        fx.hass.apply_state(snapshot(past(), json!({})));
        let handle = fx.open(Some(42));
        settle().await;

        fx.hass.apply_state(snapshot(future(), json!({"42": [174]})));
        settle().await;
        assert!(!in_flight(&handle, KeyCategory::Assigned));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_forces_request_despite_cache() {
        let fx = Fixture::new();
        fx.hass.apply_state(snapshot(past(), json!({"42": [174]})));

        let handle = fx.open(Some(42));
        settle().await;
        assert_eq!(
            fx.requests(),
            vec![HubCommand::RequestAssignedKeys { activity_id: 42 }]
        );
        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_change_uses_cache() {
        let fx = Fixture::new();
        fx.hass.apply_state(snapshot(past(), json!({})));
        let handle = fx.open(Some(42));
        settle().await;

        // 宏数据已缓存：不请求
        handle.next_page().await.unwrap();
        settle().await;
        assert_eq!(handle.view().unwrap().page, KeyCategory::Macro);
        assert_eq!(fx.requests().len(), 1);

        // 收藏数据没有：请求
        handle.next_page().await.unwrap();
        settle().await;
        assert_eq!(
            fx.requests().last(),
            Some(&HubCommand::RequestFavoriteKeys { activity_id: 42 })
        );

        // 超出范围不动
        handle.next_page().await.unwrap();
        settle().await;
        assert_eq!(handle.view().unwrap().page, KeyCategory::Favorite);
        assert_eq!(fx.requests().len(), 2);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_request_per_category() {
        let fx = Fixture::new();
        fx.hass.apply_state(snapshot(past(), json!({})));
        let handle = fx.open(Some(42));
        settle().await;

        // 请求在途时切换 activity 不会再发同类请求
        handle.select_activity(Some(43)).await.unwrap();
        settle().await;
        assert_eq!(fx.requests().len(), 1);

        // 请求完成后补发新 activity 的请求
        fx.hass.apply_state(snapshot(future(), json!({"42": [174]})));
        settle().await;
        assert_eq!(
            fx.requests(),
            vec![
                HubCommand::RequestAssignedKeys { activity_id: 42 },
                HubCommand::RequestAssignedKeys { activity_id: 43 },
            ]
        );

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_positive_does_not_complete() {
        let fx = Fixture::new();
        let old = past();
        fx.hass.apply_state(snapshot(old, json!({"42": [174]})));
        let handle = fx.open(Some(42));
        settle().await;

        // 数据存在但时间戳早于请求
        fx.hass.apply_state(snapshot(
            old + chrono::Duration::seconds(1),
            json!({"42": [174]}),
        ));
        settle().await;
        assert!(in_flight(&handle, KeyCategory::Assigned));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_giveup_falls_back_to_no_data() {
        let fx = Fixture::new();
        fx.hass.apply_state(snapshot(past(), json!({})));
        let handle = fx.open(Some(42));
        settle().await;

        tokio::time::sleep(Duration::from_secs(14)).await;
        assert!(in_flight(&handle, KeyCategory::Assigned));
        assert!(fx.updates() > 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let view = handle.view().unwrap();
        assert!(!view.in_flight.any());
        assert_eq!(view.hint, Some(LoadingHint::NoData));

        // 放弃后轮询停止，也没有自动重试
        let updates = fx.updates();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fx.updates(), updates);
        assert_eq!(fx.requests().len(), 1);
        assert_eq!(handle.view().unwrap().hint, Some(LoadingHint::NoData));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_clears_without_retry() {
        let fx = Fixture::new();
        fx.mock.reject_commands(true);
        fx.hass.apply_state(snapshot(past(), json!({})));
        let handle = fx.open(Some(42));
        settle().await;

        assert!(!in_flight(&handle, KeyCategory::Assigned));
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fx.requests().len(), 1);

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_everything() {
        let fx = Fixture::new();
        fx.hass.apply_state(snapshot(past(), json!({})));
        let handle = fx.open(Some(42));
        settle().await;
        let view = handle.subscribe_view();

        handle.close().await;
        assert_eq!(*view.borrow(), None);
        let clears = |mock: &MockHass| {
            mock.commands()
                .into_iter()
                .filter(|c| *c == HubCommand::ClearRequestingKeysFlag)
                .count()
        };
        assert_eq!(clears(&fx.mock), 1);

        // 计时器不再触发，推送也不再处理
        let calls_before = fx.mock.calls().len();
        fx.hass.apply_state(snapshot(future(), json!({"42": [174]})));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fx.mock.calls().len(), calls_before);
        assert_eq!(*view.borrow(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_releases_channels() {
        let fx = Fixture::new();
        let handle = fx.open(None);
        settle().await;
        let view = handle.subscribe_view();
        let commands = handle.commands.clone();
        handle.close().await;

        assert!(commands.is_closed());
        assert!(view.borrow().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bus_signal_for_own_entity_only() {
        let fx = Fixture::new();
        fx.hass.apply_state(snapshot(past(), json!({"42": [174], "43": [182]})));
        let handle = fx.open(Some(42));
        settle().await;
        fx.hass.apply_state(snapshot(future(), json!({"42": [174], "43": [182]})));
        settle().await;
        assert!(!in_flight(&handle, KeyCategory::Assigned));

        fx.bus.publish("remote.other", Some(7));
        settle().await;
        assert_eq!(handle.view().unwrap().resolution.effective, Some(42));

        // 43 的数据已缓存：只换解析结果，不请求
        fx.bus.publish(HUB, Some(43));
        settle().await;
        assert_eq!(handle.view().unwrap().resolution.effective, Some(43));
        assert_eq!(fx.requests().len(), 1);

        // 新 activity 没有数据：请求
        fx.bus.publish(HUB, Some(44));
        settle().await;
        assert_eq!(
            fx.requests().last(),
            Some(&HubCommand::RequestAssignedKeys { activity_id: 44 })
        );

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_retry_when_snapshot_arrives_late() {
        let fx = Fixture::new();
        let handle = fx.open(Some(42));
        settle().await;
        assert!(handle.view().is_none());
        assert!(fx.requests().is_empty());

        fx.hass.apply_state(snapshot(past(), json!({})));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            fx.requests(),
            vec![HubCommand::RequestAssignedKeys { activity_id: 42 }]
        );

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fetch_without_effective_activity() {
        let fx = Fixture::new();
        let mut idle = snapshot(past(), json!({}));
        for activity in idle.attributes.activities.iter_mut().flatten() {
            activity.state = "off".to_string();
        }
        fx.hass.apply_state(idle);

        let handle = fx.open(None);
        settle().await;
        assert!(fx.requests().is_empty());
        // 按键仍按第一个 activity 匹配
        assert_eq!(handle.view().unwrap().resolution.key_match, Some(42));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_actions() {
        let fx = Fixture::new();
        let mut snap = snapshot(past(), json!({"42": [176]}));
        snap.attributes.current_activity_id = Some(42);
        snap.attributes.favorite_keys = serde_json::from_value(json!({
            "42": [{"id": 9, "name": "Netflix", "device_id": 5}]
        }))
        .unwrap();
        fx.hass.apply_state(snap);
        let handle = fx.open(None);
        settle().await;

        handle.press(KeyAction::Assigned(176)).await.unwrap();
        handle.press(KeyAction::Favorite(9)).await.unwrap();
        handle.press(KeyAction::StopActivity).await.unwrap();
        handle.press(KeyAction::Refresh).await.unwrap();
        settle().await;

        let sent = fx.mock.commands();
        assert!(sent.contains(&HubCommand::SendAssignedKey {
            activity_id: 42,
            key_id: 176
        }));
        assert!(sent.contains(&HubCommand::SendFavoriteKey {
            activity_id: 42,
            key_id: 9,
            device_id: Some(5)
        }));
        assert!(sent.contains(&HubCommand::StopActivity { activity_id: 42 }));
        assert!(fx
            .mock
            .calls()
            .iter()
            .any(|c| c.service == "update_entity"));

        handle.close().await;
    }
}
