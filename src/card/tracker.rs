//! 按页请求跟踪
//!
//! 每个按键类别一份状态：是否有请求在途、发出时间、请求的 activity、
//! 放弃计时器和轮询计时器。每个类别同时最多一个在途请求。

use crate::hass::KeyCategory;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 单个类别的请求状态
#[derive(Debug, Default)]
struct PageRequest {
    in_flight: bool,
    issued_at: Option<DateTime<Utc>>,
    activity_id: Option<i64>,
    /// 每次 begin 递增，用来识别过期的计时器/派发结果
    generation: u64,
    giveup: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
}

impl PageRequest {
    fn cancel_timers(&mut self) {
        if let Some(handle) = self.giveup.take() {
            handle.abort();
        }
        if let Some(handle) = self.poll.take() {
            handle.abort();
        }
    }
}

/// 三个类别的在途标记（用于渲染）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InFlightFlags([bool; 3]);

impl InFlightFlags {
    pub fn get(&self, category: KeyCategory) -> bool {
        self.0[category.index()]
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|f| *f)
    }
}

/// 请求跟踪器
#[derive(Debug, Default)]
pub struct RequestTracker {
    pages: [PageRequest; 3],
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn page(&self, category: KeyCategory) -> &PageRequest {
        &self.pages[category.index()]
    }

    fn page_mut(&mut self, category: KeyCategory) -> &mut PageRequest {
        &mut self.pages[category.index()]
    }

    /// 开始一个请求，返回本次请求的 generation
    ///
    /// 该类别已有在途请求时拒绝并返回 None。
    pub fn begin(
        &mut self,
        category: KeyCategory,
        activity_id: i64,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        let page = self.page_mut(category);
        if page.in_flight {
            warn!("{} request already in flight, refusing to begin another", category);
            return None;
        }

        page.in_flight = true;
        page.issued_at = Some(now);
        page.activity_id = Some(activity_id);
        page.generation += 1;
        debug!(
            "{} request #{} begun for activity {} at {}",
            category, page.generation, activity_id, now
        );
        Some(page.generation)
    }

    /// 为当前请求挂上计时器
    ///
    /// generation 已过期时直接终止传入的计时器。
    pub fn attach_timers(
        &mut self,
        category: KeyCategory,
        generation: u64,
        giveup: JoinHandle<()>,
        poll: JoinHandle<()>,
    ) {
        if !self.is_current(category, generation) {
            giveup.abort();
            poll.abort();
            return;
        }
        let page = self.page_mut(category);
        page.cancel_timers();
        page.giveup = Some(giveup);
        page.poll = Some(poll);
    }

    /// 结束请求并取消计时器；可重复调用
    ///
    /// 返回是否真的清除了一个在途请求。
    pub fn complete(&mut self, category: KeyCategory) -> bool {
        let page = self.page_mut(category);
        let was_in_flight = page.in_flight;
        page.in_flight = false;
        page.cancel_timers();
        if was_in_flight {
            debug!("{} request #{} completed", category, page.generation);
        }
        was_in_flight
    }

    /// 只有 generation 仍是当前在途请求时才结束
    pub fn complete_if_current(&mut self, category: KeyCategory, generation: u64) -> bool {
        if self.is_current(category, generation) {
            self.complete(category)
        } else {
            false
        }
    }

    pub fn is_in_flight(&self, category: KeyCategory) -> bool {
        self.page(category).in_flight
    }

    pub fn is_current(&self, category: KeyCategory, generation: u64) -> bool {
        let page = self.page(category);
        page.in_flight && page.generation == generation
    }

    pub fn issued_at(&self, category: KeyCategory) -> Option<DateTime<Utc>> {
        self.page(category).issued_at
    }

    /// 在途请求对应的 activity
    pub fn requested_activity(&self, category: KeyCategory) -> Option<i64> {
        let page = self.page(category);
        page.in_flight.then_some(page.activity_id).flatten()
    }

    pub fn in_flight_categories(&self) -> Vec<KeyCategory> {
        KeyCategory::ALL
            .into_iter()
            .filter(|c| self.is_in_flight(*c))
            .collect()
    }

    pub fn flags(&self) -> InFlightFlags {
        InFlightFlags(KeyCategory::ALL.map(|c| self.is_in_flight(c)))
    }

    /// 取消全部类别（对话框关闭时）
    pub fn cancel_all(&mut self) {
        for category in KeyCategory::ALL {
            self.complete(category);
        }
    }
}

impl Drop for RequestTracker {
    fn drop(&mut self) {
        for page in &mut self.pages {
            page.cancel_timers();
        }
    }
}
