//! 详情对话框引擎
//!
//! - activity 解析与按键目录
//! - 按类别的请求跟踪、获取与轮询
//! - 渲染投影
//! - 对话框注册表和 activity 总线

pub mod activity;
pub mod bus;
pub mod completion;
pub mod dialog;
pub mod keys;
pub mod projection;
pub mod registry;
pub mod tracker;

pub use activity::{resolve, ActivityResolution};
pub use bus::{ActivityBus, ActivityChanged};
pub use dialog::{DialogHandle, DialogOptions, FetchConfig, KeyAction};
pub use projection::{DialogView, KeyState, LoadingHint, PageContent};
pub use registry::{should_intercept, DialogRegistry};
pub use tracker::{InFlightFlags, RequestTracker};
