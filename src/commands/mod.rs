//! 控制台命令处理模块
//!
//! 每行输入解析为一个命令，在应用状态上执行，返回要显示给用户的文本。

use crate::card::{keys, KeyAction};
use crate::hass::KeyCategory;
use crate::AppState;
use std::str::FromStr;
use tracing::{debug, info};

pub const HELP: &str = "\
commands:
  open [entity_id]        open the detail dialog (default: configured hub)
  close                   close the dialog
  page next|prev|1|2|3    switch page
  select <activity>|none  select an activity (as the main card would)
  press <key name|id>     press a remote key
  macro <id>              trigger a macro
  favorite <id>           trigger a favorite
  start [activity]        start an activity
  stop                    stop the current activity
  refresh                 ask Home Assistant to update the entity
  basic                   request activity/device lists from the hub
  show                    print the dialog
  status                  print sync status
  pause | resume          pause or resume state sync
  quit                    exit";

/// 翻页方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMove {
    Next,
    Prev,
    To(KeyCategory),
}

/// 控制台命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Open(Option<String>),
    Close,
    Page(PageMove),
    Select(Option<i64>),
    Press(KeyAction),
    Show,
    Status,
    /// 暂停（true）或恢复（false）状态同步
    PauseSync(bool),
    Help,
    Quit,
}

fn parse_id(value: Option<&str>, what: &str) -> Result<i64, String> {
    let value = value.ok_or_else(|| format!("missing {}", what))?;
    value
        .parse()
        .map_err(|_| format!("invalid {}: {}", what, value))
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".to_string());
        };
        let arg = words.next();

        let command = match verb.to_lowercase().as_str() {
            "open" => Self::Open(arg.map(str::to_string)),
            "close" => Self::Close,
            "page" => Self::Page(match arg {
                Some("next") | Some("n") => PageMove::Next,
                Some("prev") | Some("p") => PageMove::Prev,
                Some(n) => n
                    .parse::<u8>()
                    .ok()
                    .and_then(KeyCategory::from_page_number)
                    .map(PageMove::To)
                    .ok_or_else(|| format!("invalid page: {}", n))?,
                None => return Err("missing page".to_string()),
            }),
            "next" => Self::Page(PageMove::Next),
            "prev" => Self::Page(PageMove::Prev),
            "select" => match arg {
                Some("none") => Self::Select(None),
                other => Self::Select(Some(parse_id(other, "activity id")?)),
            },
            "press" => {
                let name = arg.ok_or_else(|| "missing key".to_string())?;
                let key = keys::by_name(name)
                    .or_else(|| name.parse().ok().and_then(keys::by_id))
                    .ok_or_else(|| format!("unknown key: {}", name))?;
                Self::Press(KeyAction::Assigned(key.id))
            }
            "macro" => Self::Press(KeyAction::Macro(parse_id(arg, "macro id")?)),
            "favorite" | "fav" => Self::Press(KeyAction::Favorite(parse_id(arg, "favorite id")?)),
            "start" => Self::Press(KeyAction::StartActivity(match arg {
                Some(_) => Some(parse_id(arg, "activity id")?),
                None => None,
            })),
            "stop" => Self::Press(KeyAction::StopActivity),
            "refresh" => Self::Press(KeyAction::Refresh),
            "basic" => Self::Press(KeyAction::RequestBasicData),
            "show" => Self::Show,
            "status" => Self::Status,
            "pause" => Self::PauseSync(true),
            "resume" => Self::PauseSync(false),
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };
        Ok(command)
    }
}

/// 执行命令，返回要显示的文本
pub async fn execute(state: &AppState, command: ConsoleCommand) -> Result<Option<String>, String> {
    debug!("execute: {:?}", command);

    match command {
        ConsoleCommand::Open(entity_id) => {
            let entity_id = match entity_id {
                Some(id) => id,
                None => state.entity_id().await,
            };
            // 还没同步过时先拉一次
            if state.hass.cache().get(&entity_id).is_none() {
                state
                    .hass
                    .sync_entity(&entity_id)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            if state.dialogs.open_more_info(&entity_id, None).await {
                info!("Dialog opened for {}", entity_id);
                Ok(None)
            } else {
                Err(format!("{} is not a Sofabaton hub entity", entity_id))
            }
        }
        ConsoleCommand::Close => {
            if state.dialogs.close().await {
                Ok(Some("dialog closed".to_string()))
            } else {
                Ok(Some("no dialog open".to_string()))
            }
        }
        ConsoleCommand::Select(activity_id) => {
            let entity_id = match state.dialogs.current().await.as_ref() {
                Some(handle) => handle.entity_id().to_string(),
                None => state.entity_id().await,
            };
            state.bus.publish(&entity_id, activity_id);
            Ok(None)
        }
        ConsoleCommand::Page(page_move) => {
            let current = state.dialogs.current().await;
            let handle = current.as_ref().ok_or("no dialog open")?;
            let result = match page_move {
                PageMove::Next => handle.next_page().await,
                PageMove::Prev => handle.prev_page().await,
                PageMove::To(page) => handle.set_page(page).await,
            };
            result.map_err(|e| e.to_string())?;
            Ok(None)
        }
        ConsoleCommand::Press(action) => {
            let current = state.dialogs.current().await;
            let handle = current.as_ref().ok_or("no dialog open")?;
            handle.press(action).await.map_err(|e| e.to_string())?;
            Ok(None)
        }
        ConsoleCommand::Show => {
            let current = state.dialogs.current().await;
            let view = current.as_ref().and_then(|h| h.view());
            Ok(Some(match view {
                Some(view) => view.to_string(),
                None => "no dialog open".to_string(),
            }))
        }
        ConsoleCommand::Status => {
            let status = state.sync.read().await.status();
            Ok(Some(format!(
                "sync running={} paused={} syncs={} changes={} failures={}",
                status.is_running,
                status.is_paused,
                status.total_syncs,
                status.total_changes,
                status.consecutive_failures
            )))
        }
        ConsoleCommand::PauseSync(paused) => {
            state.sync.read().await.set_paused(paused);
            Ok(Some(
                if paused { "sync paused" } else { "sync resumed" }.to_string(),
            ))
        }
        ConsoleCommand::Help => Ok(Some(HELP.to_string())),
        ConsoleCommand::Quit => Ok(None),
    }
}
