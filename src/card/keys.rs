//! 遥控器按键目录
//!
//! 共 27 个固定按键，key_id 与集成端一致。按面板分组，组内顺序即显示顺序。

/// 按键外观
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFace {
    Icon(&'static str),
    Text(&'static str),
    Color(&'static str),
}

/// 单个遥控按键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteKey {
    pub name: &'static str,
    pub id: i64,
    pub face: KeyFace,
}

/// 按键面板分组
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGroup {
    Dpad,
    Functions,
    VolumeChannel,
    Transport,
    TransportExtra,
    Colors,
    Customs,
}

const fn key(name: &'static str, id: i64, face: KeyFace) -> RemoteKey {
    RemoteKey { name, id, face }
}

pub const DPAD: [RemoteKey; 5] = [
    key("up", 174, KeyFace::Icon("mdi:arrow-up")),
    key("left", 175, KeyFace::Icon("mdi:arrow-left")),
    key("ok", 176, KeyFace::Icon("mdi:checkbox-blank-circle-outline")),
    key("right", 177, KeyFace::Icon("mdi:arrow-right")),
    key("down", 178, KeyFace::Icon("mdi:arrow-down")),
];

pub const FUNCTIONS: [RemoteKey; 3] = [
    key("back", 179, KeyFace::Icon("mdi:arrow-u-left-top")),
    key("home", 180, KeyFace::Icon("mdi:home")),
    key("menu", 181, KeyFace::Icon("mdi:menu")),
];

pub const VOLUME_CHANNEL: [RemoteKey; 6] = [
    key("volume_up", 182, KeyFace::Icon("mdi:volume-plus")),
    key("guide", 157, KeyFace::Icon("mdi:television-guide")),
    key("channel_up", 183, KeyFace::Icon("mdi:chevron-up")),
    key("volume_down", 185, KeyFace::Icon("mdi:volume-minus")),
    key("mute", 184, KeyFace::Icon("mdi:volume-mute")),
    key("channel_down", 186, KeyFace::Icon("mdi:chevron-down")),
];

pub const TRANSPORT: [RemoteKey; 3] = [
    key("rewind", 187, KeyFace::Icon("mdi:rewind")),
    key("play", 156, KeyFace::Icon("mdi:play")),
    key("fast_forward", 189, KeyFace::Icon("mdi:fast-forward")),
];

pub const TRANSPORT_EXTRA: [RemoteKey; 3] = [
    key("dvr", 155, KeyFace::Text("DVR")),
    key("pause", 188, KeyFace::Icon("mdi:pause")),
    key("exit", 154, KeyFace::Text("Exit")),
];

pub const COLORS: [RemoteKey; 4] = [
    key("red", 190, KeyFace::Color("red")),
    key("green", 191, KeyFace::Color("green")),
    key("yellow", 192, KeyFace::Color("yellow")),
    key("blue", 193, KeyFace::Color("blue")),
];

pub const CUSTOMS: [RemoteKey; 3] = [
    key("a", 153, KeyFace::Text("A")),
    key("b", 152, KeyFace::Text("B")),
    key("c", 151, KeyFace::Text("C")),
];

/// 分组及其按键，按显示顺序
pub static LAYOUT: [(KeyGroup, &[RemoteKey]); 7] = [
    (KeyGroup::Dpad, &DPAD),
    (KeyGroup::Functions, &FUNCTIONS),
    (KeyGroup::VolumeChannel, &VOLUME_CHANNEL),
    (KeyGroup::Transport, &TRANSPORT),
    (KeyGroup::TransportExtra, &TRANSPORT_EXTRA),
    (KeyGroup::Colors, &COLORS),
    (KeyGroup::Customs, &CUSTOMS),
];

/// 全部按键，按显示顺序
pub fn catalog() -> impl Iterator<Item = (KeyGroup, &'static RemoteKey)> {
    LAYOUT
        .iter()
        .flat_map(|(group, keys)| keys.iter().map(move |k| (*group, k)))
}

pub fn by_name(name: &str) -> Option<&'static RemoteKey> {
    catalog().map(|(_, k)| k).find(|k| k.name == name)
}

pub fn by_id(id: i64) -> Option<&'static RemoteKey> {
    catalog().map(|(_, k)| k).find(|k| k.id == id)
}
