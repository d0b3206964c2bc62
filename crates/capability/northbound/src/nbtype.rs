//! 北向类型名归一化。

pub const MQTT: &str = "mqtt";
pub const PANDAX: &str = "pandax";
pub const ITHINGS: &str = "ithings";
pub const SAGOO: &str = "sagoo";
/// Sagoo 的兼容别名
pub const XUNJI: &str = "xunji";

/// 小写、去空白，并把兼容别名映射到规范名。
pub fn normalize(kind: &str) -> String {
    let kind = kind.trim().to_ascii_lowercase();
    if kind == XUNJI { SAGOO.to_string() } else { kind }
}

pub fn is_supported(kind: &str) -> bool {
    supported_types().contains(&normalize(kind).as_str())
}

/// 展示名，未知类型原样返回。
pub fn display_name(kind: &str) -> String {
    match normalize(kind).as_str() {
        MQTT => "MQTT".to_string(),
        PANDAX => "PandaX".to_string(),
        ITHINGS => "iThings".to_string(),
        SAGOO => "Sagoo".to_string(),
        _ => kind.to_string(),
    }
}

pub fn supported_types() -> &'static [&'static str] {
    &[MQTT, PANDAX, ITHINGS, SAGOO]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_alias_and_case() {
        assert_eq!(normalize("XUNJI"), "sagoo");
        assert_eq!(normalize("MQTT"), "mqtt");
        assert_eq!(normalize("  PandaX "), "pandax");
        assert!(is_supported("xunji"));
        assert!(!is_supported("http"));
    }

    #[test]
    fn display_name_covers_all_types() {
        assert_eq!(display_name("ithings"), "iThings");
        assert_eq!(display_name("xunji"), "Sagoo");
        assert_eq!(display_name("custom"), "custom");
        assert_eq!(supported_types().len(), 4);
    }
}
