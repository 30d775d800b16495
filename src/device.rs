use regex::Regex;

pub const UNKNOWN_DEVICE: &str = "Unknown";

/// Device descriptor from a user agent: the content of its first
/// parenthesised group, e.g. `Windows NT 10.0; Win64; x64`.
pub fn parse_device_name(user_agent: &str) -> String {
    let re = Regex::new(r"\(([^)]+)\)").expect("valid regex");
    re.captures(user_agent)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| UNKNOWN_DEVICE.to_string(), |m| m.as_str().to_string())
}
