use sysinfo::System;

const DEFAULT_HOST: &str = "localhost";

/// Last path segment of a store key (`/urlmon/checks/a/URL` → `URL`)
pub fn basename(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

/// Parse a positive number of seconds; blank, garbage and zero yield `None`
pub fn parse_seconds(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().filter(|secs| *secs > 0)
}

/// Host name used as the metrics source
pub fn hostname() -> String {
    System::host_name().unwrap_or_else(|| DEFAULT_HOST.to_string())
}

/// Split a comma separated option into trimmed, non-empty parts
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(String::from)
        .collect()
}
