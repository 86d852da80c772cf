/*!
 * Utility functions for mastersd
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Pseudo-port that stands for "try every candidate"
pub const AUTO_PORT: &str = "AUTO";

// Serial devices the MasterSD board enumerates as
static SD_PORT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/dev/ttyACM").unwrap());

/// Format a human-readable file size
pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

/// Port choices offered for a connect: `AUTO` followed by every MasterSD candidate
pub fn port_options<S: AsRef<str>>(ports: &[S]) -> Vec<String> {
    std::iter::once(AUTO_PORT.to_string())
        .chain(
            ports
                .iter()
                .map(AsRef::as_ref)
                .filter(|port| SD_PORT_REGEX.is_match(port))
                .map(str::to_string),
        )
        .collect()
}

/// Expand a port selection into the list of ports to try
pub fn resolve_ports(selected: &[String], options: &[String]) -> Vec<String> {
    if selected.is_empty() || selected.iter().any(|port| port == AUTO_PORT) {
        options
            .iter()
            .filter(|port| *port != AUTO_PORT)
            .cloned()
            .collect()
    } else {
        selected.to_vec()
    }
}

/// Parent of an absolute path, `None` for a path without a separator
pub fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

/// Split an absolute file path into folder and name
pub fn split_file_path(path: &str) -> Option<(&str, &str)> {
    path.rsplit_once('/')
        .filter(|(folder, name)| !folder.is_empty() && !name.is_empty())
}

/// Last segment of a path
pub fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Whether `path` is `ancestor` or lies below it
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 bytes");
        assert_eq!(format_file_size(2048), "2.00 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_port_options_filter_candidates() {
        let ports = ["/dev/ttyUSB0", "/dev/ttyACM0", "VIRTUAL", "/dev/ttyACM1"];
        assert_eq!(
            port_options(&ports),
            vec!["AUTO", "/dev/ttyACM0", "/dev/ttyACM1"]
        );

        let none: [&str; 1] = ["/dev/ttyUSB0"];
        assert_eq!(port_options(&none), vec!["AUTO"]);
    }

    #[test]
    fn test_resolve_ports() {
        let options = port_options(&["/dev/ttyACM0", "/dev/ttyACM1"]);

        assert_eq!(
            resolve_ports(&["AUTO".to_string()], &options),
            vec!["/dev/ttyACM0", "/dev/ttyACM1"]
        );
        assert_eq!(resolve_ports(&[], &options).len(), 2);
        assert_eq!(
            resolve_ports(&["/dev/ttyACM1".to_string()], &options),
            vec!["/dev/ttyACM1"]
        );
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_path("/sdcard/a/b"), Some("/sdcard/a"));
        assert_eq!(parent_path("/sdcard"), Some(""));
        assert_eq!(
            split_file_path("/sdcard/prints/a.gcode"),
            Some(("/sdcard/prints", "a.gcode"))
        );
        assert_eq!(split_file_path("/sdcard/"), None);
        assert_eq!(base_name("/sdcard/prints"), "prints");

        assert!(is_within("/sdcard/a/b", "/sdcard/a"));
        assert!(is_within("/sdcard/a", "/sdcard/a"));
        assert!(!is_within("/sdcard/ab", "/sdcard/a"));
    }
}
