//! Pure extraction over client log lines.
//!
//! Every function here is total: a line that does not match yields `None`
//! (or [`UNKNOWN_VERSION`]) and nothing panics on odd input.

use std::sync::OnceLock;

use patchdoc_protocol::ServiceProfile;
use regex::Regex;

/// Written once per client launch; delimits sessions within one log file.
pub const SESSION_MARKER: &str = "***** LOG FILE OPENING *****";

/// Emitted by the client patcher when a transfer was cut short.
pub const PARTIAL_FILE_ERROR: &str = "Transferred a partial file";

/// Returned by [`extract_version`] when the web root carries no version.
pub const UNKNOWN_VERSION: &str = "unknown";

const BACKUP_WEB_ROOT_TAG: &str = "Backup Web root:";

/// Extensions accepted for queued files that are not essential executables.
const DOWNLOADABLE_EXTENSIONS: &[&str] = &[".exe", ".dat", ".bundle", ".dll"];

/// One log line, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    SessionMarker,
    WebRoot(String),
    BackupWebRoot(String),
    QueuedFile(String),
    PartialFileError,
    Unrecognized,
}

/// Classifies a line. Markers win over everything else, and a backup web
/// root is never reported as a primary one.
pub fn classify_line(line: &str, profile: &ServiceProfile) -> LogLine {
    if line.contains(SESSION_MARKER) {
        return LogLine::SessionMarker;
    }
    if let Some(url) = extract_backup_web_root(line) {
        return LogLine::BackupWebRoot(url);
    }
    if let Some(url) = extract_web_root(line) {
        return LogLine::WebRoot(url);
    }
    if line.contains(PARTIAL_FILE_ERROR) {
        return LogLine::PartialFileError;
    }
    if let Some(name) = extract_file_to_download(line, profile) {
        return LogLine::QueuedFile(name);
    }
    LogLine::Unrecognized
}

/// Byte offset of the last occurrence of `marker` in `bytes`, or
/// `bytes.len()` when the marker is absent.
pub fn find_last_marker_offset(bytes: &[u8], marker: &str) -> usize {
    let needle = marker.as_bytes();
    if needle.is_empty() || needle.len() > bytes.len() {
        return bytes.len();
    }
    bytes
        .windows(needle.len())
        .rposition(|w| w == needle)
        .unwrap_or(bytes.len())
}

/// `Web root: <url>` (but not the backup variant).
pub fn extract_web_root(line: &str) -> Option<String> {
    if line.contains(BACKUP_WEB_ROOT_TAG) {
        return None;
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"Web root: (\S+)").expect("valid regex"));
    re.captures(line).map(|c| c[1].to_string())
}

/// `Backup Web root: <url>`.
pub fn extract_backup_web_root(line: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"Backup Web root: (\S+)").expect("valid regex"));
    re.captures(line).map(|c| c[1].to_string())
}

/// PID from the client's `[LEVEL Client <pid>]` prefix.
pub fn extract_pid(line: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\[[A-Z]+ Client (\d+)\]").expect("valid regex"));
    re.captures(line).and_then(|c| c[1].parse().ok())
}

/// `Queue file to download: <name>`, kept only for known extensions or
/// the profile's essential executables.
pub fn extract_file_to_download(line: &str, profile: &ServiceProfile) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"Queue file to download: (.+)$").expect("valid regex"));
    let name = re.captures(line)?[1].trim().to_string();
    if name.is_empty() {
        return None;
    }
    if has_downloadable_extension(&name) || profile.is_essential(&name) {
        Some(name)
    } else {
        None
    }
}

/// Dotted version from a `/patch/<version>/` segment of a web root.
pub fn extract_version(web_root: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"/patch/(\d+(?:\.\d+)+)/").expect("valid regex"));
    re.captures(web_root)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

fn has_downloadable_extension(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    DOWNLOADABLE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ServiceProfile {
        ServiceProfile::new("ggg", "Client.txt", &["PathOfExile.exe", "PathOfExile_x64"])
    }

    #[test]
    fn marker_offset_finds_last_occurrence() {
        let text = format!("a\n{SESSION_MARKER}\nb\n{SESSION_MARKER}\nc\n");
        let expected = text.rfind(SESSION_MARKER).unwrap();
        assert_eq!(find_last_marker_offset(text.as_bytes(), SESSION_MARKER), expected);
    }

    #[test]
    fn marker_offset_absent_returns_len() {
        let text = b"no marker here\nnothing at all\n";
        assert_eq!(find_last_marker_offset(text, SESSION_MARKER), text.len());
        assert_eq!(find_last_marker_offset(b"", SESSION_MARKER), 0);
    }

    #[test]
    fn marker_offset_at_start() {
        let text = format!("{SESSION_MARKER}\nrest");
        assert_eq!(find_last_marker_offset(text.as_bytes(), SESSION_MARKER), 0);
    }

    #[test]
    fn web_root_variants() {
        let line = "2026/01/01 10:00:00 1 a [INFO Client 42] Web root: http://cdn/patch/4.4.0.5/";
        assert_eq!(extract_web_root(line).as_deref(), Some("http://cdn/patch/4.4.0.5/"));
        assert_eq!(extract_backup_web_root(line), None);

        let backup = "[INFO Client 42] Backup Web root: http://mirror/patch/4.4.0.5/";
        assert_eq!(extract_web_root(backup), None);
        assert_eq!(
            extract_backup_web_root(backup).as_deref(),
            Some("http://mirror/patch/4.4.0.5/")
        );
        assert_eq!(extract_web_root("Web root:"), None);
    }

    #[test]
    fn pid_extraction() {
        assert_eq!(extract_pid("2026/01/01 x [INFO Client 1234] hello"), Some(1234));
        assert_eq!(extract_pid("[DEBUG Client 7] hi"), Some(7));
        assert_eq!(extract_pid("[INFO Client abc] nope"), None);
        assert_eq!(extract_pid("no tag"), None);
    }

    #[test]
    fn queued_file_filtering() {
        let p = profile();
        let q = |name: &str| format!("[INFO Client 1] Queue file to download: {name}");
        assert_eq!(extract_file_to_download(&q("Client.exe"), &p).as_deref(), Some("Client.exe"));
        assert_eq!(extract_file_to_download(&q("Data/a.DAT"), &p).as_deref(), Some("Data/a.DAT"));
        assert_eq!(extract_file_to_download(&q("x.bundle"), &p).as_deref(), Some("x.bundle"));
        assert_eq!(extract_file_to_download(&q("lib.dll "), &p).as_deref(), Some("lib.dll"));
        // Essential without a listed extension.
        assert_eq!(
            extract_file_to_download(&q("PathOfExile_x64"), &p).as_deref(),
            Some("PathOfExile_x64")
        );
        assert_eq!(extract_file_to_download(&q("Bundles2/tmp.part"), &p), None);
        assert_eq!(extract_file_to_download(&q("Bundles2/"), &p), None);
        assert_eq!(extract_file_to_download("Queue file to download: ", &p), None);
        assert_eq!(extract_file_to_download("unrelated.exe", &p), None);
    }

    #[test]
    fn version_extraction() {
        assert_eq!(extract_version("http://cdn/patch/4.4.0.5/"), "4.4.0.5");
        assert_eq!(extract_version("https://x.y/patch/3.25.1.2/"), "3.25.1.2");
        assert_eq!(extract_version("http://cdn/latest/"), UNKNOWN_VERSION);
        assert_eq!(extract_version(""), UNKNOWN_VERSION);
    }

    #[test]
    fn classify_each_kind() {
        let p = profile();
        assert_eq!(
            classify_line(&format!("2026 {SESSION_MARKER}"), &p),
            LogLine::SessionMarker
        );
        assert_eq!(
            classify_line("[INFO Client 1] Web root: http://a/", &p),
            LogLine::WebRoot("http://a/".into())
        );
        assert_eq!(
            classify_line("[INFO Client 1] Backup Web root: http://b/", &p),
            LogLine::BackupWebRoot("http://b/".into())
        );
        assert_eq!(
            classify_line("[WARN Client 1] Transferred a partial file", &p),
            LogLine::PartialFileError
        );
        assert_eq!(
            classify_line("[INFO Client 1] Queue file to download: PathOfExile.exe", &p),
            LogLine::QueuedFile("PathOfExile.exe".into())
        );
        assert_eq!(classify_line("[INFO Client 1] Connecting", &p), LogLine::Unrecognized);
    }
}
