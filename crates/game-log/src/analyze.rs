//! One-shot analysis of the current session, used to build a repair plan.

use std::path::Path;

use patchdoc_protocol::ServiceProfile;

use crate::extract::{LogLine, SESSION_MARKER, classify_line, extract_pid, find_last_marker_offset};
use crate::window::{TAIL_WINDOW_BYTES, read_tail};

/// What the log tells us about the last patch attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLogInfo {
    pub web_root: Option<String>,
    pub backup_web_root: Option<String>,
    /// De-duplicated, in the order the patcher queued them. Empty unless
    /// `has_error` is set.
    pub files_to_download: Vec<String>,
    pub has_error: bool,
    /// PID the analysis was scoped to, if any.
    pub pid: Option<u32>,
}

/// Analyzes the trailing window of the log at `path`.
///
/// When `pid` is `None`, the first client PID seen after the session
/// marker is adopted and lines from other instances are ignored.
pub fn analyze_log(
    path: &Path,
    profile: &ServiceProfile,
    pid: Option<u32>,
) -> std::io::Result<ParsedLogInfo> {
    let (_, bytes) = read_tail(path, TAIL_WINDOW_BYTES)?;
    Ok(analyze_window(&bytes, profile, pid))
}

/// Analyzes an in-memory log window.
///
/// Starts at the last session marker; if the marker has scrolled out of
/// the window the whole window is used.
pub fn analyze_window(bytes: &[u8], profile: &ServiceProfile, pid: Option<u32>) -> ParsedLogInfo {
    let start = match find_last_marker_offset(bytes, SESSION_MARKER) {
        offset if offset < bytes.len() => offset,
        _ => 0,
    };
    let text = String::from_utf8_lossy(&bytes[start..]);

    let mut info = ParsedLogInfo {
        pid,
        ..Default::default()
    };

    for line in text.lines() {
        let kind = classify_line(line, profile);
        if kind == LogLine::SessionMarker {
            continue;
        }

        let line_pid = extract_pid(line);
        match (info.pid, line_pid) {
            (None, Some(found)) => info.pid = Some(found),
            (Some(tracked), found) if found != Some(tracked) => continue,
            _ => {}
        }

        match kind {
            LogLine::WebRoot(url) => info.web_root = Some(url),
            LogLine::BackupWebRoot(url) => info.backup_web_root = Some(url),
            LogLine::QueuedFile(name) => {
                if !info.files_to_download.contains(&name) {
                    info.files_to_download.push(name);
                }
            }
            LogLine::PartialFileError => info.has_error = true,
            LogLine::SessionMarker | LogLine::Unrecognized => {}
        }
    }

    // Without evidence of a failed transfer, queued files are just a normal patch.
    if !info.has_error {
        info.files_to_download.clear();
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ServiceProfile {
        ServiceProfile::new("ggg", "Client.txt", &["Client.exe", "ClientSteam.exe"])
    }

    #[test]
    fn example_session_yields_plan() {
        let log = format!(
            "2026/01/01 old [INFO Client 9] Web root: http://stale/patch/1.0.0.0/\n\
             2026/01/01 {SESSION_MARKER}\n\
             2026/01/01 [INFO Client 42] Web root: http://cdn/patch/4.4.0.5/\n\
             2026/01/01 [INFO Client 42] Backup Web root: http://mirror/patch/4.4.0.5/\n\
             2026/01/01 [INFO Client 42] Queue file to download: Client.exe\n\
             2026/01/01 [INFO Client 42] Queue file to download: Client.exe\n\
             2026/01/01 [INFO Client 42] Queue file to download: Data/x.dat\n\
             2026/01/01 [WARN Client 42] Transferred a partial file\n"
        );

        let info = analyze_window(log.as_bytes(), &profile(), None);
        assert_eq!(info.web_root.as_deref(), Some("http://cdn/patch/4.4.0.5/"));
        assert_eq!(info.backup_web_root.as_deref(), Some("http://mirror/patch/4.4.0.5/"));
        assert_eq!(info.files_to_download, vec!["Client.exe", "Data/x.dat"]);
        assert!(info.has_error);
        assert_eq!(info.pid, Some(42));
    }

    #[test]
    fn no_error_means_no_files() {
        let log = format!(
            "{SESSION_MARKER}\n\
             [INFO Client 1] Web root: http://cdn/patch/4.4.0.5/\n\
             [INFO Client 1] Queue file to download: Client.exe\n"
        );
        let info = analyze_window(log.as_bytes(), &profile(), None);
        assert_eq!(info.web_root.as_deref(), Some("http://cdn/patch/4.4.0.5/"));
        assert!(!info.has_error);
        assert!(info.files_to_download.is_empty());
    }

    #[test]
    fn other_instances_are_ignored() {
        let log = format!(
            "{SESSION_MARKER}\n\
             [INFO Client 5] Web root: http://mine/\n\
             [INFO Client 6] Web root: http://theirs/\n\
             [INFO Client 6] Queue file to download: Other.dll\n\
             [WARN Client 6] Transferred a partial file\n\
             [INFO Client 5] Queue file to download: Mine.dll\n"
        );
        let info = analyze_window(log.as_bytes(), &profile(), None);
        assert_eq!(info.pid, Some(5));
        assert_eq!(info.web_root.as_deref(), Some("http://mine/"));
        assert!(!info.has_error);
        assert!(info.files_to_download.is_empty());
    }

    #[test]
    fn explicit_pid_wins_over_first_seen() {
        let log = format!(
            "{SESSION_MARKER}\n\
             [INFO Client 5] Web root: http://five/\n\
             [INFO Client 6] Web root: http://six/\n\
             [INFO Client 6] Queue file to download: Six.dll\n\
             [WARN Client 6] Transferred a partial file\n"
        );
        let info = analyze_window(log.as_bytes(), &profile(), Some(6));
        assert_eq!(info.web_root.as_deref(), Some("http://six/"));
        assert_eq!(info.files_to_download, vec!["Six.dll"]);
        assert!(info.has_error);
    }

    #[test]
    fn missing_marker_scans_whole_window() {
        let log = "[INFO Client 3] Web root: http://cdn/patch/2.0.0.1/\n\
                   [INFO Client 3] Queue file to download: Client.exe\n\
                   [WARN Client 3] Transferred a partial file\n";
        let info = analyze_window(log.as_bytes(), &profile(), None);
        assert_eq!(info.web_root.as_deref(), Some("http://cdn/patch/2.0.0.1/"));
        assert_eq!(info.files_to_download, vec!["Client.exe"]);
    }

    #[test]
    fn analyze_log_reads_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            format!(
                "{SESSION_MARKER}\n[INFO Client 8] Web root: http://cdn/\n\
                 [INFO Client 8] Queue file to download: a.bundle\n\
                 [WARN Client 8] Transferred a partial file\n"
            ),
        )
        .unwrap();

        let info = analyze_log(tmp.path(), &profile(), None).unwrap();
        assert_eq!(info.files_to_download, vec!["a.bundle"]);
    }

    #[test]
    fn analyze_missing_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(analyze_log(&tmp.path().join("Client.txt"), &profile(), None).is_err());
    }
}
