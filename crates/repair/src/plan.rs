//! Repair plan construction.

use patchdoc_game_log::ParsedLogInfo;
use patchdoc_protocol::ServiceProfile;

/// The profile's essential executables, in profile order.
pub fn essential_plan(profile: &ServiceProfile) -> Vec<String> {
    profile.essential_executables.clone()
}

/// Turns a log analysis into the list of files to re-download.
///
/// Touching one essential executable refreshes the whole essential set.
/// An empty analysis falls back to the essential set.
pub fn build_plan(info: &ParsedLogInfo, profile: &ServiceProfile) -> Vec<String> {
    let mut plan = info.files_to_download.clone();

    if plan.is_empty() {
        return essential_plan(profile);
    }

    if plan.iter().any(|f| profile.is_essential(f)) {
        for essential in &profile.essential_executables {
            if !plan.iter().any(|f| f.eq_ignore_ascii_case(essential)) {
                plan.push(essential.clone());
            }
        }
    }

    plan
}
