/// Renders seconds as `m:ss`; minutes are not wrapped into hours.
pub fn human_duration(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Remaining time label shown next to the progress bar.
pub fn remaining(elapsed: u32, total: u32) -> String {
    format!("-{}", human_duration(total.saturating_sub(elapsed)))
}
