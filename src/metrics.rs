/// Percentage of `part` over `whole`, rounded half away from zero. Zero when `whole` is zero.
pub fn percent_of(part: u64, whole: u64) -> u64 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u64
}

/// Format a run duration as `HH:MM:SS`.
pub fn format_elapsed(milliseconds: u64) -> String {
    let secs = milliseconds / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Compute (online, offline, missing) percentages of the target totals.
pub fn compute_totals_breakdown(totals: &crate::model::TargetTotals) -> Option<(u64, u64, u64)> {
    if totals.count == 0 {
        return None;
    }
    Some((
        percent_of(totals.online, totals.count),
        percent_of(totals.offline, totals.count),
        percent_of(totals.missing_in_action, totals.count),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetTotals;

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(percent_of(2, 3), 67);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(3, 3), 100);
        assert_eq!(percent_of(5, 0), 0);
    }

    #[test]
    fn elapsed_is_clock_formatted() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(5_000), "00:00:05");
        assert_eq!(format_elapsed(3_725_000), "01:02:05");
    }

    #[test]
    fn totals_breakdown_skips_empty() {
        assert!(compute_totals_breakdown(&TargetTotals::default()).is_none());
        let totals = TargetTotals {
            count: 4,
            online: 2,
            offline: 1,
            missing_in_action: 1,
        };
        assert_eq!(compute_totals_breakdown(&totals), Some((50, 25, 25)));
    }
}
