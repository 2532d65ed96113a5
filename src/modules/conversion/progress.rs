use super::model::{FormatEntry, JobState, JobStatus};

/// Summarises per-format state into the job-level snapshot.
///
/// Progress is the floored mean of every entry's progress (0 for an empty
/// list). Without `forced`, the job is complete once every entry is complete
/// or skipped.
pub fn aggregate(formats: &[FormatEntry], forced: Option<JobState>) -> JobStatus {
    let progress = if formats.is_empty() {
        0
    } else {
        let total: u64 = formats.iter().map(|f| u64::from(f.progress.min(100))).sum();
        (total / formats.len() as u64) as u8
    };

    let status = forced.unwrap_or_else(|| {
        if formats.iter().all(|f| f.status.is_settled()) {
            JobState::Complete
        } else {
            JobState::Processing
        }
    });

    if status == JobState::Complete {
        JobStatus::new(
            status,
            progress,
            "All formats processed",
            "Conversion finished successfully",
        )
    } else {
        JobStatus::new(status, progress, &format!("Processing ({}%)", progress), "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::conversion::model::FormatStatus;

    fn entry(status: FormatStatus, progress: u8) -> FormatEntry {
        FormatEntry {
            status,
            progress,
            ..FormatEntry::queued("720p", 3)
        }
    }

    #[test]
    fn empty_collection_has_zero_progress() {
        let status = aggregate(&[], None);
        assert_eq!(status.progress, 0);
        assert_eq!(status.status, JobState::Complete);
    }

    #[test]
    fn progress_is_floored_mean() {
        let formats = [
            entry(FormatStatus::Processing, 33),
            entry(FormatStatus::Queued, 0),
            entry(FormatStatus::Complete, 100),
        ];
        // 133 / 3 = 44.33
        assert_eq!(aggregate(&formats, None).progress, 44);

        let formats = [entry(FormatStatus::Processing, 1), entry(FormatStatus::Queued, 0)];
        assert_eq!(aggregate(&formats, None).progress, 0);
    }

    #[test]
    fn complete_only_when_every_entry_is_settled() {
        let formats = [
            entry(FormatStatus::Complete, 100),
            entry(FormatStatus::Skipped, 100),
        ];
        let status = aggregate(&formats, None);
        assert_eq!(status.status, JobState::Complete);
        assert_eq!(status.step, "All formats processed");

        let formats = [
            entry(FormatStatus::Complete, 100),
            entry(FormatStatus::Failed, 100),
        ];
        let status = aggregate(&formats, None);
        assert_eq!(status.status, JobState::Processing);
        assert_eq!(status.step, "Processing (100%)");
    }

    #[test]
    fn forced_status_wins() {
        let formats = [entry(FormatStatus::Failed, 100), entry(FormatStatus::Queued, 0)];
        let status = aggregate(&formats, Some(JobState::Complete));
        assert_eq!(status.status, JobState::Complete);
        assert_eq!(status.progress, 50);
        assert_eq!(status.message, "Conversion finished successfully");
    }
}
