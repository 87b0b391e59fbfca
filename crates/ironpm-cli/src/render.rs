use ironpm_offline::StatusEntry;

pub(crate) fn format_status_lines(entries: &[StatusEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["No offline upgrade has been attempted.".to_string()];
    }

    entries
        .iter()
        .map(|entry| {
            format!(
                "{} [{}] {} ({} -> {})",
                entry.recorded_at_unix,
                entry.stage_id,
                entry.message,
                entry.system_releasever,
                entry.target_releasever
            )
        })
        .collect()
}
