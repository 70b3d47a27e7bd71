use std::time::Duration;

fn usable(duration: Option<f64>) -> Option<f64> {
    duration.filter(|d| d.is_finite() && *d > 0.0)
}

/// Active playback needed before a song may be reported:
/// `min(duration * percent / 100, cap)`.
///
/// Songs without a known positive duration are never eligible.
pub fn scrobble_threshold(duration: Option<f64>, percent: u8, cap: Duration) -> Option<Duration> {
    let duration = usable(duration)?;
    let percent = f64::from(percent.min(100));
    let secs = duration * percent / 100.0;
    // Anything too large for a Duration is past the cap anyway.
    let threshold = Duration::try_from_secs_f64(secs).unwrap_or(cap);
    Some(threshold.min(cap))
}

/// Active playback after which the same item showing up again counts as a
/// repeat rather than a continuation.
pub fn replay_target(duration: Option<f64>) -> Option<Duration> {
    usable(duration).and_then(|d| Duration::try_from_secs_f64(d).ok())
}
