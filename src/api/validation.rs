use std::collections::HashSet;

use crate::error::{FeedError, FeedResult};

use super::{RenderProfile, SessionConfig};

pub(super) fn validate_render_profile(profile: RenderProfile) -> FeedResult<RenderProfile> {
    if profile.max_points == 0 {
        return Err(FeedError::Configuration(
            "render profile max_points must be > 0".to_owned(),
        ));
    }
    if profile.update_interval.is_zero() {
        return Err(FeedError::Configuration(
            "render profile update interval must be > 0".to_owned(),
        ));
    }
    if profile.is_embedded() {
        let normal = RenderProfile::normal();
        if profile.max_points > normal.max_points {
            return Err(FeedError::Configuration(format!(
                "embedded max_points must not exceed the normal profile's {}, got {}",
                normal.max_points, profile.max_points
            )));
        }
        if profile.update_interval < normal.update_interval {
            return Err(FeedError::Configuration(format!(
                "embedded update interval must be >= {} ms, got {} ms",
                normal.update_interval.as_millis(),
                profile.update_interval.as_millis()
            )));
        }
    }
    Ok(profile)
}

pub(super) fn validate_session_config(config: &SessionConfig) -> FeedResult<()> {
    if config.queue_capacity == 0 {
        return Err(FeedError::Configuration(
            "queue capacity must be > 0".to_owned(),
        ));
    }
    if config.read_timeout_ms == 0 {
        return Err(FeedError::Configuration(
            "read timeout must be > 0 ms".to_owned(),
        ));
    }
    config.backoff.validate()?;

    if config.history_span_ms == Some(0) {
        return Err(FeedError::Configuration(
            "history span must be > 0 ms".to_owned(),
        ));
    }
    if config.display_points == Some(0) {
        return Err(FeedError::Configuration(
            "display points must be > 0".to_owned(),
        ));
    }

    let mut source_ids = HashSet::new();
    for source in &config.sources {
        source.validate()?;
        if !source_ids.insert(source.id()) {
            return Err(FeedError::Configuration(format!(
                "duplicate source id `{}`",
                source.id()
            )));
        }
    }

    let mut channel_ids = HashSet::new();
    for channel in &config.channels {
        if !channel_ids.insert(&channel.id) {
            return Err(FeedError::Configuration(format!(
                "channel `{}` declared twice",
                channel.id
            )));
        }
    }

    Ok(())
}

pub(super) fn validate_display_points(display_points: usize, max_points: usize) -> FeedResult<usize> {
    if display_points == 0 || display_points > max_points {
        return Err(FeedError::Configuration(format!(
            "display points must be in 1..={max_points}, got {display_points}"
        )));
    }
    Ok(display_points)
}
