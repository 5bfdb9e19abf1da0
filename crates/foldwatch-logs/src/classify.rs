use chrono::{DateTime, NaiveTime, Utc};
use foldwatch_types::{ProjectId, WorkUnitResult};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::line::{FrameData, LogLine, LogLineData, LogLineKind};

static RE_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}):(\d{2}):(\d{2}):(.*)$").unwrap());

static RE_LOG_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*+\s*Log Started(?:\s+(\S+))?\s*\*+\s*$").unwrap());

static RE_UNIT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^WU(\d+):FS(\d+):(?:0x[0-9a-fA-F]+:)?(.*)$").unwrap());

static RE_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Completed (\d+) out of (\d+) steps \((\d+)%\)").unwrap());

static RE_PROJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Project: (\d+) \(Run (\d+), Clone (\d+), Gen (\d+)\)").unwrap());

static RE_CORE_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Version:?\s+([\d.]+)").unwrap());

static RE_SHUTDOWN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Folding@home Core Shutdown: (\w+)").unwrap());

static RE_CREDIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Final credit estimate,\s+([\d.]+) points").unwrap());

static RE_PAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^FS(\d+):(Paused|Unpaused)").unwrap());

static RE_CLIENT_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*Version:\s+(\S+)").unwrap());

static RE_ARGUMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*Arguments:\s+(.*)$").unwrap());

static RE_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ERROR:(.*)$").unwrap());

static RE_LIFETIME_UNITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?\s*Number of Units Completed:\s+(\d+)").unwrap());

/// Classify one raw log line. Never fails: anything unrecognized comes back
/// as `Unknown` and is ignored downstream. A recognized prefix with a
/// payload that will not parse is downgraded to `Unknown` with a warning.
pub fn classify(index: usize, raw: &str) -> LogLine {
    if let Some(caps) = RE_LOG_OPEN.captures(raw) {
        let started_at = caps
            .get(1)
            .and_then(|m| DateTime::parse_from_rfc3339(m.as_str()).ok())
            .map(|dt| dt.with_timezone(&Utc));
        return LogLine {
            index,
            time_of_day: None,
            kind: LogLineKind::LogOpen,
            data: LogLineData::LogOpen { started_at },
            raw: raw.to_string(),
        };
    }

    let Some(caps) = RE_TIMESTAMP.captures(raw) else {
        return LogLine::unknown(index, raw);
    };

    let time_of_day = parse_time_of_day(&caps);
    if time_of_day.is_none() {
        warn!(line = index, "log line carries an out-of-range timestamp");
        return LogLine::unknown(index, raw);
    }

    let rest = caps.get(4).map(|m| m.as_str()).unwrap_or("");
    let (kind, data) = classify_rest(index, rest);

    LogLine {
        index,
        time_of_day,
        kind,
        data,
        raw: raw.to_string(),
    }
}

/// Classify a whole log text, one record per input line.
pub fn classify_text(text: &str) -> Vec<LogLine> {
    text.lines()
        .enumerate()
        .map(|(index, raw)| classify(index, raw))
        .collect()
}

fn parse_time_of_day(caps: &regex::Captures<'_>) -> Option<NaiveTime> {
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
    let second: u32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, second)
}

fn classify_rest(index: usize, rest: &str) -> (LogLineKind, LogLineData) {
    if let Some(caps) = RE_UNIT_PREFIX.captures(rest) {
        // Unit ids are two digits in practice; a parse failure here means the
        // regex matched something it should not have.
        let unit: u32 = caps[1].parse().unwrap_or(0);
        let slot: u32 = caps[2].parse().unwrap_or(0);
        return classify_unit_line(index, slot, unit, &caps[3]);
    }

    if let Some(caps) = RE_PAUSE.captures(rest) {
        let slot: u32 = caps[1].parse().unwrap_or(0);
        return if &caps[2] == "Paused" {
            (LogLineKind::Paused, LogLineData::Paused { slot })
        } else {
            (LogLineKind::Resumed, LogLineData::Resumed { slot })
        };
    }

    if let Some(caps) = RE_ERROR.captures(rest) {
        return (
            LogLineKind::Error,
            LogLineData::Error {
                text: caps[1].trim().to_string(),
            },
        );
    }

    if let Some(caps) = RE_ARGUMENTS.captures(rest) {
        return (
            LogLineKind::ClientArguments,
            LogLineData::ClientArguments {
                arguments: caps[1].trim().to_string(),
            },
        );
    }

    if let Some(caps) = RE_CLIENT_VERSION.captures(rest) {
        return (
            LogLineKind::ClientVersion,
            LogLineData::ClientVersion {
                version: caps[1].to_string(),
            },
        );
    }

    if let Some(caps) = RE_LIFETIME_UNITS.captures(rest) {
        if let Ok(count) = caps[1].parse::<u32>() {
            return (
                LogLineKind::LifetimeUnits,
                LogLineData::LifetimeUnits { count },
            );
        }
        warn!(line = index, "lifetime unit line with unparseable count");
        return (LogLineKind::Unknown, LogLineData::None);
    }

    (LogLineKind::Unknown, LogLineData::None)
}

fn classify_unit_line(index: usize, slot: u32, unit: u32, body: &str) -> (LogLineKind, LogLineData) {
    if let Some(caps) = RE_FRAME.captures(body) {
        match parse_frame(slot, unit, &caps) {
            Some(frame) => return (LogLineKind::FrameCompleted, LogLineData::Frame(frame)),
            None => {
                warn!(line = index, "frame line with unparseable step counts");
                return (LogLineKind::Unknown, LogLineData::None);
            }
        }
    }

    if let Some(caps) = RE_PROJECT.captures(body) {
        match parse_project(&caps) {
            Some(project) => {
                return (
                    LogLineKind::ProjectStart,
                    LogLineData::ProjectStart {
                        slot,
                        unit,
                        project,
                    },
                );
            }
            None => {
                warn!(line = index, "project line with unparseable 4-tuple");
                return (LogLineKind::Unknown, LogLineData::None);
            }
        }
    }

    if let Some(caps) = RE_SHUTDOWN.captures(body) {
        let result = parse_result(&caps[1]);
        if result == WorkUnitResult::Unknown {
            warn!(line = index, token = &caps[1], "unrecognized core shutdown token");
        }
        return (
            LogLineKind::CoreShutdown,
            LogLineData::CoreShutdown { slot, unit, result },
        );
    }

    if let Some(caps) = RE_CREDIT.captures(body) {
        if let Ok(points) = caps[1].parse::<f64>() {
            return (
                LogLineKind::FinalCreditEstimate,
                LogLineData::FinalCreditEstimate { slot, unit, points },
            );
        }
        warn!(line = index, "credit line with unparseable point value");
        return (LogLineKind::Unknown, LogLineData::None);
    }

    if let Some(caps) = RE_CORE_VERSION.captures(body) {
        return (
            LogLineKind::CoreVersion,
            LogLineData::CoreVersion {
                slot,
                unit,
                version: caps[1].to_string(),
            },
        );
    }

    (LogLineKind::Unknown, LogLineData::None)
}

fn parse_frame(slot: u32, unit: u32, caps: &regex::Captures<'_>) -> Option<FrameData> {
    Some(FrameData {
        slot,
        unit,
        steps_done: caps[1].parse().ok()?,
        steps_total: caps[2].parse().ok()?,
        frame_id: caps[3].parse().ok()?,
    })
}

fn parse_project(caps: &regex::Captures<'_>) -> Option<ProjectId> {
    Some(ProjectId::new(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
    ))
}

fn parse_result(token: &str) -> WorkUnitResult {
    match token {
        "FINISHED_UNIT" => WorkUnitResult::FinishedUnit,
        "EARLY_UNIT_END" => WorkUnitResult::EarlyUnitEnd,
        "INTERRUPTED" => WorkUnitResult::Interrupted,
        "BAD_WORK_UNIT" => WorkUnitResult::BadWorkUnit,
        "CORE_OUTDATED" => WorkUnitResult::CoreOutdated,
        "UNSTABLE_MACHINE" => WorkUnitResult::UnstableMachine,
        _ => WorkUnitResult::Unknown,
    }
}
