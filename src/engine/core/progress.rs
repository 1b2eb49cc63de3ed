use std::time::{Duration, Instant};

/// Minimum interval between emitted progress updates
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// Structured progress extracted from one encoder status line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// Encoded-time position in seconds
    pub position_s: f64,
    /// Completion fraction, clamped to [0,1]
    pub fraction: f64,
    /// Instantaneous speed multiplier, when the encoder reported one
    pub speed: Option<f64>,
}

/// Parser for the encoder's textual status stream.
///
/// FFmpeg interleaves status lines of the shape
/// `frame=  42 fps= 30 ... time=00:01:23.45 bitrate= ... speed=1.02x`
/// with ordinary log output. Lines without a parsable `time=` clock yield no
/// event. The reported fraction is monotonically non-decreasing for the life
/// of the parser; create a fresh parser per pass.
#[derive(Debug, Clone)]
pub struct StatusParser {
    duration_s: f64,
    last_fraction: f64,
}

impl StatusParser {
    /// `duration_s` is the known total duration of the source
    pub fn new(duration_s: f64) -> Self {
        Self {
            duration_s,
            last_fraction: 0.0,
        }
    }

    /// Parse a single status line; `None` for lines carrying no progress
    pub fn parse_line(&mut self, line: &str) -> Option<ProgressEvent> {
        let position_s = parse_clock(line)?;

        let raw = if self.duration_s > 0.0 {
            (position_s / self.duration_s).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let fraction = raw.max(self.last_fraction);
        self.last_fraction = fraction;

        Some(ProgressEvent {
            position_s,
            fraction,
            speed: parse_speed(line),
        })
    }

    /// Fraction of the most recent event (0.0 before any line matched)
    pub fn last_fraction(&self) -> f64 {
        self.last_fraction
    }
}

/// Extract the `time=HH:MM:SS.cc` clock as seconds
fn parse_clock(line: &str) -> Option<f64> {
    let start = line.find("time=")? + "time=".len();
    let token = line[start..]
        .split_whitespace()
        .next()?
        .trim_start_matches('-');

    // HH:MM:SS.cc with exactly two centisecond digits
    let mut fields = token.split(':');
    let hours: u64 = fields.next()?.parse().ok()?;
    let minutes: u64 = fields.next()?.parse().ok()?;
    let (seconds, centis) = fields.next()?.split_once('.')?;
    if fields.next().is_some() || centis.len() != 2 {
        return None;
    }
    let seconds: u64 = seconds.parse().ok()?;
    let centis: u64 = centis.parse().ok()?;

    Some((hours * 3600 + minutes * 60 + seconds) as f64 + centis as f64 / 100.0)
}

/// Extract the `speed=N.NNx` multiplier, if present
fn parse_speed(line: &str) -> Option<f64> {
    let start = line.find("speed=")? + "speed=".len();
    let token = line[start..].split_whitespace().next()?;
    token.trim_end_matches('x').parse().ok()
}

/// Gate limiting how often progress updates reach observers.
///
/// The status stream can produce many lines per second; observers only need
/// one update per [`PROGRESS_INTERVAL`].
#[derive(Debug)]
pub struct ProgressThrottle {
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self::with_interval(PROGRESS_INTERVAL)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
        }
    }

    /// True when enough time has elapsed since the last emitted update.
    /// Stamps the gate, so a `true` answer must be acted on.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}
