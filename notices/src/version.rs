use std::cmp::Ordering;
use std::fmt;

/// A dotted application version, as reported by notifiers and configured on apps.
///
/// Segments compare numerically when both are numbers and lexically otherwise.
/// A textual segment sorts below a numeric one, so `2.0.beta` is older than `2.0.0`.
/// Missing trailing segments count as zero: `2` and `2.0` are the same version.
#[derive(Debug, Clone)]
pub struct AppVersion {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Decimal digits without leading zeros, zero is the empty string.
    /// Kept as text so build numbers of any length compare correctly.
    Number(String),
    Text(String),
}

impl Segment {
    fn parse(value: &str) -> Segment {
        if value.bytes().all(|b| b.is_ascii_digit()) {
            Segment::Number(value.trim_start_matches('0').to_owned())
        } else {
            Segment::Text(value.to_owned())
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Number(a), Segment::Number(b)) => (a.len(), a).cmp(&(b.len(), b)),
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
        }
    }
}

static ZERO: Segment = Segment::Number(String::new());

impl AppVersion {
    /// Returns None for blank versions.
    pub fn parse(value: &str) -> Option<AppVersion> {
        let raw = value.trim();
        if raw.is_empty() {
            return None;
        }

        let segments = raw
            .split(['.', '-'])
            .filter(|s| !s.is_empty())
            .map(Segment::parse)
            .collect();

        Some(AppVersion {
            raw: raw.to_owned(),
            segments,
        })
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for AppVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AppVersion {}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let ours = self.segments.get(i).unwrap_or(&ZERO);
            let theirs = other.segments.get(i).unwrap_or(&ZERO);
            match ours.cmp(theirs) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        Ordering::Equal
    }
}
