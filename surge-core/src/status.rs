use crate::ConfigError;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// A set of HTTP status codes, expressed as inclusive ranges.
///
/// Used both for a request's expected statuses (which decide `http_req_failed`) and for
/// status checks inside a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSet {
    ranges: Vec<RangeInclusive<u16>>,
}

impl StatusSet {
    pub fn new(ranges: Vec<RangeInclusive<u16>>) -> Self {
        Self { ranges }
    }

    pub fn codes(codes: &[u16]) -> Self {
        Self {
            ranges: codes.iter().map(|c| *c..=*c).collect(),
        }
    }

    pub fn contains(&self, status: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(&status))
    }
}

/// 200-399, which is what counts as a successful request unless told otherwise.
impl Default for StatusSet {
    fn default() -> Self {
        Self {
            ranges: vec![200..=399],
        }
    }
}

impl FromStr for StatusSet {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigError::MalformedStatusSet(s.to_string());

        let mut ranges = vec![];
        for part in s.split(',').map(str::trim) {
            let range = match part.split_once('-') {
                Some((lo, hi)) => {
                    let lo = lo.trim().parse::<u16>().map_err(|_| malformed())?;
                    let hi = hi.trim().parse::<u16>().map_err(|_| malformed())?;
                    if lo > hi {
                        return Err(malformed());
                    }
                    lo..=hi
                }
                None => {
                    let code = part.parse::<u16>().map_err(|_| malformed())?;
                    code..=code
                }
            };
            ranges.push(range);
        }

        Ok(Self { ranges })
    }
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .ranges
            .iter()
            .map(|r| {
                if r.start() == r.end() {
                    r.start().to_string()
                } else {
                    format!("{}-{}", r.start(), r.end())
                }
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}
