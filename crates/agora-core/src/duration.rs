//! ISO-8601 duration subset.
//!
//! Providers describe event length either as an explicit end time or as an
//! ISO-8601 duration string (`PT2H30M`, `P1DT4H`, ...). Year/month components
//! are not calendar-stable and no upstream emits them, so parsing rejects
//! them.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum DurationParseError {
    #[snafu(display("Not an ISO-8601 duration: `{input}`"))]
    Malformed { input: String },
    #[snafu(display("Unsupported duration component `{component}` in `{input}`"))]
    Unsupported { input: String, component: char },
}

/// A whole-second duration carried in canonical events.
#[derive(
    Encode, Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(try_from = "String", into = "String")]
pub struct IsoDuration {
    secs: u64,
}

impl IsoDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self { secs }
    }

    pub fn as_secs(self) -> u64 {
        self.secs
    }

    pub fn parse(input: &str) -> Result<Self, DurationParseError> {
        let rest = input
            .strip_prefix('P')
            .ok_or_else(|| DurationParseError::Malformed {
                input: input.to_string(),
            })?;
        if rest.is_empty() {
            return Err(DurationParseError::Malformed {
                input: input.to_string(),
            });
        }

        let mut secs: u64 = 0;
        let mut in_time = false;
        let mut digits = String::new();
        let mut saw_component = false;

        for c in rest.chars() {
            match c {
                'T' if !in_time => {
                    in_time = true;
                }
                '0'..='9' => digits.push(c),
                unit => {
                    let value: u64 =
                        digits
                            .parse()
                            .map_err(|_| DurationParseError::Malformed {
                                input: input.to_string(),
                            })?;
                    digits.clear();
                    saw_component = true;
                    let unit_secs = match (unit, in_time) {
                        ('D', false) => 86_400,
                        ('H', true) => 3_600,
                        ('M', true) => 60,
                        ('S', true) => 1,
                        // 'W'/'Y' and date-position 'M' are calendar units.
                        (component, _) => {
                            return Err(DurationParseError::Unsupported {
                                input: input.to_string(),
                                component,
                            });
                        }
                    };
                    secs = secs.saturating_add(value.saturating_mul(unit_secs));
                }
            }
        }

        if !digits.is_empty() || !saw_component {
            return Err(DurationParseError::Malformed {
                input: input.to_string(),
            });
        }

        Ok(Self { secs })
    }
}

impl std::fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut rem = self.secs;
        let days = rem / 86_400;
        rem %= 86_400;
        let hours = rem / 3_600;
        rem %= 3_600;
        let minutes = rem / 60;
        let seconds = rem % 60;

        f.write_str("P")?;
        if days > 0 {
            write!(f, "{days}D")?;
        }
        if hours > 0 || minutes > 0 || seconds > 0 || days == 0 {
            f.write_str("T")?;
            if hours > 0 {
                write!(f, "{hours}H")?;
            }
            if minutes > 0 {
                write!(f, "{minutes}M")?;
            }
            if seconds > 0 || (hours == 0 && minutes == 0) {
                write!(f, "{seconds}S")?;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for IsoDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IsoDuration {
    type Error = DurationParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<IsoDuration> for String {
    fn from(d: IsoDuration) -> Self {
        d.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        assert_eq!(IsoDuration::parse("PT2H").unwrap().as_secs(), 7_200);
        assert_eq!(IsoDuration::parse("PT2H30M").unwrap().as_secs(), 9_000);
        assert_eq!(IsoDuration::parse("PT90M").unwrap().as_secs(), 5_400);
        assert_eq!(
            IsoDuration::parse("P1DT4H").unwrap().as_secs(),
            86_400 + 4 * 3_600
        );
        assert_eq!(IsoDuration::parse("PT45S").unwrap().as_secs(), 45);
    }

    #[test]
    fn rejects_calendar_units_and_garbage() {
        assert!(matches!(
            IsoDuration::parse("P1M"),
            Err(DurationParseError::Unsupported { component: 'M', .. })
        ));
        assert!(matches!(
            IsoDuration::parse("P1Y"),
            Err(DurationParseError::Unsupported { component: 'Y', .. })
        ));
        assert!(IsoDuration::parse("2 hours").is_err());
        assert!(IsoDuration::parse("P").is_err());
        assert!(IsoDuration::parse("PT5").is_err());
    }

    #[test]
    fn display_round_trips() {
        for s in ["PT2H", "PT2H30M", "P1DT4H", "PT45S", "PT0S"] {
            let d = IsoDuration::parse(s).unwrap();
            assert_eq!(IsoDuration::parse(&d.to_string()).unwrap(), d);
        }
    }
}
